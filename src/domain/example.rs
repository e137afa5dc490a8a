// ============================================================
// Layer 3 — Example / Label / TaskMode
// ============================================================
// An Example is one (text, label) pair straight from the corpus.
//
// A label is EITHER a class id OR a fixed-length vector of
// continuous scores — never both within one dataset. The
// TaskMode decides which one a run expects and how the model's
// head outputs are post-processed:
//
//   Classification → log-softmax over K class heads
//   Regression     → sigmoid per dimension head, rescaled later
//
// Reference: Rust Book §6 (Enums and Pattern Matching)

use serde::{Deserialize, Serialize};

use crate::domain::dimension::DimensionSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Class(usize),
    Scores(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub text:  String,
    pub label: Label,
}

impl Example {
    pub fn new(text: impl Into<String>, label: Label) -> Self {
        Self { text: text.into(), label }
    }

    pub fn class(&self) -> Option<usize> {
        match self.label {
            Label::Class(c) => Some(c),
            Label::Scores(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaskMode {
    Classification {
        num_classes: usize,
        #[serde(default)]
        class_names: Vec<String>,
    },
    Regression {
        dimensions: Vec<DimensionSpec>,
    },
}

impl TaskMode {
    /// Three-way sentiment: negative / neutral / positive.
    pub fn sentiment() -> Self {
        TaskMode::Classification {
            num_classes: 3,
            class_names: vec!["negative".into(), "neutral".into(), "positive".into()],
        }
    }

    /// Number of model outputs K (one head per class or per dimension).
    pub fn output_size(&self) -> usize {
        match self {
            TaskMode::Classification { num_classes, .. } => *num_classes,
            TaskMode::Regression { dimensions } => dimensions.len(),
        }
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, TaskMode::Classification { .. })
    }

    /// Human-readable name of each output, in head order.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            TaskMode::Classification { num_classes, class_names } => (0..*num_classes)
                .map(|i| class_names.get(i).cloned().unwrap_or_else(|| format!("class_{i}")))
                .collect(),
            TaskMode::Regression { dimensions } => {
                dimensions.iter().map(|d| d.name.clone()).collect()
            }
        }
    }

    /// Check that a label has the shape this task expects.
    /// Returns a reason string when it does not (the row is dropped).
    pub fn validate_label(&self, label: &Label) -> Result<(), String> {
        match (self, label) {
            (TaskMode::Classification { num_classes, .. }, Label::Class(c)) => {
                if c < num_classes {
                    Ok(())
                } else {
                    Err(format!("class id {c} outside 0..{num_classes}"))
                }
            }
            (TaskMode::Regression { dimensions }, Label::Scores(v)) => {
                if v.len() != dimensions.len() {
                    Err(format!("expected {} scores, got {}", dimensions.len(), v.len()))
                } else if v.iter().any(|x| !x.is_finite()) {
                    Err("non-finite score".to_string())
                } else {
                    Ok(())
                }
            }
            (TaskMode::Classification { .. }, Label::Scores(_)) => {
                Err("score vector in a classification task".to_string())
            }
            (TaskMode::Regression { .. }, Label::Class(_)) => {
                Err("class id in a regression task".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dimension::psych_dimensions;

    #[test]
    fn test_output_size_matches_mode() {
        assert_eq!(TaskMode::sentiment().output_size(), 3);
        let reg = TaskMode::Regression { dimensions: psych_dimensions() };
        assert_eq!(reg.output_size(), 10);
    }

    #[test]
    fn test_mixed_labels_are_rejected() {
        let cls = TaskMode::sentiment();
        assert!(cls.validate_label(&Label::Class(2)).is_ok());
        assert!(cls.validate_label(&Label::Class(3)).is_err());
        assert!(cls.validate_label(&Label::Scores(vec![0.1])).is_err());

        let reg = TaskMode::Regression { dimensions: psych_dimensions() };
        assert!(reg.validate_label(&Label::Scores(vec![0.0; 10])).is_ok());
        assert!(reg.validate_label(&Label::Scores(vec![0.0; 9])).is_err());
        assert!(reg.validate_label(&Label::Scores(vec![f64::NAN; 10])).is_err());
    }

    #[test]
    fn test_output_names_fall_back_to_index() {
        let mode = TaskMode::Classification { num_classes: 2, class_names: vec![] };
        assert_eq!(mode.output_names(), vec!["class_0", "class_1"]);
    }

    #[test]
    fn test_label_json_is_untagged() {
        let ex: Example = serde_json::from_str(r#"{"text":"hi","label":[0.5,0.2]}"#).unwrap();
        assert_eq!(ex.label, Label::Scores(vec![0.5, 0.2]));
        let ex: Example = serde_json::from_str(r#"{"text":"hi","label":1}"#).unwrap();
        assert_eq!(ex.class(), Some(1));
    }
}
