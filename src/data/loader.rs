// ============================================================
// Layer 4 — Example Loaders
// ============================================================
// Reads labelled examples from disk.
//
// Two on-disk formats are supported:
//
//   CSV  — one row per example, a text column plus either
//          one class column (classification) or one column
//          per dimension (regression), e.g.
//
//            review,label
//            "房间很干净",1
//
//   JSON — an array of objects, label is an int or a float list:
//
//            [{"text": "...", "label": [0.4, 61.0, ...]}]
//
// Rows with a missing, unparsable, non-finite or out-of-range
// label are DROPPED (DataError policy) and counted; a summary is
// logged once per file instead of failing the load.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::example::{Example, Label, TaskMode};
use crate::domain::traits::ExampleSource;

// ─── CSV ──────────────────────────────────────────────────────────────────────
pub struct CsvExampleSource {
    path:          PathBuf,
    text_column:   String,
    label_columns: Vec<String>,
}

impl CsvExampleSource {
    pub fn new(
        path:          impl Into<PathBuf>,
        text_column:   impl Into<String>,
        label_columns: Vec<String>,
    ) -> Self {
        Self {
            path:        path.into(),
            text_column: text_column.into(),
            label_columns,
        }
    }
}

/// Parse one class id cell; "1", "1.0" and " 2 " are accepted.
fn parse_class(cell: &str) -> Option<usize> {
    let v: f64 = cell.trim().parse().ok()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Some(v as usize)
    } else {
        None
    }
}

fn parse_score(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl ExampleSource for CsvExampleSource {
    fn load_examples(&self, mode: &TaskMode) -> Result<Vec<Example>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Cannot open CSV '{}'", self.path.display()))?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .with_context(|| format!("Column '{name}' not found in '{}'", self.path.display()))
        };

        let text_idx = column(&self.text_column)?;
        let label_idx: Vec<usize> = self
            .label_columns
            .iter()
            .map(|c| column(c))
            .collect::<Result<_>>()?;

        let mut examples = Vec::new();
        let mut dropped  = 0usize;

        for record in reader.records() {
            let record = match record {
                Ok(r)  => r,
                Err(e) => {
                    tracing::debug!("Skipping malformed CSV row: {e}");
                    dropped += 1;
                    continue;
                }
            };

            let Some(text) = record.get(text_idx) else {
                dropped += 1;
                continue;
            };

            let label = if mode.is_classification() {
                label_idx
                    .first()
                    .and_then(|&i| record.get(i))
                    .and_then(parse_class)
                    .map(Label::Class)
            } else {
                label_idx
                    .iter()
                    .map(|&i| record.get(i).and_then(parse_score))
                    .collect::<Option<Vec<f64>>>()
                    .map(Label::Scores)
            };

            match label {
                Some(label) if mode.validate_label(&label).is_ok() => {
                    examples.push(Example::new(text, label));
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            tracing::warn!(
                "Dropped {} rows with missing or invalid labels from '{}'",
                dropped,
                self.path.display()
            );
        }
        tracing::info!("Loaded {} examples from '{}'", examples.len(), self.path.display());
        Ok(examples)
    }
}

// ─── JSON ─────────────────────────────────────────────────────────────────────
pub struct JsonExampleSource {
    path: PathBuf,
}

impl JsonExampleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExampleSource for JsonExampleSource {
    fn load_examples(&self, mode: &TaskMode) -> Result<Vec<Example>> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;

        // Parse loosely first so one bad row does not sink the file.
        let rows: Vec<serde_json::Value> = serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a JSON array", self.path.display()))?;

        let total = rows.len();
        let examples: Vec<Example> = rows
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Example>(v).ok())
            .filter(|e| mode.validate_label(&e.label).is_ok())
            .collect();

        if examples.len() < total {
            tracing::warn!(
                "Dropped {} rows with missing or invalid labels from '{}'",
                total - examples.len(),
                self.path.display()
            );
        }
        tracing::info!("Loaded {} examples from '{}'", examples.len(), self.path.display());
        Ok(examples)
    }
}

/// Pick a loader from the file extension.
pub fn source_for_path(
    path:          impl Into<PathBuf>,
    text_column:   &str,
    label_columns: Vec<String>,
) -> Box<dyn ExampleSource> {
    let path = path.into();
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Box::new(JsonExampleSource::new(path)),
        _            => Box::new(CsvExampleSource::new(path, text_column, label_columns)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dimension::DimensionSpec;
    use std::io::Write;

    fn write_tmp(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_csv_drops_bad_labels() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "reviews.csv",
            "label,review\n1,great stay\n0,dirty room\n,no label\nabc,garbage\n7,out of range\n1.0,fine\n");
        let src = CsvExampleSource::new(&path, "review", vec!["label".into()]);
        let mode = TaskMode::Classification { num_classes: 2, class_names: vec![] };
        let examples = src.load_examples(&mode).unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].label, Label::Class(1));
        assert_eq!(examples[2].text, "fine");
    }

    #[test]
    fn test_csv_regression_columns_in_declared_order() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "dims.csv", "text,b,a\nhello,2.0,1.0\nbad,x,1.0\n");
        let src = CsvExampleSource::new(&path, "text", vec!["a".into(), "b".into()]);
        let mode = TaskMode::Regression {
            dimensions: vec![DimensionSpec::new("a", 0.0, 5.0), DimensionSpec::new("b", 0.0, 5.0)],
        };
        let examples = src.load_examples(&mode).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, Label::Scores(vec![1.0, 2.0]));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "x.csv", "a,b\n1,2\n");
        let src = CsvExampleSource::new(&path, "review", vec!["label".into()]);
        assert!(src.load_examples(&TaskMode::sentiment()).is_err());
    }

    #[test]
    fn test_json_array_source() {
        let dir  = tempfile::tempdir().unwrap();
        let path = write_tmp(&dir, "data.json",
            r#"[{"text":"a","label":[0.1,0.2]},{"text":"b","label":[0.3]},{"label":[1,2]}]"#);
        let mode = TaskMode::Regression {
            dimensions: vec![DimensionSpec::new("x", 0.0, 1.0), DimensionSpec::new("y", 0.0, 1.0)],
        };
        let examples = JsonExampleSource::new(&path).load_examples(&mode).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].text, "a");
    }
}
