// ============================================================
// Layer 3 — Scoring Dimensions
// ============================================================
// A dimension is one continuous psychological axis the model
// scores (valence, anxiety, ...). Each has a declared physical
// range. The network itself only ever sees values normalised
// into [0, 1]; conversion happens at the edges:
//
//   dataset preparation:  physical → normalised  (normalize)
//   prediction / report:  normalised → physical  (denormalize)
//
// The ORDER of a dimension list is part of the label contract:
// index i of a label vector, head i of the model and entry i of
// this list all describe the same axis.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub min:  f64,
    pub max:  f64,
}

impl DimensionSpec {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self { name: name.into(), min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map a physical value into [0, 1], clamping out-of-range input.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.span() <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / self.span()).clamp(0.0, 1.0)
    }

    /// Map a normalised model output back to the physical range.
    pub fn denormalize(&self, unit: f64) -> f64 {
        self.min + unit * self.span()
    }
}

/// The default ten-axis psychological profile:
/// PAD (valence / arousal / dominance), clinical scales, emotional
/// traits and cognitive indicators.
pub fn psych_dimensions() -> Vec<DimensionSpec> {
    vec![
        DimensionSpec::new("valence",              -1.0,   1.0),
        DimensionSpec::new("arousal",               0.0, 100.0),
        DimensionSpec::new("dominance",             0.0, 100.0),
        DimensionSpec::new("anxiety",               0.0,  21.0),
        DimensionSpec::new("depression",            0.0,  21.0),
        DimensionSpec::new("stress",                0.0,  40.0),
        DimensionSpec::new("emotional_salience",    0.0, 100.0),
        DimensionSpec::new("emotional_complexity",  0.0, 100.0),
        DimensionSpec::new("loneliness_index",      0.0, 100.0),
        DimensionSpec::new("self_reflection",       0.0, 100.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valence_maps_to_unit_interval() {
        let valence = DimensionSpec::new("valence", -1.0, 1.0);
        assert_eq!(valence.normalize(-1.0), 0.0);
        assert_eq!(valence.normalize(0.0), 0.5);
        assert_eq!(valence.denormalize(1.0), 1.0);
    }

    #[test]
    fn test_anxiety_round_trips_through_unit_range() {
        let anxiety = DimensionSpec::new("anxiety", 0.0, 21.0);
        let unit = anxiety.normalize(7.0);
        assert!((anxiety.denormalize(unit) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let stress = DimensionSpec::new("stress", 0.0, 40.0);
        assert_eq!(stress.normalize(55.0), 1.0);
        assert_eq!(stress.normalize(-3.0), 0.0);
    }

    #[test]
    fn test_default_profile_order() {
        let dims = psych_dimensions();
        assert_eq!(dims.len(), 10);
        assert_eq!(dims[0].name, "valence");
        assert_eq!(dims[3].name, "anxiety");
        assert_eq!(dims[3].max, 21.0);
        assert_eq!(dims[9].name, "self_reflection");
    }
}
