//! # Bias Classifier
//!
//! Five-point ordinal political-bias scale and the hybrid rule that merges
//! a configured outlet-level prior with the content-derived signal coming
//! out of AI analysis.
//!
//! - Ordinal scale: Left = -2 … Right = +2.
//! - Content evidence wins on near-agreement (within one step).
//! - Outlier content signals are anchored back toward the outlet prior.
//! - Total: defined for every combination, including unknown inputs.

use serde::{Deserialize, Serialize};

/// Political bias label on a five-point ordinal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiasLabel {
    Left,
    #[serde(rename = "Lean Left")]
    LeanLeft,
    Center,
    #[serde(rename = "Lean Right")]
    LeanRight,
    Right,
}

impl BiasLabel {
    /// Ordinal score: Left = -2, Lean Left = -1, Center = 0,
    /// Lean Right = +1, Right = +2.
    pub fn score(self) -> i32 {
        match self {
            BiasLabel::Left => -2,
            BiasLabel::LeanLeft => -1,
            BiasLabel::Center => 0,
            BiasLabel::LeanRight => 1,
            BiasLabel::Right => 2,
        }
    }

    /// Inverse of [`score`](Self::score); clamps out-of-range values.
    pub fn from_score(score: i32) -> Self {
        match score {
            i32::MIN..=-2 => BiasLabel::Left,
            -1 => BiasLabel::LeanLeft,
            0 => BiasLabel::Center,
            1 => BiasLabel::LeanRight,
            _ => BiasLabel::Right,
        }
    }

    /// Parse the human-readable label ("Lean Left", "center", …).
    /// Case-insensitive, tolerant of hyphens/underscores between words.
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match norm.as_str() {
            "left" => Some(BiasLabel::Left),
            "lean left" => Some(BiasLabel::LeanLeft),
            "center" | "centre" => Some(BiasLabel::Center),
            "lean right" => Some(BiasLabel::LeanRight),
            "right" => Some(BiasLabel::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BiasLabel::Left => "Left",
            BiasLabel::LeanLeft => "Lean Left",
            BiasLabel::Center => "Center",
            BiasLabel::LeanRight => "Lean Right",
            BiasLabel::Right => "Right",
        }
    }
}

impl std::fmt::Display for BiasLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hybrid bias rule combining the outlet prior with the content signal.
///
/// - Both unknown → `Center`.
/// - Prior unknown → the content signal as-is.
/// - Content absent → the prior as-is.
/// - Within one step of each other → the content signal wins.
/// - Further apart → the midpoint, biased toward the prior: computed in
///   half-steps and floored to the prior's side, so `Left` vs `Right`
///   resolves to `Lean Left`, not `Center`.
pub fn classify(outlet_prior: Option<BiasLabel>, content_signal: Option<BiasLabel>) -> BiasLabel {
    match (outlet_prior, content_signal) {
        (None, None) => BiasLabel::Center,
        (None, Some(content)) => content,
        (Some(prior), None) => prior,
        (Some(prior), Some(content)) => {
            let d = content.score() - prior.score();
            if d.abs() <= 1 {
                content
            } else {
                BiasLabel::from_score(prior.score() + d.signum() * ((d.abs() - 1) / 2))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_roundtrip() {
        for label in [
            BiasLabel::Left,
            BiasLabel::LeanLeft,
            BiasLabel::Center,
            BiasLabel::LeanRight,
            BiasLabel::Right,
        ] {
            assert_eq!(BiasLabel::from_score(label.score()), label);
        }
    }

    #[test]
    fn parse_accepts_label_variants() {
        assert_eq!(BiasLabel::parse("Lean Left"), Some(BiasLabel::LeanLeft));
        assert_eq!(BiasLabel::parse("lean-right"), Some(BiasLabel::LeanRight));
        assert_eq!(BiasLabel::parse("  CENTER "), Some(BiasLabel::Center));
        assert_eq!(BiasLabel::parse("centrist"), None);
    }

    #[test]
    fn serde_uses_spaced_names() {
        let json = serde_json::to_string(&BiasLabel::LeanRight).unwrap();
        assert_eq!(json, "\"Lean Right\"");
        let back: BiasLabel = serde_json::from_str("\"Lean Left\"").unwrap();
        assert_eq!(back, BiasLabel::LeanLeft);
    }

    #[test]
    fn content_wins_within_one_step() {
        assert_eq!(
            classify(Some(BiasLabel::LeanRight), Some(BiasLabel::Center)),
            BiasLabel::Center
        );
        assert_eq!(
            classify(Some(BiasLabel::Left), Some(BiasLabel::LeanLeft)),
            BiasLabel::LeanLeft
        );
        assert_eq!(
            classify(Some(BiasLabel::Center), Some(BiasLabel::Center)),
            BiasLabel::Center
        );
    }

    #[test]
    fn outliers_anchor_toward_prior() {
        // Opposite extremes resolve one step to the prior's side.
        assert_eq!(
            classify(Some(BiasLabel::Left), Some(BiasLabel::Right)),
            BiasLabel::LeanLeft
        );
        assert_eq!(
            classify(Some(BiasLabel::Right), Some(BiasLabel::Left)),
            BiasLabel::LeanRight
        );
        // Three steps apart: fractional midpoint rounds toward the prior.
        assert_eq!(
            classify(Some(BiasLabel::Left), Some(BiasLabel::LeanRight)),
            BiasLabel::LeanLeft
        );
        // Two steps apart: anchored all the way back to the prior.
        assert_eq!(
            classify(Some(BiasLabel::Left), Some(BiasLabel::Center)),
            BiasLabel::Left
        );
    }

    #[test]
    fn unknown_inputs_are_total() {
        assert_eq!(classify(None, None), BiasLabel::Center);
        assert_eq!(classify(None, Some(BiasLabel::Right)), BiasLabel::Right);
        assert_eq!(classify(Some(BiasLabel::LeanLeft), None), BiasLabel::LeanLeft);
    }

    #[test]
    fn deterministic_over_all_pairs() {
        let all = [
            None,
            Some(BiasLabel::Left),
            Some(BiasLabel::LeanLeft),
            Some(BiasLabel::Center),
            Some(BiasLabel::LeanRight),
            Some(BiasLabel::Right),
        ];
        for p in all {
            for c in all {
                assert_eq!(classify(p, c), classify(p, c));
            }
        }
    }
}
