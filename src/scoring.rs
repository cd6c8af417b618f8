//! Risk scoring: rating = likelihood × impact, bucketed into four severity bands.
//!
//! Band ladder (rating is 1..=25):
//! - `>= 17` Very High
//! - `>= 10` High
//! - `>= 4`  Moderate
//! - otherwise Low

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

const VERY_HIGH_FROM: u8 = 17;
const HIGH_FROM: u8 = 10;
const MODERATE_FROM: u8 = 4;

/// Qualitative band for a rating. Ordered from least to most severe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ToSchema)]
pub enum Severity {
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl Severity {
    pub fn from_rating(rating: u8) -> Self {
        if rating >= VERY_HIGH_FROM {
            Severity::VeryHigh
        } else if rating >= HIGH_FROM {
            Severity::High
        } else if rating >= MODERATE_FROM {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
            Severity::VeryHigh => "Very High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A validated likelihood/impact pair with its derived rating and band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub likelihood: u8,
    pub impact: u8,
    pub rating: u8,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must be between 1 and 5, got {value}")]
pub struct ScoreOutOfRange {
    pub field: &'static str,
    pub value: i64,
}

fn check(field: &'static str, value: i64) -> Result<u8, ScoreOutOfRange> {
    if (MIN_SCORE as i64..=MAX_SCORE as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ScoreOutOfRange { field, value })
    }
}

/// Score a likelihood/impact pair. Both must be in 1..=5.
pub fn assess(likelihood: i64, impact: i64) -> Result<Assessment, ScoreOutOfRange> {
    let likelihood = check("likelihood", likelihood)?;
    let impact = check("impact", impact)?;
    let rating = likelihood * impact;
    Ok(Assessment {
        likelihood,
        impact,
        rating,
        severity: Severity::from_rating(rating),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_and_band_over_full_matrix() {
        for likelihood in 1..=5i64 {
            for impact in 1..=5i64 {
                let a = assess(likelihood, impact).unwrap();
                let rating = (likelihood * impact) as u8;
                assert_eq!(a.rating, rating);
                let expected = match rating {
                    17..=25 => Severity::VeryHigh,
                    10..=16 => Severity::High,
                    4..=9 => Severity::Moderate,
                    _ => Severity::Low,
                };
                assert_eq!(a.severity, expected, "l={} i={}", likelihood, impact);
            }
        }
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(Severity::from_rating(3), Severity::Low);
        assert_eq!(Severity::from_rating(4), Severity::Moderate);
        assert_eq!(Severity::from_rating(9), Severity::Moderate);
        assert_eq!(Severity::from_rating(10), Severity::High);
        assert_eq!(Severity::from_rating(16), Severity::High);
        assert_eq!(Severity::from_rating(17), Severity::VeryHigh);
        assert_eq!(Severity::from_rating(25), Severity::VeryHigh);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = assess(0, 3).unwrap_err();
        assert_eq!(err.field, "likelihood");
        let err = assess(3, 6).unwrap_err();
        assert_eq!(err.field, "impact");
        assert!(err.to_string().contains("between 1 and 5"));
    }

    #[test]
    fn test_severity_wire_labels() {
        assert_eq!(serde_json::to_string(&Severity::VeryHigh).unwrap(), "\"Very High\"");
        let low: Severity = serde_json::from_str("\"Low\"").unwrap();
        assert_eq!(low, Severity::Low);
    }
}
