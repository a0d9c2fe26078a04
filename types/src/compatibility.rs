//! Supplement compatibility scores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("compatibility score {0} is outside 0..=100")]
pub struct ScoreOutOfRange(pub f64);

/// Outcome of one compatibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    score: u8,
    explanation: String,
}

impl CompatibilityResult {
    /// Build a result from a raw model score, rounding fractional values.
    pub fn new(score: f64, explanation: impl Into<String>) -> Result<Self, ScoreOutOfRange> {
        if !score.is_finite() || !(0.0..=100.0).contains(&score) {
            return Err(ScoreOutOfRange(score));
        }
        Ok(Self {
            score: score.round() as u8,
            explanation: explanation.into(),
        })
    }

    #[must_use]
    pub fn score(&self) -> u8 {
        self.score
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn grade(&self) -> CompatibilityGrade {
        CompatibilityGrade::from_score(self.score)
    }
}

/// Display band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityGrade {
    /// 80 and above.
    Good,
    /// 50 to 79.
    Caution,
    /// Below 50.
    Poor,
}

impl CompatibilityGrade {
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Good,
            50..=79 => Self::Caution,
            _ => Self::Poor,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "좋음",
            Self::Caution => "주의",
            Self::Poor => "나쁨",
        }
    }
}
