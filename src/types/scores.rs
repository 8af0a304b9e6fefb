use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a derived percentage score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Unknown,
    Red,
    Yellow,
    Green,
}

impl Bucket {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsetCoverage {
    pub factors: u8,
    pub scored: u8,
    pub evidenced: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedScores {
    pub potential_score: u8,
    pub actualization_score: u8,
    pub potential_bucket: Bucket,
    pub actualization_bucket: Bucket,
    pub potential_coverage: SubsetCoverage,
    pub actualization_coverage: SubsetCoverage,
}
