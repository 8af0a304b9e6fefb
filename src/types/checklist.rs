use super::identifiers::EvidenceId;
use crate::domain::scoring::evidence_strength;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const MAX_FACTOR_SCORE: u8 = 5;
pub const MAX_EVIDENCE_STRENGTH: u8 = 3;

/// The ten fixed dimensions of an idea assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKey {
    ProblemClarity,
    MarketSize,
    Competition,
    UniqueValue,
    BusinessModel,
    Timing,
    Scalability,
    TeamCapability,
    ExecutionProgress,
    CustomerTraction,
}

impl FactorKey {
    pub const ALL: [Self; 10] = [
        Self::ProblemClarity,
        Self::MarketSize,
        Self::Competition,
        Self::UniqueValue,
        Self::BusinessModel,
        Self::Timing,
        Self::Scalability,
        Self::TeamCapability,
        Self::ExecutionProgress,
        Self::CustomerTraction,
    ];

    /// Factors that feed the potential score.
    pub const POTENTIAL: [Self; 7] = [
        Self::ProblemClarity,
        Self::MarketSize,
        Self::Competition,
        Self::UniqueValue,
        Self::BusinessModel,
        Self::Timing,
        Self::Scalability,
    ];

    /// Factors that feed the actualization score.
    pub const ACTUALIZATION: [Self; 3] = [
        Self::TeamCapability,
        Self::ExecutionProgress,
        Self::CustomerTraction,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProblemClarity => "problem_clarity",
            Self::MarketSize => "market_size",
            Self::Competition => "competition",
            Self::UniqueValue => "unique_value",
            Self::BusinessModel => "business_model",
            Self::Timing => "timing",
            Self::Scalability => "scalability",
            Self::TeamCapability => "team_capability",
            Self::ExecutionProgress => "execution_progress",
            Self::CustomerTraction => "customer_traction",
        }
    }
}

impl fmt::Display for FactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for FactorKey {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("Unknown factor: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Conversational,
    Manual,
    Metric,
    Document,
    External,
}

impl EvidenceType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Manual => "manual",
            Self::Metric => "metric",
            Self::Document => "document",
            Self::External => "external",
        }
    }
}

impl TryFrom<&str> for EvidenceType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "conversational" => Ok(Self::Conversational),
            "manual" => Ok(Self::Manual),
            "metric" => Ok(Self::Metric),
            "document" => Ok(Self::Document),
            "external" => Ok(Self::External),
            _ => Err(format!("Unknown evidence type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceOrigin {
    Agent,
    System,
    User,
}

/// One support record behind a factor score. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: EvidenceId,
    #[serde(rename = "type")]
    pub kind: EvidenceType,
    pub source: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub origin: EvidenceOrigin,
}

impl Evidence {
    #[must_use]
    pub fn new(
        kind: EvidenceType,
        source: impl Into<String>,
        value: Value,
        origin: EvidenceOrigin,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EvidenceId::generate(),
            kind,
            source: source.into(),
            value,
            confidence: None,
            timestamp,
            origin,
        }
    }

    /// Confidence outside `[0, 1]` (or NaN) is dropped rather than trusted.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = (0.0..=1.0).contains(&confidence).then_some(confidence);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChecklistItemRepr {
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    evidence_strength: u8,
    #[serde(default)]
    evidence: Vec<Evidence>,
}

/// Score and evidence for one factor. `evidence_strength` is always recomputed
/// from `evidence`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChecklistItemRepr", into = "ChecklistItemRepr")]
pub struct ChecklistItem {
    score: Option<u8>,
    evidence_strength: u8,
    evidence: Vec<Evidence>,
}

impl ChecklistItem {
    #[must_use]
    pub const fn score(&self) -> Option<u8> {
        self.score
    }

    #[must_use]
    pub const fn evidence_strength(&self) -> u8 {
        self.evidence_strength
    }

    #[must_use]
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    #[must_use]
    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }

    pub fn set_score(&mut self, score: Option<i64>) {
        self.score = score.map(clamp_score);
    }

    pub fn append_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
        self.evidence_strength = evidence_strength(&self.evidence);
    }
}

fn clamp_score(raw: i64) -> u8 {
    u8::try_from(raw.clamp(0, i64::from(MAX_FACTOR_SCORE))).unwrap_or(0)
}

impl From<ChecklistItemRepr> for ChecklistItem {
    fn from(repr: ChecklistItemRepr) -> Self {
        let evidence_strength = evidence_strength(&repr.evidence);
        Self {
            score: repr.score.map(clamp_score),
            evidence_strength,
            evidence: repr.evidence,
        }
    }
}

impl From<ChecklistItem> for ChecklistItemRepr {
    fn from(item: ChecklistItem) -> Self {
        Self {
            score: item.score.map(i64::from),
            evidence_strength: item.evidence_strength,
            evidence: item.evidence,
        }
    }
}

/// Always holds exactly the ten canonical factors. Unknown keys met while
/// deserializing are dropped and missing ones are filled with empty items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, ChecklistItem>",
    into = "BTreeMap<String, ChecklistItem>"
)]
pub struct Checklist(BTreeMap<FactorKey, ChecklistItem>);

impl Default for Checklist {
    fn default() -> Self {
        Self(
            FactorKey::ALL
                .into_iter()
                .map(|key| (key, ChecklistItem::default()))
                .collect(),
        )
    }
}

impl Checklist {
    #[must_use]
    pub fn item(&self, key: FactorKey) -> &ChecklistItem {
        static EMPTY: ChecklistItem = ChecklistItem {
            score: None,
            evidence_strength: 0,
            evidence: Vec::new(),
        };
        self.0.get(&key).unwrap_or(&EMPTY)
    }

    pub fn item_mut(&mut self, key: FactorKey) -> &mut ChecklistItem {
        self.0.entry(key).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FactorKey, &ChecklistItem)> {
        self.0.iter().map(|(key, item)| (*key, item))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, ChecklistItem>> for Checklist {
    fn from(raw: BTreeMap<String, ChecklistItem>) -> Self {
        let mut checklist = Self::default();
        for (name, item) in raw {
            if let Ok(key) = FactorKey::try_from(name.as_str()) {
                checklist.0.insert(key, item);
            }
        }
        checklist
    }
}

impl From<Checklist> for BTreeMap<String, ChecklistItem> {
    fn from(checklist: Checklist) -> Self {
        checklist
            .0
            .into_iter()
            .map(|(key, item)| (key.as_str().to_string(), item))
            .collect()
    }
}
