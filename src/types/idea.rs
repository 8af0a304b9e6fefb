use super::checklist::Checklist;
use super::identifiers::IdeaId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleStage {
    #[default]
    #[serde(rename = "concept")]
    Concept,
    #[serde(rename = "pre-MVP")]
    PreMvp,
    #[serde(rename = "MVP")]
    Mvp,
    #[serde(rename = "post-launch")]
    PostLaunch,
}

impl LifecycleStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::PreMvp => "pre-MVP",
            Self::Mvp => "MVP",
            Self::PostLaunch => "post-launch",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LifecycleStage {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "concept" => Ok(Self::Concept),
            "pre-MVP" | "pre-mvp" => Ok(Self::PreMvp),
            "MVP" | "mvp" => Ok(Self::Mvp),
            "post-launch" => Ok(Self::PostLaunch),
            _ => Err(format!("Unknown lifecycle stage: {s}")),
        }
    }
}

/// One assessed concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub idea_id: IdeaId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stage: LifecycleStage,
    #[serde(default)]
    pub checklist: Checklist,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Idea {
    #[must_use]
    pub fn new(idea_id: IdeaId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            idea_id,
            title: title.into(),
            summary: String::new(),
            description: String::new(),
            stage: LifecycleStage::default(),
            checklist: Checklist::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
