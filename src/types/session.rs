use super::checklist::FactorKey;
use super::idea::Idea;
use super::identifiers::{IdeaId, SessionId};
use super::mode::Mode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub language: String,
    pub operators: Vec<String>,
    pub admin_contact: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            operators: Vec::new(),
            admin_contact: None,
        }
    }
}

/// Cached result of the last successful identity verification. The bearer
/// token itself is never stored, only its fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProfile {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub credits: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub token_fingerprint: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
    pub scored_factors: u8,
    pub evidenced_factors: u8,
    pub total_factors: u8,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            scored_factors: 0,
            evidenced_factors: 0,
            total_factors: 10,
        }
    }
}

/// Persisted state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub session_id: SessionId,
    pub mode: Mode,
    pub last_mode_change: Option<DateTime<Utc>>,
    pub settings: Settings,
    pub credential: Option<CredentialProfile>,
    pub current_assessment: Option<IdeaId>,
    pub assessments: Vec<Idea>,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: SessionId::new(""),
            mode: Mode::default(),
            last_mode_change: None,
            settings: Settings::default(),
            credential: None,
            current_assessment: None,
            assessments: Vec::new(),
            progress: Progress::default(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }
}

impl SessionState {
    #[must_use]
    pub fn new(session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Brings a state from any source (fresh, persisted, imported) back onto its
    /// invariants: owned by `session_id`, unique idea ids, a current assessment
    /// that exists, and progress derived from that assessment.
    #[must_use]
    pub fn normalize(mut self, session_id: &SessionId, now: DateTime<Utc>) -> Self {
        self.session_id = session_id.clone();
        if self.created_at == DateTime::<Utc>::default() {
            self.created_at = now;
        }
        if self.updated_at < self.created_at {
            self.updated_at = self.created_at;
        }

        let mut seen = HashSet::new();
        self.assessments
            .retain(|idea| seen.insert(idea.idea_id.clone()));

        if let Some(current) = &self.current_assessment {
            if !self.assessments.iter().any(|idea| &idea.idea_id == current) {
                self.current_assessment = None;
            }
        }

        self.recompute_progress();
        self
    }

    #[must_use]
    pub fn idea(&self, idea_id: &IdeaId) -> Option<&Idea> {
        self.assessments.iter().find(|idea| &idea.idea_id == idea_id)
    }

    pub fn idea_mut(&mut self, idea_id: &IdeaId) -> Option<&mut Idea> {
        self.assessments
            .iter_mut()
            .find(|idea| &idea.idea_id == idea_id)
    }

    #[must_use]
    pub fn current_idea(&self) -> Option<&Idea> {
        self.current_assessment
            .as_ref()
            .and_then(|idea_id| self.idea(idea_id))
    }

    pub fn recompute_progress(&mut self) {
        let progress = self.current_idea().map_or_else(Progress::default, |idea| {
            let scored = FactorKey::ALL
                .iter()
                .filter(|key| idea.checklist.item(**key).score().is_some())
                .count();
            let evidenced = FactorKey::ALL
                .iter()
                .filter(|key| idea.checklist.item(**key).has_evidence())
                .count();
            Progress {
                scored_factors: u8::try_from(scored).unwrap_or(u8::MAX),
                evidenced_factors: u8::try_from(evidenced).unwrap_or(u8::MAX),
                total_factors: 10,
            }
        });
        self.progress = progress;
    }
}
