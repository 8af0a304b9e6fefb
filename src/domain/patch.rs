#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Field-level merge of partial updates into a session.
//!
//! Precedence: a field absent from the patch keeps its current value, a field
//! present overwrites it. `settings` and per-idea `checklist` entries merge
//! recursively. Evidence is append-only, so a factor patch can only add to it.
//! A patch is applied all-or-nothing.

use crate::error::{Result, SessionError};
use crate::types::{
    CredentialProfile, Evidence, FactorKey, Idea, IdeaId, LifecycleStage, SessionState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn explicit_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_contact: Option<Option<String>>,
}

impl SettingsPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.language.is_none() && self.operators.is_none() && self.admin_contact.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FactorPatch {
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append_evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IdeaPatch {
    pub idea_id: IdeaId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<LifecycleStage>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checklist: BTreeMap<FactorKey, FactorPatch>,
}

impl IdeaPatch {
    #[must_use]
    pub fn new(idea_id: IdeaId) -> Self {
        Self {
            idea_id,
            title: None,
            summary: None,
            description: None,
            stage: None,
            checklist: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_score(mut self, factor: FactorKey, score: Option<i64>) -> Self {
        self.checklist.entry(factor).or_default().score = Some(score);
        self
    }

    #[must_use]
    pub fn with_evidence(mut self, factor: FactorKey, evidence: Evidence) -> Self {
        self.checklist
            .entry(factor)
            .or_default()
            .append_evidence
            .push(evidence);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsPatch>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub credential: Option<Option<CredentialProfile>>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_assessment: Option<Option<IdeaId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upsert_ideas: Vec<IdeaPatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_ideas: Vec<IdeaId>,
}

impl SessionPatch {
    #[must_use]
    pub fn settings(settings: SettingsPatch) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn idea(idea: IdeaPatch) -> Self {
        Self {
            upsert_ideas: vec![idea],
            ..Self::default()
        }
    }
}

fn validate_settings(patch: &SettingsPatch) -> Result<()> {
    if patch
        .language
        .as_deref()
        .is_some_and(|language| language.trim().is_empty())
    {
        return Err(SessionError::Validation(
            "settings.language must not be empty".to_string(),
        ));
    }
    if patch
        .operators
        .as_ref()
        .is_some_and(|operators| operators.iter().any(|op| op.trim().is_empty()))
    {
        return Err(SessionError::Validation(
            "settings.operators must not contain empty entries".to_string(),
        ));
    }
    Ok(())
}

fn merge_idea(idea: &mut Idea, patch: IdeaPatch, now: DateTime<Utc>) -> Result<()> {
    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(SessionError::Validation(format!(
                "idea {} title must not be empty",
                idea.idea_id
            )));
        }
        idea.title = title;
    }
    if let Some(summary) = patch.summary {
        idea.summary = summary;
    }
    if let Some(description) = patch.description {
        idea.description = description;
    }
    if let Some(stage) = patch.stage {
        idea.stage = stage;
    }
    for (factor, factor_patch) in patch.checklist {
        let item = idea.checklist.item_mut(factor);
        if let Some(score) = factor_patch.score {
            item.set_score(score);
        }
        for evidence in factor_patch.append_evidence {
            item.append_evidence(evidence);
        }
    }
    idea.updated_at = now;
    Ok(())
}

impl SessionState {
    /// Merges `patch` into the state.
    ///
    /// # Errors
    /// Returns a validation error (and leaves the state untouched) when the
    /// patch names an unknown current assessment, creates an idea without a
    /// title, or carries invalid settings.
    pub fn apply_patch(&mut self, patch: SessionPatch, now: DateTime<Utc>) -> Result<()> {
        let mut next = self.clone();

        if let Some(settings) = patch.settings {
            validate_settings(&settings)?;
            if let Some(language) = settings.language {
                next.settings.language = language;
            }
            if let Some(operators) = settings.operators {
                next.settings.operators = operators;
            }
            if let Some(admin_contact) = settings.admin_contact {
                next.settings.admin_contact = admin_contact;
            }
        }

        if let Some(credential) = patch.credential {
            next.credential = credential;
        }

        for idea_patch in patch.upsert_ideas {
            if let Some(idea) = next.idea_mut(&idea_patch.idea_id) {
                merge_idea(idea, idea_patch, now)?;
            } else {
                let title = idea_patch.title.clone().unwrap_or_default();
                if title.trim().is_empty() {
                    return Err(SessionError::Validation(format!(
                        "new idea {} requires a title",
                        idea_patch.idea_id
                    )));
                }
                let mut idea = Idea::new(idea_patch.idea_id.clone(), title, now);
                merge_idea(&mut idea, idea_patch, now)?;
                next.assessments.push(idea);
            }
        }

        for idea_id in &patch.remove_ideas {
            next.assessments.retain(|idea| &idea.idea_id != idea_id);
            if next.current_assessment.as_ref() == Some(idea_id) {
                next.current_assessment = None;
            }
        }

        if let Some(current) = patch.current_assessment {
            if let Some(idea_id) = &current {
                if next.idea(idea_id).is_none() {
                    return Err(SessionError::Validation(format!(
                        "current assessment {idea_id} does not exist"
                    )));
                }
            }
            next.current_assessment = current;
        }

        next.recompute_progress();
        next.updated_at = next.updated_at.max(now);
        *self = next;
        Ok(())
    }
}
