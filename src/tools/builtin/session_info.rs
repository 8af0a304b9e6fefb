use crate::domain::derive_scores;
use crate::tools::{parse_args, Tool, ToolContext, ToolError, ToolFuture, ToolName};
use crate::types::{FactorKey, Idea, IdeaId, Mode, SessionState};
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

pub struct GetSessionInfo;

impl Tool for GetSessionInfo {
    fn name(&self) -> ToolName {
        ToolName::GetSessionInfo
    }

    fn description(&self) -> &'static str {
        "Summarize the session: current mode, settings, ideas and checklist progress."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let NoArgs {} = parse_args(args)?;
            let state = ctx.state();
            Ok(json!({
                "mode": state.mode,
                "lastModeChange": state.last_mode_change,
                "settings": state.settings,
                "user": state.credential.as_ref().map(|profile| json!({
                    "email": profile.email,
                    "credits": profile.credits,
                })),
                "currentAssessment": state.current_assessment,
                "ideas": state
                    .assessments
                    .iter()
                    .map(|idea| json!({
                        "ideaId": idea.idea_id,
                        "title": idea.title,
                        "stage": idea.stage,
                    }))
                    .collect::<Vec<_>>(),
                "progress": state.progress,
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GetScoresArgs {
    #[serde(default)]
    idea_id: Option<IdeaId>,
}

/// The named idea, or the current assessment when none is named.
pub fn resolve_idea<'s>(
    state: &'s SessionState,
    idea_id: Option<&IdeaId>,
) -> Result<&'s Idea, ToolError> {
    match idea_id {
        Some(idea_id) => state
            .idea(idea_id)
            .ok_or_else(|| ToolError::NotFound(format!("idea {idea_id}"))),
        None => state.current_idea().ok_or_else(|| {
            ToolError::Precondition("no idea is selected; pass ideaId".to_string())
        }),
    }
}

pub fn score_report(idea: &Idea) -> Value {
    let factors = FactorKey::ALL
        .iter()
        .map(|key| {
            let item = idea.checklist.item(*key);
            (
                key.as_str().to_string(),
                json!({
                    "score": item.score(),
                    "evidenceStrength": item.evidence_strength(),
                    "evidenceCount": item.evidence().len(),
                }),
            )
        })
        .collect::<Map<String, Value>>();
    json!({
        "ideaId": idea.idea_id,
        "title": idea.title,
        "scores": derive_scores(&idea.checklist),
        "factors": factors,
    })
}

pub struct GetScores;

impl Tool for GetScores {
    fn name(&self) -> ToolName {
        ToolName::GetScores
    }

    fn description(&self) -> &'static str {
        "Derived potential and actualization scores for an idea, with per-factor detail."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ideaId": { "type": "string", "description": "Defaults to the current idea" }
            },
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let GetScoresArgs { idea_id } = parse_args(args)?;
            resolve_idea(ctx.state(), idea_id.as_ref()).map(score_report)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchModeArgs {
    mode: Mode,
    #[serde(default)]
    force: bool,
}

pub struct SwitchMode;

impl Tool for SwitchMode {
    fn name(&self) -> ToolName {
        ToolName::SwitchMode
    }

    fn description(&self) -> &'static str {
        "Move the conversation to another mode. The new tool set applies from the next turn."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mode": { "type": "string", "enum": Mode::ALL.map(|mode| mode.as_str()) },
                "force": { "type": "boolean" }
            },
            "required": ["mode"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let SwitchModeArgs { mode, force } = parse_args(args)?;
            let transition = ctx.set_mode(mode, force);
            Ok(json!({
                "from": transition.from(),
                "to": transition.to(),
                "applied": transition.is_applied(),
                "reason": transition.reason().code(),
            }))
        })
    }
}
