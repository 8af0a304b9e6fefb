use super::session_info::{resolve_idea, score_report};
use crate::domain::{IdeaPatch, SessionPatch};
use crate::tools::{parse_args, Tool, ToolContext, ToolError, ToolFuture, ToolName};
use crate::types::{
    Evidence, EvidenceOrigin, EvidenceType, FactorKey, IdeaId, LifecycleStage,
    MAX_FACTOR_SCORE,
};
use serde::Deserialize;
use serde_json::{json, Value};

fn stage_schema() -> Value {
    json!({ "type": "string", "enum": ["concept", "pre-MVP", "MVP", "post-launch"] })
}

fn factor_schema() -> Value {
    json!({
        "type": "string",
        "enum": FactorKey::ALL.map(|key| key.as_str())
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateIdeaArgs {
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stage: Option<LifecycleStage>,
    #[serde(default = "default_select")]
    select: bool,
}

const fn default_select() -> bool {
    true
}

pub struct CreateIdea;

impl Tool for CreateIdea {
    fn name(&self) -> ToolName {
        ToolName::CreateIdea
    }

    fn description(&self) -> &'static str {
        "Start assessing a new idea. It becomes the current idea unless select is false."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "summary": { "type": "string", "description": "One line" },
                "description": { "type": "string" },
                "stage": stage_schema(),
                "select": { "type": "boolean" }
            },
            "required": ["title"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: CreateIdeaArgs = parse_args(args)?;
            let idea_id = IdeaId::generate();
            let patch = IdeaPatch {
                title: Some(args.title),
                summary: args.summary,
                description: args.description,
                stage: args.stage,
                ..IdeaPatch::new(idea_id.clone())
            };
            ctx.apply_patch(SessionPatch {
                upsert_ideas: vec![patch],
                current_assessment: args.select.then(|| Some(idea_id.clone())),
                ..SessionPatch::default()
            })?;
            Ok(json!({
                "ideaId": idea_id,
                "selected": ctx.state().current_assessment.as_ref() == Some(&idea_id),
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateIdeaArgs {
    idea_id: IdeaId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stage: Option<LifecycleStage>,
}

pub struct UpdateIdea;

impl Tool for UpdateIdea {
    fn name(&self) -> ToolName {
        ToolName::UpdateIdea
    }

    fn description(&self) -> &'static str {
        "Edit an idea's title, summary, description or lifecycle stage."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ideaId": { "type": "string" },
                "title": { "type": "string" },
                "summary": { "type": "string" },
                "description": { "type": "string" },
                "stage": stage_schema()
            },
            "required": ["ideaId"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: UpdateIdeaArgs = parse_args(args)?;
            resolve_idea(ctx.state(), Some(&args.idea_id))?;
            let patch = IdeaPatch {
                title: args.title,
                summary: args.summary,
                description: args.description,
                stage: args.stage,
                ..IdeaPatch::new(args.idea_id.clone())
            };
            ctx.apply_patch(SessionPatch::idea(patch))?;
            let idea = resolve_idea(ctx.state(), Some(&args.idea_id))?;
            Ok(json!({
                "ideaId": idea.idea_id,
                "title": idea.title,
                "summary": idea.summary,
                "stage": idea.stage,
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SelectIdeaArgs {
    idea_id: IdeaId,
}

pub struct SelectIdea;

impl Tool for SelectIdea {
    fn name(&self) -> ToolName {
        ToolName::SelectIdea
    }

    fn description(&self) -> &'static str {
        "Make an existing idea the current assessment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "ideaId": { "type": "string" } },
            "required": ["ideaId"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let SelectIdeaArgs { idea_id } = parse_args(args)?;
            resolve_idea(ctx.state(), Some(&idea_id))?;
            ctx.apply_patch(SessionPatch {
                current_assessment: Some(Some(idea_id.clone())),
                ..SessionPatch::default()
            })?;
            Ok(json!({ "currentAssessment": idea_id, "progress": ctx.state().progress }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScoreFactorArgs {
    #[serde(default)]
    idea_id: Option<IdeaId>,
    factor: FactorKey,
    score: Option<i64>,
}

pub struct ScoreFactor;

impl Tool for ScoreFactor {
    fn name(&self) -> ToolName {
        ToolName::ScoreFactor
    }

    fn description(&self) -> &'static str {
        "Set one checklist factor's score from 0 to 5, or null to clear it."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ideaId": { "type": "string" },
                "factor": factor_schema(),
                "score": { "type": ["integer", "null"], "minimum": 0, "maximum": MAX_FACTOR_SCORE }
            },
            "required": ["factor", "score"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: ScoreFactorArgs = parse_args(args)?;
            let idea_id = resolve_idea(ctx.state(), args.idea_id.as_ref())?
                .idea_id
                .clone();
            ctx.apply_patch(SessionPatch::idea(
                IdeaPatch::new(idea_id.clone()).with_score(args.factor, args.score),
            ))?;
            let idea = resolve_idea(ctx.state(), Some(&idea_id))?;
            let item = idea.checklist.item(args.factor);
            Ok(json!({
                "ideaId": idea_id,
                "factor": args.factor,
                "score": item.score(),
                "evidenceStrength": item.evidence_strength(),
                "report": score_report(idea),
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AddEvidenceArgs {
    #[serde(default)]
    idea_id: Option<IdeaId>,
    factor: FactorKey,
    #[serde(rename = "type", default = "default_evidence_type")]
    kind: EvidenceType,
    source: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Option<f64>,
}

const fn default_evidence_type() -> EvidenceType {
    EvidenceType::Conversational
}

pub struct AddEvidence;

impl Tool for AddEvidence {
    fn name(&self) -> ToolName {
        ToolName::AddEvidence
    }

    fn description(&self) -> &'static str {
        "Record evidence supporting a checklist factor. Evidence cannot be edited later."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ideaId": { "type": "string" },
                "factor": factor_schema(),
                "type": {
                    "type": "string",
                    "enum": ["conversational", "manual", "metric", "document", "external"]
                },
                "source": { "type": "string" },
                "value": {},
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
            },
            "required": ["factor", "source"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: AddEvidenceArgs = parse_args(args)?;
            if args.source.trim().is_empty() {
                return Err(ToolError::InvalidArguments(
                    "source must not be empty".to_string(),
                ));
            }
            let idea_id = resolve_idea(ctx.state(), args.idea_id.as_ref())?
                .idea_id
                .clone();

            let evidence = Evidence::new(
                args.kind,
                args.source,
                args.value,
                EvidenceOrigin::Agent,
                ctx.now(),
            );
            let evidence = match args.confidence {
                Some(confidence) => evidence.with_confidence(confidence),
                None => evidence,
            };
            let evidence_id = evidence.id.clone();

            ctx.apply_patch(SessionPatch::idea(
                IdeaPatch::new(idea_id.clone()).with_evidence(args.factor, evidence),
            ))?;
            let item = resolve_idea(ctx.state(), Some(&idea_id))?
                .checklist
                .item(args.factor);
            Ok(json!({
                "ideaId": idea_id,
                "evidenceId": evidence_id,
                "factor": args.factor,
                "evidenceCount": item.evidence().len(),
                "evidenceStrength": item.evidence_strength(),
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DeleteIdeaArgs {
    idea_id: IdeaId,
    #[serde(default)]
    confirm: bool,
}

pub struct DeleteIdea;

impl Tool for DeleteIdea {
    fn name(&self) -> ToolName {
        ToolName::DeleteIdea
    }

    fn description(&self) -> &'static str {
        "Permanently delete an idea. Requires confirm: true and the user's approval."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ideaId": { "type": "string" },
                "confirm": { "type": "boolean", "const": true }
            },
            "required": ["ideaId", "confirm"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let DeleteIdeaArgs { idea_id, confirm } = parse_args(args)?;
            if !confirm {
                return Err(ToolError::Precondition(
                    "delete_idea requires confirm: true".to_string(),
                ));
            }
            resolve_idea(ctx.state(), Some(&idea_id))?;
            ctx.apply_patch(SessionPatch {
                remove_ideas: vec![idea_id.clone()],
                ..SessionPatch::default()
            })?;
            Ok(json!({
                "deleted": idea_id,
                "currentAssessment": ctx.state().current_assessment,
                "remaining": ctx.state().assessments.len(),
            }))
        })
    }
}
