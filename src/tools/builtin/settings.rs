use crate::domain::{SessionPatch, SettingsPatch};
use crate::tools::{parse_args, Tool, ToolContext, ToolError, ToolFuture, ToolName};
use serde::Deserialize;
use serde_json::{json, Value};

pub struct UpdateSettings;

impl Tool for UpdateSettings {
    fn name(&self) -> ToolName {
        ToolName::UpdateSettings
    }

    fn description(&self) -> &'static str {
        "Change session settings. Only the fields given are changed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": { "type": "string" },
                "operators": { "type": "array", "items": { "type": "string" } },
                "adminContact": { "type": ["string", "null"] }
            },
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let patch: SettingsPatch = parse_args(args)?;
            if patch.is_empty() {
                return Err(ToolError::InvalidArguments(
                    "provide at least one setting".to_string(),
                ));
            }
            ctx.apply_patch(SessionPatch::settings(patch))?;
            Ok(json!({ "settings": ctx.state().settings }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddOperatorArgs {
    operator: String,
}

pub struct AddOperator;

impl Tool for AddOperator {
    fn name(&self) -> ToolName {
        ToolName::AddOperator
    }

    fn description(&self) -> &'static str {
        "Add a person who operates this workspace, identified by email or handle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "operator": { "type": "string" } },
            "required": ["operator"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let AddOperatorArgs { operator } = parse_args(args)?;
            let operator = operator.trim().to_string();
            if operator.is_empty() {
                return Err(ToolError::InvalidArguments(
                    "operator must not be empty".to_string(),
                ));
            }

            let mut operators = ctx.state().settings.operators.clone();
            let added = !operators.contains(&operator);
            if added {
                operators.push(operator);
                ctx.apply_patch(SessionPatch::settings(SettingsPatch {
                    operators: Some(operators),
                    ..SettingsPatch::default()
                }))?;
            }
            Ok(json!({ "added": added, "operators": ctx.state().settings.operators }))
        })
    }
}
