//! Which tools exist, which modes expose them, and which need a human yes.

use super::builtin;
use super::contract::invoke_tool;
use super::{Tool, ToolContext};
use crate::llm::ToolDefinition;
use crate::types::{Mode, ToolOutcome};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    GetSessionInfo,
    GetScores,
    SwitchMode,
    ScheduleTask,
    ListScheduledTasks,
    CancelScheduledTask,
    UpdateSettings,
    AddOperator,
    CreateIdea,
    UpdateIdea,
    SelectIdea,
    ScoreFactor,
    AddEvidence,
    DeleteIdea,
}

impl ToolName {
    pub const ALL: [Self; 14] = [
        Self::GetSessionInfo,
        Self::GetScores,
        Self::SwitchMode,
        Self::ScheduleTask,
        Self::ListScheduledTasks,
        Self::CancelScheduledTask,
        Self::UpdateSettings,
        Self::AddOperator,
        Self::CreateIdea,
        Self::UpdateIdea,
        Self::SelectIdea,
        Self::ScoreFactor,
        Self::AddEvidence,
        Self::DeleteIdea,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetSessionInfo => "get_session_info",
            Self::GetScores => "get_scores",
            Self::SwitchMode => "switch_mode",
            Self::ScheduleTask => "schedule_task",
            Self::ListScheduledTasks => "list_scheduled_tasks",
            Self::CancelScheduledTask => "cancel_scheduled_task",
            Self::UpdateSettings => "update_settings",
            Self::AddOperator => "add_operator",
            Self::CreateIdea => "create_idea",
            Self::UpdateIdea => "update_idea",
            Self::SelectIdea => "select_idea",
            Self::ScoreFactor => "score_factor",
            Self::AddEvidence => "add_evidence",
            Self::DeleteIdea => "delete_idea",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ToolName {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {s}"))
    }
}

/// Available in every mode.
pub const COMMON_TOOLS: &[ToolName] = &[
    ToolName::GetSessionInfo,
    ToolName::GetScores,
    ToolName::SwitchMode,
    ToolName::ScheduleTask,
    ToolName::ListScheduledTasks,
    ToolName::CancelScheduledTask,
];

const ONBOARDING_TOOLS: &[ToolName] = &[ToolName::UpdateSettings, ToolName::CreateIdea];

const INTEGRATION_TOOLS: &[ToolName] = &[ToolName::UpdateSettings, ToolName::AddOperator];

const PLAN_TOOLS: &[ToolName] = &[
    ToolName::CreateIdea,
    ToolName::UpdateIdea,
    ToolName::SelectIdea,
    ToolName::ScoreFactor,
    ToolName::AddEvidence,
    ToolName::DeleteIdea,
];

const ACT_TOOLS: &[ToolName] = &[
    ToolName::SelectIdea,
    ToolName::ScoreFactor,
    ToolName::AddEvidence,
];

/// Calls to these are suspended until the user approves or denies them.
pub const CONFIRMATION_REQUIRED: &[ToolName] =
    &[ToolName::DeleteIdea, ToolName::CancelScheduledTask];

#[must_use]
pub const fn mode_tools(mode: Mode) -> &'static [ToolName] {
    match mode {
        Mode::Onboarding => ONBOARDING_TOOLS,
        Mode::Integration => INTEGRATION_TOOLS,
        Mode::Plan => PLAN_TOOLS,
        Mode::Act => ACT_TOOLS,
    }
}

/// Common tools followed by the mode's own, without duplicates.
#[must_use]
pub fn tool_names_for_mode(mode: Mode) -> Vec<ToolName> {
    let mut names = COMMON_TOOLS.to_vec();
    for name in mode_tools(mode) {
        if !names.contains(name) {
            names.push(*name);
        }
    }
    names
}

#[must_use]
pub fn requires_confirmation(tool_name: &str) -> bool {
    ToolName::try_from(tool_name).is_ok_and(|name| CONFIRMATION_REQUIRED.contains(&name))
}

pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Box<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl ToolRegistry {
    /// Process-wide registry of the built-in tools. Tools are stateless.
    pub fn builtin() -> &'static Self {
        static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| Self {
            tools: builtin::all()
                .into_iter()
                .map(|tool| (tool.name(), tool))
                .collect(),
        })
    }

    #[must_use]
    pub fn get(&self, name: ToolName) -> Option<&dyn Tool> {
        self.tools.get(&name).map(|tool| &**tool)
    }
}

/// Tool menu for one turn, fixed at turn start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalog {
    mode: Mode,
    names: Vec<ToolName>,
}

impl ToolCatalog {
    #[must_use]
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            mode,
            names: tool_names_for_mode(mode),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn names(&self) -> &[ToolName] {
        &self.names
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known.as_str() == name)
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let registry = ToolRegistry::builtin();
        self.names
            .iter()
            .filter_map(|name| registry.get(*name))
            .map(|tool| ToolDefinition {
                name: tool.name().as_str().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Closest catalog entry to a name the model got wrong.
    #[must_use]
    pub fn suggest(&self, unknown: &str) -> Option<&'static str> {
        self.names
            .iter()
            .map(|name| (name.as_str(), strsim::levenshtein(unknown, name.as_str())))
            .filter(|(_, distance)| *distance <= 4)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name)
    }

    /// Executes `tool_name` through the contract layer. Names outside this
    /// turn's menu settle as failures.
    pub async fn invoke(&self, ctx: &mut ToolContext, tool_name: &str, args: Value) -> ToolOutcome {
        let now = ctx.now();
        if !self.contains(tool_name) {
            warn!(tool = tool_name, mode = %self.mode, "Model proposed an unavailable tool");
            let suggestion = self.suggest(tool_name);
            let message = suggestion.map_or_else(
                || format!("Tool `{tool_name}` is not available in {} mode", self.mode),
                |name| {
                    format!(
                        "Tool `{tool_name}` is not available in {} mode. Did you mean `{name}`?",
                        self.mode
                    )
                },
            );
            return ToolOutcome::failure(
                message,
                Some(json!({ "kind": "unknown_tool", "suggestion": suggestion })),
                now,
            );
        }

        let tool = ToolName::try_from(tool_name)
            .ok()
            .and_then(|name| ToolRegistry::builtin().get(name));
        match tool {
            Some(tool) => invoke_tool(tool, ctx, args).await,
            None => ToolOutcome::failure(
                format!("Tool `{tool_name}` has no implementation"),
                Some(json!({ "kind": "unknown_tool" })),
                now,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        requires_confirmation, tool_names_for_mode, ToolCatalog, ToolName, ToolRegistry,
        COMMON_TOOLS,
    };
    use crate::types::Mode;

    #[test]
    fn every_mode_menu_starts_with_the_common_tools() {
        for mode in Mode::ALL {
            let names = tool_names_for_mode(mode);
            assert_eq!(&names[..COMMON_TOOLS.len()], COMMON_TOOLS);
        }
    }

    #[test]
    fn plan_exposes_delete_but_act_does_not() {
        assert!(ToolCatalog::for_mode(Mode::Plan).contains("delete_idea"));
        assert!(!ToolCatalog::for_mode(Mode::Act).contains("delete_idea"));
        assert!(!ToolCatalog::for_mode(Mode::Onboarding).contains("add_operator"));
    }

    #[test]
    fn confirmation_list_is_exact() {
        assert!(requires_confirmation("delete_idea"));
        assert!(requires_confirmation("cancel_scheduled_task"));
        assert!(!requires_confirmation("score_factor"));
        assert!(!requires_confirmation("no_such_tool"));
    }

    #[test]
    fn registry_implements_every_tool_name() {
        let registry = ToolRegistry::builtin();
        for name in ToolName::ALL {
            assert!(registry.get(name).is_some(), "missing {name}");
            assert_eq!(ToolName::try_from(name.as_str()), Ok(name));
        }
    }

    #[test]
    fn definitions_follow_the_menu_order() {
        let catalog = ToolCatalog::for_mode(Mode::Integration);
        let names = catalog
            .definitions()
            .into_iter()
            .map(|definition| definition.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            catalog
                .names()
                .iter()
                .map(|name| name.as_str().to_string())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn misspelled_names_get_a_suggestion() {
        let catalog = ToolCatalog::for_mode(Mode::Plan);
        assert_eq!(catalog.suggest("score_factors"), Some("score_factor"));
        assert_eq!(catalog.suggest("launch_rocket_now_please"), None);
    }
}
