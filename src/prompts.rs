use crate::types::{Mode, SessionState};

/// System prompt template; placeholders are filled per turn.
pub const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompt_templates/system.md");

#[must_use]
pub const fn mode_guidance(mode: Mode) -> &'static str {
    match mode {
        Mode::Onboarding => {
            "Get to know the founder. Confirm their preferred language and capture the \
             first idea they want to assess."
        }
        Mode::Integration => {
            "Set up the workspace: who operates it, who the admin contact is, and which \
             language to use."
        }
        Mode::Plan => {
            "Work through the checklist for the current idea. Ask one question at a time, \
             score factors as answers arrive and attach evidence for every score."
        }
        Mode::Act => {
            "The founder is executing. Track traction and progress factors, record new \
             evidence and point out the weakest factor."
        }
    }
}

/// Notice appended to the history whenever a mode is entered.
#[must_use]
pub const fn welcome_notice(mode: Mode) -> &'static str {
    match mode {
        Mode::Onboarding => "Welcome! Tell me a little about yourself and the idea on your mind.",
        Mode::Integration => "Let's set up your workspace. Who else should have access?",
        Mode::Plan => "Planning mode: we'll score your idea factor by factor.",
        Mode::Act => "Action mode: let's track what is actually happening with your idea.",
    }
}

#[must_use]
pub fn system_prompt(state: &SessionState) -> String {
    let current_idea = state
        .current_idea()
        .map_or_else(|| "none selected".to_string(), |idea| {
            format!("{} ({})", idea.title, idea.idea_id)
        });
    let progress = format!(
        "{} of {} factors scored, {} with evidence",
        state.progress.scored_factors, state.progress.total_factors, state.progress.evidenced_factors
    );

    SYSTEM_PROMPT_TEMPLATE
        .replace("{MODE}", state.mode.as_str())
        .replace("{LANGUAGE}", &state.settings.language)
        .replace("{CURRENT_IDEA}", &current_idea)
        .replace("{PROGRESS}", &progress)
        .replace("{MODE_GUIDANCE}", mode_guidance(state.mode))
}
