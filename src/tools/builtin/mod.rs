mod assessment;
mod scheduling;
mod session_info;
mod settings;

use super::Tool;

pub fn all() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(session_info::GetSessionInfo),
        Box::new(session_info::GetScores),
        Box::new(session_info::SwitchMode),
        Box::new(scheduling::ScheduleTask),
        Box::new(scheduling::ListScheduledTasks),
        Box::new(scheduling::CancelScheduledTask),
        Box::new(settings::UpdateSettings),
        Box::new(settings::AddOperator),
        Box::new(assessment::CreateIdea),
        Box::new(assessment::UpdateIdea),
        Box::new(assessment::SelectIdea),
        Box::new(assessment::ScoreFactor),
        Box::new(assessment::AddEvidence),
        Box::new(assessment::DeleteIdea),
    ]
}

#[cfg(test)]
mod tests;
