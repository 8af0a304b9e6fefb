mod checklist;
mod idea;
mod identifiers;
mod messaging;
mod mode;
mod scheduling;
mod scores;
mod session;
mod tool_outcome;

pub use checklist::{
    Checklist, ChecklistItem, Evidence, EvidenceOrigin, EvidenceType, FactorKey,
    MAX_EVIDENCE_STRENGTH, MAX_FACTOR_SCORE,
};
pub use idea::{Idea, LifecycleStage};
pub use identifiers::{CallId, EvidenceId, IdeaId, MessageId, SessionId, TaskId};
pub use messaging::{
    ChatMessage, InvocationState, MessagePart, Role, ToolInvocation, TurnErrorCard,
};
pub use mode::Mode;
pub use scheduling::{ScheduledTask, TaskStatus};
pub use scores::{Bucket, DerivedScores, SubsetCoverage};
pub use session::{CredentialProfile, Progress, SessionState, Settings};
pub use tool_outcome::{ToolFailure, ToolOutcome};
