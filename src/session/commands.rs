use crate::domain::ModeTransition;
use crate::error::Result;
use crate::identity::BearerToken;
use crate::orchestrator_service::TurnReport;
use crate::tools::ConfirmationDecision;
use crate::transfer::{ExportDocument, ImportOptions, ImportReport};
use crate::types::{CallId, CredentialProfile, Mode, SessionState};
use serde_json::Value;
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Every write to a session goes through the actor as one of these.
#[derive(Debug)]
pub enum SessionCommand {
    Chat {
        text: String,
        token: BearerToken,
        reply: Reply<TurnReport>,
    },
    Confirm {
        call_id: CallId,
        decision: ConfirmationDecision,
        reply: Reply<()>,
    },
    SetMode {
        target: Mode,
        force: bool,
        reply: Reply<ModeTransition>,
    },
    StoreUserInfo {
        profile: CredentialProfile,
        reply: Reply<SessionState>,
    },
    ClearUserInfo {
        reply: Reply<SessionState>,
    },
    /// Fire-and-forget refresh of the cached credential after verification.
    RecordCredential {
        profile: CredentialProfile,
    },
    ClearHistory {
        reply: Reply<u64>,
    },
    Export {
        reply: Reply<ExportDocument>,
    },
    Import {
        document: Value,
        options: ImportOptions,
        reply: Reply<ImportReport>,
    },
    Shutdown,
}

impl SessionCommand {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Confirm { .. } => "confirm",
            Self::SetMode { .. } => "set-mode",
            Self::StoreUserInfo { .. } => "store-user-info",
            Self::ClearUserInfo { .. } => "clear-user-info",
            Self::RecordCredential { .. } => "record-credential",
            Self::ClearHistory { .. } => "clear-history",
            Self::Export { .. } => "export",
            Self::Import { .. } => "import",
            Self::Shutdown => "shutdown",
        }
    }
}
