use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn value(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(
    /// Identity of one session. Equal to the verified principal id.
    SessionId
);
string_id!(IdeaId);
string_id!(EvidenceId);
string_id!(
    /// Id the model assigned to one proposed tool call.
    CallId
);
string_id!(MessageId);
string_id!(TaskId);

impl IdeaId {
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("idea-{}", uuid::Uuid::new_v4()))
    }
}

impl EvidenceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ev-{}", uuid::Uuid::new_v4()))
    }
}

impl MessageId {
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("msg-{}", uuid::Uuid::new_v4()))
    }
}

impl TaskId {
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("task-{}", uuid::Uuid::new_v4()))
    }
}

impl SessionId {
    /// Session ids travel in URL paths and table keys.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
    }
}
