pub mod canonical_schema;
pub mod config;
pub mod context;
pub mod db;
pub mod domain;
pub mod error;
pub mod http;
pub mod identity;
pub mod llm;
pub mod orchestrator_service;
pub mod prompts;
pub mod protocol_envelope;
pub mod session;
pub mod tools;
pub mod transfer;
pub mod types;

pub use config::{load_config, RuntimeConfig};
pub use db::SessionDb;
pub use error::{Result, SessionError};
pub use session::{SessionDeps, SessionHandle, SessionRegistry, SessionSettings};
pub use types::*;
