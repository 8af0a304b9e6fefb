#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Per-session single-writer actors and the handles clients talk to.

mod actor;
mod commands;
pub mod events;
mod handle;
mod registry;

pub use commands::SessionCommand;
pub use events::ServerEvent;
pub use handle::{SessionHandle, ViewerGuard};
pub use registry::{SessionDeps, SessionRegistry, SessionSettings};
