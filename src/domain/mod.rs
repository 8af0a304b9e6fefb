#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod delta;
pub mod mode_transition;
pub mod patch;
pub mod scoring;

pub use delta::{full_delta, state_delta, StateDelta};
pub use mode_transition::{
    decide_mode_transition, transition_timestamp, ModeTransition, TransitionReason,
};
pub use patch::{FactorPatch, IdeaPatch, SessionPatch, SettingsPatch};
pub use scoring::{bucket_for, derive_scores, evidence_strength};
