#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::types::{Mode, SessionState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    ModeChanged,
    ForcedReentry,
    AlreadyActive,
}

impl TransitionReason {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ModeChanged => "mode_changed",
            Self::ForcedReentry => "forced_reentry",
            Self::AlreadyActive => "already_active",
        }
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        !matches!(self, Self::AlreadyActive)
    }
}

/// Outcome of one `set_mode` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeTransition {
    from: Mode,
    to: Mode,
    reason: TransitionReason,
    at: Option<DateTime<Utc>>,
}

impl ModeTransition {
    #[must_use]
    pub const fn from(&self) -> Mode {
        self.from
    }

    #[must_use]
    pub const fn to(&self) -> Mode {
        self.to
    }

    #[must_use]
    pub const fn reason(&self) -> TransitionReason {
        self.reason
    }

    #[must_use]
    pub const fn at(&self) -> Option<DateTime<Utc>> {
        self.at
    }

    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.reason.is_applied()
    }
}

/// The mode graph is fully connected; the only question is whether anything
/// happens at all.
#[must_use]
pub const fn decide_mode_transition(current: Mode, target: Mode, force: bool) -> TransitionReason {
    if force && matches_mode(current, target) {
        TransitionReason::ForcedReentry
    } else if !matches_mode(current, target) {
        TransitionReason::ModeChanged
    } else {
        TransitionReason::AlreadyActive
    }
}

const fn matches_mode(a: Mode, b: Mode) -> bool {
    a as u8 == b as u8
}

/// Transition stamps are strictly increasing and strictly after session
/// creation, even when the clock has not advanced.
#[must_use]
pub fn transition_timestamp(
    created_at: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let floor = previous.map_or(created_at, |previous| previous.max(created_at));
    if now > floor {
        now
    } else {
        floor + Duration::milliseconds(1)
    }
}

impl SessionState {
    /// Applies `set_mode(target, force)`. A no-op leaves the state untouched,
    /// including the timestamps.
    pub fn set_mode(&mut self, target: Mode, force: bool, now: DateTime<Utc>) -> ModeTransition {
        let from = self.mode;
        let reason = decide_mode_transition(from, target, force);
        if !reason.is_applied() {
            return ModeTransition {
                from,
                to: target,
                reason,
                at: None,
            };
        }

        let at = transition_timestamp(self.created_at, self.last_mode_change, now);
        self.mode = target;
        self.last_mode_change = Some(at);
        self.updated_at = self.updated_at.max(at);
        ModeTransition {
            from,
            to: target,
            reason,
            at: Some(at),
        }
    }
}
