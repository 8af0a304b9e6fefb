#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Explicit per-session context handed to every component that needs the
//! session id or the time.

use crate::types::SessionId;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::Span;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.current
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |current| *current)
    }
}

#[derive(Clone)]
pub struct SessionContext {
    session_id: SessionId,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    #[must_use]
    pub fn new(session_id: SessionId, clock: Arc<dyn Clock>) -> Self {
        Self { session_id, clock }
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn span(&self) -> Span {
        tracing::info_span!("session", session_id = %self.session_id)
    }
}
