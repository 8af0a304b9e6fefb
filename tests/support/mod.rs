#![allow(dead_code, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use ideaforge::context::ManualClock;
use ideaforge::identity::{Identity, StaticIdentityVerifier};
use ideaforge::llm::{ScriptedModel, ScriptedStep};
use ideaforge::session::ServerEvent;
use ideaforge::{SessionDb, SessionDeps, SessionId, SessionRegistry, SessionSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const SESSION: &str = "user-1";
pub const OWNER_TOKEN: &str = "owner-token";
pub const STRANGER_TOKEN: &str = "stranger-token";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub db: SessionDb,
    pub model: ScriptedModel,
    pub identity: Arc<StaticIdentityVerifier>,
    pub clock: ManualClock,
}

impl Harness {
    pub async fn new(script: Vec<ScriptedStep>) -> Self {
        let db = SessionDb::new_in_memory()
            .await
            .expect("in-memory db");
        let model = ScriptedModel::new(script);
        let identity = Arc::new(
            StaticIdentityVerifier::new()
                .with_identity(
                    OWNER_TOKEN,
                    Identity {
                        id: SESSION.to_string(),
                        email: "owner@example.com".to_string(),
                        credits: 12.5,
                        payment_method: Some("card".to_string()),
                    },
                )
                .with_identity(
                    STRANGER_TOKEN,
                    Identity {
                        id: "someone-else".to_string(),
                        email: "stranger@example.com".to_string(),
                        credits: 0.0,
                        payment_method: None,
                    },
                ),
        );
        let clock = ManualClock::new(start_time());
        let registry = Arc::new(SessionRegistry::new(SessionDeps {
            db: db.clone(),
            model: Arc::new(model.clone()),
            identity: identity.clone(),
            clock: Arc::new(clock.clone()),
            settings: SessionSettings::default(),
        }));
        Self {
            registry,
            db,
            model,
            identity,
            clock,
        }
    }

    pub fn session_id() -> SessionId {
        SessionId::new(SESSION)
    }
}

/// Waits for the first event matching `pred`, skipping the rest.
pub async fn next_event<F>(events: &mut broadcast::Receiver<ServerEvent>, pred: F) -> ServerEvent
where
    F: Fn(&ServerEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for event")
}
