#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! HTTP and WebSocket surface over the session registry.

pub mod api;
mod auth;
mod ws;

use crate::error::{Result, SessionError};
use crate::session::SessionRegistry;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

pub use api::ApiError;
pub use auth::{Authorized, Credentialed};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

/// Full application router with state attached.
#[must_use]
pub fn app(registry: Arc<SessionRegistry>) -> Router {
    api::router().with_state(AppState::new(registry))
}

/// Serves `app` on `addr` until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| SessionError::ConfigError(format!("bind {addr}: {e}")))?;
    tracing::info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SessionError::Internal(format!("serve {addr}: {e}")))
}
