#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Bearer-token verification. Tokens are opaque; only their SHA-256
//! fingerprint is ever stored.

use crate::error::{Result, SessionError};
use crate::orchestrator_service::PortFuture;
use crate::types::CredentialProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parses an `Authorization` header value.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| Self::new(token))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn fingerprint(&self) -> String {
        Sha256::digest(self.0.as_bytes())
            .iter()
            .fold(String::with_capacity(64), |mut hex, byte| {
                let _ = write!(hex, "{byte:02x}");
                hex
            })
    }
}

/// Profile returned by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub credits: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn into_profile(self, token: &BearerToken, now: DateTime<Utc>) -> CredentialProfile {
        CredentialProfile {
            user_id: self.id,
            email: self.email,
            credits: self.credits,
            payment_method: self.payment_method,
            token_fingerprint: token.fingerprint(),
            verified_at: now,
        }
    }
}

pub trait IdentityVerifier: Send + Sync {
    /// Resolves `token` to its principal. An invalid token is `Unauthorized`.
    fn verify<'a>(&'a self, token: &'a BearerToken) -> PortFuture<'a, Identity>;
}

#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpIdentityVerifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SessionError::IdentityError(format!("Failed to build client: {e}")))?;
        Ok(Self { client, endpoint })
    }
}

impl IdentityVerifier for HttpIdentityVerifier {
    fn verify<'a>(&'a self, token: &'a BearerToken) -> PortFuture<'a, Identity> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.endpoint.clone())
                .bearer_auth(token.expose())
                .send()
                .await
                .map_err(|e| SessionError::IdentityError(format!("Verifier unreachable: {e}")))?;

            let status = response.status();
            debug!(status = status.as_u16(), "Identity verifier responded");
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(SessionError::Unauthorized(
                    "credential rejected by identity service".to_string(),
                ));
            }
            if !status.is_success() {
                return Err(SessionError::IdentityError(format!(
                    "identity service returned {status}"
                )));
            }
            response.json::<Identity>().await.map_err(|e| {
                SessionError::IdentityError(format!("Unreadable identity profile: {e}"))
            })
        })
    }
}

/// Fixed token table, for tests and local runs.
#[derive(Debug, Default)]
pub struct StaticIdentityVerifier {
    identities: HashMap<String, Identity>,
    calls: AtomicUsize,
}

impl StaticIdentityVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_identity(mut self, token: &str, identity: Identity) -> Self {
        self.identities.insert(token.to_string(), identity);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityVerifier for StaticIdentityVerifier {
    fn verify<'a>(&'a self, token: &'a BearerToken) -> PortFuture<'a, Identity> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.identities
                .get(token.expose())
                .cloned()
                .ok_or_else(|| SessionError::Unauthorized("unknown credential".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::{BearerToken, Identity, IdentityVerifier, StaticIdentityVerifier};
    use crate::error::SessionError;

    #[test]
    fn bearer_header_is_parsed_case_insensitively() {
        assert_eq!(
            BearerToken::from_header("bearer abc").map(|t| t.expose().to_string()),
            Some("abc".to_string())
        );
        assert!(BearerToken::from_header("Basic abc").is_none());
        assert!(BearerToken::from_header("Bearer ").is_none());
    }

    #[test]
    fn fingerprint_is_stable_hex_and_token_is_redacted() {
        let token = BearerToken::new("secret");
        assert_eq!(token.fingerprint().len(), 64);
        assert_eq!(token.fingerprint(), BearerToken::new("secret").fingerprint());
        assert_ne!(token.fingerprint(), BearerToken::new("other").fingerprint());
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_tokens() {
        let verifier = StaticIdentityVerifier::new().with_identity(
            "t-1",
            Identity {
                id: "user-1".to_string(),
                email: "one@example.com".to_string(),
                credits: 3.0,
                payment_method: None,
            },
        );

        let known = verifier.verify(&BearerToken::new("t-1")).await.unwrap();
        assert_eq!(known.id, "user-1");
        let unknown = verifier.verify(&BearerToken::new("t-2")).await;
        assert!(matches!(unknown, Err(SessionError::Unauthorized(_))));
        assert_eq!(verifier.calls(), 2);
    }
}
