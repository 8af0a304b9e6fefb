//! Request extractors that resolve the session and check the bearer credential.

use super::api::ApiError;
use super::AppState;
use crate::error::SessionError;
use crate::identity::BearerToken;
use crate::session::SessionHandle;
use crate::types::SessionId;
use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// Bearer token from the `Authorization` header, falling back to a `token`
/// query parameter for clients that cannot set headers (browser WebSockets).
fn bearer_token(parts: &Parts) -> Option<BearerToken> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(BearerToken::from_header);

    from_header.or_else(|| {
        parts.uri.query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, value)| key == "token" && !value.is_empty())
                .map(|(_, value)| BearerToken::new(value.into_owned()))
        })
    })
}

async fn resolve(parts: &mut Parts, state: &AppState) -> Result<(SessionHandle, BearerToken), ApiError> {
    let Path(session_id) = Path::<String>::from_request_parts(parts, state)
        .await
        .map_err(|rejection| SessionError::Validation(rejection.body_text()))?;
    let token = bearer_token(parts)
        .ok_or_else(|| SessionError::Unauthorized("missing bearer token".to_string()))?;
    let handle = state
        .registry
        .open(&SessionId::new(session_id), &token)
        .await?;
    Ok((handle, token))
}

/// Session whose owner presented a verified credential.
#[derive(Debug)]
pub struct Authorized {
    pub handle: SessionHandle,
    pub token: BearerToken,
}

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let (handle, token) = resolve(parts, state).await?;
        handle.authenticate(&token).await?;
        Ok(Self { handle, token })
    }
}

/// Session plus the presented token, not yet checked. Used by routes that
/// verify the token themselves.
#[derive(Debug)]
pub struct Credentialed {
    pub handle: SessionHandle,
    pub token: BearerToken,
}

#[async_trait]
impl FromRequestParts<AppState> for Credentialed {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let (handle, token) = resolve(parts, state).await?;
        Ok(Self { handle, token })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::bearer_token;
    use axum::http::Request;

    fn parts(request: Request<()>) -> axum::http::request::Parts {
        request.into_parts().0
    }

    #[test]
    fn given_header_and_query_when_extracting_then_header_wins() {
        let request = Request::builder()
            .uri("/session/u1/ws?token=from-query")
            .header("Authorization", "Bearer from-header")
            .body(())
            .unwrap();
        let token = bearer_token(&parts(request)).unwrap();
        assert_eq!(token.expose(), "from-header");
    }

    #[test]
    fn given_only_query_token_when_extracting_then_query_is_used() {
        let request = Request::builder()
            .uri("/session/u1/ws?token=abc%20def")
            .body(())
            .unwrap();
        assert_eq!(bearer_token(&parts(request)).unwrap().expose(), "abc def");
    }

    #[test]
    fn given_no_credential_when_extracting_then_none() {
        let request = Request::builder()
            .uri("/session/u1/state")
            .header("Authorization", "Basic abc")
            .body(())
            .unwrap();
        assert!(bearer_token(&parts(request)).is_none());
    }
}
