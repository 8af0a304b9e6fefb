#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Uniform JSON body for HTTP responses and CLI output.

use crate::error::{code, get_error_info, SessionError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolEnvelope {
    pub ok: bool,
    pub t: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Box<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<Box<ProtocolError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: String,
    pub msg: String,
}

/// HTTP status for a protocol error code.
#[must_use]
pub fn http_status_for(error_code: &str) -> u16 {
    match error_code {
        code::INVALID => 400,
        code::UNAUTHORIZED => 401,
        code::FORBIDDEN => 403,
        code::NOTFOUND => 404,
        code::CONFLICT => 409,
        code::ABORTED => 499,
        code::DEPENDENCY => 502,
        _ => 500,
    }
}

impl ProtocolEnvelope {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            t: Utc::now().timestamp_millis(),
            d: Some(Box::new(data)),
            err: None,
            fix: None,
        }
    }

    #[must_use]
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            t: Utc::now().timestamp_millis(),
            d: None,
            err: Some(Box::new(ProtocolError {
                code: code.into(),
                msg: msg.into(),
            })),
            fix: None,
        }
    }

    /// Error envelope carrying the documented fix hint for the error's code.
    #[must_use]
    pub fn from_error(error: &SessionError) -> Self {
        let envelope = Self::error(error.code(), error.to_string());
        match get_error_info(error.code()) {
            Some((_, fix)) => envelope.with_fix(fix),
            None => envelope,
        }
    }

    #[must_use]
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    /// Status an HTTP response carrying this envelope should use.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.err
            .as_ref()
            .map_or(200, |err| http_status_for(&err.code))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::{http_status_for, ProtocolEnvelope};
    use crate::error::SessionError;
    use serde_json::json;

    #[test]
    fn error_envelope_carries_code_fix_and_status() {
        let envelope =
            ProtocolEnvelope::from_error(&SessionError::Forbidden("other user".to_string()));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["err"]["code"], "FORBIDDEN");
        assert!(value["fix"].is_string());
        assert!(value["t"].is_i64());
        assert_eq!(envelope.http_status(), 403);
    }

    #[test]
    fn success_envelope_omits_error_fields() {
        let value = serde_json::to_value(ProtocolEnvelope::success(json!({"a": 1}))).unwrap();
        assert_eq!(value["d"]["a"], 1);
        assert!(value.get("err").is_none());
        assert_eq!(http_status_for("NOTFOUND"), 404);
    }
}
