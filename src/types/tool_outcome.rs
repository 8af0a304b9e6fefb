use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(rename = "timestampUTC")]
    pub timestamp_utc: DateTime<Utc>,
}

/// Uniform envelope every tool call settles into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolOutcome {
    #[must_use]
    pub const fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>, details: Option<Value>, now: DateTime<Utc>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(ToolFailure {
                message: message.into(),
                details,
                timestamp_utc: now,
            }),
        }
    }

    /// Fixed result substituted for a call the user refused.
    #[must_use]
    pub fn denied(tool_name: &str, now: DateTime<Utc>) -> Self {
        Self::failure(
            format!("User denied execution of tool `{tool_name}`"),
            Some(json!({ "denied": true })),
            now,
        )
    }

    #[must_use]
    pub fn is_denial(&self) -> bool {
        self.error
            .as_ref()
            .and_then(|error| error.details.as_ref())
            .and_then(|details| details.get("denied"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.message.as_str())
    }

    /// Recognizes a value that already has envelope shape: a boolean `success`
    /// plus `result` on success or an `error.message` on failure.
    #[must_use]
    pub fn from_envelope(value: &Value, now: DateTime<Utc>) -> Option<Self> {
        let object = value.as_object()?;
        let success = object.get("success")?.as_bool()?;
        let well_formed = if success {
            object.contains_key("result") && !object.contains_key("error")
        } else {
            object
                .get("error")
                .and_then(|error| error.get("message"))
                .is_some_and(Value::is_string)
        };
        if !well_formed {
            return None;
        }
        serde_json::from_value(value.clone()).ok().or_else(|| {
            // Failure envelopes produced elsewhere may lack our timestamp.
            (!success).then(|| {
                let error = object.get("error").cloned().unwrap_or(Value::Null);
                Self::failure(
                    error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    error.get("details").cloned(),
                    now,
                )
            })
        })
    }
}
