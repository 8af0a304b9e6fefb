use super::{Tool, ToolContext, ToolError};
use crate::types::ToolOutcome;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "tool panicked".to_string())
}

/// Runs a fallible tool future and settles it into an envelope. Errors and
/// panics become failures; a success value that is already an envelope is
/// returned as is.
pub async fn wrap<F>(future: F, now: DateTime<Utc>) -> ToolOutcome
where
    F: Future<Output = Result<Value, ToolError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => {
            ToolOutcome::from_envelope(&value, now).unwrap_or_else(|| ToolOutcome::success(value))
        }
        Ok(Err(error)) => ToolOutcome::failure(error.to_string(), Some(error.details()), now),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "Tool panicked");
            ToolOutcome::failure(message, Some(json!({ "kind": "panic" })), now)
        }
    }
}

pub async fn invoke_tool(tool: &dyn Tool, ctx: &mut ToolContext, args: Value) -> ToolOutcome {
    let now = ctx.now();
    let name = tool.name();
    let outcome = wrap(tool.execute(ctx, args), now).await;
    debug!(tool = %name, success = outcome.success, "Tool executed");
    outcome
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::wrap;
    use crate::tools::ToolError;
    use crate::types::ToolOutcome;
    use chrono::Utc;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn when_inner_succeeds_then_result_is_wrapped() {
        let outcome = wrap(async { Ok(json!({ "n": 1 })) }, Utc::now()).await;
        assert_eq!(outcome, ToolOutcome::success(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn when_inner_fails_then_message_is_carried() {
        let error = ToolError::NotFound("idea idea-9".to_string());
        let expected = error.to_string();
        let outcome = wrap(async { Err(error) }, Utc::now()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_message(), Some(expected.as_str()));
        assert!(outcome.result.is_none());
    }

    #[tokio::test]
    async fn when_inner_panics_then_failure_is_returned() {
        let outcome = wrap(
            async {
                if Utc::now().timestamp() > 0 {
                    panic!("boom");
                }
                Ok(Value::Null)
            },
            Utc::now(),
        )
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_message(), Some("boom"));
    }

    #[tokio::test]
    async fn when_value_is_already_an_envelope_then_it_passes_through() {
        let now = Utc::now();
        let inner = ToolOutcome::failure("upstream refused", None, now);
        let envelope = serde_json::to_value(&inner).unwrap();

        let outcome = wrap(async move { Ok(envelope) }, Utc::now()).await;
        assert_eq!(outcome, inner);

        let twice = wrap(
            async { Ok(serde_json::to_value(ToolOutcome::success(json!(7))).unwrap()) },
            now,
        )
        .await;
        assert_eq!(twice, ToolOutcome::success(json!(7)));
    }
}
