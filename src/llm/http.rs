use super::{ModelEvent, ModelRequest, ModelService, ToolCallProposal};
use crate::error::{Result, SessionError};
use crate::orchestrator_service::PortFuture;
use crate::types::CallId;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// One line of the NDJSON completion stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WireEvent {
    TextDelta {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    Finish {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Decodes one stream line. Blank lines and unknown event types yield `None`.
///
/// # Errors
/// Returns a model error when the line is not valid JSON.
pub fn parse_stream_line(line: &[u8]) -> Result<Option<ModelEvent>> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let event = serde_json::from_str::<WireEvent>(trimmed)
        .map_err(|e| SessionError::ModelError(format!("Malformed stream event: {e}")))?;
    Ok(match event {
        WireEvent::TextDelta { text } => Some(ModelEvent::TextDelta(text)),
        WireEvent::ToolCall {
            call_id,
            tool_name,
            args,
        } => Some(ModelEvent::ToolCall(ToolCallProposal {
            call_id: CallId::new(call_id),
            tool_name,
            arguments: args,
        })),
        WireEvent::Finish { reason } => Some(ModelEvent::Finished {
            reason: reason.unwrap_or_else(|| "stop".to_string()),
        }),
        WireEvent::Unknown => {
            debug!("Skipping unknown stream event");
            None
        }
    })
}

#[derive(Debug, Clone)]
pub struct HttpModelService {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
}

impl HttpModelService {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SessionError::ModelError(format!("Failed to build client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            model: model.into(),
        })
    }
}

impl ModelService for HttpModelService {
    fn stream<'a>(
        &'a self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "system": request.system_prompt,
                "messages": request.messages,
                "tools": request.tools,
                "maxSteps": request.max_steps,
            });
            let response = self
                .client
                .post(self.endpoint.clone())
                .bearer_auth(request.auth_token.expose())
                .json(&body)
                .send()
                .await
                .map_err(|e| SessionError::ModelError(format!("Model request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(SessionError::ModelStatus {
                    status: status.as_u16(),
                    message,
                });
            }

            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk
                    .map_err(|e| SessionError::ModelError(format!("Model stream broke: {e}")))?;
                buffer.extend_from_slice(&chunk);
                while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                    let line = buffer.drain(..=newline).collect::<Vec<_>>();
                    if let Some(event) = parse_stream_line(&line)? {
                        if events.send(event).await.is_err() {
                            warn!("Turn stopped listening to the model stream");
                            return Ok(());
                        }
                    }
                }
            }
            if let Some(event) = parse_stream_line(&buffer)? {
                events.send(event).await.ok();
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::parse_stream_line;
    use crate::llm::ModelEvent;
    use serde_json::json;

    #[test]
    fn stream_lines_decode_into_events() {
        let text = parse_stream_line(br#"{"type":"text-delta","text":"Hi"}"#).unwrap();
        assert_eq!(text, Some(ModelEvent::TextDelta("Hi".to_string())));

        let call = parse_stream_line(
            br#"{"type":"tool-call","callId":"c1","toolName":"get_scores","args":{"ideaId":"i"}}"#,
        )
        .unwrap();
        assert!(matches!(
            call,
            Some(ModelEvent::ToolCall(ref proposal))
                if proposal.call_id.value() == "c1"
                    && proposal.arguments == json!({ "ideaId": "i" })
        ));

        let finish = parse_stream_line(b"{\"type\":\"finish\"}\n").unwrap();
        assert_eq!(
            finish,
            Some(ModelEvent::Finished {
                reason: "stop".to_string()
            })
        );
    }

    #[test]
    fn blank_and_unknown_lines_are_skipped_but_garbage_fails() {
        assert_eq!(parse_stream_line(b"  \n").unwrap(), None);
        assert_eq!(
            parse_stream_line(br#"{"type":"usage","tokens":3}"#).unwrap(),
            None
        );
        assert!(parse_stream_line(b"not json").is_err());
    }
}
