use super::{ModelEvent, ModelRequest, ModelService, ToolCallProposal};
use crate::error::SessionError;
use crate::orchestrator_service::PortFuture;
use crate::types::CallId;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What the scripted model does on one completion step.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Events(Vec<ModelEvent>),
    Status { status: u16, message: String },
}

/// Replays a fixed script of completion steps and records every request.
/// Once the script runs out each step finishes with no output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    steps: Arc<Mutex<VecDeque<ScriptedStep>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn text(text: &str) -> ScriptedStep {
        ScriptedStep::Events(vec![
            ModelEvent::TextDelta(text.to_string()),
            ModelEvent::Finished {
                reason: "stop".to_string(),
            },
        ])
    }

    #[must_use]
    pub fn tool_call(call_id: &str, tool_name: &str, arguments: Value) -> ScriptedStep {
        Self::tool_calls(vec![(call_id, tool_name, arguments)])
    }

    /// One step proposing several calls, in order.
    #[must_use]
    pub fn tool_calls(calls: Vec<(&str, &str, Value)>) -> ScriptedStep {
        let mut events: Vec<ModelEvent> = calls
            .into_iter()
            .map(|(call_id, tool_name, arguments)| {
                ModelEvent::ToolCall(ToolCallProposal {
                    call_id: CallId::new(call_id),
                    tool_name: tool_name.to_string(),
                    arguments,
                })
            })
            .collect();
        events.push(ModelEvent::Finished {
            reason: "tool-calls".to_string(),
        });
        ScriptedStep::Events(events)
    }

    #[must_use]
    pub fn status(status: u16) -> ScriptedStep {
        ScriptedStep::Status {
            status,
            message: format!("scripted status {status}"),
        }
    }

    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }
}

impl ModelService for ScriptedModel {
    fn stream<'a>(
        &'a self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.requests.lock().await.push(request);
            let step = self.steps.lock().await.pop_front();
            match step {
                Some(ScriptedStep::Status { status, message }) => {
                    Err(SessionError::ModelStatus { status, message })
                }
                Some(ScriptedStep::Events(script)) => {
                    for event in script {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(())
                }
                None => {
                    events
                        .send(ModelEvent::Finished {
                            reason: "script-exhausted".to_string(),
                        })
                        .await
                        .ok();
                    Ok(())
                }
            }
        })
    }
}
