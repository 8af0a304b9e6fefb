//! Duplex viewer channel: pushes session events, accepts client commands.

use crate::domain::full_delta;
use crate::error::{Result, SessionError};
use crate::identity::BearerToken;
use crate::session::events::{CommandErrorEvent, ConnectionReady};
use crate::session::{ServerEvent, SessionHandle};
use crate::tools::ConfirmationDecision;
use crate::transfer::ImportOptions;
use crate::types::{CallId, Mode};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const REPLY_BUFFER: usize = 16;

/// Messages a connected client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    Approve {
        #[serde(rename = "callId")]
        call_id: CallId,
    },
    Deny {
        #[serde(rename = "callId")]
        call_id: CallId,
    },
    #[serde(alias = "setMode")]
    SetMode {
        target: Mode,
        #[serde(default)]
        force: bool,
    },
    Chat {
        text: String,
    },
    Export,
    Import {
        document: Value,
        #[serde(default)]
        options: ImportOptions,
    },
}

impl ClientMessage {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Deny { .. } => "deny",
            Self::SetMode { .. } => "set-mode",
            Self::Chat { .. } => "chat",
            Self::Export => "export",
            Self::Import { .. } => "import",
        }
    }
}

fn parse_client_message(text: &str) -> Result<ClientMessage> {
    serde_json::from_str(text)
        .map_err(|e| SessionError::Validation(format!("unrecognized client message: {e}")))
}

fn command_error(error: &SessionError) -> ServerEvent {
    ServerEvent::CommandError(CommandErrorEvent {
        code: error.code().to_string(),
        message: error.to_string(),
    })
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> Result<()> {
    let text = serde_json::to_string(event)?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| SessionError::Internal(format!("websocket send failed: {e}")))
}

fn connection_ready(handle: &SessionHandle) -> ServerEvent {
    let state = handle.state();
    ServerEvent::ConnectionReady(ConnectionReady {
        session_id: handle.session_id().clone(),
        mode: state.mode,
        state: full_delta(&state),
    })
}

/// Runs the command on its own task so a turn waiting for confirmation never
/// blocks the socket that must deliver the decision.
fn dispatch(
    message: ClientMessage,
    handle: &SessionHandle,
    token: &BearerToken,
    replies: &mpsc::Sender<ServerEvent>,
) {
    let handle = handle.clone();
    let token = token.clone();
    let replies = replies.clone();
    debug!(kind = message.kind(), "Client command");
    tokio::spawn(async move {
        let outcome = match message {
            ClientMessage::Approve { call_id } => handle
                .confirm(call_id, ConfirmationDecision::Approve)
                .await
                .map(|()| None),
            ClientMessage::Deny { call_id } => handle
                .confirm(call_id, ConfirmationDecision::Deny)
                .await
                .map(|()| None),
            ClientMessage::SetMode { target, force } => {
                handle.set_mode(target, force).await.map(|_| None)
            }
            ClientMessage::Chat { text } => handle.chat(text, token).await.map(|_| None),
            ClientMessage::Export => handle
                .export()
                .await
                .and_then(|document| serde_json::to_value(document).map_err(SessionError::from))
                .map(|document| Some(ServerEvent::ExportReady(document))),
            ClientMessage::Import { document, options } => {
                handle.import(document, options).await.map(|_| None)
            }
        };
        let reply = match outcome {
            Ok(reply) => reply,
            Err(error) => Some(command_error(&error)),
        };
        if let Some(event) = reply {
            if replies.send(event).await.is_err() {
                debug!("Viewer disconnected before the reply");
            }
        }
    });
}

/// Serves one connected viewer until either side closes.
pub async fn run(socket: WebSocket, handle: SessionHandle, token: BearerToken) {
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();
    let (mut sink, mut stream) = socket.split();
    let (replies, mut reply_rx) = mpsc::channel::<ServerEvent>(REPLY_BUFFER);
    info!(session_id = %handle.session_id(), viewers = handle.viewer_count(), "Viewer connected");

    if send(&mut sink, &connection_ready(&handle)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Viewer lagged; resending full state");
                        connection_ready(&handle)
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sink, &event).await.is_err() {
                    break;
                }
            }
            Some(reply) = reply_rx.recv() => {
                if send(&mut sink, &reply).await.is_err() {
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_client_message(&text) {
                    Ok(message) => dispatch(message, &handle, &token, &replies),
                    Err(error) => {
                        if send(&mut sink, &command_error(&error)).await.is_err() {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%error, "Viewer socket failed");
                    break;
                }
            },
        }
    }

    info!(session_id = %handle.session_id(), "Viewer disconnected");
}
