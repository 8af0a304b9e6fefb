#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use super::{
    cancel_pair, model_history, CancelSignal, ConfirmationGate, CredentialRefresher, EventSink,
    MessageStore, ModelGateway, PortFuture, StateSink, ToolExecutor, ToolRun, TurnOutcome,
    TurnPorts, TurnRequest, TurnService, TurnSettings,
};
use crate::context::{ManualClock, SessionContext};
use crate::identity::BearerToken;
use crate::llm::{ModelEvent, ModelRequest, ModelService, ScriptedModel, ScriptedStep, ToolCallProposal};
use crate::session::ServerEvent;
use crate::tools::{ConfirmationDecision, ConfirmationOutcome};
use crate::types::{
    CallId, ChatMessage, CredentialProfile, InvocationState, MessagePart, Mode, Role, SessionId,
    SessionState, ToolOutcome, TurnErrorCard,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, Default)]
struct FakePorts {
    model: ScriptedModel,
    decisions: Arc<Mutex<VecDeque<ConfirmationOutcome>>>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    events: Arc<Mutex<Vec<ServerEvent>>>,
    commits: Arc<Mutex<Vec<SessionState>>>,
    refreshes: Arc<Mutex<usize>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakePorts {
    fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            model: ScriptedModel::new(steps),
            ..Self::default()
        }
    }

    async fn with_decision(self, outcome: ConfirmationOutcome) -> Self {
        let mut decisions = self.decisions.lock().await;
        decisions.push_back(outcome);
        drop(decisions);
        self
    }

    async fn log(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    async fn event_kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(ServerEvent::kind)
            .collect()
    }
}

impl ModelGateway for FakePorts {
    fn stream_model(
        &self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'_, ()> {
        self.model.stream(request, events)
    }
}

impl CredentialRefresher for FakePorts {
    fn refresh_credential<'a>(
        &'a self,
        token: &'a BearerToken,
    ) -> PortFuture<'a, CredentialProfile> {
        Box::pin(async move {
            *self.refreshes.lock().await += 1;
            Ok(CredentialProfile {
                user_id: "s-1".to_string(),
                email: "founder@example.com".to_string(),
                credits: 3.0,
                payment_method: None,
                token_fingerprint: token.fingerprint(),
                verified_at: t0(),
            })
        })
    }
}

impl ConfirmationGate for FakePorts {
    fn await_decision<'a>(&'a self, call_id: &'a CallId) -> PortFuture<'a, ConfirmationOutcome> {
        Box::pin(async move {
            self.log.lock().await.push(format!("decision:{call_id}"));
            Ok(self
                .decisions
                .lock()
                .await
                .pop_front()
                .unwrap_or(ConfirmationOutcome::Abandoned))
        })
    }
}

impl ToolExecutor for FakePorts {
    fn execute_tool(
        &self,
        mut state: SessionState,
        _mode: Mode,
        proposal: ToolCallProposal,
    ) -> PortFuture<'_, ToolRun> {
        Box::pin(async move {
            self.log
                .lock()
                .await
                .push(format!("execute:{}", proposal.tool_name));
            let mut transitions = Vec::new();
            if proposal.tool_name == "switch_mode" {
                transitions.push(state.set_mode(Mode::Plan, false, t0()));
            }
            Ok(ToolRun {
                state,
                outcome: ToolOutcome::success(json!({ "tool": proposal.tool_name })),
                transitions,
            })
        })
    }
}

impl MessageStore for FakePorts {
    fn save_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.messages.lock().await.push(message.clone());
            Ok(())
        })
    }

    fn update_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()> {
        Box::pin(async move {
            let mut messages = self.messages.lock().await;
            if let Some(slot) = messages.iter_mut().find(|saved| saved.id == message.id) {
                *slot = message.clone();
            }
            Ok(())
        })
    }
}

impl StateSink for FakePorts {
    fn commit_state<'a>(&'a self, state: &'a SessionState) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.commits.lock().await.push(state.clone());
            Ok(())
        })
    }
}

impl EventSink for FakePorts {
    fn emit(&self, event: ServerEvent) -> PortFuture<'_, ()> {
        Box::pin(async move {
            self.log.lock().await.push(format!("event:{}", event.kind()));
            self.events.lock().await.push(event);
            Ok(())
        })
    }
}

fn assert_ports_contract<T: TurnPorts>() {}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

fn given_a_service(ports: &FakePorts, max_steps: usize) -> TurnService<FakePorts> {
    assert_ports_contract::<FakePorts>();
    let context = SessionContext::new(SessionId::new("s-1"), Arc::new(ManualClock::new(t0())));
    TurnService::new(ports.clone(), context, TurnSettings { max_steps })
}

fn given_a_request(text: &str) -> TurnRequest {
    let mut state = SessionState::new(SessionId::new("s-1"), t0());
    state.set_mode(Mode::Plan, false, t0());
    TurnRequest {
        state,
        history: Vec::new(),
        user_text: text.to_string(),
        token: BearerToken::new("token-1"),
    }
}

fn call_part(message: &ChatMessage) -> &crate::types::ToolInvocation {
    message
        .invocations()
        .next()
        .expect("message carries a tool call")
}

#[tokio::test]
async fn given_text_reply_when_turn_runs_then_it_completes_with_two_messages() {
    let ports = FakePorts::new(vec![ScriptedModel::text("Hello there")]);
    let report = given_a_service(&ports, 8)
        .run(given_a_request("hi"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.steps, 1);
    let messages = ports.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].text(), "Hello there");
    let kinds = ports.event_kinds().await;
    assert_eq!(kinds, vec!["text-delta", "turn-complete"]);
}

#[tokio::test]
async fn given_immediate_tool_when_turn_runs_then_result_is_substituted_in_place() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-1", "get_scores", json!({})),
        ScriptedModel::text("Scores look fine"),
    ]);
    let report = given_a_service(&ports, 8)
        .run(given_a_request("how am I doing?"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    let messages = ports.messages().await;
    let call = call_part(&messages[1]);
    assert_eq!(call.state, InvocationState::Executed);
    assert!(call.result.as_ref().is_some_and(|result| result.success));

    let requests = ports.model.requests().await;
    assert_eq!(requests.len(), 2);
    let second_history = &requests[1].messages;
    assert!(second_history
        .iter()
        .any(|message| message.invocations().any(|call| call.result.is_some())));
}

#[tokio::test]
async fn given_denied_delete_when_turn_runs_then_tool_never_executes() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-9", "delete_idea", json!({ "confirm": true })),
        ScriptedModel::text("Understood, keeping it"),
    ])
    .with_decision(ConfirmationOutcome::Decided(ConfirmationDecision::Deny))
    .await;

    let report = given_a_service(&ports, 8)
        .run(given_a_request("delete it"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(!ports.log().await.iter().any(|entry| entry == "execute:delete_idea"));
    let messages = ports.messages().await;
    let call = call_part(&messages[1]);
    assert_eq!(call.state, InvocationState::Denied);
    assert!(call.result.as_ref().is_some_and(ToolOutcome::is_denial));
    assert!(matches!(messages[1].parts[0], MessagePart::ToolCall(_)));
}

#[tokio::test]
async fn given_approved_delete_when_turn_runs_then_request_decision_execute_result_in_order() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-2", "delete_idea", json!({ "confirm": true })),
        ScriptedModel::text("Deleted"),
    ])
    .with_decision(ConfirmationOutcome::Decided(ConfirmationDecision::Approve))
    .await;

    given_a_service(&ports, 8)
        .run(given_a_request("delete it"), CancelSignal::never())
        .await
        .unwrap();

    let log = ports.log().await;
    let position = |needle: &str| log.iter().position(|entry| entry == needle).unwrap();
    assert!(position("event:confirmation-request") < position("decision:c-2"));
    assert!(position("decision:c-2") < position("execute:delete_idea"));
    assert!(position("execute:delete_idea") < position("event:tool-result"));
}

#[tokio::test]
async fn given_gated_call_proposed_first_when_step_settles_then_ungated_call_runs_before_the_wait() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_calls(vec![
            ("c-10", "delete_idea", json!({ "confirm": true })),
            ("c-11", "get_scores", json!({})),
        ]),
        ScriptedModel::text("Done"),
    ])
    .with_decision(ConfirmationOutcome::Decided(ConfirmationDecision::Approve))
    .await;

    let report = given_a_service(&ports, 8)
        .run(given_a_request("tidy up"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    let log = ports.log().await;
    let position = |needle: &str| log.iter().position(|entry| entry == needle).unwrap();
    assert!(position("execute:get_scores") < position("event:confirmation-request"));
    assert!(position("decision:c-10") < position("execute:delete_idea"));

    let messages = ports.messages().await;
    let calls: Vec<_> = messages[1].invocations().collect();
    assert_eq!(calls[0].call_id, CallId::new("c-10"));
    assert_eq!(calls[1].call_id, CallId::new("c-11"));
    assert!(calls
        .iter()
        .all(|call| call.state == InvocationState::Executed));
}

#[tokio::test]
async fn given_ungated_call_after_gated_one_when_turn_is_abandoned_then_it_already_ran() {
    let ports = FakePorts::new(vec![ScriptedModel::tool_calls(vec![
        ("c-12", "cancel_scheduled_task", json!({ "taskId": "task-1" })),
        ("c-13", "get_scores", json!({})),
    ])]);

    let report = given_a_service(&ports, 8)
        .run(given_a_request("cancel and score"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Abandoned);
    assert!(ports.log().await.iter().any(|entry| entry == "execute:get_scores"));
    let messages = ports.messages().await;
    let calls: Vec<_> = messages[1].invocations().collect();
    assert_eq!(calls[0].state, InvocationState::AwaitingConfirmation);
    assert_eq!(calls[1].state, InvocationState::Executed);
}

#[tokio::test]
async fn given_gated_tool_outside_the_mode_menu_when_proposed_then_no_confirmation_is_requested() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-14", "delete_idea", json!({ "confirm": true })),
        ScriptedModel::text("That is not possible here"),
    ]);
    let mut request = given_a_request("delete it");
    request.state.set_mode(Mode::Act, true, t0());

    let report = given_a_service(&ports, 8)
        .run(request, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    let log = ports.log().await;
    assert!(!log.iter().any(|entry| entry.starts_with("decision:")));
    assert!(!ports.event_kinds().await.contains(&"confirmation-request"));
    assert!(ports.event_kinds().await.contains(&"tool-result"));
}

#[tokio::test]
async fn given_no_viewer_answers_when_confirmation_is_pending_then_turn_is_abandoned() {
    let ports = FakePorts::new(vec![ScriptedModel::tool_call(
        "c-3",
        "cancel_scheduled_task",
        json!({ "taskId": "task-1" }),
    )]);

    let report = given_a_service(&ports, 8)
        .run(given_a_request("cancel my reminder"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Abandoned);
    let messages = ports.messages().await;
    let call = call_part(&messages[1]);
    assert_eq!(call.state, InvocationState::AwaitingConfirmation);
    assert!(call.result.is_none());
    assert!(!ports.event_kinds().await.contains(&"tool-result"));
}

#[tokio::test]
async fn given_single_forbidden_response_when_turn_runs_then_credential_refreshes_and_retries() {
    let ports = FakePorts::new(vec![ScriptedModel::status(403), ScriptedModel::text("ok")]);

    let report = given_a_service(&ports, 8)
        .run(given_a_request("hi"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(*ports.refreshes.lock().await, 1);
    assert!(report.state.credential.is_some());
    assert_eq!(ports.commits.lock().await.len(), 1);
}

#[tokio::test]
async fn given_two_forbidden_responses_when_turn_runs_then_it_fails_after_one_refresh() {
    let ports = FakePorts::new(vec![ScriptedModel::status(403), ScriptedModel::status(403)]);

    let report = given_a_service(&ports, 8)
        .run(given_a_request("hi"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Failed);
    assert_eq!(*ports.refreshes.lock().await, 1);
    let messages = ports.messages().await;
    let last = messages.last().unwrap();
    assert!(last.is_error_card());
    assert!(ports.event_kinds().await.contains(&"turn-error"));
}

#[tokio::test]
async fn given_model_outage_when_turn_runs_then_error_card_is_retryable() {
    let ports = FakePorts::new(vec![ScriptedModel::status(502)]);

    let report = given_a_service(&ports, 8)
        .run(given_a_request("hi"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Failed);
    assert_eq!(*ports.refreshes.lock().await, 0);
    let events = ports.events.lock().await;
    let card: Option<&TurnErrorCard> = events.iter().find_map(|event| match event {
        ServerEvent::TurnError(card) => Some(card),
        _ => None,
    });
    let card = card.unwrap();
    assert!(card.retryable);
    assert_eq!(card.detail["code"], "DEPENDENCY");
}

#[tokio::test]
async fn given_cancelled_signal_when_turn_runs_then_it_aborts_before_the_model() {
    let ports = FakePorts::new(vec![ScriptedModel::text("never sent")]);
    let (trigger, signal) = cancel_pair();
    trigger.cancel();

    let report = given_a_service(&ports, 8)
        .run(given_a_request("hi"), signal)
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::Aborted);
    assert!(ports.model.requests().await.is_empty());
    assert_eq!(ports.messages().await.len(), 1);
}

#[tokio::test]
async fn given_mode_switching_tool_when_turn_runs_then_notice_is_recorded() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-4", "switch_mode", json!({ "mode": "plan" })),
        ScriptedModel::text("Switched"),
    ]);
    let mut request = given_a_request("let's plan");
    request.state = SessionState::new(SessionId::new("s-1"), t0());

    let report = given_a_service(&ports, 8)
        .run(request, CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.state.mode, Mode::Plan);
    assert!(ports.event_kinds().await.contains(&"notice"));
    let messages = ports.messages().await;
    assert!(messages.iter().any(|message| message
        .parts
        .iter()
        .any(|part| matches!(part, MessagePart::Notice { mode: Mode::Plan, .. }))));
}

#[tokio::test]
async fn given_model_keeps_calling_tools_when_limit_is_reached_then_turn_stops() {
    let ports = FakePorts::new(vec![
        ScriptedModel::tool_call("c-5", "get_scores", json!({})),
        ScriptedModel::tool_call("c-6", "get_scores", json!({})),
        ScriptedModel::tool_call("c-7", "get_scores", json!({})),
    ]);

    let report = given_a_service(&ports, 2)
        .run(given_a_request("loop"), CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.outcome, TurnOutcome::StepLimit);
    assert_eq!(report.steps, 2);
    assert_eq!(ports.model.requests().await.len(), 2);
}

#[test]
fn model_history_drops_error_cards_and_unsettled_calls() {
    let user = ChatMessage::user_text("hi", t0());
    let card = ChatMessage::error_card(
        TurnErrorCard {
            summary: "boom".to_string(),
            detail: json!({}),
            timestamp: t0(),
            retryable: true,
        },
        t0(),
    );
    let mut pending = crate::types::ToolInvocation::proposed(
        CallId::new("c-8"),
        "delete_idea".to_string(),
        json!({}),
    );
    pending.await_confirmation().unwrap();
    let assistant = ChatMessage::new(
        Role::Assistant,
        vec![
            MessagePart::Text {
                text: "Shall I delete it?".to_string(),
            },
            MessagePart::ToolCall(pending),
        ],
        t0(),
    );

    let history = model_history(&[user, card, assistant]);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].parts.len(), 1);
    assert_eq!(history[1].text(), "Shall I delete it?");
}
