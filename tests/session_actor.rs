#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod support;

use chrono::Duration;
use ideaforge::context::Clock;
use ideaforge::identity::BearerToken;
use ideaforge::llm::ScriptedModel;
use ideaforge::orchestrator_service::TurnOutcome;
use ideaforge::session::ServerEvent;
use ideaforge::tools::ConfirmationDecision;
use ideaforge::{
    CallId, InvocationState, MessagePart, Mode, Role, ScheduledTask, SessionError, TaskId,
    TaskStatus,
};
use serde_json::json;
use support::{next_event, Harness, OWNER_TOKEN, STRANGER_TOKEN};

fn owner() -> BearerToken {
    BearerToken::new(OWNER_TOKEN)
}

async fn given_pending_task(harness: &Harness, id: &str) -> TaskId {
    let now = harness.clock.now();
    let task = ScheduledTask {
        id: TaskId::new(id),
        session_id: Harness::session_id(),
        description: "Call the pilot customer".to_string(),
        payload: json!({}),
        run_at: now + Duration::days(1),
        status: TaskStatus::Pending,
        created_at: now,
    };
    harness.db.insert_task(&task).await.unwrap();
    task.id
}

#[tokio::test]
async fn given_text_reply_when_chatting_then_history_holds_both_messages() {
    let harness = Harness::new(vec![ScriptedModel::text("Welcome aboard")]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let mut events = handle.subscribe();

    let report = handle.chat("Hello", owner()).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.steps, 1);

    let messages = handle.messages().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].text(), "Welcome aboard");

    let complete = next_event(&mut events, |event| {
        matches!(event, ServerEvent::TurnComplete(_))
    })
    .await;
    assert_eq!(complete.kind(), "turn-complete");
}

#[tokio::test]
async fn given_empty_text_when_chatting_then_validation_error_and_no_history() {
    let harness = Harness::new(vec![]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();

    let error = handle.chat("   ", owner()).await.unwrap_err();
    assert!(matches!(error, SessionError::Validation(_)));
    assert!(handle.messages().await.unwrap().is_empty());
    assert!(harness.model.requests().await.is_empty());
}

#[tokio::test]
async fn given_confirmation_tool_when_approved_then_it_runs_in_place() {
    let harness = Harness::new(vec![
        ScriptedModel::tool_call("c-1", "cancel_scheduled_task", json!({"taskId": "t-1"})),
        ScriptedModel::text("Cancelled it"),
    ])
    .await;
    let task_id = given_pending_task(&harness, "t-1").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("Cancel my follow-up", owner()).await })
    };

    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(request) if request.call_id.value() == "c-1")
    })
    .await;
    let pending = harness
        .db
        .get_task(&Harness::session_id(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, TaskStatus::Pending);

    handle
        .confirm(CallId::new("c-1"), ConfirmationDecision::Approve)
        .await
        .unwrap();
    let report = turn.await.unwrap().unwrap();
    assert_eq!(report.outcome, TurnOutcome::Completed);

    let cancelled = harness
        .db
        .get_task(&Harness::session_id(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let messages = handle.messages().await.unwrap();
    let invocation = messages
        .iter()
        .flat_map(|message| message.invocations())
        .find(|invocation| invocation.call_id.value() == "c-1")
        .unwrap();
    assert_eq!(invocation.state, InvocationState::Executed);
    assert!(invocation.result.as_ref().unwrap().success);
}

#[tokio::test]
async fn given_confirmation_tool_when_denied_then_operation_never_runs() {
    let harness = Harness::new(vec![
        ScriptedModel::tool_call("c-2", "cancel_scheduled_task", json!({"taskId": "t-2"})),
        ScriptedModel::text("Kept it"),
    ])
    .await;
    let task_id = given_pending_task(&harness, "t-2").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("Cancel it", owner()).await })
    };
    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(_))
    })
    .await;
    handle
        .confirm(CallId::new("c-2"), ConfirmationDecision::Deny)
        .await
        .unwrap();
    turn.await.unwrap().unwrap();

    let task = harness
        .db
        .get_task(&Harness::session_id(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let messages = handle.messages().await.unwrap();
    let assistant = messages
        .iter()
        .find(|message| message.invocations().next().is_some())
        .unwrap();
    assert!(matches!(
        assistant.parts.first(),
        Some(MessagePart::ToolCall(invocation))
            if invocation.state == InvocationState::Denied
                && invocation.result.as_ref().is_some_and(|r| r.is_denial())
    ));
}

#[tokio::test]
async fn given_pending_confirmation_when_last_viewer_leaves_then_turn_is_abandoned() {
    let harness = Harness::new(vec![ScriptedModel::tool_call(
        "c-3",
        "cancel_scheduled_task",
        json!({"taskId": "t-3"}),
    )])
    .await;
    let task_id = given_pending_task(&harness, "t-3").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("Cancel it", owner()).await })
    };
    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(_))
    })
    .await;
    drop(viewer);

    let report = turn.await.unwrap().unwrap();
    assert_eq!(report.outcome, TurnOutcome::Abandoned);
    let task = harness
        .db
        .get_task(&Harness::session_id(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let still_waiting = handle
        .messages()
        .await
        .unwrap()
        .iter()
        .flat_map(|message| message.invocations().cloned().collect::<Vec<_>>())
        .any(|invocation| invocation.state == InvocationState::AwaitingConfirmation);
    assert!(still_waiting);
}

#[tokio::test]
async fn given_no_running_turn_when_confirming_then_conflict() {
    let harness = Harness::new(vec![]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();

    let error = handle
        .confirm(CallId::new("ghost"), ConfirmationDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(error, SessionError::Conflict(_)));
    assert!(!handle.cancel());
}

#[tokio::test]
async fn given_cached_fingerprint_when_authenticating_then_verifier_is_skipped() {
    let harness = Harness::new(vec![]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();

    handle.authenticate(&owner()).await.unwrap();
    handle.authenticate(&owner()).await.unwrap();
    assert_eq!(harness.identity.calls(), 1);

    let error = handle
        .authenticate(&BearerToken::new(STRANGER_TOKEN))
        .await
        .unwrap_err();
    assert!(matches!(error, SessionError::Forbidden(_)));

    let error = handle
        .authenticate(&BearerToken::new("forged"))
        .await
        .unwrap_err();
    assert!(matches!(error, SessionError::Unauthorized(_)));
}

#[tokio::test]
async fn given_store_user_info_then_profile_is_cached_without_the_token() {
    let harness = Harness::new(vec![]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();

    let state = handle.store_user_info(&owner()).await.unwrap();
    let profile = state.credential.unwrap();
    assert_eq!(profile.email, "owner@example.com");
    assert_eq!(profile.token_fingerprint, owner().fingerprint());

    let cached = harness
        .db
        .load_credential(&Harness::session_id())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(cached.token_fingerprint, OWNER_TOKEN);

    let cleared = handle.clear_user_info().await.unwrap();
    assert!(cleared.credential.is_none());
    assert!(harness
        .db
        .load_credential(&Harness::session_id())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn given_onboarding_when_switching_to_integration_then_transition_is_later_than_creation() {
    let harness = Harness::new(vec![]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let created_at = handle.state().created_at;
    harness.clock.advance(Duration::seconds(5));

    let first = handle.set_mode(Mode::Integration, false).await.unwrap();
    assert!(first.is_applied());
    let state = handle.state();
    assert_eq!(state.mode, Mode::Integration);
    assert!(state.last_mode_change.unwrap() > created_at);

    let repeat = handle.set_mode(Mode::Integration, false).await.unwrap();
    assert!(!repeat.is_applied());
    let forced = handle.set_mode(Mode::Integration, true).await.unwrap();
    assert!(forced.is_applied());

    let notices = handle
        .messages()
        .await
        .unwrap()
        .iter()
        .filter(|message| message.role == Role::System)
        .count();
    assert_eq!(notices, 2);
}

#[tokio::test]
async fn given_history_when_clearing_then_messages_are_removed() {
    let harness = Harness::new(vec![ScriptedModel::text("Hi")]).await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    handle.chat("Hello", owner()).await.unwrap();

    assert_eq!(handle.clear_history().await.unwrap(), 2);
    assert!(handle.messages().await.unwrap().is_empty());
}

#[tokio::test]
async fn given_spawned_session_when_requested_again_then_same_actor_is_reused() {
    let harness = Harness::new(vec![]).await;
    let first = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _second = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    assert_eq!(harness.registry.len().await, 1);

    let malformed = harness
        .registry
        .get_or_spawn(&ideaforge::SessionId::new("a/b"))
        .await
        .unwrap_err();
    assert!(matches!(malformed, SessionError::Validation(_)));

    harness.registry.shutdown_all().await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(first.is_closed());
}

#[tokio::test]
async fn given_gated_call_first_when_step_settles_then_ungated_call_applies_during_the_wait() {
    let harness = Harness::new(vec![
        ScriptedModel::tool_calls(vec![
            ("c-20", "cancel_scheduled_task", json!({"taskId": "t-20"})),
            ("c-21", "update_settings", json!({"language": "fr"})),
        ]),
        ScriptedModel::text("Done"),
    ])
    .await;
    given_pending_task(&harness, "t-20").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("Cancel it and switch to French", owner()).await })
    };
    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(request) if request.call_id.value() == "c-20")
    })
    .await;
    assert_eq!(handle.state().settings.language, "fr");

    handle
        .confirm(CallId::new("c-20"), ConfirmationDecision::Approve)
        .await
        .unwrap();
    assert_eq!(turn.await.unwrap().unwrap().outcome, TurnOutcome::Completed);

    let messages = handle.messages().await.unwrap();
    let assistant = messages
        .iter()
        .find(|message| message.invocations().next().is_some())
        .unwrap();
    let order: Vec<_> = assistant
        .invocations()
        .map(|invocation| invocation.call_id.value().to_string())
        .collect();
    assert_eq!(order, vec!["c-20", "c-21"]);
}

#[tokio::test]
async fn given_pending_confirmation_when_mode_change_arrives_then_it_applies_after_the_turn() {
    let harness = Harness::new(vec![
        ScriptedModel::tool_call("c-22", "cancel_scheduled_task", json!({"taskId": "t-22"})),
        ScriptedModel::text("Cancelled"),
    ])
    .await;
    given_pending_task(&harness, "t-22").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("Cancel it", owner()).await })
    };
    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(_))
    })
    .await;

    let switch = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.set_mode(Mode::Plan, false).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!switch.is_finished());
    assert_eq!(handle.state().mode, Mode::Onboarding);

    handle
        .confirm(CallId::new("c-22"), ConfirmationDecision::Approve)
        .await
        .unwrap();
    assert_eq!(turn.await.unwrap().unwrap().outcome, TurnOutcome::Completed);
    let transition = switch.await.unwrap().unwrap();
    assert!(transition.is_applied());
    assert_eq!(handle.state().mode, Mode::Plan);
}

#[tokio::test]
async fn given_pending_confirmation_when_turn_is_cancelled_then_earlier_changes_are_kept() {
    let harness = Harness::new(vec![ScriptedModel::tool_calls(vec![
        ("c-23", "update_settings", json!({"language": "de"})),
        ("c-24", "cancel_scheduled_task", json!({"taskId": "t-24"})),
    ])])
    .await;
    let task_id = given_pending_task(&harness, "t-24").await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    let _viewer = handle.viewer();
    let mut events = handle.subscribe();

    let turn = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.chat("German please, and cancel it", owner()).await })
    };
    next_event(&mut events, |event| {
        matches!(event, ServerEvent::ConfirmationRequest(_))
    })
    .await;
    assert!(handle.cancel());

    let report = turn.await.unwrap().unwrap();
    assert_eq!(report.outcome, TurnOutcome::Aborted);
    assert_eq!(handle.state().settings.language, "de");
    let stored = harness
        .db
        .load_state(&Harness::session_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.settings.language, "de");
    let task = harness
        .db
        .get_task(&Harness::session_id(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn given_gated_tool_missing_from_mode_menu_when_proposed_then_it_fails_without_asking() {
    let harness = Harness::new(vec![
        ScriptedModel::tool_call("c-25", "delete_idea", json!({"confirm": true})),
        ScriptedModel::text("Not possible in act mode"),
    ])
    .await;
    let handle = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    handle.set_mode(Mode::Act, false).await.unwrap();
    let mut events = handle.subscribe();

    let report = handle.chat("Delete my idea", owner()).await.unwrap();
    assert_eq!(report.outcome, TurnOutcome::Completed);

    let result = next_event(&mut events, |event| {
        matches!(event, ServerEvent::ToolResult(_) | ServerEvent::ConfirmationRequest(_))
    })
    .await;
    let ServerEvent::ToolResult(result) = result else {
        panic!("expected a tool result, got {}", result.kind());
    };
    assert!(!result.result.success);
    assert!(result.result.error_message().unwrap().contains("act mode"));
}

#[tokio::test]
async fn given_unverified_credential_when_opening_then_no_session_is_spawned() {
    let harness = Harness::new(vec![]).await;
    let session_id = Harness::session_id();

    let forged = harness
        .registry
        .open(&session_id, &BearerToken::new("forged"))
        .await
        .unwrap_err();
    assert!(matches!(forged, SessionError::Unauthorized(_)));
    let foreign = harness
        .registry
        .open(&session_id, &BearerToken::new(STRANGER_TOKEN))
        .await
        .unwrap_err();
    assert!(matches!(foreign, SessionError::Forbidden(_)));
    assert!(harness.registry.is_empty().await);
    assert!(harness.db.load_state(&session_id).await.unwrap().is_none());

    let handle = harness.registry.open(&session_id, &owner()).await.unwrap();
    assert_eq!(harness.registry.len().await, 1);
    handle.authenticate(&owner()).await.unwrap();
    assert_eq!(harness.identity.calls(), 3);

    let again = harness.registry.open(&session_id, &owner()).await.unwrap();
    again.authenticate(&owner()).await.unwrap();
    assert_eq!(harness.identity.calls(), 3);
}

#[tokio::test]
async fn given_stopped_session_when_registry_is_used_again_then_it_is_evicted() {
    let harness = Harness::new(vec![]).await;
    let stopped = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    stopped.shutdown().await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(stopped.is_closed());

    harness
        .registry
        .get_or_spawn(&ideaforge::SessionId::new("user-2"))
        .await
        .unwrap();
    assert_eq!(harness.registry.len().await, 1);

    let respawned = harness
        .registry
        .get_or_spawn(&Harness::session_id())
        .await
        .unwrap();
    assert!(!respawned.is_closed());
    assert_eq!(harness.registry.len().await, 2);
}
