#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::context::{ManualClock, SessionContext};
use crate::db::SessionDb;
use crate::tools::{ToolCatalog, ToolContext};
use crate::types::{FactorKey, IdeaId, Mode, SessionId, SessionState, ToolOutcome};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

async fn given_a_tool_context(mode: Mode) -> ToolContext {
    let start = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let session_id = SessionId::new("founder-1");
    let mut state = SessionState::new(session_id.clone(), start);
    state.set_mode(mode, false, start);
    let db = SessionDb::new_in_memory().await.unwrap();
    let context = SessionContext::new(session_id, Arc::new(ManualClock::new(start)));
    ToolContext::new(state, db, context)
}

async fn when_called(ctx: &mut ToolContext, tool: &str, args: Value) -> ToolOutcome {
    let catalog = ToolCatalog::for_mode(ctx.state().mode);
    catalog.invoke(ctx, tool, args).await
}

fn then_result(outcome: &ToolOutcome) -> &Value {
    assert!(outcome.success, "unexpected failure: {outcome:?}");
    outcome.result.as_ref().unwrap()
}

async fn given_a_created_idea(ctx: &mut ToolContext) -> IdeaId {
    let outcome = when_called(ctx, "create_idea", json!({ "title": "Meal kits for climbers" })).await;
    let idea_id = then_result(&outcome)["ideaId"].as_str().unwrap().to_string();
    IdeaId::new(idea_id)
}

#[tokio::test]
async fn when_idea_created_then_it_becomes_current() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    let idea_id = given_a_created_idea(&mut ctx).await;

    assert_eq!(ctx.state().current_assessment.as_ref(), Some(&idea_id));
    assert_eq!(ctx.state().assessments.len(), 1);
}

#[tokio::test]
async fn when_factor_scored_with_strong_evidence_then_strength_is_two() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    given_a_created_idea(&mut ctx).await;

    let scored = when_called(
        &mut ctx,
        "score_factor",
        json!({ "factor": "problem_clarity", "score": 5 }),
    )
    .await;
    assert_eq!(then_result(&scored)["score"], json!(5));

    let evidence = when_called(
        &mut ctx,
        "add_evidence",
        json!({
            "factor": "problem_clarity",
            "source": "customer interview",
            "value": "12 of 15 named the same pain",
            "confidence": 0.85
        }),
    )
    .await;
    assert_eq!(then_result(&evidence)["evidenceStrength"], json!(2));

    let item = ctx
        .state()
        .current_idea()
        .unwrap()
        .checklist
        .item(FactorKey::ProblemClarity);
    assert_eq!(item.score(), Some(5));
    assert_eq!(ctx.state().progress.evidenced_factors, 1);
}

#[tokio::test]
async fn when_score_is_out_of_range_then_it_is_clamped() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    let idea_id = given_a_created_idea(&mut ctx).await;

    let outcome = when_called(
        &mut ctx,
        "score_factor",
        json!({ "ideaId": idea_id, "factor": "timing", "score": 11 }),
    )
    .await;
    assert_eq!(then_result(&outcome)["score"], json!(5));

    let cleared = when_called(
        &mut ctx,
        "score_factor",
        json!({ "ideaId": idea_id, "factor": "timing", "score": null }),
    )
    .await;
    assert_eq!(then_result(&cleared)["score"], Value::Null);
}

#[tokio::test]
async fn when_delete_lacks_confirm_flag_then_failure_and_idea_survives() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    let idea_id = given_a_created_idea(&mut ctx).await;

    let outcome = when_called(&mut ctx, "delete_idea", json!({ "ideaId": idea_id })).await;
    assert!(!outcome.success);
    assert!(outcome
        .error_message()
        .unwrap()
        .contains("confirm: true"));
    assert_eq!(ctx.state().assessments.len(), 1);

    let deleted = when_called(
        &mut ctx,
        "delete_idea",
        json!({ "ideaId": idea_id, "confirm": true }),
    )
    .await;
    assert!(deleted.success);
    assert!(ctx.state().assessments.is_empty());
    assert!(ctx.state().current_assessment.is_none());
}

#[tokio::test]
async fn when_tool_not_in_mode_then_failure_names_a_suggestion() {
    let mut ctx = given_a_tool_context(Mode::Act).await;

    let outcome = when_called(&mut ctx, "scor_factor", json!({})).await;
    assert!(!outcome.success);
    let details = outcome.error.as_ref().unwrap().details.clone().unwrap();
    assert_eq!(details["suggestion"], json!("score_factor"));

    let outcome = when_called(&mut ctx, "delete_idea", json!({})).await;
    assert!(!outcome.success);
    assert!(outcome.error_message().unwrap().contains("act mode"));
}

#[tokio::test]
async fn when_arguments_are_malformed_then_failure_not_panic() {
    let mut ctx = given_a_tool_context(Mode::Onboarding).await;

    let outcome = when_called(&mut ctx, "update_settings", json!({ "colour": "red" })).await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_ref().unwrap().details,
        Some(json!({ "kind": "invalid_arguments" }))
    );
}

#[tokio::test]
async fn when_operator_added_twice_then_list_has_it_once() {
    let mut ctx = given_a_tool_context(Mode::Integration).await;

    for _ in 0..2 {
        let outcome = when_called(
            &mut ctx,
            "add_operator",
            json!({ "operator": "ops@example.com" }),
        )
        .await;
        assert!(outcome.success);
    }
    assert_eq!(ctx.state().settings.operators, vec!["ops@example.com"]);
}

#[tokio::test]
async fn when_switch_mode_called_then_transition_is_recorded() {
    let mut ctx = given_a_tool_context(Mode::Onboarding).await;

    let outcome = when_called(&mut ctx, "switch_mode", json!({ "mode": "plan" })).await;
    assert_eq!(then_result(&outcome)["applied"], json!(true));

    let again = when_called(&mut ctx, "switch_mode", json!({ "mode": "plan" })).await;
    assert_eq!(then_result(&again)["applied"], json!(false));

    let (state, transitions) = ctx.into_parts();
    assert_eq!(state.mode, Mode::Plan);
    assert_eq!(transitions.len(), 1);
}

#[tokio::test]
async fn when_task_scheduled_then_it_lists_and_cancels() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    let run_at = ctx.now() + Duration::days(2);

    let scheduled = when_called(
        &mut ctx,
        "schedule_task",
        json!({ "description": "Call the pilot customer", "runAt": run_at }),
    )
    .await;
    let task_id = then_result(&scheduled)["task"]["id"].clone();

    let listed = when_called(&mut ctx, "list_scheduled_tasks", json!({})).await;
    assert_eq!(then_result(&listed)["tasks"].as_array().unwrap().len(), 1);

    let cancelled = when_called(&mut ctx, "cancel_scheduled_task", json!({ "taskId": task_id })).await;
    assert_eq!(then_result(&cancelled)["task"]["status"], json!("cancelled"));

    let listed = when_called(&mut ctx, "list_scheduled_tasks", json!({})).await;
    assert!(then_result(&listed)["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn when_task_is_in_the_past_then_it_is_rejected() {
    let mut ctx = given_a_tool_context(Mode::Plan).await;
    let run_at = ctx.now() - Duration::minutes(1);

    let outcome = when_called(
        &mut ctx,
        "schedule_task",
        json!({ "description": "too late", "runAt": run_at }),
    )
    .await;
    assert!(!outcome.success);
}
