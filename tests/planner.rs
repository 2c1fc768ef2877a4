use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use adloom::channels::errors::TAG_DEGRADED;
use adloom::clients::goals::{CampaignGoals, GoalsRow, InMemoryGoalsStore};
use adloom::clients::recommendation::RecommendationClient;
use adloom::node::{NodeError, PARAM_USER_VALIDATION, ThreadConfig};
use adloom::runtimes::checkpointer::InMemoryCheckpointer;
use adloom::runtimes::runner::{AppRunner, RunOutcome, RunnerError};
use adloom::runtimes::runtime_config::RuntimeConfig;
use adloom::state::VersionedState;
use adloom::agents::planner::build_planner;

mod common;
use common::*;

#[tokio::test]
async fn full_run_produces_a_complete_plan() {
    let (ctx, model) = scripted_context(full_run_responses());
    let app = build_planner(&ctx, None, RuntimeConfig::new()).unwrap();

    let mut runner = AppRunner::new(app).await.unwrap();
    runner
        .create_session(
            "t1".into(),
            VersionedState::new_with_fields(submission_fields()),
            ThreadConfig::new("t1"),
        )
        .await
        .unwrap();
    let RunOutcome::Complete(state) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected completion");
    };

    assert_eq!(model.calls(), 6);
    let fields = state.fields.snapshot();
    assert_eq!(fields["industry"], json!("Groceries"));
    assert_eq!(fields["age_group"], json!("18-34"));
    assert_eq!(fields["recommended_ad_platforms"], json!(["Meta", "Google"]));
    assert_eq!(fields["campaign_start_date"], json!("2026-09-15"));
    assert_eq!(fields["campaign_end_date"], json!("2026-10-15"));
    assert_eq!(fields["total_budget"], json!(5000.0));
    assert_eq!(
        fields["channel_budget_allocation"],
        json!({"Meta": 0.6, "Google": 0.4})
    );
    assert_eq!(fields["campaign_name"], json!("Fresh in Ten"));
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn review_pauses_and_an_edited_resume_propagates() {
    let (ctx, model) = scripted_context(full_run_responses());
    let store = InMemoryCheckpointer::shared();
    let app = build_planner(&ctx, Some(store.clone()), RuntimeConfig::new()).unwrap();

    let mut runner = AppRunner::with_checkpointer(Arc::new(app), Some(store));
    let thread = ThreadConfig::new("t1").with_param(PARAM_USER_VALIDATION, json!(true));
    runner
        .create_session(
            "t1".into(),
            VersionedState::new_with_fields(submission_fields()),
            thread,
        )
        .await
        .unwrap();

    let RunOutcome::Paused(first) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected the classifier review pause");
    };
    assert_eq!(first.resume_schema, "industry_classification");
    assert_eq!(first.payload, json!({"industry": "Groceries"}));

    // The reviewer overrides the classification.
    runner
        .resume("t1", json!({"industry": "Quick Commerce"}))
        .unwrap();

    // Every later stage pauses too; wave each through untouched.
    let state = loop {
        match runner.run_until_complete("t1").await.unwrap() {
            RunOutcome::Paused(interrupt) => {
                runner.resume("t1", interrupt.payload).unwrap();
            }
            RunOutcome::Complete(state) => break state,
        }
    };

    let fields = state.fields.snapshot();
    assert_eq!(fields["industry"], json!("Quick Commerce"));
    assert_eq!(fields["campaign_name"], json!("Fresh in Ten"));
    // Resuming never re-invokes the model; suspended stages pick up after
    // their process step.
    assert_eq!(model.calls(), 6);
}

#[tokio::test]
async fn resuming_without_a_checkpointer_fails_loudly() {
    let (ctx, model) = scripted_context(full_run_responses());
    let app = build_planner(&ctx, None, RuntimeConfig::new()).unwrap();

    let mut runner = AppRunner::new(app).await.unwrap();
    let thread = ThreadConfig::new("t1").with_param(PARAM_USER_VALIDATION, json!(true));
    runner
        .create_session(
            "t1".into(),
            VersionedState::new_with_fields(submission_fields()),
            thread,
        )
        .await
        .unwrap();

    let RunOutcome::Paused(interrupt) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected the classifier review pause");
    };
    assert_eq!(model.calls(), 1);

    // With nothing backing the stage's session the pause cannot be restored;
    // the resume must fail rather than silently re-run the stage and drop
    // the payload.
    runner.resume("t1", interrupt.payload).unwrap();
    let err = runner.run_until_complete("t1").await.unwrap_err();
    let RunnerError::NodeFailed { node, source } = err else {
        panic!("expected a node failure, got {err}");
    };
    assert_eq!(node, "brand_industry_classifier");
    assert!(matches!(source, NodeError::Subgraph { .. }));
    assert!(source.to_string().contains("checkpointer"));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn failed_enrichment_degrades_instead_of_aborting() {
    let server = MockServer::start_async().await;
    let optimize = server
        .mock_async(|when, then| {
            when.method(POST).path("/optimize");
            then.status(200).json_body(json!({}));
        })
        .await;
    let allocate = server
        .mock_async(|when, then| {
            when.method(POST).path("/allocatebudget");
            then.status(500);
        })
        .await;

    let client =
        RecommendationClient::new(server.base_url(), Duration::from_secs(2)).unwrap();
    let goals = InMemoryGoalsStore::new(vec![GoalsRow {
        account_id: Some("acct-1".into()),
        objective: Some("conversions".into()),
        goals: CampaignGoals {
            spend: 100.0,
            conversions: 12,
            ..Default::default()
        },
    }]);
    let (ctx, _model) = scripted_context(full_run_responses());
    let ctx = ctx
        .with_recommendation(Arc::new(client))
        .with_goals(Arc::new(goals));
    let app = build_planner(&ctx, None, RuntimeConfig::new()).unwrap();

    let mut runner = AppRunner::new(app).await.unwrap();
    runner
        .create_session(
            "t1".into(),
            VersionedState::new_with_fields(submission_fields()),
            ThreadConfig::new("t1"),
        )
        .await
        .unwrap();
    let RunOutcome::Complete(state) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected completion despite the failing service");
    };

    optimize.assert_async().await;
    allocate.assert_async().await;

    // The model's own budget split stands.
    let fields = state.fields.snapshot();
    assert_eq!(fields["total_budget"], json!(5000.0));
    assert_eq!(
        fields["channel_budget_allocation"],
        json!({"Meta": 0.6, "Google": 0.4})
    );

    let degraded: Vec<_> = state
        .errors
        .snapshot()
        .into_iter()
        .filter(|e| e.has_tag(TAG_DEGRADED))
        .collect();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].context["service"], "recommendation");
    assert!(degraded[0].to_string().contains("marketing_budget_allocator.output"));
}
