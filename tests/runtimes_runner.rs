use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adloom::app::App;
use adloom::graphs::GraphBuilder;
use adloom::message::Message;
use adloom::node::{
    InterruptRequest, Node, NodeContext, NodeError, NodeOutput, NodePartial, ThreadConfig,
};
use adloom::runtimes::checkpointer::InMemoryCheckpointer;
use adloom::runtimes::runner::{AppRunner, RunOutcome, RunnerError, SessionInit, StepOutcome};
use adloom::runtimes::runtime_config::RuntimeConfig;
use adloom::state::{StateSnapshot, VersionedState};
use adloom::types::NodeKind;


/// Appends one assistant message and counts its executions.
struct Append {
    tag: &'static str,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for Append {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(NodePartial::new()
            .with_message(Message::assistant(self.tag))
            .into())
    }
}

/// Suspends until a resume payload arrives, then records it as a field.
struct Gate;

#[async_trait]
impl Node for Gate {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        match ctx.resume {
            Some(payload) => Ok(NodePartial::new().with_field("approved", payload).into()),
            None => Ok(NodeOutput::Suspend(InterruptRequest {
                payload: json!({"question": "proceed?"}),
                resume_schema: "approval".into(),
            })),
        }
    }
}

fn linear_app(runs: &[Arc<AtomicUsize>; 3]) -> App {
    GraphBuilder::new()
        .add_node(
            NodeKind::custom("a"),
            Append {
                tag: "a",
                runs: runs[0].clone(),
            },
        )
        .add_node(
            NodeKind::custom("b"),
            Append {
                tag: "b",
                runs: runs[1].clone(),
            },
        )
        .add_node(
            NodeKind::custom("c"),
            Append {
                tag: "c",
                runs: runs[2].clone(),
            },
        )
        .add_edge(NodeKind::Start, NodeKind::custom("a"))
        .add_edge(NodeKind::custom("a"), NodeKind::custom("b"))
        .add_edge(NodeKind::custom("b"), NodeKind::custom("c"))
        .add_edge(NodeKind::custom("c"), NodeKind::End)
        .compile()
        .unwrap()
}

fn counters() -> [Arc<AtomicUsize>; 3] {
    [
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
    ]
}

#[tokio::test]
async fn linear_run_executes_each_node_once_in_order() {
    let runs = counters();
    let mut runner = AppRunner::new(linear_app(&runs)).await.unwrap();
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();

    let outcome = runner.run_until_complete("t1").await.unwrap();
    let RunOutcome::Complete(state) = outcome else {
        panic!("expected completion");
    };
    let contents: Vec<String> = state
        .messages
        .snapshot()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
    assert!(runs.iter().all(|r| r.load(Ordering::SeqCst) == 1));
    assert_eq!(runner.session("t1").unwrap().step, 3);
}

#[tokio::test]
async fn a_checkpoint_lands_after_every_step() {
    let runs = counters();
    let store = InMemoryCheckpointer::shared();
    let mut runner = AppRunner::with_checkpointer(Arc::new(linear_app(&runs)), Some(store.clone()));
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    runner.run_until_complete("t1").await.unwrap();

    // Step 0 is the session seed; one more per executed node.
    assert_eq!(store.list_steps("t1").await.unwrap(), vec![0, 1, 2, 3]);
    let latest = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.pending, NodeKind::End);
}

#[tokio::test]
async fn restore_resumes_without_rerunning_finished_nodes() {
    let runs = counters();
    let store = InMemoryCheckpointer::shared();
    let app = Arc::new(linear_app(&runs));

    let mut first = AppRunner::with_checkpointer(app.clone(), Some(store.clone()));
    first
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    first.run_step("t1").await.unwrap();
    first.run_step("t1").await.unwrap();
    drop(first);

    let mut second = AppRunner::with_checkpointer(app, Some(store));
    let init = second
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    assert_eq!(init, SessionInit::Restored { step: 2 });

    let RunOutcome::Complete(state) = second.run_until_complete("t1").await.unwrap() else {
        panic!("expected completion");
    };
    assert_eq!(state.messages.len(), 3);
    assert!(runs.iter().all(|r| r.load(Ordering::SeqCst) == 1));
}

#[tokio::test]
async fn pause_is_stable_until_resumed() {
    let app = GraphBuilder::new()
        .add_node(NodeKind::custom("gate"), Gate)
        .add_edge(NodeKind::Start, NodeKind::custom("gate"))
        .add_edge(NodeKind::custom("gate"), NodeKind::End)
        .compile()
        .unwrap();
    let mut runner = AppRunner::new(app).await.unwrap();
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();

    let RunOutcome::Paused(interrupt) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected a pause");
    };
    assert_eq!(interrupt.resume_schema, "approval");
    assert_eq!(interrupt.payload, json!({"question": "proceed?"}));

    // Stepping again without a payload re-surfaces the same interrupt.
    let StepOutcome::Paused(repeat) = runner.run_step("t1").await.unwrap() else {
        panic!("expected the pause to hold");
    };
    assert_eq!(repeat, interrupt);
    assert_eq!(runner.session("t1").unwrap().step, 1);

    runner.resume("t1", json!(true)).unwrap();
    let RunOutcome::Complete(state) = runner.run_until_complete("t1").await.unwrap() else {
        panic!("expected completion after resume");
    };
    assert_eq!(state.fields.get("approved"), Some(&json!(true)));
}

#[tokio::test]
async fn resume_without_a_pending_interrupt_is_an_error() {
    let runs = counters();
    let mut runner = AppRunner::new(linear_app(&runs)).await.unwrap();
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    let err = runner.resume("t1", json!({})).unwrap_err();
    assert!(matches!(err, RunnerError::NoPendingInterrupt { .. }));
}

#[tokio::test]
async fn runaway_cycle_hits_the_step_limit() {
    let runs = counters();
    let app = GraphBuilder::new()
        .add_node(
            NodeKind::custom("a"),
            Append {
                tag: "a",
                runs: runs[0].clone(),
            },
        )
        .add_node(
            NodeKind::custom("b"),
            Append {
                tag: "b",
                runs: runs[1].clone(),
            },
        )
        .add_edge(NodeKind::Start, NodeKind::custom("a"))
        .add_edge(NodeKind::custom("a"), NodeKind::custom("b"))
        .add_edge(NodeKind::custom("b"), NodeKind::custom("a"))
        .with_runtime_config(RuntimeConfig::new().with_step_limit(5))
        .compile()
        .unwrap();

    let mut runner = AppRunner::new(app).await.unwrap();
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    let err = runner.run_until_complete("t1").await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::StepLimitExceeded { limit: 5, .. }
    ));
    // The failing step never committed.
    assert_eq!(runner.session("t1").unwrap().step, 5);
}

#[tokio::test]
async fn duplicate_session_ids_are_rejected() {
    let runs = counters();
    let mut runner = AppRunner::new(linear_app(&runs)).await.unwrap();
    runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap();
    let err = runner
        .create_session("t1".into(), VersionedState::new(), ThreadConfig::new("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::SessionExists { .. }));
}
