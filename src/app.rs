//! Compiled workflow graph.
//!
//! An [`App`] is immutable once built: the node table, the edge tables, and
//! the runtime configuration the builder captured. Execution lives in the
//! runner; the app only answers "which node is next" and "fold this delta
//! into state".

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::graphs::ConditionalRoute;
use crate::node::{Node, NodePartial};
use crate::reducers::ReducerRegistry;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::state::{StateSnapshot, VersionedState};
use crate::types::NodeKind;

/// Failure to resolve the next node after a step.
#[derive(Debug, Error, Diagnostic)]
pub enum RouteError {
    #[error("router on `{node}` returned label `{label}` with no matching route")]
    #[diagnostic(
        code(adloom::app::unknown_route),
        help("Route tables must cover every label the router can produce.")
    )]
    UnknownRoute { node: String, label: String },

    #[error("node `{node}` has no outgoing edge")]
    #[diagnostic(code(adloom::app::dangling))]
    Dangling { node: String },
}

/// A compiled graph plus its reducer registry and runtime configuration.
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional: FxHashMap<NodeKind, ConditionalRoute>,
    entry: NodeKind,
    runtime_config: RuntimeConfig,
    reducers: ReducerRegistry,
}

impl App {
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, NodeKind>,
        conditional: FxHashMap<NodeKind, ConditionalRoute>,
        entry: NodeKind,
        runtime_config: RuntimeConfig,
    ) -> Self {
        Self {
            nodes,
            edges,
            conditional,
            entry,
            runtime_config,
            reducers: ReducerRegistry::default(),
        }
    }

    /// First real node of the graph.
    #[must_use]
    pub fn entry(&self) -> &NodeKind {
        &self.entry
    }

    #[must_use]
    pub fn node(&self, kind: &NodeKind) -> Option<&Arc<dyn Node>> {
        self.nodes.get(kind)
    }

    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Resolve the node that follows `from`, consulting its conditional
    /// route first. Routing runs on the post-merge snapshot.
    pub fn resolve_next(
        &self,
        from: &NodeKind,
        snapshot: &StateSnapshot,
    ) -> Result<NodeKind, RouteError> {
        if let Some(route) = self.conditional.get(from) {
            let label = route.router.determine_next_step(snapshot);
            return route
                .routes
                .get(&label)
                .cloned()
                .ok_or_else(|| RouteError::UnknownRoute {
                    node: from.label().to_string(),
                    label,
                });
        }
        self.edges
            .get(from)
            .cloned()
            .ok_or_else(|| RouteError::Dangling {
                node: from.label().to_string(),
            })
    }

    /// Fold a node delta into state. Returns the channels that changed.
    pub fn apply_step(
        &self,
        state: &mut VersionedState,
        partial: &NodePartial,
    ) -> Vec<&'static str> {
        let updated = self.reducers.apply(state, partial);
        if !updated.is_empty() {
            tracing::debug!(channels = ?updated, "state channels updated");
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::{GraphBuilder, ROUTE_FINISH, ROUTE_TOOL, ToolRouter};
    use crate::message::{Message, ToolCall};
    use crate::node::{NodeContext, NodeError, NodeOutput};
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Node for Noop {
        async fn run(
            &self,
            _snapshot: StateSnapshot,
            _ctx: NodeContext,
        ) -> Result<NodeOutput, NodeError> {
            Ok(NodePartial::new().into())
        }
    }

    fn loop_app() -> App {
        GraphBuilder::new()
            .add_node(NodeKind::custom("process"), Noop)
            .add_node(NodeKind::custom("tool"), Noop)
            .add_node(NodeKind::custom("output"), Noop)
            .add_edge(NodeKind::Start, NodeKind::custom("process"))
            .add_conditional_edge(
                NodeKind::custom("process"),
                ToolRouter,
                [
                    (ROUTE_TOOL, NodeKind::custom("tool")),
                    (ROUTE_FINISH, NodeKind::custom("output")),
                ],
            )
            .add_edge(NodeKind::custom("tool"), NodeKind::custom("process"))
            .add_edge(NodeKind::custom("output"), NodeKind::End)
            .compile()
            .unwrap()
    }

    #[test]
    fn conditional_routing_follows_tool_calls() {
        let app = loop_app();
        let mut state = VersionedState::new();

        state.messages.push(
            Message::assistant("").with_tool_calls(vec![ToolCall::new("1", "t", json!({}))]),
        );
        let next = app
            .resolve_next(&NodeKind::custom("process"), &state.snapshot())
            .unwrap();
        assert_eq!(next, NodeKind::custom("tool"));

        state.messages.push(Message::assistant("done"));
        let next = app
            .resolve_next(&NodeKind::custom("process"), &state.snapshot())
            .unwrap();
        assert_eq!(next, NodeKind::custom("output"));
    }

    #[test]
    fn static_edges_resolve_directly() {
        let app = loop_app();
        let next = app
            .resolve_next(&NodeKind::custom("output"), &VersionedState::new().snapshot())
            .unwrap();
        assert_eq!(next, NodeKind::End);
    }
}
