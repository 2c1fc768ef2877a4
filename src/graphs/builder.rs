//! Fluent builder producing a compiled, validated [`App`].

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::app::App;
use crate::graphs::{ConditionalRoute, Router};
use crate::node::Node;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::types::NodeKind;

/// Structural problems detected at compile time.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("graph has no entry edge from Start")]
    #[diagnostic(
        code(adloom::graph::missing_entry),
        help("Add an edge from NodeKind::Start to the first node.")
    )]
    MissingEntry,

    #[error("node `{node}` referenced by an edge is not registered")]
    #[diagnostic(code(adloom::graph::unknown_node))]
    UnknownNode { node: String },

    #[error("node `{node}` registered twice")]
    #[diagnostic(code(adloom::graph::duplicate_node))]
    DuplicateNode { node: String },

    #[error("node `{node}` has no outgoing edge")]
    #[diagnostic(
        code(adloom::graph::dangling_node),
        help("Every node needs an edge, conditional or not, toward End.")
    )]
    DanglingNode { node: String },

    #[error("conditional edge on `{node}` has an empty route table")]
    #[diagnostic(code(adloom::graph::empty_routes))]
    EmptyRoutes { node: String },

    #[error("field `{field}` is written by both `{first}` and `{second}`")]
    #[diagnostic(
        code(adloom::graph::field_ownership),
        help("Each campaign field may have exactly one writing stage.")
    )]
    FieldOwnershipConflict {
        field: String,
        first: String,
        second: String,
    },
}

/// Accumulates nodes and edges, then validates them into an [`App`].
///
/// ```
/// use std::sync::Arc;
/// use adloom::graphs::{GraphBuilder, ToolRouter};
/// use adloom::types::NodeKind;
/// # use adloom::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
/// # use adloom::state::StateSnapshot;
/// # struct Noop;
/// # #[async_trait::async_trait]
/// # impl Node for Noop {
/// #     async fn run(&self, _s: StateSnapshot, _c: NodeContext) -> Result<NodeOutput, NodeError> {
/// #         Ok(NodePartial::new().into())
/// #     }
/// # }
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::custom("process"), Noop)
///     .add_node(NodeKind::custom("tool"), Noop)
///     .add_node(NodeKind::custom("output"), Noop)
///     .add_edge(NodeKind::Start, NodeKind::custom("process"))
///     .add_conditional_edge(
///         NodeKind::custom("process"),
///         ToolRouter,
///         [
///             ("tool", NodeKind::custom("tool")),
///             ("finish", NodeKind::custom("output")),
///         ],
///     )
///     .add_edge(NodeKind::custom("tool"), NodeKind::custom("process"))
///     .add_edge(NodeKind::custom("output"), NodeKind::End)
///     .compile()
///     .unwrap();
/// assert_eq!(app.entry().label(), "process");
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, NodeKind>,
    conditional: FxHashMap<NodeKind, ConditionalRoute>,
    duplicate: Option<NodeKind>,
    runtime_config: RuntimeConfig,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_node(self, kind: NodeKind, node: impl Node + 'static) -> Self {
        self.add_shared_node(kind, Arc::new(node))
    }

    /// Register an already-shared node, used when the same instance backs
    /// several graphs.
    #[must_use]
    pub fn add_shared_node(mut self, kind: NodeKind, node: Arc<dyn Node>) -> Self {
        if self.nodes.insert(kind.clone(), node).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(kind);
        }
        self
    }

    /// Unconditional edge. An edge from [`NodeKind::Start`] marks the entry.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.insert(from, to);
        self
    }

    /// Routed edge: after `from` runs, `router` picks a label and the route
    /// table maps it to the next node.
    #[must_use]
    pub fn add_conditional_edge<L>(
        mut self,
        from: NodeKind,
        router: impl Router + 'static,
        routes: impl IntoIterator<Item = (L, NodeKind)>,
    ) -> Self
    where
        L: Into<String>,
    {
        let routes: FxHashMap<String, NodeKind> = routes
            .into_iter()
            .map(|(label, kind)| (label.into(), kind))
            .collect();
        self.conditional.insert(
            from,
            ConditionalRoute {
                router: Arc::new(router),
                routes,
            },
        );
        self
    }

    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    /// Validate the structure and produce an executable [`App`].
    pub fn compile(self) -> Result<App, GraphCompileError> {
        if let Some(node) = self.duplicate {
            return Err(GraphCompileError::DuplicateNode {
                node: node.label().to_string(),
            });
        }

        let entry = self
            .edges
            .get(&NodeKind::Start)
            .cloned()
            .ok_or(GraphCompileError::MissingEntry)?;

        let registered = |kind: &NodeKind| -> Result<(), GraphCompileError> {
            match kind {
                NodeKind::Start | NodeKind::End => Ok(()),
                custom => {
                    if self.nodes.contains_key(custom) {
                        Ok(())
                    } else {
                        Err(GraphCompileError::UnknownNode {
                            node: custom.label().to_string(),
                        })
                    }
                }
            }
        };

        registered(&entry)?;
        for (from, to) in &self.edges {
            registered(from)?;
            registered(to)?;
        }
        for (from, route) in &self.conditional {
            registered(from)?;
            if route.routes.is_empty() {
                return Err(GraphCompileError::EmptyRoutes {
                    node: from.label().to_string(),
                });
            }
            for target in route.routes.values() {
                registered(target)?;
            }
        }

        for kind in self.nodes.keys() {
            if !self.edges.contains_key(kind) && !self.conditional.contains_key(kind) {
                return Err(GraphCompileError::DanglingNode {
                    node: kind.label().to_string(),
                });
            }
        }

        Ok(App::from_parts(
            self.nodes,
            self.edges,
            self.conditional,
            entry,
            self.runtime_config,
        ))
    }
}
