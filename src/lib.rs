//! # Adloom: Campaign Planning Workflows
//!
//! Adloom assembles marketing campaign plans by running a graph of
//! model-backed agents over a shared, versioned state. Each agent stage
//! validates its inputs, converses with a chat model (optionally calling
//! tools in a loop), parses the model's answer against a declared schema,
//! and merges the fields it owns back into the plan.
//!
//! ## Core Concepts
//!
//! - **Nodes**: async units of work over a state snapshot ([`node::Node`])
//! - **State**: three versioned channels (messages, fields, errors)
//! - **Graph**: static edges plus conditional routing ([`graphs::GraphBuilder`])
//! - **Runtime**: sequential per-session steps with a checkpoint after each
//!   ([`runtimes::AppRunner`])
//! - **Interrupts**: a node can suspend for human review and the thread
//!   resumes later, even in a new process
//! - **Service**: submit / status / result / resume facade
//!   ([`service::PlannerService`])
//!
//! ## Building a Workflow
//!
//! ```
//! use adloom::{
//!     graphs::GraphBuilder,
//!     message::Message,
//!     node::{Node, NodeContext, NodeError, NodeOutput, NodePartial},
//!     state::StateSnapshot,
//!     types::NodeKind,
//! };
//! use async_trait::async_trait;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodeOutput, NodeError> {
//!         let partial = NodePartial::new().with_message(Message::assistant("Hello!"));
//!         Ok(partial.into())
//!     }
//! }
//!
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::custom("greet"), GreetingNode)
//!     .add_edge(NodeKind::Start, NodeKind::custom("greet"))
//!     .add_edge(NodeKind::custom("greet"), NodeKind::End)
//!     .compile()
//!     .expect("valid graph");
//! assert_eq!(app.entry(), &NodeKind::custom("greet"));
//! ```
//!
//! ## The Campaign Planner
//!
//! The planner itself lives in [`agents`]: six stages chained as sub-graphs
//! (industry, audience, channels, schedule, budget, name), compiled by
//! [`agents::planner::build_planner`] and exposed through
//! [`service::PlannerService`].

pub mod agents;
pub mod app;
pub mod capability;
pub mod channels;
pub mod clients;
pub mod event_bus;
pub mod graphs;
pub mod message;
pub mod node;
pub mod reducers;
pub mod runtimes;
pub mod schema;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod types;
