//! Graph construction: routers, conditional routes, and the builder.

pub mod builder;

pub use builder::{GraphBuilder, GraphCompileError};

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Route label for entering the tool loop.
pub const ROUTE_TOOL: &str = "tool";
/// Route label for leaving the loop toward output.
pub const ROUTE_FINISH: &str = "finish";

/// Pure routing decision over a state snapshot.
///
/// Routers must not mutate anything or consult the outside world; the same
/// snapshot always yields the same label.
pub trait Router: Send + Sync {
    fn determine_next_step(&self, snapshot: &StateSnapshot) -> String;
}

/// The standard process-node router: any pending tool calls on the last
/// message mean another tool round, otherwise the loop is done.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToolRouter;

impl Router for ToolRouter {
    fn determine_next_step(&self, snapshot: &StateSnapshot) -> String {
        match snapshot.last_message() {
            Some(message) if message.has_tool_calls() => ROUTE_TOOL.to_string(),
            _ => ROUTE_FINISH.to_string(),
        }
    }
}

/// A router plus the label-to-node table it selects from.
#[derive(Clone)]
pub struct ConditionalRoute {
    pub router: Arc<dyn Router>,
    pub routes: FxHashMap<String, NodeKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ToolCall};
    use crate::state::VersionedState;
    use serde_json::json;

    #[test]
    fn tool_router_is_pure_over_the_last_message() {
        let router = ToolRouter;

        let mut state = VersionedState::new_with_user_message("classify");
        assert_eq!(router.determine_next_step(&state.snapshot()), ROUTE_FINISH);

        state.messages.push(
            Message::assistant("")
                .with_tool_calls(vec![ToolCall::new("1", "lookup", json!({}))]),
        );
        let snap = state.snapshot();
        // Same snapshot, same answer, any number of times.
        assert_eq!(router.determine_next_step(&snap), ROUTE_TOOL);
        assert_eq!(router.determine_next_step(&snap), ROUTE_TOOL);

        state.messages.push(Message::tool("{\"result\": 1}"));
        state.messages.push(Message::assistant("done"));
        assert_eq!(router.determine_next_step(&state.snapshot()), ROUTE_FINISH);
    }

    #[test]
    fn empty_state_routes_to_finish() {
        let router = ToolRouter;
        assert_eq!(
            router.determine_next_step(&VersionedState::new().snapshot()),
            ROUTE_FINISH
        );
    }
}
