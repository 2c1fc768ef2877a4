//! The campaign-planning agents: generic node roles, the six domain stages,
//! and the composite planner graph.

pub mod ad_channel_recommender;
pub mod audience_segment_analyzer;
pub mod brand_industry_classifier;
pub mod campaign_name_generator;
pub mod campaign_schedule_recommender;
pub mod marketing_budget_allocator;
pub mod nodes;
pub mod planner;
pub mod subgraph;

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::app::App;
use crate::capability::{ChatModel, DEFAULT_CAPABILITY_TIMEOUT, ToolNode, ToolRegistry};
use crate::clients::{CascadePolicy, GoalsStore, RecommendationClient};
use crate::graphs::{GraphBuilder, GraphCompileError, ROUTE_FINISH, ROUTE_TOOL, ToolRouter};
use crate::node::Node;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::{ExtraFieldsPolicy, ObjectSchema};
use crate::types::NodeKind;

use nodes::{HumanNode, InputNode, LlmProcess};

/// Everything the stages need from the outside world, carried explicitly.
#[derive(Clone)]
pub struct PlannerContext {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<ToolRegistry>,
    pub recommendation: Option<Arc<RecommendationClient>>,
    pub goals: Option<Arc<dyn GoalsStore>>,
    pub cascade: CascadePolicy,
    /// How often a process node re-invokes the model when structured output
    /// fails to parse (0 or 1).
    pub parse_retries: u8,
    /// Bound on every model completion and tool call.
    pub capability_timeout: Duration,
}

impl PlannerContext {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            recommendation: None,
            goals: None,
            cascade: CascadePolicy::default(),
            parse_retries: 1,
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_recommendation(mut self, client: Arc<RecommendationClient>) -> Self {
        self.recommendation = Some(client);
        self
    }

    #[must_use]
    pub fn with_goals(mut self, goals: Arc<dyn GoalsStore>) -> Self {
        self.goals = Some(goals);
        self
    }

    #[must_use]
    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub fn with_parse_retries(mut self, parse_retries: u8) -> Self {
        self.parse_retries = parse_retries;
        self
    }

    #[must_use]
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }
}

/// Declarative description of one stage's graph.
pub(crate) struct StageSpec {
    pub agent: &'static str,
    pub input_schema: ObjectSchema,
    pub output_schema: ObjectSchema,
    pub system_prompt: &'static str,
    pub prompt: fn(&FxHashMap<String, Value>) -> String,
    pub bind_tools: Vec<String>,
}

/// Wire the standard stage shape: input, process with a tool loop, output,
/// human review, end.
pub(crate) fn assemble_stage(
    ctx: &PlannerContext,
    spec: StageSpec,
    output_node: Arc<dyn Node>,
    runtime: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    let input = NodeKind::custom(format!("{}.input", spec.agent));
    let process = NodeKind::custom(format!("{}.process", spec.agent));
    let tool = NodeKind::custom(format!("{}.tool", spec.agent));
    let output = NodeKind::custom(format!("{}.output", spec.agent));
    let human = NodeKind::custom(format!("{}.human", spec.agent));

    GraphBuilder::new()
        .add_node(
            input.clone(),
            InputNode::new(spec.agent, spec.input_schema, ExtraFieldsPolicy::Ignore, spec.prompt),
        )
        .add_node(
            process.clone(),
            LlmProcess::new(
                spec.agent,
                Arc::clone(&ctx.model),
                Arc::clone(&ctx.tools),
                spec.bind_tools,
                spec.system_prompt,
            )
            .with_output_contract(spec.output_schema)
            .with_parse_retries(ctx.parse_retries)
            .with_timeout(ctx.capability_timeout),
        )
        .add_node(
            tool.clone(),
            ToolNode::new(Arc::clone(&ctx.tools)).with_timeout(ctx.capability_timeout),
        )
        .add_shared_node(output.clone(), output_node)
        .add_node(human.clone(), HumanNode::new(spec.agent, spec.output_schema))
        .add_edge(NodeKind::Start, input.clone())
        .add_edge(input, process.clone())
        .add_conditional_edge(
            process.clone(),
            ToolRouter,
            [(ROUTE_TOOL, tool.clone()), (ROUTE_FINISH, output.clone())],
        )
        .add_edge(tool, process)
        .add_edge(output, human.clone())
        .add_edge(human, NodeKind::End)
        .with_runtime_config(runtime)
        .compile()
}

/// Field value rendered as prompt text: strings verbatim, everything else as
/// compact JSON, absent fields empty.
pub(crate) fn field_text(fields: &FxHashMap<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
