//! The composite campaign planner: six stages run in sequence, each embedded
//! as a sub-graph node sharing one checkpoint store.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::app::App;
use crate::graphs::{GraphBuilder, GraphCompileError};
use crate::runtimes::checkpointer::Checkpointer;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;
use crate::types::NodeKind;

use super::{
    PlannerContext, ad_channel_recommender, audience_segment_analyzer,
    brand_industry_classifier, campaign_name_generator, campaign_schedule_recommender,
    marketing_budget_allocator, subgraph::SubgraphNode,
};

/// Stage execution order.
pub const STAGE_ORDER: [&str; 6] = [
    brand_industry_classifier::AGENT,
    audience_segment_analyzer::AGENT,
    ad_channel_recommender::AGENT,
    campaign_schedule_recommender::AGENT,
    marketing_budget_allocator::AGENT,
    campaign_name_generator::AGENT,
];

/// Resume schemas by name, for validating interrupt resume payloads at the
/// service boundary.
#[must_use]
pub fn resume_schemas() -> FxHashMap<String, ObjectSchema> {
    let schemas = [
        brand_industry_classifier::OUTPUT_SCHEMA,
        audience_segment_analyzer::OUTPUT_SCHEMA,
        ad_channel_recommender::OUTPUT_SCHEMA,
        campaign_schedule_recommender::OUTPUT_SCHEMA,
        marketing_budget_allocator::OUTPUT_SCHEMA,
        campaign_name_generator::OUTPUT_SCHEMA,
    ];
    schemas
        .into_iter()
        .map(|schema| (schema.name.to_string(), schema))
        .collect()
}

fn check_field_ownership(
    stages: &[(&'static str, &'static [&'static str])],
) -> Result<(), GraphCompileError> {
    let mut owners: FxHashMap<&str, &str> = FxHashMap::default();
    for (agent, writes) in stages {
        for field in *writes {
            if let Some(first) = owners.insert(field, agent) {
                return Err(GraphCompileError::FieldOwnershipConflict {
                    field: (*field).to_string(),
                    first: first.to_string(),
                    second: (*agent).to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Compile the composite planner graph.
///
/// `checkpointer` is shared between the outer graph and every stage, so an
/// interrupt or crash inside a stage resumes from its own durable state.
/// `runtime` applies to the outer graph; stages get a config with the same
/// step limit and no sinks of their own.
pub fn build_planner(
    ctx: &PlannerContext,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    runtime: RuntimeConfig,
) -> Result<App, GraphCompileError> {
    check_field_ownership(&[
        (brand_industry_classifier::AGENT, brand_industry_classifier::WRITES),
        (audience_segment_analyzer::AGENT, audience_segment_analyzer::WRITES),
        (ad_channel_recommender::AGENT, ad_channel_recommender::WRITES),
        (
            campaign_schedule_recommender::AGENT,
            campaign_schedule_recommender::WRITES,
        ),
        (marketing_budget_allocator::AGENT, marketing_budget_allocator::WRITES),
        (campaign_name_generator::AGENT, campaign_name_generator::WRITES),
    ])?;

    let stage_runtime = RuntimeConfig::new().with_step_limit(runtime.step_limit);
    let stages: Vec<(&'static str, App)> = vec![
        (
            brand_industry_classifier::AGENT,
            brand_industry_classifier::build(ctx, stage_runtime.clone())?,
        ),
        (
            audience_segment_analyzer::AGENT,
            audience_segment_analyzer::build(ctx, stage_runtime.clone())?,
        ),
        (
            ad_channel_recommender::AGENT,
            ad_channel_recommender::build(ctx, stage_runtime.clone())?,
        ),
        (
            campaign_schedule_recommender::AGENT,
            campaign_schedule_recommender::build(ctx, stage_runtime.clone())?,
        ),
        (
            marketing_budget_allocator::AGENT,
            marketing_budget_allocator::build(ctx, stage_runtime.clone())?,
        ),
        (
            campaign_name_generator::AGENT,
            campaign_name_generator::build(ctx, stage_runtime)?,
        ),
    ];

    let mut builder = GraphBuilder::new();
    let mut previous = NodeKind::Start;
    for (agent, app) in stages {
        let kind = NodeKind::custom(agent);
        builder = builder
            .add_node(
                kind.clone(),
                SubgraphNode::new(agent, Arc::new(app), checkpointer.clone()),
            )
            .add_edge(previous, kind.clone());
        previous = kind;
    }
    builder
        .add_edge(previous, NodeKind::End)
        .with_runtime_config(runtime)
        .compile()
}
