//! Stage 5: split the budget across the recommended platforms.
//!
//! A caller-supplied `total_budget` always wins over whatever number the
//! model produced. The allocation service refines the channel split; like
//! the optimizer it is best effort, and on failure the model's split stands
//! with a degraded-run event recorded.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::app::App;
use crate::channels::errors::ErrorEvent;
use crate::clients::recommendation::{
    BudgetAllocationRequest, RecommendationClient, SERVICE_NAME,
};
use crate::graphs::GraphCompileError;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;
use crate::state::StateSnapshot;

use super::nodes::parse_output;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "marketing_budget_allocator";

pub const WRITES: &[&str] = &["total_budget", "channel_budget_allocation"];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "budget_inputs",
    required: &["campaign_objective", "recommended_ad_platforms"],
    optional: &["total_budget", "campaign_start_date", "campaign_end_date", "industry"],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "budget_allocation",
    required: &["total_budget", "channel_budget_allocation"],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are a media buyer. Allocate the campaign budget across \
the recommended platforms as fractions that sum to 1. Answer with a JSON object: \
{\"total_budget\": <number>, \"channel_budget_allocation\": {\"<platform>\": <fraction>}}.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Objective: {}\nPlatforms: {}\nTotal budget: {}\nAllocate the budget across platforms.",
        field_text(fields, "campaign_objective"),
        field_text(fields, "recommended_ad_platforms"),
        field_text(fields, "total_budget"),
    )
}

pub struct BudgetOutput {
    recommendation: Option<Arc<RecommendationClient>>,
}

impl BudgetOutput {
    #[must_use]
    pub fn new(recommendation: Option<Arc<RecommendationClient>>) -> Self {
        Self { recommendation }
    }
}

#[async_trait]
impl Node for BudgetOutput {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut fallbacks = FxHashMap::default();
        fallbacks.insert("total_budget".to_string(), "total_budget".to_string());
        let mut fields = parse_output(AGENT, &OUTPUT_SCHEMA, &fallbacks, &snapshot)?;

        // The submitted budget is authoritative when present.
        if let Some(submitted) = snapshot.field_f64("total_budget") {
            fields.insert("total_budget".into(), json!(submitted));
        }

        let mut partial = NodePartial::new();
        if let Some(client) = &self.recommendation {
            let request = BudgetAllocationRequest {
                total_budget: fields
                    .get("total_budget")
                    .and_then(Value::as_f64)
                    .unwrap_or_default(),
                recommended_ad_platforms: snapshot
                    .field_strings("recommended_ad_platforms")
                    .unwrap_or_default(),
                campaign_objective: snapshot
                    .field_str("campaign_objective")
                    .unwrap_or_default()
                    .to_string(),
            };
            match client.allocate_budget(&request).await {
                Ok(allocation) => {
                    if let Some(split) = allocation.channel_budget_allocation {
                        fields.insert("channel_budget_allocation".into(), json!(split));
                        ctx.emit("allocation service split merged")?;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "budget allocation unavailable, keeping model split");
                    partial = partial.with_error(ErrorEvent::degraded(
                        format!("{AGENT}.output"),
                        ctx.step,
                        SERVICE_NAME,
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(partial.with_fields(fields).into())
    }
}

pub fn build(ctx: &PlannerContext, runtime: RuntimeConfig) -> Result<App, GraphCompileError> {
    assemble_stage(
        ctx,
        StageSpec {
            agent: AGENT,
            input_schema: INPUT_SCHEMA,
            output_schema: OUTPUT_SCHEMA,
            system_prompt: SYSTEM_PROMPT,
            prompt,
            bind_tools: Vec::new(),
        },
        Arc::new(BudgetOutput::new(ctx.recommendation.clone())),
        runtime,
    )
}
