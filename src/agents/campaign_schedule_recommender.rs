//! Stage 4: recommend the campaign flight dates.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::app::App;
use crate::graphs::GraphCompileError;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;

use super::nodes::OutputNode;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "campaign_schedule_recommender";

pub const WRITES: &[&str] = &["campaign_start_date", "campaign_end_date"];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "schedule_inputs",
    required: &["industry", "campaign_objective"],
    optional: &["total_budget", "recommended_ad_platforms", "locations"],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "campaign_schedule",
    required: &["campaign_start_date", "campaign_end_date"],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are a campaign planner. Recommend a start and end date \
for the campaign flight, ISO 8601 dates. Answer with a JSON object: \
{\"campaign_start_date\": \"YYYY-MM-DD\", \"campaign_end_date\": \"YYYY-MM-DD\"}.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Industry: {}\nObjective: {}\nPlatforms: {}\nRecommend the campaign schedule.",
        field_text(fields, "industry"),
        field_text(fields, "campaign_objective"),
        field_text(fields, "recommended_ad_platforms"),
    )
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
        Arc::new(OutputNode::new(AGENT, OUTPUT_SCHEMA)),
        runtime,
    )
}
