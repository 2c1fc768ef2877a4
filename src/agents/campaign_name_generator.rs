//! Stage 6: name the campaign.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::app::App;
use crate::graphs::GraphCompileError;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;

use super::nodes::OutputNode;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "campaign_name_generator";

pub const WRITES: &[&str] = &["campaign_name"];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "naming_inputs",
    required: &["brand_name", "campaign_objective", "industry"],
    optional: &["age_group", "campaign_start_date", "campaign_end_date"],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "campaign_name",
    required: &["campaign_name"],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are a creative strategist. Produce one short, memorable \
campaign name. Answer with a JSON object: {\"campaign_name\": \"...\"}.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Brand: {}\nIndustry: {}\nObjective: {}\nName this campaign.",
        field_text(fields, "brand_name"),
        field_text(fields, "industry"),
        field_text(fields, "campaign_objective"),
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
