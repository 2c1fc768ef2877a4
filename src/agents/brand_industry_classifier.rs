//! Stage 1: classify the brand into an industry.
//!
//! May consult the `industry_categories` tool for the canonical category
//! list before answering.

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::app::App;
use crate::graphs::GraphCompileError;
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;

use super::nodes::OutputNode;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "brand_industry_classifier";

/// Fields this stage owns.
pub const WRITES: &[&str] = &["industry"];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "brand_profile",
    required: &["brand_name", "brand_description"],
    optional: &["product_name", "product_description", "website"],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "industry_classification",
    required: &["industry"],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are a brand analyst. Classify the brand into a single \
industry category. Use the industry_categories tool when you need the list of valid \
categories. Answer with a JSON object: {\"industry\": \"<category>\"}.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Brand: {}\nDescription: {}\nProduct: {} {}\nWebsite: {}\nClassify this brand's industry.",
        field_text(fields, "brand_name"),
        field_text(fields, "brand_description"),
        field_text(fields, "product_name"),
        field_text(fields, "product_description"),
        field_text(fields, "website"),
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
            bind_tools: vec!["industry_categories".to_string()],
        },
        Arc::new(OutputNode::new(AGENT, OUTPUT_SCHEMA)),
        runtime,
    )
}
