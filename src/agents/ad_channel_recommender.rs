//! Stage 3: pick advertising platforms.
//!
//! This stage is the single writer of `recommended_ad_platforms`. When the
//! audience stage's optimizer produced a by-model suggestion, that wins over
//! the raw model answer; either way the result is restricted to the
//! platforms the pipeline can actually buy on.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::app::App;
use crate::graphs::GraphCompileError;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;
use crate::state::StateSnapshot;

use super::nodes::parse_output;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "ad_channel_recommender";

pub const WRITES: &[&str] = &["recommended_ad_platforms"];

/// Platforms the downstream buying integrations support.
pub const SUPPORTED_PLATFORMS: &[&str] = &["Meta", "Google", "LinkedIn", "TikTok"];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "channel_inputs",
    required: &["industry", "campaign_objective"],
    optional: &[
        "age_group",
        "gender",
        "interests",
        "locations",
        "psychographic_traits",
        "integrated_ad_platforms",
        "recommended_ad_platforms_by_model",
    ],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "channel_recommendation",
    required: &["recommended_ad_platforms"],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are a media planner. Recommend the advertising platforms \
best suited to the audience and objective, choosing only from Meta, Google, LinkedIn and \
TikTok. Answer with a JSON object: {\"recommended_ad_platforms\": [\"...\"]}.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Industry: {}\nObjective: {}\nAudience: {} / {} in {}\nWhich ad platforms should this campaign run on?",
        field_text(fields, "industry"),
        field_text(fields, "campaign_objective"),
        field_text(fields, "age_group"),
        field_text(fields, "gender"),
        field_text(fields, "locations"),
    )
}

pub struct ChannelOutput;

#[async_trait]
impl Node for ChannelOutput {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut fields = parse_output(AGENT, &OUTPUT_SCHEMA, &FxHashMap::default(), &snapshot)?;

        // Optimizer suggestion from the audience stage takes precedence.
        let by_model = snapshot
            .field_strings("recommended_ad_platforms_by_model")
            .filter(|platforms| !platforms.is_empty());
        let candidates: Vec<String> = match by_model {
            Some(platforms) => {
                ctx.emit("using optimizer platform suggestion")?;
                platforms
            }
            None => serde_json::from_value(fields["recommended_ad_platforms"].clone())
                .map_err(|e| NodeError::Parse {
                    node: format!("{AGENT}.output"),
                    message: format!("recommended_ad_platforms: {e}"),
                })?,
        };

        let supported: Vec<String> = candidates
            .into_iter()
            .filter(|p| SUPPORTED_PLATFORMS.contains(&p.as_str()))
            .collect();
        if supported.is_empty() {
            return Err(NodeError::Parse {
                node: format!("{AGENT}.output"),
                message: "no supported ad platforms in the recommendation".to_string(),
            });
        }
        fields.insert("recommended_ad_platforms".into(), json!(supported));

        Ok(NodePartial::new().with_fields(fields).into())
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
        Arc::new(ChannelOutput),
        runtime,
    )
}
