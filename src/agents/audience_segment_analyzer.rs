//! Stage 2: describe the target audience.
//!
//! After parsing the model's segmentation, the output node asks the
//! optimization service to tune targeting against historical campaign goals.
//! That call is best effort: any failure is recorded as a degraded-run event
//! and the model's own segmentation stands.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::app::App;
use crate::channels::errors::ErrorEvent;
use crate::clients::goals::{CampaignGoals, CascadePolicy, GoalsStore, fetch_goals};
use crate::clients::recommendation::{
    OptimizationRequest, RecommendationClient, SERVICE_NAME,
};
use crate::graphs::GraphCompileError;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::runtimes::runtime_config::RuntimeConfig;
use crate::schema::ObjectSchema;
use crate::state::StateSnapshot;

use super::nodes::parse_output;
use super::{PlannerContext, StageSpec, assemble_stage, field_text};

pub const AGENT: &str = "audience_segment_analyzer";

pub const WRITES: &[&str] = &[
    "age_group",
    "gender",
    "interests",
    "locations",
    "psychographic_traits",
    "recommended_ad_platforms_by_model",
];

pub const INPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "audience_inputs",
    required: &["brand_description", "industry", "campaign_objective"],
    optional: &["product_description", "account_ids", "integrated_ad_platforms"],
};

pub const OUTPUT_SCHEMA: ObjectSchema = ObjectSchema {
    name: "audience_segment",
    required: &[
        "age_group",
        "gender",
        "interests",
        "locations",
        "psychographic_traits",
    ],
    optional: &[],
};

const SYSTEM_PROMPT: &str = "You are an audience strategist. Given a brand, its industry \
and a campaign objective, describe the target audience. Answer with a JSON object with \
keys age_group, gender, interests, locations, psychographic_traits.";

fn prompt(fields: &FxHashMap<String, Value>) -> String {
    format!(
        "Industry: {}\nBrand: {}\nObjective: {}\nDescribe the audience to target.",
        field_text(fields, "industry"),
        field_text(fields, "brand_description"),
        field_text(fields, "campaign_objective"),
    )
}

/// Output node with the optimization enrichment bolted on.
pub struct AudienceOutput {
    recommendation: Option<Arc<RecommendationClient>>,
    goals: Option<Arc<dyn GoalsStore>>,
    cascade: CascadePolicy,
}

impl AudienceOutput {
    #[must_use]
    pub fn new(
        recommendation: Option<Arc<RecommendationClient>>,
        goals: Option<Arc<dyn GoalsStore>>,
        cascade: CascadePolicy,
    ) -> Self {
        Self {
            recommendation,
            goals,
            cascade,
        }
    }

    async fn lookup_goals(&self, account_ids: &[String], objective: &str) -> CampaignGoals {
        let Some(store) = &self.goals else {
            return CampaignGoals::default();
        };
        match fetch_goals(store.as_ref(), &self.cascade, account_ids, objective).await {
            Ok(Some(goals)) => goals,
            Ok(None) => CampaignGoals::default(),
            Err(e) => {
                tracing::warn!(error = %e, "goals lookup failed, using defaults");
                CampaignGoals::default()
            }
        }
    }
}

#[async_trait]
impl Node for AudienceOutput {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut fields = parse_output(AGENT, &OUTPUT_SCHEMA, &FxHashMap::default(), &snapshot)?;
        let mut partial = NodePartial::new();

        if let Some(client) = &self.recommendation {
            let account_ids = snapshot.field_strings("account_ids").unwrap_or_default();
            let objective = snapshot
                .field_str("campaign_objective")
                .unwrap_or_default()
                .to_string();
            let goals = self.lookup_goals(&account_ids, &objective).await;
            let request = OptimizationRequest {
                goals,
                account_ids,
                campaign_objective: objective,
            };
            match client.optimize(&request).await {
                Ok(suggestion) => {
                    if let Some(age_group) = suggestion.age_group {
                        fields.insert("age_group".into(), json!(age_group));
                    }
                    if let Some(gender) = suggestion.gender {
                        fields.insert("gender".into(), json!(gender));
                    }
                    if let Some(locations) = suggestion.locations {
                        fields.insert("locations".into(), json!(locations));
                    }
                    if let Some(platforms) = suggestion.recommended_ad_platforms {
                        fields.insert("recommended_ad_platforms_by_model".into(), json!(platforms));
                    }
                    ctx.emit("optimization suggestion merged")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "optimization unavailable, keeping model output");
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
    let output = AudienceOutput::new(
        ctx.recommendation.clone(),
        ctx.goals.clone(),
        ctx.cascade.clone(),
    );
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
        Arc::new(output),
        runtime,
    )
}
