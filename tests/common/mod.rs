#![allow(dead_code)]

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use adloom::agents::PlannerContext;
use adloom::capability::chat::{ChatError, ChatModel, ChatRequest, ChatResponse, ToolSpec};
use adloom::capability::tools::{Tool, ToolError, ToolRegistry};
use adloom::message::Message;

/// Chat model that replays a fixed script of responses, one per call.
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<Message>>,
    calls: AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = self
            .responses
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| ChatError::Provider {
                provider: "scripted".into(),
                message: "script exhausted".into(),
            })?;
        Ok(ChatResponse { message })
    }
}

/// Assistant message whose content is a JSON object.
pub fn assistant_json(value: Value) -> Message {
    Message::assistant(&value.to_string())
}

/// Canonical category lookup tool the classifier stage can call.
pub struct IndustryCategoriesTool;

#[async_trait]
impl Tool for IndustryCategoriesTool {
    fn name(&self) -> &str {
        "industry_categories"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "industry_categories".into(),
            description: "Lists the valid industry categories".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
        Ok(json!([
            "Groceries",
            "Fashion",
            "Electronics",
            "Travel",
            "Finance"
        ]))
    }
}

/// Planner context over a scripted model; the model handle is returned so
/// tests can assert on call counts.
pub fn scripted_context(responses: Vec<Message>) -> (PlannerContext, Arc<ScriptedChatModel>) {
    let model = Arc::new(ScriptedChatModel::new(responses));
    let tools = Arc::new(ToolRegistry::new().register(IndustryCategoriesTool));
    let ctx = PlannerContext::new(model.clone(), tools);
    (ctx, model)
}

/// A well-formed submission for a quick-commerce brand.
pub fn submission_fields() -> FxHashMap<String, Value> {
    let mut fields = FxHashMap::default();
    fields.insert("brand_name".to_string(), json!("Zepto"));
    fields.insert(
        "brand_description".to_string(),
        json!("10-minute grocery delivery"),
    );
    fields.insert("campaign_objective".to_string(), json!("conversions"));
    fields.insert("account_ids".to_string(), json!(["acct-1"]));
    fields
}

/// One valid model answer per stage, in planner order.
pub fn full_run_responses() -> Vec<Message> {
    vec![
        assistant_json(json!({"industry": "Groceries"})),
        assistant_json(json!({
            "age_group": "18-34",
            "gender": "All",
            "interests": ["convenience", "cooking"],
            "locations": ["Mumbai", "Bengaluru"],
            "psychographic_traits": ["time-poor", "urban"],
        })),
        assistant_json(json!({"recommended_ad_platforms": ["Meta", "Google"]})),
        assistant_json(json!({
            "campaign_start_date": "2026-09-15",
            "campaign_end_date": "2026-10-15",
        })),
        assistant_json(json!({
            "total_budget": 5000.0,
            "channel_budget_allocation": {"Meta": 0.6, "Google": 0.4},
        })),
        assistant_json(json!({"campaign_name": "Fresh in Ten"})),
    ]
}
