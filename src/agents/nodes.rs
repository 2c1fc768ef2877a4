//! Generic node roles every stage is built from.
//!
//! A stage is input validation, a model-backed process with a tool loop, an
//! output parser, and a human review gate. The domain modules supply schemas
//! and prompts; the behavior contracts live here.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::capability::DEFAULT_CAPABILITY_TIMEOUT;
use crate::capability::chat::{ChatError, ChatModel, ChatRequest, ChatResponse};
use crate::capability::tools::ToolRegistry;
use crate::message::Message;
use crate::node::{
    InterruptRequest, Node, NodeContext, NodeError, NodeOutput, NodePartial, ServiceErrorKind,
};
use crate::schema::{ExtraFieldsPolicy, ObjectSchema, parse_json_object, value_to_fields};
use crate::state::StateSnapshot;

/// Validates the incoming fields against the stage's input schema and seeds
/// the conversation with the stage prompt.
pub struct InputNode {
    agent: &'static str,
    schema: ObjectSchema,
    policy: ExtraFieldsPolicy,
    prompt: fn(&FxHashMap<String, Value>) -> String,
}

impl InputNode {
    #[must_use]
    pub fn new(
        agent: &'static str,
        schema: ObjectSchema,
        policy: ExtraFieldsPolicy,
        prompt: fn(&FxHashMap<String, Value>) -> String,
    ) -> Self {
        Self {
            agent,
            schema,
            policy,
            prompt,
        }
    }
}

#[async_trait]
impl Node for InputNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let validated = self
            .schema
            .validate(&snapshot.fields, self.policy)
            .map_err(|violations| NodeError::Validation {
                node: format!("{}.input", self.agent),
                violations,
            })?;
        ctx.emit("input accepted")?;
        let prompt = (self.prompt)(&validated);
        Ok(NodePartial::new().with_message(Message::user(&prompt)).into())
    }
}

/// Invokes the chat model with the stage's bound tools and appends exactly
/// one assistant message.
///
/// When the stage declares an output contract and the final (tool-free)
/// response does not parse against it, the model is re-invoked once if the
/// retry budget allows; the second answer is taken either way. Safe to
/// re-execute after a crash: it reads state, calls the capability, and
/// appends.
pub struct LlmProcess {
    agent: &'static str,
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    bind_tools: Vec<String>,
    system_prompt: String,
    output_contract: Option<ObjectSchema>,
    parse_retries: u8,
    timeout: Duration,
}

impl LlmProcess {
    #[must_use]
    pub fn new(
        agent: &'static str,
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        bind_tools: Vec<String>,
        system_prompt: &str,
    ) -> Self {
        Self {
            agent,
            model,
            tools,
            bind_tools,
            system_prompt: system_prompt.to_string(),
            output_contract: None,
            parse_retries: 1,
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_output_contract(mut self, schema: ObjectSchema) -> Self {
        self.output_contract = Some(schema);
        self
    }

    #[must_use]
    pub fn with_parse_retries(mut self, parse_retries: u8) -> Self {
        self.parse_retries = parse_retries;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completion with the node's timeout applied; a hung provider becomes a
    /// timeout error instead of stalling the thread.
    async fn complete_bounded(&self, request: ChatRequest) -> Result<ChatResponse, NodeError> {
        tokio::time::timeout(self.timeout, self.model.complete(request))
            .await
            .map_err(|_| ChatError::Timeout {
                seconds: self.timeout.as_secs(),
            })
            .and_then(|result| result)
            .map_err(chat_error)
    }

    fn satisfies_contract(&self, content: &str) -> bool {
        match &self.output_contract {
            Some(schema) => parse_json_object(content)
                .ok()
                .is_some_and(|obj| schema.validate(&obj, ExtraFieldsPolicy::Ignore).is_ok()),
            None => true,
        }
    }
}

fn chat_error(e: ChatError) -> NodeError {
    match e {
        ChatError::Timeout { .. } => NodeError::ExternalService {
            service: "chat-model".into(),
            kind: ServiceErrorKind::Timeout,
            message: e.to_string(),
        },
        ChatError::Provider { .. } => NodeError::ExternalService {
            service: "chat-model".into(),
            kind: ServiceErrorKind::Other,
            message: e.to_string(),
        },
    }
}

#[async_trait]
impl Node for LlmProcess {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut messages = Vec::with_capacity(snapshot.messages.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(snapshot.messages.iter().cloned());
        let request =
            ChatRequest::new(messages).with_tools(self.tools.specs_for(&self.bind_tools));

        let mut response = self.complete_bounded(request.clone()).await?;

        if !response.message.has_tool_calls() {
            let mut retries = self.parse_retries;
            while retries > 0 && !self.satisfies_contract(&response.message.content) {
                ctx.emit("output missed the contract, re-invoking the model")?;
                response = self.complete_bounded(request.clone()).await?;
                retries -= 1;
            }
        }

        let mut message = response.message;
        message.role = Message::ASSISTANT.to_string();
        Ok(NodePartial::new().with_message(message).into())
    }
}

/// Parse the latest assistant message into `schema` fields.
///
/// Required fields that the model omitted may be filled from prior state via
/// `fallbacks` (schema field name to state field name); anything still
/// missing is a parse failure naming the stage's output node.
pub(crate) fn parse_output(
    agent: &str,
    schema: &ObjectSchema,
    fallbacks: &FxHashMap<String, String>,
    snapshot: &StateSnapshot,
) -> Result<FxHashMap<String, Value>, NodeError> {
    let node = format!("{agent}.output");
    let content = snapshot
        .messages
        .iter()
        .rev()
        .find(|m| m.has_role(Message::ASSISTANT))
        .map(|m| m.content.clone())
        .ok_or(NodeError::MissingInput {
            what: "an assistant message to parse",
        })?;

    let mut object = parse_json_object(&content).map_err(|e| NodeError::Parse {
        node: node.clone(),
        message: e.to_string(),
    })?;

    for field in schema.required {
        let missing = matches!(object.get(*field), None | Some(Value::Null));
        if missing {
            if let Some(source) = fallbacks.get(*field) {
                if let Some(value) = snapshot.field(source) {
                    object.insert((*field).to_string(), value.clone());
                }
            }
        }
    }

    schema
        .validate(&object, ExtraFieldsPolicy::Ignore)
        .map_err(|violations| NodeError::Parse {
            node,
            message: crate::schema::render_violations(&violations),
        })
}

/// Plain output stage: parse and merge, no enrichment.
pub struct OutputNode {
    agent: &'static str,
    schema: ObjectSchema,
    fallbacks: FxHashMap<String, String>,
}

impl OutputNode {
    #[must_use]
    pub fn new(agent: &'static str, schema: ObjectSchema) -> Self {
        Self {
            agent,
            schema,
            fallbacks: FxHashMap::default(),
        }
    }

    /// Fill a missing required `field` from the named prior state field.
    #[must_use]
    pub fn with_fallback(mut self, field: impl Into<String>, state_field: impl Into<String>) -> Self {
        self.fallbacks.insert(field.into(), state_field.into());
        self
    }
}

#[async_trait]
impl Node for OutputNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let fields = parse_output(self.agent, &self.schema, &self.fallbacks, &snapshot)?;
        ctx.emit("output parsed")?;
        Ok(NodePartial::new().with_fields(fields).into())
    }
}

/// Human review gate.
///
/// Suspends with a projection of the stage's output schema when the thread
/// asked for validation; otherwise passes through unchanged. A resume
/// payload, edited or identical, is re-validated against the same schema
/// before it is merged, so resuming with the untouched projection leaves
/// state exactly as it was.
pub struct HumanNode {
    agent: &'static str,
    schema: ObjectSchema,
}

impl HumanNode {
    #[must_use]
    pub fn new(agent: &'static str, schema: ObjectSchema) -> Self {
        Self { agent, schema }
    }
}

#[async_trait]
impl Node for HumanNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let node = format!("{}.human", self.agent);

        if let Some(payload) = &ctx.resume {
            let object = value_to_fields(payload).map_err(|violations| NodeError::Validation {
                node: node.clone(),
                violations,
            })?;
            let validated = self
                .schema
                .validate(&object, ExtraFieldsPolicy::Reject)
                .map_err(|violations| NodeError::Validation { node, violations })?;
            ctx.emit("review accepted")?;
            return Ok(NodePartial::new().with_fields(validated).into());
        }

        if ctx.user_validation_enabled() {
            let projection: serde_json::Map<String, Value> =
                self.schema.project(&snapshot.fields).into_iter().collect();
            ctx.emit("awaiting review")?;
            return Ok(NodeOutput::Suspend(InterruptRequest {
                payload: Value::Object(projection),
                resume_schema: self.schema.name.to_string(),
            }));
        }

        Ok(NodePartial::new().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{PARAM_USER_VALIDATION, ThreadConfig};
    use crate::state::VersionedState;
    use serde_json::json;

    const SCHEMA: ObjectSchema = ObjectSchema {
        name: "industry_classification",
        required: &["industry"],
        optional: &[],
    };

    fn ctx(validation: bool) -> NodeContext {
        let thread =
            ThreadConfig::new("t1").with_param(PARAM_USER_VALIDATION, json!(validation));
        NodeContext::new("classifier.human", 1, thread, None)
    }

    struct StalledModel;

    #[async_trait]
    impl ChatModel for StalledModel {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ChatError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ChatError::Provider {
                provider: "stalled".into(),
                message: "unreachable".into(),
            })
        }
    }

    #[tokio::test]
    async fn a_hung_model_times_out_instead_of_stalling() {
        let node = LlmProcess::new(
            "classifier",
            Arc::new(StalledModel),
            Arc::new(ToolRegistry::new()),
            Vec::new(),
            "classify the brand",
        )
        .with_timeout(Duration::from_millis(20));

        let state = VersionedState::new_with_user_message("classify Zepto");
        let err = node.run(state.snapshot(), ctx(false)).await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::ExternalService {
                kind: ServiceErrorKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn human_passes_through_when_validation_disabled() {
        let node = HumanNode::new("classifier", SCHEMA);
        let state = VersionedState::new().with_field("industry", json!("Groceries"));
        let output = node.run(state.snapshot(), ctx(false)).await.unwrap();
        assert_eq!(output, NodeOutput::Continue(NodePartial::new()));
    }

    #[tokio::test]
    async fn human_suspends_with_schema_projection() {
        let node = HumanNode::new("classifier", SCHEMA);
        let state = VersionedState::new()
            .with_field("industry", json!("Groceries"))
            .with_field("brand_name", json!("Zepto"));
        let output = node.run(state.snapshot(), ctx(true)).await.unwrap();
        let NodeOutput::Suspend(request) = output else {
            panic!("expected a suspension");
        };
        assert_eq!(request.resume_schema, "industry_classification");
        assert_eq!(request.payload, json!({"industry": "Groceries"}));
    }

    #[tokio::test]
    async fn resume_payload_is_revalidated() {
        let node = HumanNode::new("classifier", SCHEMA);
        let state = VersionedState::new().with_field("industry", json!("Groceries"));

        let mut ctx = ctx(true);
        ctx.resume = Some(json!({"industry": "Quick Commerce", "extra": 1}));
        let err = node.run(state.snapshot(), ctx).await.unwrap_err();
        assert!(matches!(err, NodeError::Validation { .. }));
        assert!(err.to_string().contains("extra"));
    }

    #[tokio::test]
    async fn parse_output_applies_fallbacks() {
        const BUDGET: ObjectSchema = ObjectSchema {
            name: "budget_allocation",
            required: &["total_budget", "channel_budget_allocation"],
            optional: &[],
        };
        let mut state = VersionedState::new().with_field("total_budget", json!(9000.0));
        state.messages.push(Message::assistant(
            r#"{"channel_budget_allocation": {"Meta": 0.6, "Google": 0.4}}"#,
        ));

        let mut fallbacks = FxHashMap::default();
        fallbacks.insert("total_budget".to_string(), "total_budget".to_string());
        let fields = parse_output("budget", &BUDGET, &fallbacks, &state.snapshot()).unwrap();
        assert_eq!(fields["total_budget"], json!(9000.0));

        let empty = FxHashMap::default();
        let err = parse_output("budget", &BUDGET, &empty, &state.snapshot()).unwrap_err();
        assert!(matches!(err, NodeError::Parse { .. }));
        assert_eq!(err.node(), Some("budget.output"));
    }
}
