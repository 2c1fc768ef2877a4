//! HTTP client for the recommendation/optimization service.
//!
//! Both endpoints are enrichment calls: callers treat every failure here as
//! a degradation, log it, and continue with what the model produced. The
//! client enforces a bounded timeout so a slow service cannot stall a run.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::clients::goals::CampaignGoals;
use crate::node::ServiceErrorKind;

/// Service name used in degradation events.
pub const SERVICE_NAME: &str = "recommendation";

#[derive(Debug, Error, Diagnostic)]
pub enum RecommendationError {
    #[error("could not reach the recommendation service: {message}")]
    #[diagnostic(code(adloom::recommendation::connect))]
    Connect { message: String },

    #[error("recommendation request timed out")]
    #[diagnostic(code(adloom::recommendation::timeout))]
    Timeout,

    #[error("recommendation service answered with status {status}")]
    #[diagnostic(code(adloom::recommendation::status))]
    Status { status: u16 },

    #[error("could not decode the recommendation response: {message}")]
    #[diagnostic(code(adloom::recommendation::decode))]
    Decode { message: String },

    #[error("could not build the HTTP client: {message}")]
    #[diagnostic(code(adloom::recommendation::build))]
    Build { message: String },
}

impl RecommendationError {
    #[must_use]
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            RecommendationError::Connect { .. } => ServiceErrorKind::Connect,
            RecommendationError::Timeout => ServiceErrorKind::Timeout,
            RecommendationError::Status { status } => ServiceErrorKind::Status(*status),
            RecommendationError::Decode { .. } => ServiceErrorKind::Decode,
            RecommendationError::Build { .. } => ServiceErrorKind::Other,
        }
    }
}

/// Request to tune audience targeting against historical goals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub goals: CampaignGoals,
    pub account_ids: Vec<String>,
    pub campaign_objective: String,
}

/// Optimizer output; every field is optional and merged only when present.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub age_group: Option<String>,
    pub gender: Option<String>,
    pub locations: Option<Vec<String>>,
    pub recommended_ad_platforms: Option<Vec<String>>,
}

/// Request to split a budget across recommended platforms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BudgetAllocationRequest {
    pub total_budget: f64,
    pub recommended_ad_platforms: Vec<String>,
    pub campaign_objective: String,
}

/// Budget split returned by the service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub total_budget: Option<f64>,
    pub channel_budget_allocation: Option<FxHashMap<String, f64>>,
}

pub struct RecommendationClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecommendationClient {
    /// Build a client with a hard per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RecommendationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecommendationError::Build {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn optimize(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationSuggestion, RecommendationError> {
        self.post("optimize", request).await
    }

    pub async fn allocate_budget(
        &self,
        request: &BudgetAllocationRequest,
    ) -> Result<BudgetAllocation, RecommendationError> {
        self.post("allocatebudget", request).await
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, RecommendationError>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecommendationError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| RecommendationError::Decode {
                message: e.to_string(),
            })
    }
}

fn classify_send_error(e: reqwest::Error) -> RecommendationError {
    if e.is_timeout() {
        RecommendationError::Timeout
    } else {
        RecommendationError::Connect {
            message: e.to_string(),
        }
    }
}
