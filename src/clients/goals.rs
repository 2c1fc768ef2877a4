//! Campaign-goals lookup with a cascading filter policy.
//!
//! Historical goal aggregates feed the audience optimizer. The warehouse may
//! have nothing for a specific account/objective pair, so lookups relax
//! their filter tier by tier and the first non-empty answer wins. The tier
//! order is policy, not code: callers can reorder or drop tiers.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Aggregate numeric goals used to steer optimization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignGoals {
    pub spend: f64,
    pub impressions: u64,
    pub views: u64,
    pub clicks: u64,
    pub conversions: u64,
}

impl CampaignGoals {
    fn accumulate(&mut self, other: &CampaignGoals) {
        self.spend += other.spend;
        self.impressions += other.impressions;
        self.views += other.views;
        self.clicks += other.clicks;
        self.conversions += other.conversions;
    }
}

/// One relaxation level of the lookup filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CascadeTier {
    /// Goals for the caller's accounts with the matching objective.
    AccountAndObjective,
    /// Goals for the matching objective across all accounts.
    ObjectiveOnly,
    /// Unfiltered defaults.
    Unfiltered,
}

/// Ordered tiers tried until one returns data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadePolicy {
    pub tiers: Vec<CascadeTier>,
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                CascadeTier::AccountAndObjective,
                CascadeTier::ObjectiveOnly,
                CascadeTier::Unfiltered,
            ],
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum GoalsError {
    #[error("goals store query failed: {message}")]
    #[diagnostic(code(adloom::goals::backend))]
    Backend { message: String },
}

/// Backend holding historical goal aggregates.
///
/// `account_ids` empty means "any account"; `objective` `None` means "any
/// objective". Returns `None` when nothing matches the filter.
#[async_trait]
pub trait GoalsStore: Send + Sync {
    async fn query(
        &self,
        account_ids: &[String],
        objective: Option<&str>,
    ) -> Result<Option<CampaignGoals>, GoalsError>;
}

/// Run the cascade: try each tier in policy order, first non-empty wins.
pub async fn fetch_goals(
    store: &dyn GoalsStore,
    policy: &CascadePolicy,
    account_ids: &[String],
    objective: &str,
) -> Result<Option<CampaignGoals>, GoalsError> {
    for tier in &policy.tiers {
        let result = match tier {
            CascadeTier::AccountAndObjective => {
                if account_ids.is_empty() {
                    continue;
                }
                store.query(account_ids, Some(objective)).await?
            }
            CascadeTier::ObjectiveOnly => store.query(&[], Some(objective)).await?,
            CascadeTier::Unfiltered => store.query(&[], None).await?,
        };
        if result.is_some() {
            return Ok(result);
        }
    }
    Ok(None)
}

/// One stored aggregate row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoalsRow {
    pub account_id: Option<String>,
    pub objective: Option<String>,
    pub goals: CampaignGoals,
}

/// Table-backed store for tests and small deployments.
#[derive(Default)]
pub struct InMemoryGoalsStore {
    rows: Vec<GoalsRow>,
}

impl InMemoryGoalsStore {
    #[must_use]
    pub fn new(rows: Vec<GoalsRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl GoalsStore for InMemoryGoalsStore {
    async fn query(
        &self,
        account_ids: &[String],
        objective: Option<&str>,
    ) -> Result<Option<CampaignGoals>, GoalsError> {
        let mut total = CampaignGoals::default();
        let mut matched = false;
        for row in &self.rows {
            let account_ok = account_ids.is_empty()
                || row
                    .account_id
                    .as_ref()
                    .is_some_and(|id| account_ids.contains(id));
            let objective_ok = objective.is_none_or(|o| {
                row.objective
                    .as_ref()
                    .is_some_and(|row_objective| row_objective == o)
            });
            if account_ok && objective_ok {
                total.accumulate(&row.goals);
                matched = true;
            }
        }
        Ok(matched.then_some(total))
    }
}
