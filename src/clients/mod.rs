//! Clients for external collaborators: the recommendation/optimization
//! service and the campaign-goals store.

pub mod goals;
pub mod recommendation;

pub use goals::{
    CampaignGoals, CascadePolicy, CascadeTier, GoalsError, GoalsRow, GoalsStore,
    InMemoryGoalsStore, fetch_goals,
};
pub use recommendation::{
    BudgetAllocation, BudgetAllocationRequest, OptimizationRequest, OptimizationSuggestion,
    RecommendationClient, RecommendationError,
};
