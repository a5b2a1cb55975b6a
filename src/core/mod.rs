mod engine;
mod error;
mod path;
mod rebalance;
mod sampler;
mod study;
mod summary;
mod types;

pub use engine::{BatchRequest, HISTORY_SAMPLE_LIMIT, MonteCarloResult, run_monte_carlo};
pub use error::SimulationError;
pub use path::simulate_path;
pub use rebalance::{
    RebalanceFrequency, RebalanceStrategy, RebalanceTrigger, current_weights, turnover,
};
pub use sampler::{MonthlyReturns, ReturnSampler};
pub use study::{Study, StudyResults, StudyRun, run_study};
pub use summary::{
    PortfolioComparisonRow, ScenarioComparisonRow, SummaryStatistics, compare_portfolios,
    compare_scenarios, percentile,
};
pub use types::{
    AssetStatistics, AssetStats, CASH_ASSET, ContributionConfig, ExtraWithdrawalConfig,
    MonthSnapshot, PathHistory, PathMetrics, PortfolioConfig, RebalanceConfig, ScenarioParams,
    SimulationParams,
};
