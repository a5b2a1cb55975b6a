use std::collections::BTreeMap;

use tracing::info;

use super::engine::{BatchRequest, run_monte_carlo};
use super::error::SimulationError;
use super::rebalance::RebalanceStrategy;
use super::sampler::ReturnSampler;
use super::summary::{
    PortfolioComparisonRow, ScenarioComparisonRow, SummaryStatistics, compare_portfolios,
    compare_scenarios,
};
use super::types::{
    AssetStatistics, PathHistory, PathMetrics, PortfolioConfig, ScenarioParams, SimulationParams,
};

/// Every portfolio evaluated under every economic scenario with shared simulation params.
#[derive(Debug, Clone)]
pub struct Study {
    pub asset_stats: AssetStatistics,
    pub portfolios: BTreeMap<String, PortfolioConfig>,
    pub scenarios: BTreeMap<String, ScenarioParams>,
    pub params: SimulationParams,
}

impl Study {
    /// Checks every portfolio and scenario pairing so a bad entry fails before any batch runs.
    pub fn validate(&self) -> Result<(), SimulationError> {
        for portfolio in self.portfolios.values() {
            ReturnSampler::for_portfolio(&self.asset_stats, portfolio)?;
            for scenario in self.scenarios.values() {
                RebalanceStrategy::from_portfolio(portfolio, scenario.transaction_cost)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StudyRun {
    pub portfolio: String,
    pub scenario: String,
    pub metrics: Vec<PathMetrics>,
    pub histories: Vec<PathHistory>,
    pub summary: SummaryStatistics,
}

#[derive(Debug, Clone, Default)]
pub struct StudyResults {
    /// Portfolio-major, both keys in sorted order.
    pub runs: Vec<StudyRun>,
}

impl StudyResults {
    pub fn tables(&self) -> impl Iterator<Item = (&str, &str, &[PathMetrics])> + Clone {
        self.runs
            .iter()
            .map(|r| (r.portfolio.as_str(), r.scenario.as_str(), r.metrics.as_slice()))
    }

    pub fn scenario_comparison(&self) -> Vec<ScenarioComparisonRow> {
        compare_scenarios(self.tables())
    }

    pub fn portfolio_comparison(&self, scenario: &str) -> Vec<PortfolioComparisonRow> {
        compare_portfolios(self.tables(), scenario)
    }

    pub fn get(&self, portfolio: &str, scenario: &str) -> Option<&StudyRun> {
        self.runs
            .iter()
            .find(|r| r.portfolio == portfolio && r.scenario == scenario)
    }
}

pub fn run_study(study: &Study, collect_histories: bool) -> Result<StudyResults, SimulationError> {
    study.validate()?;
    let mut runs = Vec::with_capacity(study.portfolios.len() * study.scenarios.len());

    for (portfolio_key, portfolio) in &study.portfolios {
        for (scenario_key, scenario) in &study.scenarios {
            let request = BatchRequest {
                asset_stats: &study.asset_stats,
                portfolio,
                scenario,
                params: &study.params,
            };
            let result = run_monte_carlo(&request, collect_histories)?;
            let summary = SummaryStatistics::from_metrics(&result.metrics);

            info!(
                portfolio = %portfolio_key,
                scenario = %scenario_key,
                survival_rate = summary.survival_rate,
                mean_final_value = summary.mean_final_value,
                "batch finished"
            );

            runs.push(StudyRun {
                portfolio: portfolio_key.clone(),
                scenario: scenario_key.clone(),
                metrics: result.metrics,
                histories: result.histories,
                summary,
            });
        }
    }

    Ok(StudyResults { runs })
}
