use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::core::{
    AssetStatistics, AssetStats, CASH_ASSET, ContributionConfig, ExtraWithdrawalConfig,
    PortfolioConfig, ScenarioParams, SimulationParams, Study,
};

pub const DEFAULT_ITERATIONS: u32 = 1_000;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Study settings document. Every section is optional so partial documents fail with a field
/// name in the error rather than a serde position.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsPayload {
    pub project: ProjectPayload,
    pub simulation: SimulationPayload,
    pub contributions: ContributionsPayload,
    pub withdrawal_changes: WithdrawalChangesPayload,
    pub portfolios: BTreeMap<String, PortfolioConfig>,
    pub economic_scenarios: BTreeMap<String, ScenarioParams>,
    pub asset_statistics: Option<AssetStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectPayload {
    pub initial_capital: Option<f64>,
    pub simulation_horizon_years: Option<u32>,
    /// Overrides `simulation_horizon_years` when set.
    pub simulation_horizon_months: Option<u32>,
    pub withdrawals: WithdrawalsPayload,
    pub random_seed: Option<u64>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WithdrawalsPayload {
    pub amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SimulationPayload {
    pub montecarlo_iterations: Option<u32>,
    pub inflation_adjustment: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContributionsPayload {
    pub enabled: bool,
    pub periodic_contribution: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WithdrawalChangesPayload {
    pub enabled: bool,
    pub thirteenth_payment_amount: Option<f64>,
    pub thirteenth_payment_months: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct AssetStatsRow {
    asset: String,
    mean_return_annual: f64,
    std_dev_annual: f64,
}

pub fn load_settings(path: &Path) -> Result<SettingsPayload, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read settings {}: {e}", path.display()))?;
    parse_settings(&raw)
}

pub fn parse_settings(json: &str) -> Result<SettingsPayload, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid settings JSON: {e}"))
}

pub fn load_asset_statistics_csv(path: &Path) -> Result<AssetStatistics, String> {
    let file = fs::File::open(path)
        .map_err(|e| format!("failed to open asset statistics {}: {e}", path.display()))?;
    parse_asset_statistics_csv(file)
        .map_err(|e| format!("asset statistics {}: {e}", path.display()))
}

/// Reads `asset,mean_return_annual,std_dev_annual` rows. Later rows win on duplicate assets.
pub fn parse_asset_statistics_csv<R: io::Read>(reader: R) -> Result<AssetStatistics, String> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut stats = AssetStatistics::new();

    for (idx, row) in reader.deserialize::<AssetStatsRow>().enumerate() {
        // Header is line 1.
        let row = row.map_err(|e| format!("line {}: {e}", idx + 2))?;
        stats.insert(
            row.asset.trim().to_string(),
            AssetStats {
                mean_return_annual: row.mean_return_annual,
                std_dev_annual: row.std_dev_annual,
            },
        );
    }

    if stats.is_empty() {
        return Err("no asset rows found".to_string());
    }
    Ok(stats)
}

/// Validates a settings document and resolves it into a runnable study.
///
/// `asset_stats_override` (typically loaded from CSV) takes precedence over inline
/// `asset_statistics`.
pub fn build_study(
    payload: SettingsPayload,
    asset_stats_override: Option<AssetStatistics>,
) -> Result<Study, String> {
    let project = payload.project;

    let Some(initial_capital) = project.initial_capital else {
        return Err("project.initial_capital is required".to_string());
    };
    if !initial_capital.is_finite() || initial_capital <= 0.0 {
        return Err("project.initial_capital must be > 0".to_string());
    }

    let horizon_months = match (project.simulation_horizon_months, project.simulation_horizon_years)
    {
        (Some(months), _) => months,
        (None, Some(years)) => years
            .checked_mul(12)
            .ok_or_else(|| "project.simulation_horizon_years is too large".to_string())?,
        (None, None) => {
            return Err("project.simulation_horizon_years is required".to_string());
        }
    };
    if horizon_months == 0 {
        return Err("project.simulation_horizon_years must be > 0".to_string());
    }

    let withdrawal_amount = project.withdrawals.amount.unwrap_or(0.0);
    if !withdrawal_amount.is_finite() || withdrawal_amount < 0.0 {
        return Err("project.withdrawals.amount must be >= 0".to_string());
    }

    let n_iterations = payload
        .simulation
        .montecarlo_iterations
        .unwrap_or(DEFAULT_ITERATIONS);

    let contributions = payload.contributions;
    if !contributions.periodic_contribution.is_finite() {
        return Err("contributions.periodic_contribution must be finite".to_string());
    }

    let changes = payload.withdrawal_changes;
    let extra_amount = changes.thirteenth_payment_amount.unwrap_or(withdrawal_amount);
    if !extra_amount.is_finite() || extra_amount < 0.0 {
        return Err("withdrawal_changes.thirteenth_payment_amount must be >= 0".to_string());
    }
    if changes.thirteenth_payment_months.contains(&0) {
        return Err("withdrawal_changes.thirteenth_payment_months must be >= 1".to_string());
    }

    if payload.portfolios.is_empty() {
        return Err("portfolios must contain at least one portfolio".to_string());
    }
    for (key, portfolio) in &payload.portfolios {
        validate_portfolio(key, portfolio)?;
    }

    if payload.economic_scenarios.is_empty() {
        return Err("economic_scenarios must contain at least one scenario".to_string());
    }
    for (key, scenario) in &payload.economic_scenarios {
        validate_scenario(key, scenario)?;
    }

    let Some(asset_stats) = asset_stats_override.or(payload.asset_statistics) else {
        return Err(
            "asset statistics are required (--asset-stats or asset_statistics)".to_string(),
        );
    };
    for (asset, stats) in &asset_stats {
        if asset == CASH_ASSET {
            continue;
        }
        if !stats.mean_return_annual.is_finite() {
            return Err(format!(
                "asset_statistics.{asset}.mean_return_annual must be finite"
            ));
        }
        if !stats.std_dev_annual.is_finite() || stats.std_dev_annual < 0.0 {
            return Err(format!("asset_statistics.{asset}.std_dev_annual must be >= 0"));
        }
    }

    let study = Study {
        asset_stats,
        portfolios: payload.portfolios,
        scenarios: payload.economic_scenarios,
        params: SimulationParams {
            initial_capital,
            horizon_months,
            withdrawal_amount,
            random_seed: project.random_seed,
            n_iterations,
            inflation_adjustment: payload.simulation.inflation_adjustment.unwrap_or(true),
            contributions: ContributionConfig {
                enabled: contributions.enabled,
                periodic_contribution: contributions.periodic_contribution,
            },
            withdrawal_changes: ExtraWithdrawalConfig {
                enabled: changes.enabled,
                amount: extra_amount,
                trigger_months: changes.thirteenth_payment_months,
            },
        },
    };

    study.validate().map_err(|e| e.to_string())?;
    Ok(study)
}

fn validate_portfolio(key: &str, portfolio: &PortfolioConfig) -> Result<(), String> {
    if portfolio.allocation.is_empty() {
        return Err(format!("portfolios.{key}.allocation must not be empty"));
    }
    for (asset, weight) in &portfolio.allocation {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(format!("portfolios.{key}.allocation.{asset} must be >= 0"));
        }
    }
    let total: f64 = portfolio.allocation.values().sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(format!(
            "portfolios.{key}.allocation must sum to 1 (got {total})"
        ));
    }

    if let Some(threshold) = portfolio.rebalance.threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(format!(
                "portfolios.{key}.rebalance.threshold must be in (0, 1]"
            ));
        }
    }
    Ok(())
}

fn validate_scenario(key: &str, scenario: &ScenarioParams) -> Result<(), String> {
    if !scenario.inflation_rate.is_finite() || scenario.inflation_rate <= -1.0 {
        return Err(format!(
            "economic_scenarios.{key}.inflation_rate must be > -1"
        ));
    }
    if !(0.0..1.0).contains(&scenario.transaction_cost) {
        return Err(format!(
            "economic_scenarios.{key}.transaction_cost must be in [0, 1)"
        ));
    }
    Ok(())
}
