use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Asset id that never needs supplied statistics; it always uses the fixed cash profile.
pub const CASH_ASSET: &str = "cash";
pub const CASH_MEAN_RETURN_ANNUAL: f64 = 0.02;
pub const CASH_STD_DEV_ANNUAL: f64 = 0.001;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetStats {
    pub mean_return_annual: f64,
    pub std_dev_annual: f64,
}

impl AssetStats {
    pub fn cash() -> Self {
        Self {
            mean_return_annual: CASH_MEAN_RETURN_ANNUAL,
            std_dev_annual: CASH_STD_DEV_ANNUAL,
        }
    }
}

pub type AssetStatistics = BTreeMap<String, AssetStats>;

/// Raw rebalance settings as written in configuration. The tag is resolved by
/// `RebalanceStrategy::from_portfolio`, which rejects anything it does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl RebalanceConfig {
    pub fn time(frequency: &str) -> Self {
        Self {
            kind: "time".to_string(),
            frequency: Some(frequency.to_string()),
            threshold: None,
        }
    }

    pub fn threshold(threshold: f64) -> Self {
        Self {
            kind: "threshold".to_string(),
            frequency: None,
            threshold: Some(threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub name: String,
    pub allocation: BTreeMap<String, f64>,
    pub rebalance: RebalanceConfig,
}

impl PortfolioConfig {
    /// Asset ids in allocation order. Per-asset vectors throughout the core use this order.
    pub fn asset_ids(&self) -> Vec<String> {
        self.allocation.keys().cloned().collect()
    }

    pub fn target_weights(&self) -> Vec<f64> {
        self.allocation.values().copied().collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub inflation_rate: f64,
    pub transaction_cost: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ContributionConfig {
    pub enabled: bool,
    /// Signed: negative amounts model recurring outflows such as taxes.
    pub periodic_contribution: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraWithdrawalConfig {
    pub enabled: bool,
    pub amount: f64,
    /// 1-indexed simulation months.
    pub trigger_months: Vec<u32>,
}

impl ExtraWithdrawalConfig {
    pub fn applies_to(&self, month_index: usize) -> bool {
        self.enabled
            && self
                .trigger_months
                .iter()
                .any(|&m| m as usize == month_index + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub initial_capital: f64,
    pub horizon_months: u32,
    pub withdrawal_amount: f64,
    pub random_seed: Option<u64>,
    pub n_iterations: u32,
    pub inflation_adjustment: bool,
    pub contributions: ContributionConfig,
    pub withdrawal_changes: ExtraWithdrawalConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PathMetrics {
    pub final_value: f64,
    pub total_withdrawals: f64,
    pub total_contributions: f64,
    pub net_flow: f64,
    pub total_rebalance_costs: f64,
    pub months_survived: u32,
    pub survived_full_period: bool,
    pub total_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSnapshot {
    pub month: u32,
    pub portfolio_value: f64,
    pub withdrawal: f64,
    pub base_withdrawal: f64,
    pub contribution: f64,
    pub total_withdrawals: f64,
    pub total_contributions: f64,
    pub total_rebalance_costs: f64,
    /// Indexed like `PortfolioConfig::asset_ids`.
    pub asset_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathHistory {
    /// 1-indexed iteration number within its batch.
    pub simulation: u32,
    pub months: Vec<MonthSnapshot>,
}
