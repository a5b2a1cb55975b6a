use chrono::NaiveDate;

use super::error::SimulationError;
use super::types::PortfolioConfig;

const DEFAULT_FREQUENCY: &str = "annual";
const DEFAULT_THRESHOLD: f64 = 0.05;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Annual,
}

impl RebalanceFrequency {
    pub fn from_tag(tag: &str) -> Result<Self, SimulationError> {
        match tag {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annual" => Ok(Self::Annual),
            other => Err(SimulationError::UnknownRebalanceFrequency(other.to_string())),
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Annual => 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceTrigger {
    /// Fires on the first check of a path, then whenever `frequency` days have elapsed
    /// since the last firing. Every check that fires moves the reference date.
    Time {
        frequency: RebalanceFrequency,
        last_rebalance: Option<NaiveDate>,
    },
    /// Fires when the largest absolute weight deviation reaches `threshold`.
    Threshold { threshold: f64 },
}

/// Rebalancing policy for a single trajectory.
///
/// Weights and values are slices indexed in the portfolio's allocation order. A time-based
/// strategy carries per-path state, so every trajectory needs its own instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceStrategy {
    target_weights: Vec<f64>,
    transaction_cost: f64,
    trigger: RebalanceTrigger,
}

impl RebalanceStrategy {
    pub fn time_based(
        target_weights: Vec<f64>,
        frequency: RebalanceFrequency,
        transaction_cost: f64,
    ) -> Self {
        Self {
            target_weights,
            transaction_cost,
            trigger: RebalanceTrigger::Time {
                frequency,
                last_rebalance: None,
            },
        }
    }

    pub fn threshold_based(target_weights: Vec<f64>, threshold: f64, transaction_cost: f64) -> Self {
        Self {
            target_weights,
            transaction_cost,
            trigger: RebalanceTrigger::Threshold { threshold },
        }
    }

    pub fn from_portfolio(
        portfolio: &PortfolioConfig,
        transaction_cost: f64,
    ) -> Result<Self, SimulationError> {
        let config = &portfolio.rebalance;
        let targets = portfolio.target_weights();
        match config.kind.as_str() {
            "time" => {
                let tag = config.frequency.as_deref().unwrap_or(DEFAULT_FREQUENCY);
                let frequency = RebalanceFrequency::from_tag(tag)?;
                Ok(Self::time_based(targets, frequency, transaction_cost))
            }
            "threshold" => {
                let threshold = config.threshold.unwrap_or(DEFAULT_THRESHOLD);
                Ok(Self::threshold_based(targets, threshold, transaction_cost))
            }
            other => Err(SimulationError::UnknownRebalanceType(other.to_string())),
        }
    }

    pub fn trigger(&self) -> &RebalanceTrigger {
        &self.trigger
    }

    pub fn target_weights(&self) -> &[f64] {
        &self.target_weights
    }

    pub fn should_rebalance(
        &mut self,
        current_weights: &[f64],
        current_date: NaiveDate,
        _portfolio_value: f64,
    ) -> bool {
        match &mut self.trigger {
            RebalanceTrigger::Time {
                frequency,
                last_rebalance,
            } => {
                let Some(last) = *last_rebalance else {
                    *last_rebalance = Some(current_date);
                    return true;
                };
                let elapsed = current_date.signed_duration_since(last).num_days();
                if elapsed >= frequency.days() {
                    *last_rebalance = Some(current_date);
                    true
                } else {
                    false
                }
            }
            RebalanceTrigger::Threshold { threshold } => {
                max_deviation(&self.target_weights, current_weights) >= *threshold
            }
        }
    }

    /// Moves every asset to its target weight of the post-cost capital.
    /// Returns the new per-asset values and the transaction cost paid.
    pub fn rebalance(&self, current_values: &[f64], portfolio_value: f64) -> (Vec<f64>, f64) {
        let weights = current_weights(current_values, portfolio_value);
        let cost = self.rebalance_cost(&weights, portfolio_value);
        let remaining = portfolio_value - cost;
        let new_values = self.target_weights.iter().map(|w| remaining * w).collect();
        (new_values, cost)
    }

    pub fn rebalance_cost(&self, current_weights: &[f64], portfolio_value: f64) -> f64 {
        portfolio_value * (turnover(&self.target_weights, current_weights) / 2.0)
            * self.transaction_cost
    }
}

pub fn current_weights(values: &[f64], portfolio_value: f64) -> Vec<f64> {
    if portfolio_value <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| v / portfolio_value).collect()
}

pub fn turnover(target_weights: &[f64], current_weights: &[f64]) -> f64 {
    target_weights
        .iter()
        .enumerate()
        .map(|(i, target)| (target - current_weights.get(i).copied().unwrap_or(0.0)).abs())
        .sum()
}

fn max_deviation(target_weights: &[f64], current_weights: &[f64]) -> f64 {
    target_weights
        .iter()
        .enumerate()
        .map(|(i, target)| (current_weights.get(i).copied().unwrap_or(0.0) - target).abs())
        .fold(0.0, f64::max)
}
