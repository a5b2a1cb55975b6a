use chrono::{Days, NaiveDate};

use super::rebalance::{RebalanceStrategy, current_weights};
use super::sampler::MonthlyReturns;
use super::types::{MonthSnapshot, PathMetrics, ScenarioParams, SimulationParams};

const DAYS_PER_STEP: u64 = 30;

// Relative slack for proration drift when a withdrawal exactly drains the portfolio.
const WITHDRAWAL_REL_TOLERANCE: f64 = 1e-9;

pub(crate) fn simulation_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy, Default)]
struct FlowTotals {
    withdrawals: f64,
    contributions: f64,
    rebalance_costs: f64,
}

/// Advances one trajectory month by month until `params.horizon_months` is exhausted or the
/// portfolio cannot fund a withdrawal. `returns` must cover the horizon.
///
/// Per month: inflation, returns, contribution, withdrawal (or ruin), rebalance, date step,
/// snapshot. The order matters because contribution and withdrawal each prorate against a
/// different base.
pub fn simulate_path(
    params: &SimulationParams,
    scenario: &ScenarioParams,
    target_weights: &[f64],
    strategy: &mut RebalanceStrategy,
    returns: &MonthlyReturns,
    mut history: Option<&mut Vec<MonthSnapshot>>,
) -> PathMetrics {
    let horizon = params.horizon_months as usize;
    debug_assert!(returns.months() >= horizon, "returns shorter than the horizon");
    let n_months = horizon.min(returns.months());
    let monthly_inflation = (1.0 + scenario.inflation_rate).powf(1.0 / 12.0);

    let mut values: Vec<f64> = target_weights
        .iter()
        .map(|w| params.initial_capital * w)
        .collect();
    let mut portfolio_value: f64 = values.iter().sum();
    let mut base_withdrawal = params.withdrawal_amount;
    let mut totals = FlowTotals::default();
    let mut months_survived = n_months;
    let mut current_date = simulation_epoch();

    for month in 0..n_months {
        if params.inflation_adjustment && month > 0 {
            base_withdrawal *= monthly_inflation;
        }

        for (value, log_return) in values.iter_mut().zip(returns.month(month)) {
            *value *= log_return.exp();
        }
        portfolio_value = values.iter().sum();

        let contribution = if params.contributions.enabled {
            params.contributions.periodic_contribution
        } else {
            0.0
        };
        if contribution != 0.0 {
            let previous_total = portfolio_value;
            portfolio_value += contribution;
            totals.contributions += contribution;
            apply_contribution(&mut values, target_weights, previous_total, portfolio_value);
        }

        let mut withdrawal = base_withdrawal;
        if params.withdrawal_changes.applies_to(month) {
            withdrawal += params.withdrawal_changes.amount
                * extra_withdrawal_factor(params.inflation_adjustment, scenario.inflation_rate, month);
        }

        if cannot_fund(portfolio_value, withdrawal) {
            months_survived = month;
            portfolio_value = 0.0;
            values.fill(0.0);
            break;
        }
        apply_withdrawal(&mut values, portfolio_value, withdrawal);
        portfolio_value = (portfolio_value - withdrawal).max(0.0);
        totals.withdrawals += withdrawal;

        let weights = current_weights(&values, portfolio_value);
        if strategy.should_rebalance(&weights, current_date, portfolio_value) {
            let (rebalanced, cost) = strategy.rebalance(&values, portfolio_value);
            values = rebalanced;
            portfolio_value -= cost;
            totals.rebalance_costs += cost;
        }

        current_date = current_date
            .checked_add_days(Days::new(DAYS_PER_STEP))
            .unwrap_or(current_date);

        if let Some(rows) = history.as_deref_mut() {
            rows.push(MonthSnapshot {
                month: month as u32 + 1,
                portfolio_value,
                withdrawal,
                base_withdrawal,
                contribution,
                total_withdrawals: totals.withdrawals,
                total_contributions: totals.contributions,
                total_rebalance_costs: totals.rebalance_costs,
                asset_values: values.clone(),
            });
        }
    }

    build_metrics(params.initial_capital, portfolio_value, totals, months_survived, horizon)
}

/// Inflation scaling of an extra payment: `(1 + r)^((m + 1) / 12)` from the second month on.
fn extra_withdrawal_factor(inflation_adjustment: bool, inflation_rate: f64, month: usize) -> f64 {
    if inflation_adjustment && month > 0 {
        (1.0 + inflation_rate).powf((month + 1) as f64 / 12.0)
    } else {
        1.0
    }
}

fn cannot_fund(portfolio_value: f64, withdrawal: f64) -> bool {
    portfolio_value < 0.0 || portfolio_value < withdrawal * (1.0 - WITHDRAWAL_REL_TOLERANCE)
}

/// Spreads a signed contribution so each asset keeps its pre-contribution share.
fn apply_contribution(values: &mut [f64], target_weights: &[f64], previous_total: f64, new_total: f64) {
    if new_total <= 0.0 {
        values.fill(0.0);
        return;
    }
    if previous_total > 0.0 {
        for value in values.iter_mut() {
            *value = *value / previous_total * new_total;
        }
    } else {
        for (value, weight) in values.iter_mut().zip(target_weights) {
            *value = new_total * weight;
        }
    }
}

/// Takes `withdrawal` from every asset in proportion to its share of `pre_withdrawal_total`.
fn apply_withdrawal(values: &mut [f64], pre_withdrawal_total: f64, withdrawal: f64) {
    if pre_withdrawal_total <= 0.0 {
        values.fill(0.0);
        return;
    }
    for value in values.iter_mut() {
        *value = (*value - withdrawal * *value / pre_withdrawal_total).max(0.0);
    }
}

fn build_metrics(
    initial_capital: f64,
    final_value: f64,
    totals: FlowTotals,
    months_survived: usize,
    horizon: usize,
) -> PathMetrics {
    let total_return = if initial_capital > 0.0 {
        (final_value - initial_capital) / initial_capital
    } else {
        0.0
    };

    PathMetrics {
        final_value,
        total_withdrawals: totals.withdrawals,
        total_contributions: totals.contributions,
        net_flow: totals.contributions - totals.withdrawals,
        total_rebalance_costs: totals.rebalance_costs,
        months_survived: months_survived as u32,
        survived_full_period: months_survived == horizon,
        total_return,
    }
}
