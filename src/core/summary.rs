use serde::Serialize;

use super::types::PathMetrics;

pub const FINAL_VALUE_PERCENTILES: [f64; 4] = [5.0, 25.0, 75.0, 95.0];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub iterations: usize,
    /// Percentage of trajectories that reached the horizon.
    pub survival_rate: f64,
    pub mean_final_value: f64,
    pub median_final_value: f64,
    pub std_final_value: f64,
    pub min_final_value: f64,
    pub max_final_value: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
    pub mean_months_survived: f64,
    pub mean_total_withdrawals: f64,
    pub mean_total_contributions: f64,
    pub mean_total_rebalance_costs: f64,
    pub mean_net_flow: f64,
    /// Percentage.
    pub mean_total_return: f64,
}

impl SummaryStatistics {
    pub fn from_metrics(metrics: &[PathMetrics]) -> Self {
        if metrics.is_empty() {
            return Self::default();
        }

        let survivors = metrics.iter().filter(|m| m.survived_full_period).count();
        let mut final_values: Vec<f64> = metrics.iter().map(|m| m.final_value).collect();
        let mean_final_value = mean(&final_values);
        let std_final_value = sample_std(&final_values, mean_final_value);
        let [p5, p25, p75, p95] = FINAL_VALUE_PERCENTILES.map(|p| percentile(&mut final_values, p));

        Self {
            iterations: metrics.len(),
            survival_rate: 100.0 * survivors as f64 / metrics.len() as f64,
            mean_final_value,
            median_final_value: percentile(&mut final_values, 50.0),
            std_final_value,
            min_final_value: final_values[0],
            max_final_value: final_values[final_values.len() - 1],
            percentile_5: p5,
            percentile_25: p25,
            percentile_75: p75,
            percentile_95: p95,
            mean_months_survived: mean_of(metrics, |m| m.months_survived as f64),
            mean_total_withdrawals: mean_of(metrics, |m| m.total_withdrawals),
            mean_total_contributions: mean_of(metrics, |m| m.total_contributions),
            mean_total_rebalance_costs: mean_of(metrics, |m| m.total_rebalance_costs),
            mean_net_flow: mean_of(metrics, |m| m.net_flow),
            mean_total_return: 100.0 * mean_of(metrics, |m| m.total_return),
        }
    }

    /// Column names and values in table order.
    pub fn columns(&self) -> [(&'static str, f64); 17] {
        [
            ("iterations", self.iterations as f64),
            ("survival_rate", self.survival_rate),
            ("mean_final_value", self.mean_final_value),
            ("median_final_value", self.median_final_value),
            ("std_final_value", self.std_final_value),
            ("min_final_value", self.min_final_value),
            ("max_final_value", self.max_final_value),
            ("percentile_5", self.percentile_5),
            ("percentile_25", self.percentile_25),
            ("percentile_75", self.percentile_75),
            ("percentile_95", self.percentile_95),
            ("mean_months_survived", self.mean_months_survived),
            ("mean_total_withdrawals", self.mean_total_withdrawals),
            ("mean_total_contributions", self.mean_total_contributions),
            ("mean_total_rebalance_costs", self.mean_total_rebalance_costs),
            ("mean_net_flow", self.mean_net_flow),
            ("mean_total_return", self.mean_total_return),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparisonRow {
    pub portfolio: String,
    pub scenario: String,
    #[serde(flatten)]
    pub summary: SummaryStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioComparisonRow {
    pub portfolio: String,
    #[serde(flatten)]
    pub summary: SummaryStatistics,
}

/// One row per (portfolio, scenario) metrics table.
pub fn compare_scenarios<'a, I>(tables: I) -> Vec<ScenarioComparisonRow>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a [PathMetrics])>,
{
    tables
        .into_iter()
        .map(|(portfolio, scenario, metrics)| ScenarioComparisonRow {
            portfolio: portfolio.to_string(),
            scenario: scenario.to_string(),
            summary: SummaryStatistics::from_metrics(metrics),
        })
        .collect()
}

/// One row per portfolio, restricted to tables run under `scenario`.
pub fn compare_portfolios<'a, I>(tables: I, scenario: &str) -> Vec<PortfolioComparisonRow>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a [PathMetrics])>,
{
    tables
        .into_iter()
        .filter(|(_, s, _)| *s == scenario)
        .map(|(portfolio, _, metrics)| PortfolioComparisonRow {
            portfolio: portfolio.to_string(),
            summary: SummaryStatistics::from_metrics(metrics),
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_of(metrics: &[PathMetrics], f: impl Fn(&PathMetrics) -> f64) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    metrics.iter().map(f).sum::<f64>() / metrics.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Linear interpolation between closest ranks. Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn row(final_value: f64, months: u32, horizon: u32) -> PathMetrics {
        PathMetrics {
            final_value,
            total_withdrawals: 1_000.0,
            total_contributions: 250.0,
            net_flow: -750.0,
            total_rebalance_costs: 10.0,
            months_survived: months,
            survived_full_period: months == horizon,
            total_return: (final_value - 100.0) / 100.0,
        }
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        assert_approx(percentile(&mut values, 25.0), 1.75);
        assert_approx(percentile(&mut values, 50.0), 2.5);
        assert_approx(percentile(&mut values, 95.0), 3.85);
    }

    #[test]
    fn summary_matches_hand_calculation() {
        let metrics = vec![
            row(100.0, 12, 12),
            row(200.0, 12, 12),
            row(0.0, 7, 12),
            row(300.0, 12, 12),
        ];
        let s = SummaryStatistics::from_metrics(&metrics);

        assert_eq!(s.iterations, 4);
        assert_approx(s.survival_rate, 75.0);
        assert_approx(s.mean_final_value, 150.0);
        assert_approx(s.median_final_value, 150.0);
        assert_approx(s.std_final_value, (50_000.0_f64 / 3.0).sqrt());
        assert_approx(s.min_final_value, 0.0);
        assert_approx(s.max_final_value, 300.0);
        assert_approx(s.percentile_5, 15.0);
        assert_approx(s.percentile_25, 75.0);
        assert_approx(s.percentile_75, 225.0);
        assert_approx(s.percentile_95, 285.0);
        assert_approx(s.mean_months_survived, 10.75);
        assert_approx(s.mean_total_withdrawals, 1_000.0);
        assert_approx(s.mean_total_contributions, 250.0);
        assert_approx(s.mean_total_rebalance_costs, 10.0);
        assert_approx(s.mean_net_flow, -750.0);
        assert_approx(s.mean_total_return, 50.0);
    }

    #[test]
    fn empty_table_summarizes_to_zero() {
        assert_eq!(SummaryStatistics::from_metrics(&[]), SummaryStatistics::default());
    }

    #[test]
    fn single_row_has_zero_spread() {
        let s = SummaryStatistics::from_metrics(&[row(42.0, 3, 3)]);
        assert_approx(s.std_final_value, 0.0);
        assert_approx(s.percentile_5, 42.0);
        assert_approx(s.percentile_95, 42.0);
        assert_approx(s.survival_rate, 100.0);
    }

    #[test]
    fn cross_tabulation_keeps_input_order_and_filters_by_scenario() {
        let a = vec![row(100.0, 12, 12)];
        let b = vec![row(0.0, 3, 12)];
        let c = vec![row(50.0, 12, 12), row(0.0, 1, 12)];
        let tables = [
            ("aggressive", "base", a.as_slice()),
            ("aggressive", "stagflation", b.as_slice()),
            ("balanced", "base", c.as_slice()),
        ];

        let scenarios = compare_scenarios(tables);
        assert_eq!(scenarios.len(), 3);
        assert_eq!(scenarios[1].portfolio, "aggressive");
        assert_eq!(scenarios[1].scenario, "stagflation");
        assert_approx(scenarios[1].summary.survival_rate, 0.0);

        let portfolios = compare_portfolios(tables, "base");
        assert_eq!(portfolios.len(), 2);
        assert_eq!(portfolios[0].portfolio, "aggressive");
        assert_eq!(portfolios[1].portfolio, "balanced");
        assert_approx(portfolios[1].summary.survival_rate, 50.0);

        assert!(compare_portfolios(tables, "missing").is_empty());
    }

    #[test]
    fn comparison_rows_serialize_flat() {
        let rows = compare_portfolios([("balanced", "base", &[row(1.0, 1, 1)][..])], "base");
        let json = serde_json::to_value(&rows[0]).expect("row should serialize");
        assert_eq!(json["portfolio"], "balanced");
        assert_eq!(json["survival_rate"], 100.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_survival_rate_is_survivor_share(flags in proptest::collection::vec(proptest::bool::ANY, 1..200)) {
            let metrics: Vec<PathMetrics> = flags
                .iter()
                .map(|&survived| row(10.0, if survived { 12 } else { 4 }, 12))
                .collect();
            let survivors = flags.iter().filter(|f| **f).count();
            let s = SummaryStatistics::from_metrics(&metrics);
            let expected = 100.0 * survivors as f64 / flags.len() as f64;
            prop_assert!((s.survival_rate - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_percentiles_are_ordered(values in proptest::collection::vec(0u32..1_000_000, 1..100)) {
            let metrics: Vec<PathMetrics> = values.iter().map(|v| row(*v as f64, 1, 1)).collect();
            let s = SummaryStatistics::from_metrics(&metrics);
            prop_assert!(s.min_final_value <= s.percentile_5);
            prop_assert!(s.percentile_5 <= s.percentile_25);
            prop_assert!(s.percentile_25 <= s.median_final_value);
            prop_assert!(s.median_final_value <= s.percentile_75);
            prop_assert!(s.percentile_75 <= s.percentile_95);
            prop_assert!(s.percentile_95 <= s.max_final_value);
        }
    }
}
