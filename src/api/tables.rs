use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::{
    PathHistory, PathMetrics, PortfolioComparisonRow, ScenarioComparisonRow, Study, StudyResults,
    SummaryStatistics,
};

const METRICS_HEADER: [&str; 8] = [
    "final_value",
    "total_withdrawals",
    "total_contributions",
    "net_flow",
    "total_rebalance_costs",
    "months_survived",
    "survived_full_period",
    "total_return",
];

const HISTORY_HEADER: [&str; 9] = [
    "simulation",
    "month",
    "portfolio_value",
    "withdrawal",
    "base_withdrawal",
    "contribution",
    "total_withdrawals",
    "total_contributions",
    "total_rebalance_costs",
];

fn csv_err(e: csv::Error) -> String {
    format!("failed to write CSV: {e}")
}

fn summary_header() -> impl Iterator<Item = &'static str> {
    SummaryStatistics::default()
        .columns()
        .into_iter()
        .map(|(name, _)| name)
}

fn summary_values(summary: &SummaryStatistics) -> impl Iterator<Item = String> {
    summary
        .columns()
        .into_iter()
        .map(|(_, value)| value.to_string())
}

/// One row per iteration. The header is written even for an empty table.
pub fn write_metrics<W: io::Write>(writer: W, metrics: &[PathMetrics]) -> Result<(), String> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(METRICS_HEADER).map_err(csv_err)?;
    for row in metrics {
        wtr.serialize(row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| format!("failed to flush CSV: {e}"))
}

/// Long format: one row per (simulation, month), with a `<asset>_value` column per asset.
pub fn write_histories<W: io::Write>(
    writer: W,
    histories: &[PathHistory],
    assets: &[String],
) -> Result<(), String> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header: Vec<String> = HISTORY_HEADER
        .iter()
        .map(|h| h.to_string())
        .chain(assets.iter().map(|a| format!("{a}_value")))
        .collect();
    wtr.write_record(&header).map_err(csv_err)?;

    for history in histories {
        for snap in &history.months {
            let mut record = vec![
                history.simulation.to_string(),
                snap.month.to_string(),
                snap.portfolio_value.to_string(),
                snap.withdrawal.to_string(),
                snap.base_withdrawal.to_string(),
                snap.contribution.to_string(),
                snap.total_withdrawals.to_string(),
                snap.total_contributions.to_string(),
                snap.total_rebalance_costs.to_string(),
            ];
            record.extend(snap.asset_values.iter().map(|v| v.to_string()));
            wtr.write_record(&record).map_err(csv_err)?;
        }
    }
    wtr.flush().map_err(|e| format!("failed to flush CSV: {e}"))
}

pub fn write_scenario_comparison<W: io::Write>(
    writer: W,
    rows: &[ScenarioComparisonRow],
) -> Result<(), String> {
    let mut wtr = csv::Writer::from_writer(writer);
    let header: Vec<&str> = ["portfolio", "scenario"]
        .into_iter()
        .chain(summary_header())
        .collect();
    wtr.write_record(&header).map_err(csv_err)?;
    for row in rows {
        let record: Vec<String> = [row.portfolio.clone(), row.scenario.clone()]
            .into_iter()
            .chain(summary_values(&row.summary))
            .collect();
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| format!("failed to flush CSV: {e}"))
}

pub fn write_portfolio_comparison<W: io::Write>(
    writer: W,
    rows: &[PortfolioComparisonRow],
) -> Result<(), String> {
    let mut wtr = csv::Writer::from_writer(writer);
    let header: Vec<&str> = std::iter::once("portfolio")
        .chain(summary_header())
        .collect();
    wtr.write_record(&header).map_err(csv_err)?;
    for row in rows {
        let record: Vec<String> = std::iter::once(row.portfolio.clone())
            .chain(summary_values(&row.summary))
            .collect();
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| format!("failed to flush CSV: {e}"))
}

fn create(path: &Path) -> Result<fs::File, String> {
    fs::File::create(path).map_err(|e| format!("failed to create {}: {e}", path.display()))
}

/// Writes every per-pair table plus the comparison tables into `dir`. Returns the files written.
pub fn write_study_tables(
    dir: &Path,
    study: &Study,
    results: &StudyResults,
) -> Result<Vec<PathBuf>, String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("failed to create output dir {}: {e}", dir.display()))?;
    let mut written = Vec::new();

    for run in &results.runs {
        let key = format!("{}_{}", run.portfolio, run.scenario);

        let path = dir.join(format!("metrics_{key}.csv"));
        write_metrics(create(&path)?, &run.metrics)?;
        written.push(path);

        if !run.histories.is_empty() {
            let assets = study
                .portfolios
                .get(&run.portfolio)
                .map(|p| p.asset_ids())
                .unwrap_or_default();
            let path = dir.join(format!("histories_{key}.csv"));
            write_histories(create(&path)?, &run.histories, &assets)?;
            written.push(path);
        }
    }

    let path = dir.join("scenario_comparison.csv");
    write_scenario_comparison(create(&path)?, &results.scenario_comparison())?;
    written.push(path);

    for scenario in study.scenarios.keys() {
        let path = dir.join(format!("portfolio_comparison_{scenario}.csv"));
        write_portfolio_comparison(create(&path)?, &results.portfolio_comparison(scenario))?;
        written.push(path);
    }

    Ok(written)
}
