use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    PathHistory, PortfolioComparisonRow, ScenarioComparisonRow, SimulationError, Study,
    StudyResults, SummaryStatistics, run_study,
};

mod settings;
mod tables;

pub use settings::{
    ContributionsPayload, DEFAULT_ITERATIONS, ProjectPayload, SettingsPayload, SimulationPayload,
    WithdrawalChangesPayload, WithdrawalsPayload, build_study, load_asset_statistics_csv,
    load_settings, parse_asset_statistics_csv, parse_settings,
};
pub use tables::{
    write_histories, write_metrics, write_portfolio_comparison, write_scenario_comparison,
    write_study_tables,
};

const DEFAULT_OUTPUT_DIR: &str = "results/simulations";

#[derive(Parser, Debug)]
#[command(
    name = "wealthpath",
    about = "Monte Carlo retirement portfolio simulator (rebalancing, inflation, contributions)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every portfolio under every economic scenario and write CSV tables.
    Run(RunArgs),
    /// Serve the JSON simulation API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, help = "Settings JSON document")]
    pub config: PathBuf,
    #[arg(
        long,
        help = "CSV with asset,mean_return_annual,std_dev_annual; overrides inline asset_statistics"
    )]
    pub asset_stats: Option<PathBuf>,
    #[arg(long, help = "Defaults to project.output_dir, then results/simulations")]
    pub output_dir: Option<PathBuf>,
    #[arg(long, help = "Overrides simulation.montecarlo_iterations")]
    pub iterations: Option<u32>,
    #[arg(long, help = "Overrides project.random_seed")]
    pub seed: Option<u64>,
    #[arg(long, help = "Skip writing sampled trajectory histories")]
    pub no_histories: bool,
}

pub async fn run_cli(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Run(args) => tokio::task::spawn_blocking(move || run_batch(args))
            .await
            .map_err(|e| format!("simulation task failed: {e}"))?,
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("server error: {e}")),
    }
}

fn run_batch(args: RunArgs) -> Result<(), String> {
    let mut payload = load_settings(&args.config)?;
    if let Some(iterations) = args.iterations {
        payload.simulation.montecarlo_iterations = Some(iterations);
    }
    if let Some(seed) = args.seed {
        payload.project.random_seed = Some(seed);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| payload.project.output_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let asset_stats = args
        .asset_stats
        .as_deref()
        .map(load_asset_statistics_csv)
        .transpose()?;

    let study = build_study(payload, asset_stats).inspect_err(|e| {
        warn!(config = %args.config.display(), error = %e, "rejected settings");
    })?;

    info!(
        portfolios = study.portfolios.len(),
        scenarios = study.scenarios.len(),
        iterations = study.params.n_iterations,
        horizon_months = study.params.horizon_months,
        "starting study"
    );

    let results = run_study(&study, !args.no_histories).map_err(|e| e.to_string())?;
    let written = write_study_tables(&output_dir, &study, &results)?;

    info!(
        files = written.len(),
        output_dir = %output_dir.display(),
        "results written"
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SimulateRequest {
    #[serde(flatten)]
    settings: SettingsPayload,
    #[serde(default)]
    include_histories: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    portfolio: String,
    scenario: String,
    /// Column order of `asset_values` in each history snapshot.
    assets: Vec<String>,
    summary: SummaryStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    histories: Option<Vec<PathHistory>>,
}

#[derive(Debug, Serialize)]
struct SimulateResponse {
    iterations: u32,
    horizon_months: u32,
    runs: Vec<RunResponse>,
    scenario_comparison: Vec<ScenarioComparisonRow>,
    portfolio_comparisons: BTreeMap<String, Vec<PortfolioComparisonRow>>,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "wealthpath HTTP API listening");

    axum::serve(listener, router()).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(Json(request): Json<SimulateRequest>) -> Response {
    let include_histories = request.include_histories;
    let study = match build_study(request.settings, None) {
        Ok(study) => study,
        Err(msg) => {
            warn!(error = %msg, "rejected simulation request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let results = run_study(&study, include_histories)?;
        Ok::<_, SimulationError>(build_simulate_response(&study, results))
    })
    .await;

    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("simulation task failed: {e}"),
        ),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

/// Histories are only attached when the study collected them.
fn build_simulate_response(study: &Study, results: StudyResults) -> SimulateResponse {
    let scenario_comparison = results.scenario_comparison();
    let portfolio_comparisons = study
        .scenarios
        .keys()
        .map(|s| (s.clone(), results.portfolio_comparison(s)))
        .collect();

    let runs = results
        .runs
        .into_iter()
        .map(|run| RunResponse {
            assets: study
                .portfolios
                .get(&run.portfolio)
                .map(|p| p.asset_ids())
                .unwrap_or_default(),
            histories: (!run.histories.is_empty()).then_some(run.histories),
            portfolio: run.portfolio,
            scenario: run.scenario,
            summary: run.summary,
        })
        .collect();

    SimulateResponse {
        iterations: study.params.n_iterations,
        horizon_months: study.params.horizon_months,
        runs,
        scenario_comparison,
        portfolio_comparisons,
    }
}
