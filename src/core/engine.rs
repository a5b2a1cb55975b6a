use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use super::error::SimulationError;
use super::path::simulate_path;
use super::rebalance::RebalanceStrategy;
use super::sampler::ReturnSampler;
use super::types::{
    AssetStatistics, PathHistory, PathMetrics, PortfolioConfig, ScenarioParams, SimulationParams,
};

pub const HISTORY_SAMPLE_LIMIT: usize = 100;
const PROGRESS_INTERVAL: u32 = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    pub asset_stats: &'a AssetStatistics,
    pub portfolio: &'a PortfolioConfig,
    pub scenario: &'a ScenarioParams,
    pub params: &'a SimulationParams,
}

#[derive(Debug, Clone, Default)]
pub struct MonteCarloResult {
    /// One row per iteration, in iteration order.
    pub metrics: Vec<PathMetrics>,
    /// Sampled trajectories, ordered by iteration. Empty unless requested.
    pub histories: Vec<PathHistory>,
}

/// Runs `params.n_iterations` independent trajectories.
///
/// Iteration `i` draws from its own generator seeded with `random_seed + i` (entropy when no
/// seed is set) and gets a freshly built rebalance strategy, so iterations can run on any
/// thread and still produce the same table as a sequential run. Configuration problems
/// surface before any trajectory is simulated.
pub fn run_monte_carlo(
    request: &BatchRequest<'_>,
    collect_histories: bool,
) -> Result<MonteCarloResult, SimulationError> {
    let BatchRequest {
        asset_stats,
        portfolio,
        scenario,
        params,
    } = *request;

    validate_params(params)?;
    let sampler = ReturnSampler::for_portfolio(asset_stats, portfolio)?;
    let make_strategy = || RebalanceStrategy::from_portfolio(portfolio, scenario.transaction_cost);
    make_strategy()?;

    let n_iterations = params.n_iterations;
    if n_iterations == 0 {
        return Ok(MonteCarloResult::default());
    }

    info!(
        portfolio = %portfolio.name,
        iterations = n_iterations,
        horizon_months = params.horizon_months,
        "running monte carlo batch"
    );

    let sampled = if collect_histories {
        history_sample(params.random_seed, n_iterations as usize)
    } else {
        Vec::new()
    };
    let targets = portfolio.target_weights();
    let horizon = params.horizon_months as usize;

    let runs = (0..n_iterations)
        .into_par_iter()
        .map(|iteration| {
            let mut rng = iteration_rng(params.random_seed, iteration);
            let returns = sampler.sample_path(&mut rng, horizon);
            let mut strategy = make_strategy()?;

            let keep = sampled.binary_search(&(iteration as usize)).is_ok();
            let mut months = Vec::new();
            let metrics = simulate_path(
                params,
                scenario,
                &targets,
                &mut strategy,
                &returns,
                keep.then_some(&mut months),
            );

            if (iteration + 1) % PROGRESS_INTERVAL == 0 {
                debug!(portfolio = %portfolio.name, completed = iteration + 1, "batch progress");
            }

            let history = keep.then(|| PathHistory {
                simulation: iteration + 1,
                months,
            });
            Ok((metrics, history))
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;

    let mut result = MonteCarloResult {
        metrics: Vec::with_capacity(runs.len()),
        histories: Vec::with_capacity(sampled.len()),
    };
    for (metrics, history) in runs {
        result.metrics.push(metrics);
        result.histories.extend(history);
    }
    Ok(result)
}

fn validate_params(params: &SimulationParams) -> Result<(), SimulationError> {
    if !(params.initial_capital > 0.0) {
        return Err(SimulationError::InvalidParameter(
            "initial capital must be > 0".to_string(),
        ));
    }
    if params.horizon_months == 0 {
        return Err(SimulationError::InvalidParameter(
            "horizon must be at least one month".to_string(),
        ));
    }
    if !(params.withdrawal_amount >= 0.0) {
        return Err(SimulationError::InvalidParameter(
            "withdrawal amount must be >= 0".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn iteration_seed(base_seed: u64, iteration: u32) -> u64 {
    base_seed.wrapping_add(iteration as u64)
}

fn iteration_rng(base_seed: Option<u64>, iteration: u32) -> ChaCha8Rng {
    match base_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(iteration_seed(seed, iteration)),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Sorted iteration indices whose full histories are kept.
fn history_sample(base_seed: Option<u64>, n_iterations: usize) -> Vec<usize> {
    let amount = n_iterations.min(HISTORY_SAMPLE_LIMIT);
    let mut rng = match base_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(splitmix64(seed)),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut picked = index::sample(&mut rng, n_iterations, amount).into_vec();
    picked.sort_unstable();
    picked
}

// Decorrelates the history-sampling stream from the per-iteration streams seeded nearby.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
