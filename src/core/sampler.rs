use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::error::SimulationError;
use super::types::{AssetStatistics, AssetStats, CASH_ASSET, PortfolioConfig};

const MONTHS_PER_YEAR: f64 = 12.0;

/// Log-returns for one trajectory, `months x assets`, assets in allocation order.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReturns {
    assets: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl MonthlyReturns {
    pub fn from_rows(assets: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { assets, rows }
    }

    pub fn zeros(assets: Vec<String>, months: usize) -> Self {
        let width = assets.len();
        Self {
            assets,
            rows: vec![vec![0.0; width]; months],
        }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn months(&self) -> usize {
        self.rows.len()
    }

    pub fn month(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }
}

/// Independent monthly normal log-returns per asset. No cross-asset correlation.
#[derive(Debug, Clone)]
pub struct ReturnSampler {
    assets: Vec<String>,
    distributions: Vec<Normal<f64>>,
}

impl ReturnSampler {
    pub fn new(
        stats: &AssetStatistics,
        assets: &[String],
        portfolio_name: &str,
    ) -> Result<Self, SimulationError> {
        let mut distributions = Vec::with_capacity(assets.len());
        for asset in assets {
            let annual = if asset == CASH_ASSET {
                AssetStats::cash()
            } else {
                *stats
                    .get(asset)
                    .ok_or_else(|| SimulationError::MissingAssetStatistics {
                        portfolio: portfolio_name.to_string(),
                        asset: asset.clone(),
                    })?
            };
            distributions.push(monthly_distribution(asset, annual)?);
        }

        Ok(Self {
            assets: assets.to_vec(),
            distributions,
        })
    }

    pub fn for_portfolio(
        stats: &AssetStatistics,
        portfolio: &PortfolioConfig,
    ) -> Result<Self, SimulationError> {
        Self::new(stats, &portfolio.asset_ids(), &portfolio.name)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn sample_month<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.distributions.iter().map(|d| d.sample(rng)).collect()
    }

    pub fn sample_path<R: Rng + ?Sized>(&self, rng: &mut R, months: usize) -> MonthlyReturns {
        let rows = (0..months).map(|_| self.sample_month(rng)).collect();
        MonthlyReturns::from_rows(self.assets.clone(), rows)
    }
}

fn monthly_distribution(asset: &str, annual: AssetStats) -> Result<Normal<f64>, SimulationError> {
    let mean = annual.mean_return_annual / MONTHS_PER_YEAR;
    let std_dev = annual.std_dev_annual / MONTHS_PER_YEAR.sqrt();
    if !mean.is_finite() {
        return Err(SimulationError::InvalidParameter(format!(
            "mean return for '{asset}' must be finite"
        )));
    }
    let invalid_std = || {
        SimulationError::InvalidParameter(format!(
            "std deviation for '{asset}' must be finite and >= 0, got {}",
            annual.std_dev_annual
        ))
    };
    // Normal::new accepts a negative std dev.
    if !(std_dev >= 0.0 && std_dev.is_finite()) {
        return Err(invalid_std());
    }
    Normal::new(mean, std_dev).map_err(|_| invalid_std())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CASH_MEAN_RETURN_ANNUAL;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn stats() -> AssetStatistics {
        let mut stats = AssetStatistics::new();
        stats.insert(
            "bonds".to_string(),
            AssetStats {
                mean_return_annual: 0.05,
                std_dev_annual: 0.08,
            },
        );
        stats.insert(
            "stocks".to_string(),
            AssetStats {
                mean_return_annual: 0.10,
                std_dev_annual: 0.15,
            },
        );
        stats
    }

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sample_path_has_one_row_per_month_and_one_column_per_asset() {
        let sampler = ReturnSampler::new(&stats(), &names(&["bonds", "stocks"]), "p").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let returns = sampler.sample_path(&mut rng, 12);
        assert_eq!(returns.months(), 12);
        assert_eq!(returns.assets(), &names(&["bonds", "stocks"])[..]);
        for m in 0..12 {
            assert_eq!(returns.month(m).len(), 2);
        }
    }

    #[test]
    fn identical_seeds_give_bit_identical_paths() {
        let sampler = ReturnSampler::new(&stats(), &names(&["bonds", "stocks"]), "p").unwrap();
        let a = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(7), 24);
        let b = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(7), 24);
        let c = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(8), 24);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zero_volatility_returns_the_monthly_mean() {
        let mut stats = stats();
        stats.insert(
            "flat".to_string(),
            AssetStats {
                mean_return_annual: 0.06,
                std_dev_annual: 0.0,
            },
        );
        let sampler = ReturnSampler::new(&stats, &names(&["flat"]), "p").unwrap();
        let returns = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(1), 6);
        for m in 0..6 {
            assert!((returns.month(m)[0] - 0.005).abs() < 1e-15);
        }
    }

    #[test]
    fn cash_ignores_supplied_statistics() {
        let mut stats = stats();
        stats.insert(
            CASH_ASSET.to_string(),
            AssetStats {
                mean_return_annual: 0.5,
                std_dev_annual: 0.9,
            },
        );
        let sampler = ReturnSampler::new(&stats, &names(&["cash"]), "p").unwrap();
        let returns = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(3), 600);
        let mean: f64 = (0..600).map(|m| returns.month(m)[0]).sum::<f64>() / 600.0;
        assert!((mean - CASH_MEAN_RETURN_ANNUAL / 12.0).abs() < 1e-4);
    }

    #[test]
    fn cash_needs_no_statistics() {
        let sampler = ReturnSampler::new(&AssetStatistics::new(), &names(&["cash"]), "p");
        assert!(sampler.is_ok());
    }

    #[test]
    fn missing_asset_is_rejected() {
        let err = ReturnSampler::new(&stats(), &names(&["gold"]), "defensive").unwrap_err();
        assert_eq!(
            err,
            SimulationError::MissingAssetStatistics {
                portfolio: "defensive".to_string(),
                asset: "gold".to_string(),
            }
        );
    }

    #[test]
    fn negative_volatility_is_rejected() {
        let mut stats = stats();
        stats.insert(
            "weird".to_string(),
            AssetStats {
                mean_return_annual: 0.05,
                std_dev_annual: -0.1,
            },
        );
        let err = ReturnSampler::new(&stats, &names(&["weird"]), "p").unwrap_err();
        assert!(matches!(err, SimulationError::InvalidParameter(_)));
    }

    #[test]
    fn nan_volatility_is_rejected() {
        let mut stats = stats();
        stats.insert(
            "broken".to_string(),
            AssetStats {
                mean_return_annual: 0.05,
                std_dev_annual: f64::NAN,
            },
        );
        let err = ReturnSampler::new(&stats, &names(&["broken"]), "p").unwrap_err();
        assert!(matches!(err, SimulationError::InvalidParameter(_)));
    }

    #[test]
    fn sample_means_track_annual_statistics() {
        let sampler = ReturnSampler::new(&stats(), &names(&["stocks"]), "p").unwrap();
        let returns = sampler.sample_path(&mut ChaCha8Rng::seed_from_u64(11), 20_000);
        let draws: Vec<f64> = (0..returns.months()).map(|m| returns.month(m)[0]).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (draws.len() - 1) as f64;
        assert!((mean - 0.10 / 12.0).abs() < 0.002);
        assert!((var.sqrt() - 0.15 / 12f64.sqrt()).abs() < 0.002);
    }
}
