use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("unknown rebalance type '{0}' (expected 'time' or 'threshold')")]
    UnknownRebalanceType(String),

    #[error("unknown rebalance frequency '{0}' (expected 'monthly', 'quarterly' or 'annual')")]
    UnknownRebalanceFrequency(String),

    #[error("portfolio '{portfolio}' allocates to '{asset}' but no statistics were supplied for it")]
    MissingAssetStatistics { portfolio: String, asset: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
