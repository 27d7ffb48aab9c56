//! Errors surfaced while loading and validating a simulation config.

use thiserror::Error;

/// Everything that can go wrong between reading a config file and having a
/// runnable [`crate::config::SimulationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("miner power percentages must sum to 100, got {0}")]
    PowerDoesNotSumTo100(f64),

    #[error("selfish miner power share must be below 50, got {0}")]
    SelfishPowerTooHigh(f64),

    #[error("gamma must be one of 0, 0.5 or 1, got {0}")]
    InvalidGamma(f64),

    #[error("rounds must be greater than zero, got {0}")]
    InvalidRounds(u64),

    #[error("at least one selfish miner is required")]
    NoSelfishMiners,

    #[error("weak/strong header ratio must be at least 1, got {0}")]
    InvalidRatio(f64),

    #[error("fruit and superblock probabilities must sum to 1.0, got {0}")]
    InvalidFruitProbabilities(f64),

    #[error("superblock_prob must be greater than 0, otherwise no block is ever mined")]
    FruitchainNoBlockRounds,

    #[error("consensus '{consensus}' requires field '{field}'")]
    MissingField {
        consensus: String,
        field: &'static str,
    },

    #[error("field '{field}' is not used by consensus '{consensus}'")]
    UnexpectedField {
        consensus: String,
        field: &'static str,
    },

    #[error("unknown consensus '{0}', expected one of Nakamoto, Strongchain, Fruitchain, Subchain")]
    UnknownConsensus(String),
}
