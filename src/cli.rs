//! Command-line surface: `selfish-mining-sim <consensus> [variant] --config
//! <path> --out <path> [--seed <u64>] [-v]`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Discrete-event selfish-mining simulator for Nakamoto, Strongchain,
/// Fruitchain and Subchain consensus.
#[derive(Parser, Debug)]
#[command(name = "selfish-mining-sim", version, about)]
pub struct Cli {
    /// Consensus family to simulate.
    pub consensus: Consensus,

    /// Subchain evaluation variant. Required for `subchain`, rejected for
    /// every other consensus.
    pub variant: Option<SubchainVariant>,

    /// Path to the YAML simulation configuration.
    #[arg(long)]
    pub config: PathBuf,

    /// Path to write the attribution CSV to.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Seed for the run's single random generator. Drawn from the OS RNG
    /// once at startup if omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consensus {
    Nakamoto,
    Strongchain,
    Fruitchain,
    Subchain,
}

impl std::fmt::Display for Consensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Consensus::Nakamoto => "Nakamoto",
            Consensus::Strongchain => "Strongchain",
            Consensus::Fruitchain => "Fruitchain",
            Consensus::Subchain => "Subchain",
        };
        write!(f, "{name}")
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubchainVariant {
    Weak,
    Strong,
}

impl Cli {
    /// Enforces the `subchain`-only variant positional; `clap` can't express
    /// this cross-argument rule declaratively.
    pub fn validate(&self) -> Result<(), String> {
        match (self.consensus, self.variant) {
            (Consensus::Subchain, None) => {
                Err("subchain requires a variant: weak or strong".to_string())
            }
            (Consensus::Subchain, Some(_)) => Ok(()),
            (other, Some(_)) => Err(format!("{other} does not take a variant argument")),
            (_, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(consensus: Consensus, variant: Option<SubchainVariant>) -> Cli {
        Cli { consensus, variant, config: PathBuf::from("c.yaml"), out: None, seed: None, verbose: false }
    }

    #[test]
    fn subchain_without_variant_is_rejected() {
        assert!(cli(Consensus::Subchain, None).validate().is_err());
    }

    #[test]
    fn subchain_with_variant_is_accepted() {
        assert!(cli(Consensus::Subchain, Some(SubchainVariant::Weak)).validate().is_ok());
    }

    #[test]
    fn non_subchain_with_variant_is_rejected() {
        assert!(cli(Consensus::Nakamoto, Some(SubchainVariant::Weak)).validate().is_err());
    }

    #[test]
    fn non_subchain_without_variant_is_accepted() {
        assert!(cli(Consensus::Nakamoto, None).validate().is_ok());
    }
}
