//! Convenience re-export of the crate's public surface.

pub use crate::action::{ActionStore, SelfishAction};
pub use crate::block::{Block, ChainBlock};
pub use crate::chain::{Chain, OverrideRule};
pub use crate::cli::{Cli, Consensus, SubchainVariant};
pub use crate::config::{CommonConfig, Gamma, SimulationConfig};
pub use crate::error::ConfigError;
pub use crate::ids::{IdGen, MinerId};
pub use crate::results::{write_block_csv, write_fruit_csv, MinerSummary, ResultsTable};

pub use crate::fruitchain::{self, FruitchainConfig};
pub use crate::nakamoto;
pub use crate::strongchain::{self, StrongchainConfig};
pub use crate::subchain::{self, SubchainConfig, Variant as SubchainManagerVariant};
