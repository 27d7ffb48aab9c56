//! Simulation configuration: raw deserialized shape, validation, and the
//! validated [`SimulationConfig`] consumed by the per-consensus managers.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// γ, restricted to the three values the model recognizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    Zero,
    Half,
    One,
}

impl Gamma {
    fn from_f64(value: f64) -> Result<Self, ConfigError> {
        if value == 0.0 {
            Ok(Gamma::Zero)
        } else if value == 0.5 {
            Ok(Gamma::Half)
        } else if value == 1.0 {
            Ok(Gamma::One)
        } else {
            Err(ConfigError::InvalidGamma(value))
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Gamma::Zero => 0.0,
            Gamma::Half => 0.5,
            Gamma::One => 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMiner {
    mining_power: f64,
}

#[derive(Debug, Deserialize)]
struct RawMiners {
    honest: RawMiner,
    selfish: Vec<RawMiner>,
}

/// The raw, untyped shape of one simulation entry, before per-consensus
/// validation. Unknown top-level keys are a hard `serde_yaml` parse error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSimConfig {
    consensus_name: String,
    miners: RawMiners,
    gamma: f64,
    simulation_mining_rounds: u64,
    #[serde(default)]
    weak_to_strong_header_ratio: Option<f64>,
    #[serde(default)]
    weak_to_strong_block_ratio: Option<f64>,
    #[serde(default)]
    fruit_mine_prob: Option<f64>,
    #[serde(default)]
    superblock_prob: Option<f64>,
}

/// Top-level document: a list of one-entry maps, label -> config.
pub type RawDocument = Vec<HashMap<String, RawSimConfig>>;

/// Fields shared by every consensus family, already validated.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    pub label: String,
    pub honest_power: f64,
    pub selfish_powers: Vec<f64>,
    pub gamma: Gamma,
    pub rounds: u64,
}

/// A validated, per-consensus simulation configuration.
#[derive(Debug, Clone)]
pub enum SimulationConfig {
    Nakamoto(CommonConfig),
    Strongchain {
        common: CommonConfig,
        weak_to_strong_header_ratio: f64,
    },
    Fruitchain {
        common: CommonConfig,
        fruit_mine_prob: f64,
        superblock_prob: f64,
    },
    Subchain {
        common: CommonConfig,
        weak_to_strong_block_ratio: f64,
    },
}

impl SimulationConfig {
    pub fn common(&self) -> &CommonConfig {
        match self {
            SimulationConfig::Nakamoto(c) => c,
            SimulationConfig::Strongchain { common, .. } => common,
            SimulationConfig::Fruitchain { common, .. } => common,
            SimulationConfig::Subchain { common, .. } => common,
        }
    }
}

/// Loads and validates every entry in a YAML config file.
pub fn load_file(path: &Path) -> Result<Vec<SimulationConfig>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_document(&text)
}

/// Parses and validates every entry in a YAML document string.
pub fn parse_document(text: &str) -> Result<Vec<SimulationConfig>, ConfigError> {
    let raw: RawDocument = serde_yaml::from_str(text)?;
    raw.into_iter()
        .flat_map(|entry| entry.into_iter())
        .map(|(label, raw)| validate(label, raw))
        .collect()
}

fn validate(label: String, raw: RawSimConfig) -> Result<SimulationConfig, ConfigError> {
    let consensus = raw.consensus_name.clone();
    let power_sum = raw.miners.honest.mining_power
        + raw.miners.selfish.iter().map(|m| m.mining_power).sum::<f64>();
    if (power_sum - 100.0).abs() > f64::EPSILON {
        return Err(ConfigError::PowerDoesNotSumTo100(power_sum));
    }
    for miner in &raw.miners.selfish {
        if miner.mining_power >= 50.0 {
            return Err(ConfigError::SelfishPowerTooHigh(miner.mining_power));
        }
    }
    if raw.miners.selfish.is_empty() {
        return Err(ConfigError::NoSelfishMiners);
    }
    if raw.simulation_mining_rounds == 0 {
        return Err(ConfigError::InvalidRounds(0));
    }

    let common = CommonConfig {
        label,
        honest_power: raw.miners.honest.mining_power,
        selfish_powers: raw.miners.selfish.iter().map(|m| m.mining_power).collect(),
        gamma: Gamma::from_f64(raw.gamma)?,
        rounds: raw.simulation_mining_rounds,
    };

    match consensus.as_str() {
        "Nakamoto" => {
            reject_unexpected(&consensus, &raw)?;
            Ok(SimulationConfig::Nakamoto(common))
        }
        "Strongchain" => {
            let ratio = require_field(&consensus, "weak_to_strong_header_ratio", raw.weak_to_strong_header_ratio)?;
            if ratio < 1.0 {
                return Err(ConfigError::InvalidRatio(ratio));
            }
            Ok(SimulationConfig::Strongchain {
                common,
                weak_to_strong_header_ratio: ratio,
            })
        }
        "Subchain" => {
            let ratio = require_field(&consensus, "weak_to_strong_block_ratio", raw.weak_to_strong_block_ratio)?;
            if ratio < 1.0 {
                return Err(ConfigError::InvalidRatio(ratio));
            }
            Ok(SimulationConfig::Subchain {
                common,
                weak_to_strong_block_ratio: ratio,
            })
        }
        "Fruitchain" => {
            let fruit_mine_prob = require_field(&consensus, "fruit_mine_prob", raw.fruit_mine_prob)?;
            let superblock_prob = require_field(&consensus, "superblock_prob", raw.superblock_prob)?;
            let sum = fruit_mine_prob + superblock_prob;
            if (sum - 1.0).abs() > f64::EPSILON {
                return Err(ConfigError::InvalidFruitProbabilities(sum));
            }
            if superblock_prob <= 0.0 {
                return Err(ConfigError::FruitchainNoBlockRounds);
            }
            Ok(SimulationConfig::Fruitchain {
                common,
                fruit_mine_prob,
                superblock_prob,
            })
        }
        other => Err(ConfigError::UnknownConsensus(other.to_string())),
    }
}

fn require_field(
    consensus: &str,
    field: &'static str,
    value: Option<f64>,
) -> Result<f64, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingField {
        consensus: consensus.to_string(),
        field,
    })
}

fn reject_unexpected(consensus: &str, raw: &RawSimConfig) -> Result<(), ConfigError> {
    if raw.weak_to_strong_header_ratio.is_some() {
        return Err(ConfigError::UnexpectedField {
            consensus: consensus.to_string(),
            field: "weak_to_strong_header_ratio",
        });
    }
    if raw.weak_to_strong_block_ratio.is_some() {
        return Err(ConfigError::UnexpectedField {
            consensus: consensus.to_string(),
            field: "weak_to_strong_block_ratio",
        });
    }
    if raw.fruit_mine_prob.is_some() {
        return Err(ConfigError::UnexpectedField {
            consensus: consensus.to_string(),
            field: "fruit_mine_prob",
        });
    }
    if raw.superblock_prob.is_some() {
        return Err(ConfigError::UnexpectedField {
            consensus: consensus.to_string(),
            field: "superblock_prob",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAKAMOTO_YAML: &str = r#"
- minimum:
    consensus_name: Nakamoto
    miners:
      honest: { mining_power: 60 }
      selfish: [{ mining_power: 40 }]
    gamma: 0
    simulation_mining_rounds: 1
"#;

    #[test]
    fn parses_a_valid_nakamoto_entry() {
        let configs = parse_document(NAKAMOTO_YAML).unwrap();
        assert_eq!(configs.len(), 1);
        let common = configs[0].common();
        assert_eq!(common.label, "minimum");
        assert_eq!(common.honest_power, 60.0);
        assert_eq!(common.selfish_powers, vec![40.0]);
    }

    #[test]
    fn rejects_power_not_summing_to_100() {
        let yaml = NAKAMOTO_YAML.replace("mining_power: 40", "mining_power: 30");
        let err = parse_document(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::PowerDoesNotSumTo100(_)));
    }

    #[test]
    fn rejects_selfish_power_at_or_above_50() {
        let yaml = r#"
- x:
    consensus_name: Nakamoto
    miners:
      honest: { mining_power: 50 }
      selfish: [{ mining_power: 50 }]
    gamma: 0
    simulation_mining_rounds: 1
"#;
        let err = parse_document(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::SelfishPowerTooHigh(_)));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let yaml = NAKAMOTO_YAML.replace(
            "simulation_mining_rounds: 1",
            "simulation_mining_rounds: 1\n    bogus_key: 1",
        );
        assert!(parse_document(&yaml).is_err());
    }

    #[test]
    fn strongchain_requires_ratio_field() {
        let yaml = NAKAMOTO_YAML.replace("Nakamoto", "Strongchain");
        let err = parse_document(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn rejects_unexpected_field_reports_the_field_actually_present() {
        let yaml = NAKAMOTO_YAML.replace(
            "simulation_mining_rounds: 1",
            "simulation_mining_rounds: 1\n    superblock_prob: 0.3",
        );
        let err = parse_document(&yaml).unwrap_err();
        match err {
            ConfigError::UnexpectedField { field, .. } => assert_eq!(field, "superblock_prob"),
            other => panic!("expected UnexpectedField, got {other:?}"),
        }
    }

    #[test]
    fn fruitchain_requires_probabilities_to_sum_to_one() {
        let yaml = r#"
- x:
    consensus_name: Fruitchain
    miners:
      honest: { mining_power: 60 }
      selfish: [{ mining_power: 40 }]
    gamma: 0.5
    simulation_mining_rounds: 500
    fruit_mine_prob: 0.9
    superblock_prob: 0.2
"#;
        let err = parse_document(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFruitProbabilities(_)));
    }
}
