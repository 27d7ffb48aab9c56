use std::collections::HashMap;
use std::fs::File;
use std::process::ExitCode;

use clap::Parser;
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;

use selfish_mining_sim::cli::{Cli, Consensus, SubchainVariant};
use selfish_mining_sim::config::{self, SimulationConfig};
use selfish_mining_sim::results::{write_block_csv, write_fruit_csv, ResultsTable};
use selfish_mining_sim::{fruitchain, nakamoto, strongchain, subchain};

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    if let Err(e) = cli.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let configs = match config::load_file(&cli.config) {
        Ok(configs) => configs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let matching: Vec<&SimulationConfig> =
        configs.iter().filter(|c| matches_consensus(c, cli.consensus)).collect();

    let entry = match matching.as_slice() {
        [entry] => entry,
        [] => {
            eprintln!("no {} entry found in {}", cli.consensus, cli.config.display());
            return ExitCode::FAILURE;
        }
        _ => {
            eprintln!(
                "{} has more than one {} entry; exactly one is required per run",
                cli.config.display(),
                cli.consensus
            );
            return ExitCode::FAILURE;
        }
    };

    let seed = cli.seed.unwrap_or_else(|| OsRng.next_u64());
    debug!("seed = {seed}");

    match run(entry, cli.variant, seed) {
        Ok((table, fruit_chain)) => {
            println!("{table}");

            if let Some(path) = &cli.out {
                let file = match File::create(path) {
                    Ok(f) => f,
                    Err(e) => {
                        eprintln!("failed to create {}: {e}", path.display());
                        return ExitCode::FAILURE;
                    }
                };

                let result = match fruit_chain {
                    Some(chain) => write_fruit_csv(file, &chain),
                    None => write_block_csv(file, &table),
                };
                if let Err(e) = result {
                    eprintln!("failed to write {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn matches_consensus(config: &SimulationConfig, consensus: Consensus) -> bool {
    matches!(
        (config, consensus),
        (SimulationConfig::Nakamoto(_), Consensus::Nakamoto)
            | (SimulationConfig::Strongchain { .. }, Consensus::Strongchain)
            | (SimulationConfig::Fruitchain { .. }, Consensus::Fruitchain)
            | (SimulationConfig::Subchain { .. }, Consensus::Subchain)
    )
}

type RunOutput = (ResultsTable, Option<selfish_mining_sim::chain::Chain<selfish_mining_sim::block::Block>>);

fn run(
    config: &SimulationConfig,
    variant: Option<SubchainVariant>,
    seed: u64,
) -> Result<RunOutput, String> {
    match config {
        SimulationConfig::Nakamoto(common) => {
            let mut manager = nakamoto::Manager::new(common, seed);
            manager.run_simulation();
            let names = miner_names(&manager.honest.id, &manager.honest.name, &manager.selfish);
            let table = ResultsTable::new(&names, &manager.wins, &manager.block_counts());
            Ok((table, None))
        }
        SimulationConfig::Strongchain { common, weak_to_strong_header_ratio } => {
            let cfg = strongchain::StrongchainConfig {
                label: common.label.clone(),
                honest_power: common.honest_power,
                selfish_powers: common.selfish_powers.clone(),
                gamma: common.gamma,
                rounds: common.rounds,
                ratio: *weak_to_strong_header_ratio,
            };
            let mut manager = strongchain::Manager::new(&cfg, seed);
            manager.run_simulation();
            let names = miner_names(&manager.honest.id, &manager.honest.name, &manager.selfish);
            let table = ResultsTable::new(&names, &manager.wins, &manager.block_counts());
            Ok((table, None))
        }
        SimulationConfig::Fruitchain { common, fruit_mine_prob, superblock_prob } => {
            let cfg = fruitchain::FruitchainConfig {
                label: common.label.clone(),
                honest_power: common.honest_power,
                selfish_powers: common.selfish_powers.clone(),
                gamma: common.gamma,
                rounds: common.rounds,
                fruit_mine_prob: *fruit_mine_prob,
                superblock_prob: *superblock_prob,
            };
            let mut manager = fruitchain::Manager::new(&cfg, seed);
            manager.run_simulation();
            let names = miner_names(&manager.honest.id, &manager.honest.name, &manager.selfish);
            let table = ResultsTable::new(&names, &manager.wins, &manager.block_counts());
            Ok((table, Some(manager.public_chain.clone())))
        }
        SimulationConfig::Subchain { common, weak_to_strong_block_ratio } => {
            let variant = match variant {
                Some(SubchainVariant::Weak) => subchain::Variant::Weak,
                Some(SubchainVariant::Strong) => subchain::Variant::Strong,
                None => return Err("subchain requires a variant: weak or strong".to_string()),
            };
            let cfg = subchain::SubchainConfig {
                variant,
                common: common.clone(),
                weak_to_strong_block_ratio: *weak_to_strong_block_ratio,
            };
            let mut manager = subchain::Manager::new(&cfg, seed);
            manager.run_simulation();
            let names = miner_names(&manager.honest.id, &manager.honest.name, &manager.selfish);
            let table = ResultsTable::new(&names, &manager.wins, &manager.block_counts());
            Ok((table, None))
        }
    }
}

fn miner_names<S>(
    honest_id: &selfish_mining_sim::ids::MinerId,
    honest_name: &str,
    selfish: &HashMap<selfish_mining_sim::ids::MinerId, S>,
) -> Vec<(selfish_mining_sim::ids::MinerId, String)>
where
    S: MinerNamed,
{
    let mut names = vec![(*honest_id, honest_name.to_string())];
    let mut selfish_names: Vec<_> = selfish.values().map(|m| (m.id(), m.name().to_string())).collect();
    selfish_names.sort_by_key(|(id, _)| *id);
    names.extend(selfish_names);
    names
}

trait MinerNamed {
    fn id(&self) -> selfish_mining_sim::ids::MinerId;
    fn name(&self) -> &str;
}

impl MinerNamed for nakamoto::SelfishMiner {
    fn id(&self) -> selfish_mining_sim::ids::MinerId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl MinerNamed for strongchain::SelfishMiner {
    fn id(&self) -> selfish_mining_sim::ids::MinerId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl MinerNamed for fruitchain::SelfishMiner {
    fn id(&self) -> selfish_mining_sim::ids::MinerId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl MinerNamed for subchain::SelfishMiner {
    fn id(&self) -> selfish_mining_sim::ids::MinerId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}
