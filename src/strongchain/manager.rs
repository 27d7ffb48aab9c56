//! Per-round orchestrator for Strongchain: a Bernoulli split between
//! weak-header and strong-block rounds, chain-weight-based override
//! resolution, and the weak-header epoch bookkeeping.

use std::collections::HashMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::{ActionStore, SelfishAction};
use crate::chain::Chain;
use crate::common::{bernoulli, elect_leader};
use crate::config::Gamma;
use crate::ids::{IdGen, MinerId};

use super::block::StrongBlock;
use super::honest::HonestMiner;
use super::selfish::{MineEffect, SelfishMiner, OVERRIDE_RULE};

pub struct StrongchainConfig {
    pub label: String,
    pub honest_power: f64,
    pub selfish_powers: Vec<f64>,
    pub gamma: Gamma,
    pub rounds: u64,
    pub ratio: f64,
}

pub struct Manager {
    pub public_chain: Chain<StrongBlock>,
    pub honest: HonestMiner,
    pub selfish: HashMap<MinerId, SelfishMiner>,
    pub action_store: ActionStore,
    pub ongoing_fork: bool,
    pub wins: HashMap<MinerId, u64>,
    pub weak_header_events: u64,
    pub strong_block_events: u64,
    gamma: Gamma,
    rounds: u64,
    ratio: f64,
    rng: StdRng,
}

impl Manager {
    pub fn new(config: &StrongchainConfig, seed: u64) -> Self {
        let mut id_gen = IdGen::new();
        let honest_id = id_gen.next_id();
        let honest = HonestMiner::new(honest_id, config.honest_power);

        let mut selfish = HashMap::new();
        for &power in &config.selfish_powers {
            let id = id_gen.next_id();
            selfish.insert(id, SelfishMiner::new(id, power));
        }

        let mut wins = HashMap::new();
        wins.insert(honest.id, 0);
        for id in selfish.keys() {
            wins.insert(*id, 0);
        }

        Manager {
            public_chain: Chain::new("public blockchain"),
            honest,
            selfish,
            action_store: ActionStore::new(),
            ongoing_fork: false,
            wins,
            weak_header_events: 0,
            strong_block_events: 0,
            gamma: config.gamma,
            rounds: config.rounds,
            ratio: config.ratio,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn weighted_miners(&self) -> Vec<(MinerId, f64)> {
        let mut miners = vec![(self.honest.id, self.honest.power)];
        miners.extend(self.selfish.values().map(|m| (m.id, m.power)));
        miners
    }

    pub fn run_simulation(&mut self) {
        let weak_header_probability = self.ratio / (self.ratio + 1.0);

        for round in 0..self.rounds {
            let weighted = self.weighted_miners();
            let leader = elect_leader(&weighted, &mut self.rng);
            *self.wins.entry(leader).or_insert(0) += 1;

            if bernoulli(weak_header_probability, &mut self.rng) {
                self.weak_header_events += 1;
                self.run_weak_header_round(leader, round);
            } else {
                self.strong_block_events += 1;
                self.run_strong_round(leader, round);
            }
        }
        info!(
            "strongchain run: {} weak-header events, {} strong-block events",
            self.weak_header_events, self.strong_block_events
        );
        self.resolve_dangling_wait();
    }

    fn run_weak_header_round(&mut self, leader: MinerId, round: u64) {
        if leader == self.honest.id {
            self.honest.add_weak_header(round);
            self.weak_header_override_loop();
        } else {
            self.selfish.get_mut(&leader).unwrap().add_weak_header(round);
        }
    }

    fn weak_header_override_loop(&mut self) {
        loop {
            self.action_store.clear();
            let honest_weak_count = self.honest.weak_headers.len();
            for (id, miner) in self.selfish.iter_mut() {
                let action = miner.decide_next_action_weak(&self.public_chain, honest_weak_count, self.ratio);
                self.action_store.add(action, *id);
            }
            if !self.action_store.actions().contains(&SelfishAction::Override) {
                break;
            }
            self.resolve_overrides();
        }
    }

    fn run_strong_round(&mut self, leader: MinerId, round: u64) {
        debug!("round {round}: strong leader {leader}");

        if leader == self.honest.id {
            self.clear_sm_weak_headers_if_no_fork();

            let match_competitors = self.action_store.objects(SelfishAction::Match);
            let (ongoing_fork, preempted) =
                self.honest
                    .mine_new_block(self.ongoing_fork, self.gamma, &match_competitors, &mut self.rng);
            self.ongoing_fork = ongoing_fork;

            if let Some(winner_id) = preempted {
                self.apply_honest_preemption(winner_id);
            }
            self.add_honest_block(round);
        } else {
            let match_competitors: Vec<(MinerId, usize)> = self
                .action_store
                .objects(SelfishAction::Match)
                .into_iter()
                .map(|id| (id, self.selfish[&id].private.size()))
                .collect();

            let leader_miner = self.selfish.get_mut(&leader).expect("leader must exist");
            let (ongoing_fork, effect) = leader_miner.mine_new_block(
                &self.public_chain,
                self.ongoing_fork,
                &match_competitors,
                self.ratio,
                &mut self.rng,
            );
            self.ongoing_fork = ongoing_fork;
            let action = leader_miner.action;

            match action {
                SelfishAction::Override => self.selfish_override(leader),
                SelfishAction::Wait => {
                    if !self.ongoing_fork {
                        return;
                    }
                }
                SelfishAction::Match => {
                    if let MineEffect::ImmediateMatch { tie_winner } = effect {
                        self.resolve_immediate_match(leader, tie_winner);
                    }
                }
                SelfishAction::Adopt => {}
                SelfishAction::Idle => unreachable!("a mining leader never idles"),
            }
        }

        self.override_resolution_loop();
    }

    fn clear_sm_weak_headers_if_no_fork(&mut self) {
        for miner in self.selfish.values_mut() {
            if miner.private.fork_block_id.is_none() {
                miner.clear_private_weak_headers();
            }
        }
    }

    fn apply_honest_preemption(&mut self, winner_id: MinerId) {
        if let Some(last) = self
            .selfish
            .get(&winner_id)
            .and_then(|m| m.private.chain.last())
            .cloned()
        {
            if let Some(tip) = self.public_chain.chain.last_mut() {
                *tip = last;
            }
        }
        if let Some(winner) = self.selfish.get_mut(&winner_id) {
            winner.clear_private_strong_chain();
        }
    }

    fn add_honest_block(&mut self, round: u64) {
        let mut block = StrongBlock::new(format!("Block {round} data"), self.honest.name.clone(), self.honest.id);
        block.weak_headers = std::mem::take(&mut self.honest.weak_headers);
        self.public_chain.add_block(block);

        for id in self.action_store.objects(SelfishAction::Match) {
            if let Some(m) = self.selfish.get_mut(&id) {
                m.clear_private_chain();
            }
            self.action_store.remove(SelfishAction::Match, id);
        }
    }

    fn selfish_override(&mut self, leader: MinerId) {
        self.ongoing_fork = false;
        info!("strongchain override by selfish miner {leader}");
        let leader_chain = self.selfish[&leader].private.clone();
        self.public_chain.override_chain(&leader_chain, OVERRIDE_RULE);
        self.selfish.get_mut(&leader).unwrap().clear_private_strong_chain();
        self.honest.clear_weak_headers();

        for id in self.action_store.objects(SelfishAction::Match) {
            if let Some(m) = self.selfish.get_mut(&id) {
                m.clear_private_chain();
            }
            self.action_store.remove(SelfishAction::Match, id);
        }
    }

    fn resolve_immediate_match(&mut self, leader: MinerId, tie_winner: Option<MinerId>) {
        if let Some(winner_id) = tie_winner {
            if let Some(last) = self.selfish[&winner_id].private.chain.last().cloned() {
                if let Some(tip) = self.public_chain.chain.last_mut() {
                    *tip = last;
                }
            }
        }
        self.ongoing_fork = false;
        let leader_chain = self.selfish[&leader].private.clone();
        self.public_chain.override_chain(&leader_chain, OVERRIDE_RULE);

        let match_objects = self.action_store.objects(SelfishAction::Match);
        for id in std::iter::once(leader).chain(match_objects) {
            if let Some(m) = self.selfish.get_mut(&id) {
                m.clear_private_chain();
            }
        }
    }

    fn override_resolution_loop(&mut self) {
        loop {
            self.action_store.clear();
            for (id, miner) in self.selfish.iter_mut() {
                let action = miner.decide_next_action(&self.public_chain, self.ratio);
                self.action_store.add(action, *id);
            }
            let all_actions = self.action_store.actions();
            if !all_actions.contains(&SelfishAction::Override) {
                if all_actions.contains(&SelfishAction::Match) {
                    self.resolve_matches();
                }
                break;
            }
            self.resolve_overrides();
        }
    }

    /// Picks the override winner among several attackers by maximum chain
    /// weight, not uniformly — Strongchain's tie-break specialization.
    fn strongest_chain_winner(&self, candidates: &[MinerId]) -> MinerId {
        candidates
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let pow_a = self.selfish[&a].private.chains_pow(self.ratio);
                let pow_b = self.selfish[&b].private.chains_pow(self.ratio);
                pow_a.partial_cmp(&pow_b).unwrap()
            })
            .expect("strongest_chain_winner requires at least one candidate")
    }

    fn resolve_overrides(&mut self) {
        let attackers = self.action_store.objects(SelfishAction::Override);
        let winner = if attackers.len() == 1 {
            attackers[0]
        } else {
            self.strongest_chain_winner(&attackers)
        };

        let winner_chain = self.selfish[&winner].private.clone();
        self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
        self.selfish.get_mut(&winner).unwrap().clear_private_strong_chain();
        self.honest.clear_weak_headers();

        for id in attackers {
            if let Some(m) = self.selfish.get_mut(&id) {
                m.clear_private_chain();
            }
        }
        self.ongoing_fork = false;
    }

    fn resolve_matches(&mut self) {
        let match_objects = self.action_store.objects(SelfishAction::Match);

        if self.ongoing_fork {
            self.ongoing_fork = false;
            let candidates_with_honest: Vec<MinerId> = match_objects.clone();
            let honest_pow = self
                .public_chain
                .chains_pow_from_index(self.selfish[&match_objects[0]].private.fork_block_id.unwrap_or(0), self.ratio);
            let strongest = candidates_with_honest
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    let pow_a = self.selfish[&a].private.chains_pow(self.ratio);
                    let pow_b = self.selfish[&b].private.chains_pow(self.ratio);
                    pow_a.partial_cmp(&pow_b).unwrap()
                });
            let best_selfish_pow = strongest.map(|id| self.selfish[&id].private.chains_pow(self.ratio)).unwrap_or(0.0);

            if best_selfish_pow > honest_pow {
                let winner_id = strongest.unwrap();
                let winner_chain = self.selfish[&winner_id].private.clone();
                self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
                self.selfish.get_mut(&winner_id).unwrap().clear_private_chain();
            }
            for id in match_objects {
                if let Some(m) = self.selfish.get_mut(&id) {
                    m.clear_private_chain();
                }
                self.action_store.remove(SelfishAction::Match, id);
            }
        } else if match_objects.len() == 1 {
            let winner = match_objects[0];
            if self.gamma == Gamma::One {
                let winner_chain = self.selfish[&winner].private.clone();
                self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
                self.selfish.get_mut(&winner).unwrap().clear_private_chain();
                self.action_store.remove(SelfishAction::Match, winner);
            } else {
                self.ongoing_fork = true;
            }
        } else {
            self.ongoing_fork = true;
        }
    }

    fn resolve_dangling_wait(&mut self) {
        let waiting = self.action_store.objects(SelfishAction::Wait);
        if waiting.is_empty() {
            return;
        }
        warn!("post-simulation dangling WAIT resolved for {waiting:?}");
        let winner = self.strongest_chain_winner(&waiting);
        let winner_chain = self.selfish[&winner].private.clone();
        self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
    }

    pub fn block_counts(&self) -> HashMap<MinerId, u64> {
        let mut counts = HashMap::new();
        counts.insert(self.honest.id, 0);
        for id in self.selfish.keys() {
            counts.insert(*id, 0);
        }
        for block in &self.public_chain.chain {
            *counts.entry(block.miner_id).or_insert(0) += 1;
        }
        counts
    }
}
