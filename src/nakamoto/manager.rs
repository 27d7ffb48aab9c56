//! Per-round orchestrator for the Nakamoto consensus family: leader
//! election, dispatch, override/match resolution, and the post-simulation
//! dangling-WAIT cleanup.

use std::collections::HashMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::{ActionStore, SelfishAction};
use crate::block::Block;
use crate::chain::Chain;
use crate::common::{elect_leader, pick_uniform};
use crate::config::{CommonConfig, Gamma};
use crate::ids::{IdGen, MinerId};

use super::honest::HonestMiner;
use super::selfish::{MineEffect, SelfishMiner, OVERRIDE_RULE};

/// Drives one full Nakamoto simulation run.
pub struct Manager {
    pub public_chain: Chain<Block>,
    pub honest: HonestMiner,
    pub selfish: HashMap<MinerId, SelfishMiner>,
    pub action_store: ActionStore,
    pub ongoing_fork: bool,
    pub wins: HashMap<MinerId, u64>,
    pub gamma: Gamma,
    pub rounds: u64,
    rng: StdRng,
}

impl Manager {
    pub fn new(config: &CommonConfig, seed: u64) -> Self {
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
            gamma: config.gamma,
            rounds: config.rounds,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn weighted_miners(&self) -> Vec<(MinerId, f64)> {
        let mut miners = vec![(self.honest.id, self.honest.power)];
        miners.extend(self.selfish.values().map(|m| (m.id, m.power)));
        miners
    }

    /// Runs every configured round to completion.
    pub fn run_simulation(&mut self) {
        for round in 0..self.rounds {
            let weighted = self.weighted_miners();
            let leader = elect_leader(&weighted, &mut self.rng);
            *self.wins.entry(leader).or_insert(0) += 1;
            self.one_round(leader, round);
        }
        info!("ran {} rounds", self.rounds);
        self.resolve_dangling_wait();
    }

    fn one_round(&mut self, leader: MinerId, round: u64) {
        debug!("round {round}: leader {leader}");

        if leader == self.honest.id {
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
            let (ongoing_fork, effect) =
                leader_miner.mine_new_block(&self.public_chain, self.ongoing_fork, &match_competitors, &mut self.rng);
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
            winner.clear_private_chain();
        }
    }

    fn add_honest_block(&mut self, round: u64) {
        let block = Block::new(format!("Block {round} data"), self.honest.name.clone(), self.honest.id, false);
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
        let leader_chain = self.selfish[&leader].private.clone();
        info!("override by selfish miner {leader}");
        self.public_chain.override_chain(&leader_chain, OVERRIDE_RULE);
        self.selfish.get_mut(&leader).unwrap().clear_private_chain();

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
                let action = miner.decide_next_action(&self.public_chain);
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

    fn resolve_overrides(&mut self) {
        let attackers = self.action_store.objects(SelfishAction::Override);
        let winner = if attackers.len() == 1 {
            attackers[0]
        } else {
            pick_uniform(&attackers, &mut self.rng)
        };

        let winner_chain = self.selfish[&winner].private.clone();
        self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
        self.selfish.get_mut(&winner).unwrap().clear_private_chain();

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
            let mut candidates: Vec<Option<MinerId>> = match_objects.iter().map(|&id| Some(id)).collect();
            candidates.push(None);
            let winner = pick_uniform(&candidates, &mut self.rng);

            if let Some(winner_id) = winner {
                let winner_chain = self.selfish[&winner_id].private.clone();
                self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
                self.selfish.get_mut(&winner_id).unwrap().clear_private_chain();
                for id in match_objects {
                    if let Some(m) = self.selfish.get_mut(&id) {
                        m.clear_private_chain();
                    }
                    self.action_store.remove(SelfishAction::Match, id);
                }
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

    /// Post-simulation: resolves the extreme case where a selfish miner
    /// still holds a longer private chain than the public chain at the
    /// end of the run.
    fn resolve_dangling_wait(&mut self) {
        let waiting = self.action_store.objects(SelfishAction::Wait);
        if waiting.is_empty() {
            return;
        }

        let max_size = waiting
            .iter()
            .map(|id| self.selfish[id].private.size())
            .max()
            .unwrap_or(0);
        let longest: Vec<MinerId> = waiting
            .into_iter()
            .filter(|id| self.selfish[id].private.size() == max_size)
            .collect();

        if longest.is_empty() {
            return;
        }
        warn!("post-simulation dangling WAIT resolved for {longest:?}");
        let winner = pick_uniform(&longest, &mut self.rng);
        let winner_chain = self.selfish[&winner].private.clone();
        self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
    }

    /// Final per-miner block count on the main chain.
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
