//! Per-round orchestrator for Subchain: one Bernoulli split between weak and
//! strong rounds, shared by two evaluation variants with very different
//! epoch semantics (see module docs).

use std::collections::HashMap;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::{ActionStore, SelfishAction};
use crate::block::Block;
use crate::chain::Chain;
use crate::common::{bernoulli, elect_leader, pick_uniform};
use crate::config::{CommonConfig, Gamma};
use crate::ids::{IdGen, MinerId};

use super::honest::HonestMiner;
use super::selfish::{MineEffect, SelfishMiner, OVERRIDE_RULE};

/// Which Subchain evaluation variant a [`Manager`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Weak rounds run a full Nakamoto-style round against an ephemeral
    /// per-epoch weak chain; an honest-won strong round finalizes the
    /// epoch onto a separate permanent strong chain.
    Weak,
    /// Weak rounds just buffer a block onto the leader's own weak-chain;
    /// strong rounds run a full Nakamoto-style round that grafts buffered
    /// weak blocks onto the strong chain as it goes.
    Strong,
}

pub struct SubchainConfig {
    pub variant: Variant,
    pub common: CommonConfig,
    pub weak_to_strong_block_ratio: f64,
}

/// Drives one full Subchain simulation run.
pub struct Manager {
    pub variant: Variant,
    /// Weak variant: the ephemeral per-epoch weak chain. Strong variant:
    /// the single unified strong chain (weak blocks graft into it).
    pub public_chain: Chain<Block>,
    /// Weak variant only: the permanent chain of sealed strong blocks.
    pub public_chain_strong: Chain<Block>,
    pub honest: HonestMiner,
    pub selfish: HashMap<MinerId, SelfishMiner>,
    pub action_store: ActionStore,
    pub ongoing_fork: bool,
    pub wins: HashMap<MinerId, u64>,
    pub gamma: Gamma,
    pub ratio: f64,
    pub rounds: u64,
    rng: StdRng,
}

impl Manager {
    pub fn new(config: &SubchainConfig, seed: u64) -> Self {
        let mut id_gen = IdGen::new();
        let honest_id = id_gen.next_id();
        let honest = HonestMiner::new(honest_id, config.common.honest_power);

        let mut selfish = HashMap::new();
        for &power in &config.common.selfish_powers {
            let id = id_gen.next_id();
            selfish.insert(id, SelfishMiner::new(id, power));
        }

        let mut wins = HashMap::new();
        wins.insert(honest.id, 0);
        for id in selfish.keys() {
            wins.insert(*id, 0);
        }

        Manager {
            variant: config.variant,
            public_chain: Chain::new("public blockchain"),
            public_chain_strong: Chain::new("public blockchain strong"),
            honest,
            selfish,
            action_store: ActionStore::new(),
            ongoing_fork: false,
            wins,
            gamma: config.common.gamma,
            ratio: config.weak_to_strong_block_ratio,
            rounds: config.common.rounds,
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
        let weak_prob = self.ratio / (self.ratio + 1.0);
        for round in 0..self.rounds {
            let weighted = self.weighted_miners();
            let leader = elect_leader(&weighted, &mut self.rng);
            *self.wins.entry(leader).or_insert(0) += 1;

            if bernoulli(weak_prob, &mut self.rng) {
                self.weak_round(leader, round);
            } else {
                self.strong_round(leader, round);
            }
        }
        info!("ran {} rounds", self.rounds);
        if self.variant == Variant::Strong {
            self.resolve_dangling_wait();
        }
    }

    fn weak_round(&mut self, leader: MinerId, round: u64) {
        match self.variant {
            Variant::Weak => self.one_round(leader, round, true),
            Variant::Strong => {
                if leader == self.honest.id {
                    self.honest.add_weak_block(round);
                } else {
                    self.selfish.get_mut(&leader).expect("leader must exist").add_weak_block(round);
                }
            }
        }
    }

    fn strong_round(&mut self, leader: MinerId, round: u64) {
        match self.variant {
            Variant::Weak => self.finalize_epoch(leader, round),
            Variant::Strong => self.one_round(leader, round, false),
        }
    }

    /// One full Nakamoto-style round. In the weak variant this runs for
    /// every weak sub-round against the ephemeral `public_chain`; in the
    /// strong variant it runs for every strong sub-round against the
    /// unified strong `public_chain`, with weak-chain grafting folded into
    /// [`SelfishMiner::update_private_blockchain`] and [`Manager::add_honest_block`].
    fn one_round(&mut self, leader: MinerId, round: u64, is_weak: bool) {
        debug!("round {round}: leader {leader} (weak={is_weak})");

        if leader == self.honest.id {
            let match_competitors = self.action_store.objects(SelfishAction::Match);
            let (ongoing_fork, preempted) =
                self.honest
                    .mine_new_block(self.ongoing_fork, self.gamma, &match_competitors, &mut self.rng);
            self.ongoing_fork = ongoing_fork;

            if let Some(winner_id) = preempted {
                self.apply_honest_preemption(winner_id);
            }
            self.add_honest_block(round, is_weak);
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
                is_weak,
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

    /// Appends the honest miner's block. In the strong variant, first
    /// grafts its buffered weak-block run onto the public chain.
    fn add_honest_block(&mut self, round: u64, is_weak: bool) {
        if self.variant == Variant::Strong {
            let weak = std::mem::take(&mut self.honest.weak_chain);
            self.public_chain.chain.extend(weak);
        }
        let block = Block::new(format!("Block {round} data"), self.honest.name.clone(), self.honest.id, is_weak);
        self.public_chain.add_block(block);
        self.public_chain.last_block_id = self.public_chain.chain.len() as u64;

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
        self.honest.clear_weak_chain();

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
        self.honest.clear_weak_chain();

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
        self.honest.clear_weak_chain();

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
                self.honest.clear_weak_chain();
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
                self.honest.clear_weak_chain();
                self.action_store.remove(SelfishAction::Match, winner);
            } else {
                self.ongoing_fork = true;
            }
        } else {
            self.ongoing_fork = true;
        }
    }

    /// Post-simulation dangling-WAIT cleanup for the strong variant (the
    /// weak variant never leaves a round mid-epoch: every strong round
    /// either finalizes or no-ops).
    fn resolve_dangling_wait(&mut self) {
        let waiting = self.action_store.objects(SelfishAction::Wait);
        if waiting.is_empty() {
            return;
        }

        let max_size = waiting.iter().map(|id| self.selfish[id].private.size()).max().unwrap_or(0);
        let longest: Vec<MinerId> =
            waiting.into_iter().filter(|id| self.selfish[id].private.size() == max_size).collect();

        if longest.is_empty() {
            return;
        }
        warn!("post-simulation dangling WAIT resolved for {longest:?}");
        let winner = pick_uniform(&longest, &mut self.rng);
        let winner_chain = self.selfish[&winner].private.clone();
        self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
    }

    /// Weak variant only: a strong round's epoch finalization. A no-op if a
    /// selfish miner wins the strong-round leader election; the epoch only
    /// advances on an honest win.
    fn finalize_epoch(&mut self, leader: MinerId, round: u64) {
        if leader != self.honest.id {
            return;
        }

        let match_objects = self.action_store.objects(SelfishAction::Match);
        let winning = if self.ongoing_fork {
            let mut pool: Vec<Chain<Block>> =
                match_objects.iter().map(|id| self.selfish[id].private.clone()).collect();
            pool.push(self.public_chain.clone());
            let idx = pick_uniform(&(0..pool.len()).collect::<Vec<usize>>(), &mut self.rng);
            pool.swap_remove(idx)
        } else {
            self.public_chain.clone()
        };

        self.public_chain_strong.chain.extend(winning.chain.iter().cloned());
        let payload = format!("Block {round} data");
        self.public_chain_strong.add_block(Block::new(payload, self.honest.name.clone(), self.honest.id, false));

        self.action_store.clear();
        self.ongoing_fork = false;
        self.public_chain.clear();
        self.public_chain.last_block_id = 0;
        for miner in self.selfish.values_mut() {
            miner.private.clear();
        }
    }

    /// Final per-miner block count on the canonical chain: the strong
    /// ledger in the weak variant, the unified public chain otherwise.
    pub fn block_counts(&self) -> HashMap<MinerId, u64> {
        let mut counts = HashMap::new();
        counts.insert(self.honest.id, 0);
        for id in self.selfish.keys() {
            counts.insert(*id, 0);
        }
        let chain = match self.variant {
            Variant::Weak => &self.public_chain_strong,
            Variant::Strong => &self.public_chain,
        };
        for block in &chain.chain {
            if !block.is_weak {
                *counts.entry(block.miner_id).or_insert(0) += 1;
            }
        }
        counts
    }
}
