//! Per-round orchestrator for Fruitchain: a Bernoulli split between
//! fruit-mining and superblock rounds, fruit-count leader and match
//! tie-breaks, and the end-of-run pick of the longest chain in play.

use std::collections::HashMap;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::{ActionStore, SelfishAction};
use crate::block::Block;
use crate::chain::Chain;
use crate::common::{bernoulli, elect_leader, pick_uniform};
use crate::config::Gamma;
use crate::ids::{IdGen, MinerId};

use super::honest::HonestMiner;
use super::selfish::{MineEffect, SelfishMiner, OVERRIDE_RULE};

/// Validated Fruitchain-specific configuration.
#[derive(Debug, Clone)]
pub struct FruitchainConfig {
    pub label: String,
    pub honest_power: f64,
    pub selfish_powers: Vec<f64>,
    pub gamma: Gamma,
    pub rounds: u64,
    pub fruit_mine_prob: f64,
    pub superblock_prob: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    MineFruit,
    MineBlock,
}

/// Drives one full Fruitchain simulation run.
pub struct Manager {
    pub public_chain: Chain<Block>,
    pub honest: HonestMiner,
    pub selfish: HashMap<MinerId, SelfishMiner>,
    pub action_store: ActionStore,
    pub ongoing_fork: bool,
    pub wins: HashMap<MinerId, u64>,
    pub gamma: Gamma,
    pub fruit_mine_prob: f64,
    pub superblock_prob: f64,
    pub rounds: u64,
    rng: StdRng,
}

impl Manager {
    pub fn new(config: &FruitchainConfig, seed: u64) -> Self {
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
            fruit_mine_prob: config.fruit_mine_prob,
            superblock_prob: config.superblock_prob,
            rounds: config.rounds,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn weighted_miners(&self) -> Vec<(MinerId, f64)> {
        let mut miners = vec![(self.honest.id, self.honest.power)];
        miners.extend(self.selfish.values().map(|m| (m.id, m.power)));
        miners
    }

    fn choose_event_kind(&mut self) -> EventKind {
        if bernoulli(self.superblock_prob, &mut self.rng) {
            EventKind::MineBlock
        } else {
            EventKind::MineFruit
        }
    }

    fn fruit_count(&self, id: MinerId) -> usize {
        if id == self.honest.id {
            self.honest.get_fruit_count()
        } else {
            self.selfish[&id].get_fruit_count()
        }
    }

    /// Fruit-count tiebreak among all miners, gated by γ, used only for
    /// superblock-round leader election during an ongoing fork.
    fn elect_leader_by_fruit_count(&mut self) -> MinerId {
        let all_ids: Vec<MinerId> = std::iter::once(self.honest.id)
            .chain(self.selfish.keys().copied())
            .collect();
        let max_count = all_ids.iter().map(|&id| self.fruit_count(id)).max().unwrap_or(0);
        let candidates: Vec<MinerId> =
            all_ids.into_iter().filter(|&id| self.fruit_count(id) == max_count).collect();

        let pool: Vec<MinerId> = match self.gamma {
            Gamma::Half => candidates.clone(),
            Gamma::Zero => {
                let honest_only: Vec<MinerId> =
                    candidates.iter().copied().filter(|&id| id == self.honest.id).collect();
                if honest_only.is_empty() { candidates.clone() } else { honest_only }
            }
            Gamma::One => {
                let selfish_only: Vec<MinerId> =
                    candidates.iter().copied().filter(|&id| id != self.honest.id).collect();
                if selfish_only.is_empty() { candidates.clone() } else { selfish_only }
            }
        };
        pick_uniform(&pool, &mut self.rng)
    }

    /// Runs until the longest chain in play reaches `rounds` blocks.
    pub fn run_simulation(&mut self) {
        let mut round = 0u64;
        while self.max_chain_size() < self.rounds as usize {
            let event = self.choose_event_kind();
            let leader = if self.ongoing_fork && event == EventKind::MineBlock {
                self.elect_leader_by_fruit_count()
            } else {
                let weighted = self.weighted_miners();
                elect_leader(&weighted, &mut self.rng)
            };

            self.one_round(leader, round, event);

            if event == EventKind::MineBlock {
                *self.wins.entry(leader).or_insert(0) += 1;
            }
            round += 1;
        }
        info!("ran {round} rounds");
        self.finalize();
    }

    fn max_chain_size(&self) -> usize {
        let mut best = self.public_chain.size();
        let mut ids: Vec<MinerId> = self.selfish.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let size = self.selfish[&id].private.size();
            if size >= best {
                best = size;
            }
        }
        best
    }

    /// Replaces `public_chain` with the longest chain any participant is
    /// holding (own chain included), matching Fruitchain's "pick the best
    /// chain standing" finalization instead of the dangling-WAIT override
    /// Nakamoto and Strongchain use.
    fn finalize(&mut self) {
        let mut winner: Option<MinerId> = None;
        let mut best = self.public_chain.size();
        let mut ids: Vec<MinerId> = self.selfish.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let size = self.selfish[&id].private.size();
            if size >= best {
                best = size;
                winner = Some(id);
            }
        }
        if let Some(id) = winner {
            let winner_chain = self.selfish[&id].private.clone();
            self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
        }
    }

    fn one_round(&mut self, leader: MinerId, round: u64, event: EventKind) {
        debug!("round {round}: leader {leader}, event {event:?}");

        match event {
            EventKind::MineFruit => self.mine_fruit_round(leader),
            EventKind::MineBlock => self.mine_block_round(leader),
        }
    }

    fn mine_fruit_round(&mut self, leader: MinerId) {
        if leader == self.honest.id {
            self.honest.mine_new_fruit();
            for miner in self.selfish.values_mut() {
                miner.receive_new_fruit(leader);
            }
        } else {
            self.selfish.get_mut(&leader).unwrap().mine_new_fruit();
        }
    }

    fn mine_block_round(&mut self, leader: MinerId) {
        if leader == self.honest.id {
            let match_competitors = self.action_store.objects(SelfishAction::Match);
            let (ongoing_fork, preempted) =
                self.honest
                    .mine_new_block(self.ongoing_fork, self.gamma, &match_competitors, &mut self.rng);
            self.ongoing_fork = ongoing_fork;

            if let Some(winner_id) = preempted {
                self.apply_honest_preemption(winner_id);
            }
            self.add_honest_block();
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

        if leader == self.honest.id {
            self.honest.clear_fruit_queue();
            for miner in self.selfish.values_mut() {
                miner.clear_fruit_queue();
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
            winner.clear_private_chain();
        }
    }

    fn add_honest_block(&mut self) {
        let payload = self.honest.fruit_payload();
        let block = Block::new(payload, self.honest.name.clone(), self.honest.id, false);
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
        self.selfish.get_mut(&leader).unwrap().clear_fruit_queue();

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

    /// Match resolution, with fruit-count comparison gating the
    /// exactly-one-attacker branch before falling back to γ (§4.2.4).
    fn resolve_matches(&mut self) {
        let match_objects = self.action_store.objects(SelfishAction::Match);

        if self.ongoing_fork {
            self.ongoing_fork = false;
            let mut candidates: Vec<Option<MinerId>> = match_objects.iter().map(|&id| Some(id)).collect();
            candidates.push(None);
            let winner = pick_uniform(&candidates, &mut self.rng);

            if let Some(winner_id) = winner {
                self.resolve_fruit_match(winner_id, &match_objects);
            }
        } else if match_objects.len() == 1 {
            let attacker = match_objects[0];
            let honest_fruits = self.honest.get_fruit_count();
            let selfish_fruits = self.selfish[&attacker].get_fruit_count();

            if selfish_fruits > honest_fruits {
                self.resolve_fruit_match(attacker, &match_objects);
            } else if selfish_fruits == honest_fruits {
                match self.gamma {
                    Gamma::One => self.resolve_fruit_match(attacker, &match_objects),
                    Gamma::Half => {
                        if bernoulli(0.5, &mut self.rng) {
                            self.resolve_fruit_match(attacker, &match_objects);
                        }
                    }
                    Gamma::Zero => self.ongoing_fork = true,
                }
            }
        } else {
            self.ongoing_fork = true;
        }
    }

    /// Overrides with `winner`'s chain (no-op if `winner` is the honest
    /// miner), then clears every participant's fruit queues — fruits are
    /// paid out on inclusion regardless of who mined the sealing block.
    fn resolve_fruit_match(&mut self, winner: MinerId, match_objects: &[MinerId]) {
        if winner != self.honest.id {
            let winner_chain = self.selfish[&winner].private.clone();
            self.public_chain.override_chain(&winner_chain, OVERRIDE_RULE);
            self.selfish.get_mut(&winner).unwrap().clear_private_chain();
            self.action_store.remove(SelfishAction::Match, winner);
        }
        for id in match_objects {
            self.action_store.remove(SelfishAction::Match, *id);
        }

        self.honest.clear_fruit_queue();
        for miner in self.selfish.values_mut() {
            miner.clear_fruit_queue();
        }
    }

    /// Final per-miner block count on the finalized main chain.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(
        honest: f64,
        selfish: f64,
        gamma: Gamma,
        rounds: u64,
        fruit_mine_prob: f64,
        superblock_prob: f64,
    ) -> FruitchainConfig {
        FruitchainConfig {
            label: "test".into(),
            honest_power: honest,
            selfish_powers: vec![selfish],
            gamma,
            rounds,
            fruit_mine_prob,
            superblock_prob,
        }
    }

    #[test]
    fn run_simulation_reaches_configured_chain_length() {
        let cfg = config(60.0, 40.0, Gamma::Half, 50, 0.8, 0.2);
        let mut manager = Manager::new(&cfg, 7);
        manager.run_simulation();
        assert!(manager.public_chain.size() >= 50);
    }

    #[test]
    fn block_counts_sum_to_chain_size() {
        let cfg = config(60.0, 40.0, Gamma::One, 200, 0.7, 0.3);
        let mut manager = Manager::new(&cfg, 11);
        manager.run_simulation();
        let total: u64 = manager.block_counts().values().sum();
        assert_eq!(total as usize, manager.public_chain.size());
    }

    #[test]
    fn csv_rows_equal_final_chain_length() {
        let cfg = config(55.0, 45.0, Gamma::Half, 300, 0.85, 0.15);
        let mut manager = Manager::new(&cfg, 99);
        manager.run_simulation();
        assert_eq!(manager.public_chain.chain.len(), manager.public_chain.size());
    }
}
