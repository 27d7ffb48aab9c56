//! Selfish miner strategy for Fruitchain: the Nakamoto override/match/adopt
//! decision tree over chain-size lead (fruit counts are only consulted by
//! match resolution and leader election, never here), plus a private fruit
//! queue that becomes the next superblock's payload.

use rand::rngs::StdRng;

use crate::action::SelfishAction;
use crate::block::Block;
use crate::chain::{Chain, OverrideRule};
use crate::common::pick_uniform;
use crate::ids::MinerId;

/// Fruitchain's fork index is the first block after divergence, same as
/// Nakamoto.
pub const OVERRIDE_RULE: OverrideRule = OverrideRule::PostDivergence;

#[derive(Debug, Clone)]
pub struct SelfishMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    pub private: Chain<Block>,
    /// Fruits received from other miners while this one is mining privately.
    pub fruit_queue: Vec<MinerId>,
    /// Fruits this miner mined itself, kept separate until seal time.
    pub private_queue: Vec<MinerId>,
    pub action: SelfishAction,
}

#[derive(Debug, Clone, Copy)]
pub enum MineEffect {
    None,
    ImmediateMatch { tie_winner: Option<MinerId> },
}

impl SelfishMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        SelfishMiner {
            id,
            name: format!("Selfish miner {id}"),
            power,
            private: Chain::new(id.to_string()),
            fruit_queue: Vec::new(),
            private_queue: Vec::new(),
            action: SelfishAction::Idle,
        }
    }

    pub fn mine_new_fruit(&mut self) {
        self.private_queue.push(self.id);
    }

    pub fn receive_new_fruit(&mut self, miner_id: MinerId) {
        self.fruit_queue.push(miner_id);
    }

    pub fn clear_fruit_queue(&mut self) {
        self.fruit_queue.clear();
        self.private_queue.clear();
    }

    pub fn get_fruit_count(&self) -> usize {
        self.fruit_queue.iter().filter(|&&id| id == self.id).count()
            + self.private_queue.iter().filter(|&&id| id == self.id).count()
    }

    fn fruit_payload(&self) -> String {
        let all: Vec<MinerId> = self
            .fruit_queue
            .iter()
            .chain(self.private_queue.iter())
            .copied()
            .collect();
        serde_json::to_string(&all).unwrap_or_default()
    }

    pub fn clear_private_chain(&mut self) {
        self.private.clear();
    }

    pub fn update_private_blockchain(&mut self, public: &Chain<Block>) {
        if self.private.chain.is_empty() {
            self.private.initialize(public.last_block_id as usize);
        }
        let payload = self.fruit_payload();
        self.private.add_block(Block::new(payload, self.name.clone(), self.id, false));
    }

    pub fn mine_new_block(
        &mut self,
        public: &Chain<Block>,
        ongoing_fork: bool,
        match_competitors: &[(MinerId, usize)],
        rng: &mut StdRng,
    ) -> (bool, MineEffect) {
        self.update_private_blockchain(public);

        if !ongoing_fork {
            self.action = SelfishAction::Wait;
            return (false, MineEffect::None);
        }

        let Some(&(_, first_size)) = match_competitors.first() else {
            self.action = SelfishAction::Wait;
            return (false, MineEffect::None);
        };
        let lead = self.private.size() as i64 - first_size as i64;
        let in_match = match_competitors.iter().any(|&(id, _)| id == self.id);

        if in_match {
            self.action = SelfishAction::Override;
            (false, MineEffect::None)
        } else if lead >= 2 {
            self.action = SelfishAction::Wait;
            (false, MineEffect::None)
        } else if lead == 0 {
            self.action = SelfishAction::Match;
            let mut candidates: Vec<Option<MinerId>> =
                match_competitors.iter().map(|&(id, _)| Some(id)).collect();
            candidates.push(None);
            let winner = pick_uniform(&candidates, rng);
            (false, MineEffect::ImmediateMatch { tie_winner: winner })
        } else {
            self.clear_private_chain();
            self.clear_fruit_queue();
            self.action = SelfishAction::Adopt;
            (false, MineEffect::None)
        }
    }

    pub fn decide_next_action(&mut self, public: &Chain<Block>) -> SelfishAction {
        if self.private.chain.is_empty() {
            self.action = SelfishAction::Idle;
            return self.action;
        }
        let fork_id = self.private.fork_block_id.expect("fork point must be recorded");
        let lead = self.private.size() as i64 - public.size_from_index(fork_id) as i64;

        self.action = if lead >= 2 {
            SelfishAction::Wait
        } else if lead == 1 {
            SelfishAction::Override
        } else if lead == 0 {
            SelfishAction::Match
        } else {
            self.clear_private_chain();
            self.clear_fruit_queue();
            SelfishAction::Adopt
        };
        self.action
    }
}
