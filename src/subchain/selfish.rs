//! Selfish miner strategy for Subchain: the plain Nakamoto override/match/
//! adopt decision tree over chain-size lead. The strong variant additionally
//! grafts a buffered run of weak blocks onto the strong chain the moment
//! this miner next mines a strong block.

use rand::rngs::StdRng;

use crate::action::SelfishAction;
use crate::block::Block;
use crate::chain::{Chain, OverrideRule};
use crate::common::pick_uniform;
use crate::ids::MinerId;

/// Subchain's fork index already names the divergence point, same as
/// Strongchain.
pub const OVERRIDE_RULE: OverrideRule = OverrideRule::Divergence;

#[derive(Debug, Clone)]
pub struct SelfishMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    pub private: Chain<Block>,
    /// Weak blocks mined since this miner's last strong block (strong
    /// variant only; always empty in the weak variant).
    pub weak_chain: Vec<Block>,
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
            weak_chain: Vec::new(),
            action: SelfishAction::Idle,
        }
    }

    pub fn add_weak_block(&mut self, round: u64) {
        let payload = format!("Weak block {round} data");
        self.weak_chain.push(Block::new(payload, self.name.clone(), self.id, true));
    }

    pub fn clear_weak_chain(&mut self) {
        self.weak_chain.clear();
    }

    pub fn clear_private_chain(&mut self) {
        self.private.clear();
        self.weak_chain.clear();
    }

    /// Grafts any buffered weak blocks onto the private chain, then appends
    /// the newly mined block. `is_weak` tags the weak variant's per-epoch
    /// blocks (never counted by [`Chain::size`]) versus the strong variant's
    /// sealing strong block.
    pub fn update_private_blockchain(&mut self, public: &Chain<Block>, is_weak: bool) {
        if self.private.chain.is_empty() {
            self.private.initialize(public.last_block_id as usize);
        }
        let weak = std::mem::take(&mut self.weak_chain);
        self.private.chain.extend(weak);
        self.private.add_block(Block::new("Block data", self.name.clone(), self.id, is_weak));
    }

    pub fn mine_new_block(
        &mut self,
        public: &Chain<Block>,
        ongoing_fork: bool,
        match_competitors: &[(MinerId, usize)],
        is_weak: bool,
        rng: &mut StdRng,
    ) -> (bool, MineEffect) {
        self.update_private_blockchain(public, is_weak);

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
            SelfishAction::Adopt
        };
        self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_private_chain_is_idle() {
        let mut miner = SelfishMiner::new(1, 40.0);
        let public: Chain<Block> = Chain::new("public");
        assert_eq!(miner.decide_next_action(&public), SelfishAction::Idle);
    }

    #[test]
    fn update_private_blockchain_grafts_buffered_weak_blocks() {
        let public: Chain<Block> = Chain::new("public");
        let mut miner = SelfishMiner::new(1, 40.0);
        miner.add_weak_block(1);
        miner.add_weak_block(2);
        miner.update_private_blockchain(&public, false);

        assert_eq!(miner.private.chain.len(), 3);
        assert!(miner.private.chain[0].is_weak);
        assert!(miner.private.chain[1].is_weak);
        assert!(!miner.private.chain[2].is_weak);
        assert_eq!(miner.private.size(), 1);
        assert!(miner.weak_chain.is_empty());
    }

    #[test]
    fn decide_next_action_adopts_when_behind() {
        let mut public: Chain<Block> = Chain::new("public");
        public.add_block(Block::new("a", "h", 0, false));
        public.add_block(Block::new("b", "h", 0, false));

        let mut miner = SelfishMiner::new(1, 40.0);
        miner.private.initialize(0);
        miner.private.add_block(Block::new("x", "s", 1, false));

        let action = miner.decide_next_action(&public);
        assert_eq!(action, SelfishAction::Adopt);
        assert!(miner.private.chain.is_empty());
    }
}
