//! Selfish miner strategy for the Nakamoto baseline.

use rand::rngs::StdRng;

use crate::action::SelfishAction;
use crate::block::Block;
use crate::chain::{Chain, OverrideRule};
use crate::common::pick_uniform;
use crate::ids::MinerId;

/// Slice-bound rule for Nakamoto's `override_chain`: the fork index is the
/// first block *after* divergence.
pub const OVERRIDE_RULE: OverrideRule = OverrideRule::PostDivergence;

#[derive(Debug, Clone)]
pub struct SelfishMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    pub private: Chain<Block>,
    pub action: SelfishAction,
}

/// What the manager must do after a selfish miner's `mine_new_block` leader
/// turn, beyond storing `self.action`.
#[derive(Debug, Clone, Copy)]
pub enum MineEffect {
    /// No manager-side effect beyond the stored action.
    None,
    /// The MATCH tie resolved immediately: the manager must splice in
    /// `tie_winner`'s last block (if it isn't the public chain itself),
    /// then override the public chain with this miner's own private chain,
    /// and clear every miner in `match_competitors`.
    ImmediateMatch { tie_winner: Option<MinerId> },
}

impl SelfishMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        SelfishMiner {
            id,
            name: format!("Selfish miner {id}"),
            power,
            private: Chain::new(id.to_string()),
            action: SelfishAction::Idle,
        }
    }

    pub fn clear_private_chain(&mut self) {
        self.private.clear();
    }

    /// Appends the just-mined block to the private chain, initializing a
    /// fresh fork point first if the chain was empty.
    pub fn update_private_blockchain(&mut self, public: &Chain<Block>, payload: impl Into<String>) {
        if self.private.chain.is_empty() {
            self.private.initialize(public.last_block_id as usize);
        }
        let block = Block::new(payload, self.name.clone(), self.id, false);
        self.private.add_block(block);
    }

    /// Leader-turn decision (fork carried over from a previous round).
    /// `match_competitors` excludes `self`.
    pub fn mine_new_block(
        &mut self,
        public: &Chain<Block>,
        ongoing_fork: bool,
        match_competitors: &[(MinerId, usize)],
        rng: &mut StdRng,
    ) -> (bool, MineEffect) {
        self.update_private_blockchain(public, "block data");

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

    /// Re-evaluation after any block lands on the public chain.
    pub fn decide_next_action(&mut self, public: &Chain<Block>) -> SelfishAction {
        if self.private.chain.is_empty() {
            self.action = SelfishAction::Idle;
            return self.action;
        }

        let lead = self.private.length() as i64 - public.last_block_id as i64;
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
    use rand::SeedableRng;

    #[test]
    fn update_private_blockchain_initializes_fork_point_once() {
        let mut public: Chain<Block> = Chain::new("public");
        public.add_block(Block::new("d", "honest", 0, false));
        let mut selfish = SelfishMiner::new(1, 40.0);

        selfish.update_private_blockchain(&public, "a");
        assert_eq!(selfish.private.fork_block_id, Some(1));

        selfish.update_private_blockchain(&public, "b");
        assert_eq!(selfish.private.fork_block_id, Some(1));
        assert_eq!(selfish.private.size(), 2);
    }

    #[test]
    fn decide_next_action_follows_lead_thresholds() {
        let mut public: Chain<Block> = Chain::new("public");
        let mut selfish = SelfishMiner::new(1, 40.0);
        selfish.private.initialize(0);
        selfish.private.add_block(Block::new("a", "s", 1, false));
        selfish.private.add_block(Block::new("b", "s", 1, false));

        assert_eq!(selfish.decide_next_action(&public), SelfishAction::Wait);

        public.add_block(Block::new("x", "h", 0, false));
        assert_eq!(selfish.decide_next_action(&public), SelfishAction::Override);

        public.add_block(Block::new("y", "h", 0, false));
        assert_eq!(selfish.decide_next_action(&public), SelfishAction::Match);

        public.add_block(Block::new("z", "h", 0, false));
        assert_eq!(selfish.decide_next_action(&public), SelfishAction::Adopt);
        assert!(selfish.private.chain.is_empty());
    }

    #[test]
    fn empty_private_chain_is_idle() {
        let public: Chain<Block> = Chain::new("public");
        let mut selfish = SelfishMiner::new(1, 40.0);
        assert_eq!(selfish.decide_next_action(&public), SelfishAction::Idle);
    }

    #[test]
    fn mine_new_block_with_no_fork_is_wait() {
        let public: Chain<Block> = Chain::new("public");
        let mut selfish = SelfishMiner::new(1, 40.0);
        let mut rng = StdRng::seed_from_u64(1);
        let (fork, _) = selfish.mine_new_block(&public, false, &[], &mut rng);
        assert!(!fork);
        assert_eq!(selfish.action, SelfishAction::Wait);
    }
}
