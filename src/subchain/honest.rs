//! Honest miner strategy for Subchain: the Nakamoto baseline, plus — in the
//! strong variant only — a private buffer of weak blocks waiting to be
//! grafted onto whichever strong block comes next.

use rand::rngs::StdRng;

use crate::block::Block;
use crate::common::bernoulli;
use crate::config::Gamma;
use crate::ids::MinerId;

#[derive(Debug, Clone)]
pub struct HonestMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    /// Weak blocks mined since the last strong block (strong variant only).
    pub weak_chain: Vec<Block>,
}

impl HonestMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        HonestMiner {
            id,
            name: format!("Honest miner {id}"),
            power,
            weak_chain: Vec::new(),
        }
    }

    pub fn add_weak_block(&mut self, round: u64) {
        let payload = format!("Weak block {round} data");
        self.weak_chain.push(Block::new(payload, self.name.clone(), self.id, true));
    }

    pub fn clear_weak_chain(&mut self) {
        self.weak_chain.clear();
    }

    pub fn mine_new_block(
        &self,
        ongoing_fork: bool,
        gamma: Gamma,
        match_competitors: &[MinerId],
        rng: &mut StdRng,
    ) -> (bool, Option<MinerId>) {
        if ongoing_fork && gamma == Gamma::Half && !match_competitors.is_empty() {
            let preemption_prob = self.power * 0.5 / 100.0;
            if bernoulli(preemption_prob, rng) {
                return (false, Some(match_competitors[0]));
            }
        }
        (false, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_chain_buffers_and_clears() {
        let mut honest = HonestMiner::new(0, 60.0);
        honest.add_weak_block(1);
        honest.add_weak_block(2);
        assert_eq!(honest.weak_chain.len(), 2);
        assert!(honest.weak_chain.iter().all(|b| b.is_weak));

        honest.clear_weak_chain();
        assert!(honest.weak_chain.is_empty());
    }
}
