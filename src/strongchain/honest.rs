//! Honest miner strategy for Strongchain: the Nakamoto baseline plus a
//! buffer of weak headers mined since the last strong block.

use rand::rngs::StdRng;

use crate::common::bernoulli;
use crate::config::Gamma;
use crate::ids::MinerId;

use super::block::WeakHeader;

#[derive(Debug, Clone)]
pub struct HonestMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    pub weak_headers: Vec<WeakHeader>,
}

impl HonestMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        HonestMiner {
            id,
            name: format!("Honest miner {id}"),
            power,
            weak_headers: Vec::new(),
        }
    }

    pub fn add_weak_header(&mut self, round: u64) {
        let payload = format!("Weak header {round} data");
        let name = self.name.clone();
        self.weak_headers.push(WeakHeader::new(payload, name, self.id));
    }

    pub fn clear_weak_headers(&mut self) {
        self.weak_headers.clear();
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
