//! Honest miner strategy for Fruitchain: the Nakamoto preemption rule for
//! superblock rounds, plus a shared fruit queue that feeds the next
//! superblock's payload.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::Gamma;
use crate::ids::MinerId;

#[derive(Debug, Clone)]
pub struct HonestMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
    pub fruit_queue: Vec<MinerId>,
}

impl HonestMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        HonestMiner {
            id,
            name: format!("Honest miner {id}"),
            power,
            fruit_queue: Vec::new(),
        }
    }

    pub fn mine_new_fruit(&mut self) {
        self.fruit_queue.push(self.id);
    }

    pub fn receive_new_fruit(&mut self, miner_id: MinerId) {
        self.fruit_queue.push(miner_id);
    }

    pub fn clear_fruit_queue(&mut self) {
        self.fruit_queue.clear();
    }

    pub fn get_fruit_count(&self) -> usize {
        self.fruit_queue.iter().filter(|&&id| id == self.id).count()
    }

    pub fn fruit_payload(&self) -> String {
        serde_json::to_string(&self.fruit_queue).unwrap_or_default()
    }

    /// Superblock-round preemption rule, identical in shape to Nakamoto's
    /// honest miner: a selfish miner tied with the public chain at the
    /// divergence point wins the tie with probability `power * 0.5 / 100`.
    pub fn mine_new_block(
        &self,
        ongoing_fork: bool,
        gamma: Gamma,
        match_competitors: &[MinerId],
        rng: &mut StdRng,
    ) -> (bool, Option<MinerId>) {
        if !ongoing_fork || match_competitors.is_empty() {
            return (false, None);
        }
        if gamma != Gamma::Half {
            return (false, None);
        }
        let preemption_prob = self.power * 0.5 / 100.0;
        if rng.gen_bool(preemption_prob.clamp(0.0, 1.0)) {
            let winner = match_competitors[0];
            (false, Some(winner))
        } else {
            (false, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fruit_count_only_counts_own_entries() {
        let mut miner = HonestMiner::new(0, 60.0);
        miner.mine_new_fruit();
        miner.receive_new_fruit(1);
        miner.receive_new_fruit(2);
        assert_eq!(miner.get_fruit_count(), 1);
    }

    #[test]
    fn clear_fruit_queue_empties_it() {
        let mut miner = HonestMiner::new(0, 60.0);
        miner.receive_new_fruit(3);
        miner.clear_fruit_queue();
        assert!(miner.fruit_queue.is_empty());
    }
}
