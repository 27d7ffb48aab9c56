//! Honest miner strategy, shared baseline for all four consensus families.

use rand::rngs::StdRng;

use crate::common::bernoulli;
use crate::config::Gamma;
use crate::ids::MinerId;

#[derive(Debug, Clone)]
pub struct HonestMiner {
    pub id: MinerId,
    pub name: String,
    pub power: f64,
}

impl HonestMiner {
    pub fn new(id: MinerId, power: f64) -> Self {
        HonestMiner {
            id,
            name: format!("Honest miner {id}"),
            power,
        }
    }

    /// Decides, on election, whether the γ=0.5 network tie-break preempts
    /// this miner's own publish with one of the `match_competitors`' private
    /// chains. Returns the preempting miner's id, if any, and the cleared
    /// `ongoing_fork` flag.
    ///
    /// The manager still appends the honest miner's own new block afterward
    /// regardless of whether preemption fired — the preempted block only
    /// replaces the public chain's *previous* tip.
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
