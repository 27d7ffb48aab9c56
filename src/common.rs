//! Helpers shared by every consensus manager: weighted leader election and
//! the γ=0.5 uniform tie-break used throughout the override/match loop.

use rand::seq::SliceRandom;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use crate::ids::MinerId;

/// Elects a miner id with replacement, weighted by mining power.
pub fn elect_leader(miners: &[(MinerId, f64)], rng: &mut StdRng) -> MinerId {
    let weights = miners.iter().map(|&(_, power)| power);
    let dist = WeightedIndex::new(weights).expect("at least one miner with positive power");
    let idx = dist.sample(rng);
    miners[idx].0
}

/// Picks one candidate uniformly at random.
pub fn pick_uniform<T: Copy>(candidates: &[T], rng: &mut StdRng) -> T {
    *candidates
        .choose(rng)
        .expect("pick_uniform requires a non-empty candidate list")
}

/// A Bernoulli trial with probability `p` of returning `true`.
pub fn bernoulli(p: f64, rng: &mut StdRng) -> bool {
    use rand::Rng;
    rng.gen_bool(p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn elect_leader_never_picks_zero_weight_miner() {
        let mut rng = StdRng::seed_from_u64(1);
        let miners = [(0, 100.0), (1, 0.0)];
        for _ in 0..50 {
            assert_eq!(elect_leader(&miners, &mut rng), 0);
        }
    }

    #[test]
    fn pick_uniform_is_deterministic_for_a_fixed_seed() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = [10, 20, 30];
        let first = pick_uniform(&candidates, &mut rng);
        assert!(candidates.contains(&first));
    }
}
