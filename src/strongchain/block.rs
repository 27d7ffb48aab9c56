//! Strongchain's block shape: a strong block carrying the weak headers
//! mined against it, plus the chain-weight arithmetic that replaces plain
//! chain length as the override comparison.

use crate::block::ChainBlock;
use crate::chain::Chain;
use crate::ids::MinerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeakHeader {
    pub payload: String,
    pub miner_name: String,
    pub miner_id: MinerId,
}

impl WeakHeader {
    pub fn new(payload: impl Into<String>, miner_name: impl Into<String>, miner_id: MinerId) -> Self {
        WeakHeader {
            payload: payload.into(),
            miner_name: miner_name.into(),
            miner_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongBlock {
    pub payload: String,
    pub miner_name: String,
    pub miner_id: MinerId,
    pub weak_headers: Vec<WeakHeader>,
}

impl StrongBlock {
    pub fn new(payload: impl Into<String>, miner_name: impl Into<String>, miner_id: MinerId) -> Self {
        StrongBlock {
            payload: payload.into(),
            miner_name: miner_name.into(),
            miner_id,
            weak_headers: Vec::new(),
        }
    }
}

impl ChainBlock for StrongBlock {
    fn is_weak(&self) -> bool {
        false
    }

    fn miner_id(&self) -> MinerId {
        self.miner_id
    }
}

impl Chain<StrongBlock> {
    /// Total chain weight: each strong block contributes 1, each attached
    /// weak header contributes `1/ratio`.
    pub fn chains_pow(&self, ratio: f64) -> f64 {
        self.chains_pow_from_index(0, ratio)
    }

    /// Chain weight restricted to `chain[index..]`.
    pub fn chains_pow_from_index(&self, index: usize, ratio: f64) -> f64 {
        self.chain
            .get(index..)
            .map(|slice| {
                slice
                    .iter()
                    .map(|b| 1.0 + b.weak_headers.len() as f64 / ratio)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_pow_counts_weak_headers_as_fractional_weight() {
        let mut chain: Chain<StrongBlock> = Chain::new("public");
        let mut block = StrongBlock::new("d", "Honest miner 0", 0);
        block.weak_headers.push(WeakHeader::new("w", "Honest miner 0", 0));
        block.weak_headers.push(WeakHeader::new("w", "Honest miner 0", 0));
        chain.add_block(block);
        chain.add_block(StrongBlock::new("d2", "Honest miner 0", 0));

        assert_eq!(chain.chains_pow(2.0), (1.0 + 2.0 / 2.0) + 1.0);
    }

    #[test]
    fn ratio_one_reduces_weak_headers_to_full_weight() {
        let mut chain: Chain<StrongBlock> = Chain::new("public");
        let mut block = StrongBlock::new("d", "m", 0);
        block.weak_headers.push(WeakHeader::new("w", "m", 0));
        chain.add_block(block);

        assert_eq!(chain.chains_pow(1.0), 2.0);
    }
}
