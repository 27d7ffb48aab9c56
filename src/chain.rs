//! The append-only chain container and its `override_chain` primitive.

use crate::block::ChainBlock;

/// Which slice bound `override_chain` truncates at.
///
/// Nakamoto and Fruitchain's fork index is the first block *after*
/// divergence, so the cut happens one index earlier than the stored
/// `fork_block_id` (except at the genesis edge case). Strongchain and
/// Subchain's fork index already names the divergence point itself. This is
/// the off-by-one the model source hard-codes per consensus family; keeping
/// it as an explicit parameter means a single [`Chain::override_chain`]
/// implementation serves both families without silently reintroducing the
/// distinction as a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideRule {
    /// Cut at `fork_block_id` itself (Strongchain, Subchain).
    Divergence,
    /// Cut at `fork_block_id - 1`, or `0` at the genesis edge case
    /// (Nakamoto, Fruitchain).
    PostDivergence,
}

/// An ordered sequence of blocks, plus the bookkeeping needed to compare a
/// private chain against the public chain and to splice one onto the other.
#[derive(Debug, Clone)]
pub struct Chain<B: ChainBlock> {
    pub chain: Vec<B>,
    pub owner: String,
    pub last_block_id: u64,
    pub fork_block_id: Option<usize>,
}

impl<B: ChainBlock> Chain<B> {
    pub fn new(owner: impl Into<String>) -> Self {
        Chain {
            chain: Vec::new(),
            owner: owner.into(),
            last_block_id: 0,
            fork_block_id: None,
        }
    }

    /// Appends `block`, advancing `last_block_id` regardless of weakness
    /// (weak blocks are never pushed onto a strong chain directly; they
    /// live in a miner's own weak-block/weak-header buffer until committed).
    pub fn add_block(&mut self, block: B) {
        self.chain.push(block);
        self.last_block_id += 1;
    }

    /// Marks this chain (expected to be empty) as forked off the public
    /// chain at `fork_block_id`.
    pub fn initialize(&mut self, fork_block_id: usize) {
        self.fork_block_id = Some(fork_block_id);
    }

    /// Number of strong blocks on this chain.
    pub fn size(&self) -> usize {
        self.chain.iter().filter(|b| !b.is_weak()).count()
    }

    /// Effective public-chain-equivalent height of a private chain: its own
    /// strong-block count plus the public height it forked from.
    pub fn length(&self) -> usize {
        self.size() + self.fork_block_id.unwrap_or(0)
    }

    /// Clears this chain, nulling `fork_block_id` along with it. Invariant
    /// (`spec.md` §3): `fork_block_id` is set exactly when `chain` is
    /// non-empty for a selfish miner's private chain.
    pub fn clear(&mut self) {
        self.chain.clear();
        self.fork_block_id = None;
    }

    /// Truncates this chain back to the attacker's divergence point and
    /// appends the attacker's private chain, then resyncs `last_block_id` to
    /// the resulting chain length.
    ///
    /// # Panics
    /// Panics if `attacker.fork_block_id` is `None` — overriding requires a
    /// non-empty private chain with a recorded fork point.
    pub fn override_chain(&mut self, attacker: &Chain<B>, rule: OverrideRule) {
        let fork_id = attacker
            .fork_block_id
            .expect("override_chain requires an attacker with a recorded fork point");

        let cut_at = match rule {
            OverrideRule::Divergence => fork_id,
            OverrideRule::PostDivergence => fork_id.saturating_sub(1),
        };

        self.chain.truncate(cut_at);
        self.chain.extend(attacker.chain.iter().cloned());
        self.last_block_id = self.chain.len() as u64;
    }

    /// Restricts [`Chain::size`] to the suffix starting at `index`.
    pub fn size_from_index(&self, index: usize) -> usize {
        self.chain
            .get(index..)
            .map(|slice| slice.iter().filter(|b| !b.is_weak()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn block(miner: usize, weak: bool) -> Block {
        Block::new("data", format!("Miner {miner}"), miner, weak)
    }

    #[test]
    fn size_counts_strong_blocks_only() {
        let mut chain: Chain<Block> = Chain::new("public");
        chain.add_block(block(1, false));
        chain.add_block(block(1, true));
        chain.add_block(block(1, false));

        assert_eq!(chain.size(), 2);
        assert_eq!(chain.last_block_id, 3);
    }

    #[test]
    fn override_chain_post_divergence_genesis_edge_case() {
        let mut public: Chain<Block> = Chain::new("public");
        public.add_block(block(1, false));

        let mut private: Chain<Block> = Chain::new("1");
        private.initialize(0);
        private.add_block(block(1, false));
        private.add_block(block(1, false));

        public.override_chain(&private, OverrideRule::PostDivergence);
        assert_eq!(public.size(), 2);
        assert_eq!(public.last_block_id, 2);
    }

    #[test]
    fn override_chain_divergence_cuts_at_fork_index() {
        let mut public: Chain<Block> = Chain::new("public");
        public.add_block(block(0, false));
        public.add_block(block(0, false));

        let mut private: Chain<Block> = Chain::new("1");
        private.initialize(1);
        private.add_block(block(1, false));
        private.add_block(block(1, false));

        public.override_chain(&private, OverrideRule::Divergence);
        assert_eq!(public.chain.len(), 3);
        assert_eq!(public.chain[0].miner_id, 0);
        assert_eq!(public.chain[1].miner_id, 1);
    }

    #[test]
    fn clear_nulls_fork_block_id() {
        let mut private: Chain<Block> = Chain::new("1");
        private.initialize(2);
        private.add_block(block(1, false));
        assert!(private.fork_block_id.is_some());

        private.clear();
        assert!(private.fork_block_id.is_none());
        assert!(private.chain.is_empty());
    }
}
