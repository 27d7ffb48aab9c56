//! Block records shared by Nakamoto, Fruitchain and Subchain. Strongchain's
//! block (with its attached weak headers) lives in [`crate::strongchain`].

use crate::ids::MinerId;

/// A mined block. Identity is symbolic: `payload` is free-form text, not a
/// hash of anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub payload: String,
    pub miner_name: String,
    pub miner_id: MinerId,
    pub is_weak: bool,
}

impl Block {
    pub fn new(
        payload: impl Into<String>,
        miner_name: impl Into<String>,
        miner_id: MinerId,
        is_weak: bool,
    ) -> Self {
        Block {
            payload: payload.into(),
            miner_name: miner_name.into(),
            miner_id,
            is_weak,
        }
    }
}

/// Capability a block must provide for [`crate::chain::Chain`] bookkeeping.
pub trait ChainBlock: Clone + std::fmt::Debug {
    fn is_weak(&self) -> bool;
    fn miner_id(&self) -> MinerId;
}

impl ChainBlock for Block {
    fn is_weak(&self) -> bool {
        self.is_weak
    }

    fn miner_id(&self) -> MinerId {
        self.miner_id
    }
}
