//! Action tags and the store that tracks which selfish miners currently hold
//! which action, per round.

use crate::ids::MinerId;

/// Action taken by the honest miner when it is elected round leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HonestAction {
    Publish,
}

/// Action taken by a selfish miner, either as round leader or during
/// re-evaluation after a block lands on the public chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelfishAction {
    Idle,
    Adopt,
    Wait,
    Override,
    Match,
}

/// Ordered multimap from [`SelfishAction`] to the set of selfish miners
/// currently holding that action.
///
/// Mirrors the model's `ActionObjectStore`: insertion order is preserved,
/// `remove` is a no-op unless the pair is present, and `actions()` returns
/// every tag added (with multiplicity), matching the "do-while" idiom the
/// override resolution loop relies on (`SA.OVERRIDE in all_actions`).
#[derive(Debug, Clone, Default)]
pub struct ActionStore {
    entries: Vec<(SelfishAction, MinerId)>,
}

impl ActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: SelfishAction, miner: MinerId) {
        self.entries.push((action, miner));
    }

    /// Removes the first `(action, miner)` pair found. Idempotent: returns
    /// `false` and does nothing if the pair is not present.
    pub fn remove(&mut self, action: SelfishAction, miner: MinerId) -> bool {
        if let Some(pos) =
            self.entries.iter().position(|&(a, m)| a == action && m == miner)
        {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Stable list of miners currently holding `action`.
    pub fn objects(&self, action: SelfishAction) -> Vec<MinerId> {
        self.entries
            .iter()
            .filter(|&&(a, _)| a == action)
            .map(|&(_, m)| m)
            .collect()
    }

    /// Every action tag added this round, with multiplicity.
    pub fn actions(&self) -> Vec<SelfishAction> {
        self.entries.iter().map(|&(a, _)| a).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
