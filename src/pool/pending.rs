use std::cmp::Ordering;

use alloy_primitives::B256;
use slab::Slab;
use tracing::info;

use crate::pool::{
    meta::{MetaId, MetaTx, INVALID_INDEX},
    queues::WorstQueue,
    state::SubPoolType,
};

/// Best-first view of the pending pool kept as a sorted slice rather than a
/// heap: `best()` peeks at index 0, and the mining snapshot walks the slice
/// front-to-back without disturbing anything. Full sorts happen once per
/// batch via [`PendingPool::enforce_best_invariants`].
#[derive(Debug, Default)]
pub(crate) struct BestSlice {
    ids: Vec<MetaId>,
    pub(crate) pending_base_fee: u64,
}

impl BestSlice {
    /// Appends without restoring order; the caller re-sorts at the end of
    /// the batch.
    fn unsafe_add(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        arena[id].best_index = self.ids.len();
        self.ids.push(id);
    }

    /// Removes without restoring order.
    fn unsafe_remove(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        let pos = arena[id].best_index;
        debug_assert!(pos != INVALID_INDEX, "element not in best slice");
        self.ids.swap_remove(pos);
        if let Some(&moved) = self.ids.get(pos) {
            arena[moved].best_index = pos;
        }
        arena[id].best_index = INVALID_INDEX;
    }

    fn sort(&mut self, arena: &mut Slab<MetaTx>) {
        let base_fee = self.pending_base_fee;
        self.ids.sort_by(|&a, &b| {
            if arena[a].better(&arena[b], base_fee) {
                Ordering::Less
            } else if arena[b].better(&arena[a], base_fee) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        for pos in 0..self.ids.len() {
            let id = self.ids[pos];
            arena[id].best_index = pos;
        }
    }
}

/// The pending sub-pool: transactions executable on the current state,
/// ordered best-first for mining and worst-first for eviction.
#[derive(Debug)]
pub(crate) struct PendingPool {
    limit: usize,
    pub(crate) best: BestSlice,
    pub(crate) worst: WorstQueue,
    adding: bool,
    added: Vec<B256>,
}

impl PendingPool {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            best: BestSlice::default(),
            worst: WorstQueue::default(),
            adding: false,
            added: Vec::new(),
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn len(&self) -> usize {
        self.best.ids.len()
    }

    /// Starts recording the hashes of transactions added until the next
    /// [`Self::append_added_hashes`].
    pub(crate) fn reset_added_hashes(&mut self) {
        self.added.clear();
        self.adding = true;
    }

    pub(crate) fn append_added_hashes(&mut self, out: &mut Vec<B256>) {
        out.append(&mut self.added);
        self.adding = false;
    }

    pub(crate) fn best(&self) -> Option<MetaId> {
        self.best.ids.first().copied()
    }

    /// Best-first snapshot order. Only valid between batches, after
    /// [`Self::enforce_best_invariants`].
    pub(crate) fn best_ids(&self) -> &[MetaId] {
        &self.best.ids
    }

    pub(crate) fn worst(&self) -> Option<MetaId> {
        self.worst.peek()
    }

    pub(crate) fn pop_worst(&mut self, arena: &mut Slab<MetaTx>) -> Option<MetaId> {
        let id = self.worst.pop(arena)?;
        self.best.unsafe_remove(arena, id);
        arena[id].current_sub_pool = SubPoolType::None;
        Some(id)
    }

    pub(crate) fn add(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        let mt = &mut arena[id];
        mt.current_sub_pool = SubPoolType::Pending;
        if self.adding {
            self.added.push(mt.tx.id_hash);
        }
        if mt.tx.traced {
            info!(target: "txpool",
                id_hash = %mt.tx.id_hash, sender = %mt.tx.sender_id, "moved to sub-pool Pending");
        }
        self.worst.push(arena, id);
        self.best.unsafe_add(arena, id);
    }

    pub(crate) fn remove(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        self.worst.remove_id(arena, id);
        self.best.unsafe_remove(arena, id);
        arena[id].current_sub_pool = SubPoolType::None;
    }

    /// Re-fixes the worst heap around an element whose ephemeral fields
    /// changed. The best slice is only repaired by the batch-end sort.
    pub(crate) fn updated(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        self.worst.fix(arena, id);
    }

    pub(crate) fn enforce_best_invariants(&mut self, arena: &mut Slab<MetaTx>) {
        self.best.sort(arena);
    }

    pub(crate) fn enforce_worst_invariants(&mut self, arena: &mut Slab<MetaTx>) {
        self.worst.heapify(arena);
    }

    pub(crate) fn set_pending_base_fee(&mut self, pending_base_fee: u64) {
        self.best.pending_base_fee = pending_base_fee;
        self.worst.pending_base_fee = pending_base_fee;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pool::state::SubPoolMarker, test_utils::helpers::meta_tx_with};

    fn pending_meta(arena: &mut Slab<MetaTx>, fee_cap: u64, tip: u64) -> MetaId {
        let mut mt = meta_tx_with(fee_cap, tip, SubPoolType::Pending);
        mt.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        arena.insert(mt)
    }

    #[test]
    fn test_best_slice_order_after_enforce() {
        let mut arena = Slab::new();
        let mut pool = PendingPool::new(100);

        let mid = pending_meta(&mut arena, 50, 5);
        let top = pending_meta(&mut arena, 50, 9);
        let low = pending_meta(&mut arena, 50, 1);
        for id in [mid, top, low] {
            pool.add(&mut arena, id);
        }
        pool.enforce_best_invariants(&mut arena);

        assert_eq!(pool.best(), Some(top));
        assert_eq!(pool.best_ids(), &[top, mid, low]);
        assert_eq!(arena[top].best_index, 0);
        assert_eq!(arena[low].best_index, 2);
    }

    #[test]
    fn test_pop_worst_leaves_both_views_consistent() {
        let mut arena = Slab::new();
        let mut pool = PendingPool::new(100);

        let a = pending_meta(&mut arena, 10, 1);
        let b = pending_meta(&mut arena, 30, 3);
        pool.add(&mut arena, a);
        pool.add(&mut arena, b);

        let popped = pool.pop_worst(&mut arena).unwrap();
        assert_eq!(popped, a);
        assert_eq!(arena[a].current_sub_pool, SubPoolType::None);
        assert_eq!(arena[a].best_index, INVALID_INDEX);
        assert_eq!(arena[a].worst_index, INVALID_INDEX);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_added_hash_tracking() {
        let mut arena = Slab::new();
        let mut pool = PendingPool::new(100);

        let before = pending_meta(&mut arena, 10, 1);
        pool.add(&mut arena, before);

        pool.reset_added_hashes();
        let tracked = pending_meta(&mut arena, 20, 2);
        pool.add(&mut arena, tracked);

        let mut out = Vec::new();
        pool.append_added_hashes(&mut out);
        assert_eq!(out, vec![arena[tracked].tx.id_hash]);

        // not recording outside a reset/append window
        let after = pending_meta(&mut arena, 30, 3);
        pool.add(&mut arena, after);
        let mut out = Vec::new();
        pool.append_added_hashes(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_remove_middle_element() {
        let mut arena = Slab::new();
        let mut pool = PendingPool::new(100);

        let ids: Vec<_> = (1..=4).map(|i| pending_meta(&mut arena, i * 10, i)).collect();
        for &id in &ids {
            pool.add(&mut arena, id);
        }
        pool.remove(&mut arena, ids[1]);
        pool.enforce_best_invariants(&mut arena);

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.best(), Some(ids[3]));
        assert!(!pool.best_ids().contains(&ids[1]));
    }
}
