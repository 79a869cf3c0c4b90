use std::marker::PhantomData;

use slab::Slab;

use crate::pool::meta::{MetaId, MetaTx, INVALID_INDEX};

/// Ordering side of an intrusive heap: which predicate roots the heap and
/// which back-reference field on [`MetaTx`] it maintains.
pub(crate) trait HeapOrd {
    fn less(arena: &Slab<MetaTx>, a: MetaId, b: MetaId, pending_base_fee: u64) -> bool;
    fn set_pos(arena: &mut Slab<MetaTx>, id: MetaId, pos: usize);
    fn pos(arena: &Slab<MetaTx>, id: MetaId) -> usize;
}

/// Roots the heap at the best transaction; maintains `best_index`.
#[derive(Debug)]
pub(crate) struct BestOrd;

impl HeapOrd for BestOrd {
    #[inline]
    fn less(arena: &Slab<MetaTx>, a: MetaId, b: MetaId, pending_base_fee: u64) -> bool {
        arena[a].better(&arena[b], pending_base_fee)
    }

    #[inline]
    fn set_pos(arena: &mut Slab<MetaTx>, id: MetaId, pos: usize) {
        arena[id].best_index = pos;
    }

    #[inline]
    fn pos(arena: &Slab<MetaTx>, id: MetaId) -> usize {
        arena[id].best_index
    }
}

/// Roots the heap at the eviction candidate; maintains `worst_index`.
#[derive(Debug)]
pub(crate) struct WorstOrd;

impl HeapOrd for WorstOrd {
    #[inline]
    fn less(arena: &Slab<MetaTx>, a: MetaId, b: MetaId, pending_base_fee: u64) -> bool {
        arena[a].worse(&arena[b], pending_base_fee)
    }

    #[inline]
    fn set_pos(arena: &mut Slab<MetaTx>, id: MetaId, pos: usize) {
        arena[id].worst_index = pos;
    }

    #[inline]
    fn pos(arena: &Slab<MetaTx>, id: MetaId) -> usize {
        arena[id].worst_index
    }
}

/// Binary heap of arena handles with intrusive position indices.
///
/// Every swap writes the element's position back into the [`MetaTx`], so
/// `fix` and `remove` are O(log n) without a lookup map. The pending base
/// fee is part of the heap because the ordering predicates depend on it;
/// whoever changes it must re-heapify.
#[derive(Debug)]
pub(crate) struct Heap<K> {
    ids: Vec<MetaId>,
    pub(crate) pending_base_fee: u64,
    _ord: PhantomData<K>,
}

pub(crate) type BestQueue = Heap<BestOrd>;
pub(crate) type WorstQueue = Heap<WorstOrd>;

impl<K> Default for Heap<K> {
    fn default() -> Self {
        Self { ids: Vec::new(), pending_base_fee: 0, _ord: PhantomData }
    }
}

impl<K: HeapOrd> Heap<K> {
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn peek(&self) -> Option<MetaId> {
        self.ids.first().copied()
    }

    pub(crate) fn push(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        let pos = self.ids.len();
        self.ids.push(id);
        K::set_pos(arena, id, pos);
        self.up(arena, pos);
    }

    pub(crate) fn pop(&mut self, arena: &mut Slab<MetaTx>) -> Option<MetaId> {
        if self.ids.is_empty() {
            return None;
        }
        let last = self.ids.len() - 1;
        self.swap(arena, 0, last);
        let id = self.ids.pop().expect("checked non-empty");
        K::set_pos(arena, id, INVALID_INDEX);
        if !self.ids.is_empty() {
            self.down(arena, 0);
        }
        Some(id)
    }

    /// Removes the element currently at heap position `pos`.
    pub(crate) fn remove(&mut self, arena: &mut Slab<MetaTx>, pos: usize) -> MetaId {
        let last = self.ids.len() - 1;
        if pos != last {
            self.swap(arena, pos, last);
        }
        let id = self.ids.pop().expect("remove on empty heap");
        K::set_pos(arena, id, INVALID_INDEX);
        if pos < self.ids.len() && !self.down(arena, pos) {
            self.up(arena, pos);
        }
        id
    }

    /// Removes a specific element via its intrusive index.
    pub(crate) fn remove_id(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) -> MetaId {
        let pos = K::pos(arena, id);
        debug_assert!(pos != INVALID_INDEX, "element not in heap");
        self.remove(arena, pos)
    }

    /// Restores heap order around an element whose key fields changed.
    pub(crate) fn fix(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        let pos = K::pos(arena, id);
        debug_assert!(pos != INVALID_INDEX, "element not in heap");
        if !self.down(arena, pos) {
            self.up(arena, pos);
        }
    }

    /// Re-establishes the heap invariant over all elements, e.g. after a
    /// bulk pass that rewrote markers without per-element fixes.
    pub(crate) fn heapify(&mut self, arena: &mut Slab<MetaTx>) {
        for pos in 0..self.ids.len() {
            let id = self.ids[pos];
            K::set_pos(arena, id, pos);
        }
        let n = self.ids.len();
        for i in (0..n / 2).rev() {
            self.down(arena, i);
        }
    }

    fn up(&mut self, arena: &mut Slab<MetaTx>, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !K::less(arena, self.ids[pos], self.ids[parent], self.pending_base_fee) {
                break;
            }
            self.swap(arena, pos, parent);
            pos = parent;
        }
    }

    fn down(&mut self, arena: &mut Slab<MetaTx>, start: usize) -> bool {
        let n = self.ids.len();
        let mut pos = start;
        loop {
            let left = 2 * pos + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && K::less(arena, self.ids[right], self.ids[left], self.pending_base_fee)
            {
                child = right;
            }
            if !K::less(arena, self.ids[child], self.ids[pos], self.pending_base_fee) {
                break;
            }
            self.swap(arena, pos, child);
            pos = child;
        }
        pos > start
    }

    fn swap(&mut self, arena: &mut Slab<MetaTx>, i: usize, j: usize) {
        self.ids.swap(i, j);
        K::set_pos(arena, self.ids[i], i);
        K::set_pos(arena, self.ids[j], j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pool::state::{SubPoolMarker, SubPoolType},
        test_utils::helpers::meta_tx_with,
    };

    fn insert(arena: &mut Slab<MetaTx>, fee_cap: u64, tip: u64) -> MetaId {
        let mut mt = meta_tx_with(fee_cap, tip, SubPoolType::BaseFee);
        mt.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        arena.insert(mt)
    }

    #[test]
    fn test_best_heap_pops_highest_fee_cap_first() {
        let mut arena = Slab::new();
        let mut best = BestQueue::default();

        let low = insert(&mut arena, 10, 1);
        let high = insert(&mut arena, 30, 1);
        let mid = insert(&mut arena, 20, 1);
        for id in [low, high, mid] {
            best.push(&mut arena, id);
        }

        assert_eq!(best.peek(), Some(high));
        assert_eq!(best.pop(&mut arena), Some(high));
        assert_eq!(best.pop(&mut arena), Some(mid));
        assert_eq!(best.pop(&mut arena), Some(low));
        assert_eq!(best.pop(&mut arena), None);
        assert_eq!(arena[high].best_index, INVALID_INDEX);
    }

    #[test]
    fn test_worst_heap_pops_lowest_first() {
        let mut arena = Slab::new();
        let mut worst = WorstQueue::default();

        // pending-side demotion order is by absolute minimum fee cap
        let mut low = meta_tx_with(10, 1, SubPoolType::Pending);
        low.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        let mut high = meta_tx_with(30, 1, SubPoolType::Pending);
        high.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        let low = arena.insert(low);
        let high = arena.insert(high);
        worst.push(&mut arena, high);
        worst.push(&mut arena, low);

        assert_eq!(worst.pop(&mut arena), Some(low));
        assert_eq!(worst.pop(&mut arena), Some(high));
    }

    #[test]
    fn test_positions_track_swaps() {
        let mut arena = Slab::new();
        let mut best = BestQueue::default();

        let ids: Vec<_> = (1..=5).map(|i| insert(&mut arena, i * 10, 1)).collect();
        for &id in &ids {
            best.push(&mut arena, id);
        }
        for pos in 0..best.len() {
            let id = best.ids[pos];
            assert_eq!(arena[id].best_index, pos);
        }
    }

    #[test]
    fn test_remove_id_keeps_heap_valid() {
        let mut arena = Slab::new();
        let mut best = BestQueue::default();

        let ids: Vec<_> = (1..=6).map(|i| insert(&mut arena, i * 10, 1)).collect();
        for &id in &ids {
            best.push(&mut arena, id);
        }

        // remove a middle element
        best.remove_id(&mut arena, ids[2]);
        assert_eq!(arena[ids[2]].best_index, INVALID_INDEX);

        let mut popped = Vec::new();
        while let Some(id) = best.pop(&mut arena) {
            popped.push(arena[id].min_fee_cap);
        }
        assert_eq!(popped, vec![60, 50, 40, 20, 10]);
    }

    #[test]
    fn test_fix_after_key_change() {
        let mut arena = Slab::new();
        let mut best = BestQueue::default();

        let a = insert(&mut arena, 10, 1);
        let b = insert(&mut arena, 20, 1);
        best.push(&mut arena, a);
        best.push(&mut arena, b);
        assert_eq!(best.peek(), Some(b));

        arena[a].min_fee_cap = 50;
        best.fix(&mut arena, a);
        assert_eq!(best.peek(), Some(a));
    }

    #[test]
    fn test_heapify_after_bulk_rewrite() {
        let mut arena = Slab::new();
        let mut worst = WorstQueue::default();

        let ids: Vec<_> = (1..=4).map(|i| insert(&mut arena, i * 10, 1)).collect();
        for &id in &ids {
            worst.push(&mut arena, id);
        }

        // bulk-degrade the best element without fixing incrementally
        arena[ids[3]].sub_pool = SubPoolMarker::QUEUED_POOL_BITS;
        worst.heapify(&mut arena);
        assert_eq!(worst.peek(), Some(ids[3]));
    }
}
