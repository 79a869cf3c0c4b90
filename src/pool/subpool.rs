use alloy_primitives::B256;
use slab::Slab;
use tracing::info;

use crate::pool::{
    meta::{MetaId, MetaTx},
    queues::{BestQueue, WorstQueue},
    state::SubPoolType,
};

/// Parked sub-pool (BaseFee or Queued): twin heaps give O(1) peeks at both
/// the best promotion candidate and the worst eviction candidate, with
/// O(log n) add/remove/update through the intrusive indices.
#[derive(Debug)]
pub(crate) struct SubPool {
    kind: SubPoolType,
    limit: usize,
    pub(crate) best: BestQueue,
    pub(crate) worst: WorstQueue,
    adding: bool,
    added: Vec<B256>,
}

impl SubPool {
    pub(crate) fn new(kind: SubPoolType, limit: usize) -> Self {
        Self {
            kind,
            limit,
            best: BestQueue::default(),
            worst: WorstQueue::default(),
            adding: false,
            added: Vec::new(),
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn len(&self) -> usize {
        self.best.len()
    }

    pub(crate) fn reset_added_hashes(&mut self) {
        self.added.clear();
        self.adding = true;
    }

    pub(crate) fn append_added_hashes(&mut self, out: &mut Vec<B256>) {
        out.append(&mut self.added);
        self.adding = false;
    }

    pub(crate) fn best(&self) -> Option<MetaId> {
        self.best.peek()
    }

    pub(crate) fn worst(&self) -> Option<MetaId> {
        self.worst.peek()
    }

    pub(crate) fn pop_best(&mut self, arena: &mut Slab<MetaTx>) -> Option<MetaId> {
        let id = self.best.pop(arena)?;
        self.worst.remove_id(arena, id);
        arena[id].current_sub_pool = SubPoolType::None;
        Some(id)
    }

    pub(crate) fn pop_worst(&mut self, arena: &mut Slab<MetaTx>) -> Option<MetaId> {
        let id = self.worst.pop(arena)?;
        self.best.remove_id(arena, id);
        arena[id].current_sub_pool = SubPoolType::None;
        Some(id)
    }

    pub(crate) fn add(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        let mt = &mut arena[id];
        mt.current_sub_pool = self.kind;
        if self.adding {
            self.added.push(mt.tx.id_hash);
        }
        if mt.tx.traced {
            info!(target: "txpool",
                id_hash = %mt.tx.id_hash, sender = %mt.tx.sender_id, pool = %self.kind,
                "moved to sub-pool");
        }
        self.best.push(arena, id);
        self.worst.push(arena, id);
    }

    pub(crate) fn remove(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        self.best.remove_id(arena, id);
        self.worst.remove_id(arena, id);
        arena[id].current_sub_pool = SubPoolType::None;
    }

    pub(crate) fn updated(&mut self, arena: &mut Slab<MetaTx>, id: MetaId) {
        self.best.fix(arena, id);
        self.worst.fix(arena, id);
    }

    pub(crate) fn enforce_invariants(&mut self, arena: &mut Slab<MetaTx>) {
        self.best.heapify(arena);
        self.worst.heapify(arena);
    }

    pub(crate) fn set_pending_base_fee(&mut self, pending_base_fee: u64) {
        self.best.pending_base_fee = pending_base_fee;
        self.worst.pending_base_fee = pending_base_fee;
    }
}
