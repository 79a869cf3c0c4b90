use std::sync::Arc;

use alloy_primitives::Bytes;

use crate::{
    pool::state::{SubPoolMarker, SubPoolType},
    types::TxSlot,
};

/// Stable handle of a [`MetaTx`] in the pool's slab arena. The nonce index,
/// the hash map and the sub-pool queues all refer to the envelope through
/// this handle, so the envelope never moves while heaps hold positions into
/// it.
pub(crate) type MetaId = usize;

/// Sentinel for "not currently in this queue".
pub(crate) const INVALID_INDEX: usize = usize::MAX;

/// Mutable envelope around an immutable [`TxSlot`].
///
/// Exclusively owned by the pool engine; referenced by exactly one nonce
/// index slot, at most one sub-pool and the by-hash map. The ephemeral
/// fields are rewritten by every reclassification pass for the sender.
#[derive(Debug)]
pub(crate) struct MetaTx {
    pub(crate) tx: Arc<TxSlot>,
    /// Encoded form, owned here until persisted, then dropped.
    pub(crate) rlp: Option<Bytes>,
    /// Eligibility marker; see [`SubPoolMarker`].
    pub(crate) sub_pool: SubPoolMarker,
    /// `max(0, nonce - state_nonce)`.
    pub(crate) nonce_distance: u64,
    /// Shortfall of the cumulative required balance vs the state balance,
    /// clamped to u64.
    pub(crate) cumulative_balance_distance: u64,
    /// Minimum fee cap over all same-sender transactions up to this nonce.
    pub(crate) min_fee_cap: u64,
    /// Minimum tip over all same-sender transactions up to this nonce.
    pub(crate) min_tip: u64,
    /// Position in the current sub-pool's best structure.
    pub(crate) best_index: usize,
    /// Position in the current sub-pool's worst heap.
    pub(crate) worst_index: usize,
    pub(crate) current_sub_pool: SubPoolType,
    /// Block number at insertion; FIFO tiebreaker.
    pub(crate) timestamp: u64,
}

impl MetaTx {
    pub(crate) fn new(tx: Arc<TxSlot>, rlp: Bytes, is_local: bool, timestamp: u64) -> Self {
        let mut sub_pool = SubPoolMarker::empty();
        if is_local {
            sub_pool = SubPoolMarker::IS_LOCAL;
        }
        Self {
            tx,
            rlp: Some(rlp),
            sub_pool,
            nonce_distance: 0,
            cumulative_balance_distance: 0,
            min_fee_cap: 0,
            min_tip: 0,
            best_index: INVALID_INDEX,
            worst_index: INVALID_INDEX,
            current_sub_pool: SubPoolType::None,
            timestamp,
        }
    }

    /// Effective marker at comparison time: the stored bits with the
    /// block-fee bit recomputed from the pending base fee.
    #[inline]
    fn effective_marker(&self, pending_base_fee: u64) -> u8 {
        let mut bits = self.sub_pool.bits();
        if self.min_fee_cap >= pending_base_fee {
            bits |= SubPoolMarker::ENOUGH_FEE_CAP_BLOCK.bits();
        }
        bits
    }

    /// Best-first ordering predicate.
    ///
    /// Higher effective marker wins; ties dispatch on the current sub-pool:
    /// pending compares effective tips, base-fee compares minimum fee caps,
    /// queued prefers the transaction closest to becoming executable.
    /// Final tie goes to the earlier insertion block.
    pub(crate) fn better(&self, than: &MetaTx, pending_base_fee: u64) -> bool {
        let sub_pool = self.effective_marker(pending_base_fee);
        let than_sub_pool = than.effective_marker(pending_base_fee);
        if sub_pool != than_sub_pool {
            return sub_pool > than_sub_pool;
        }

        match self.current_sub_pool {
            SubPoolType::Pending => {
                let effective_tip = if pending_base_fee <= self.min_fee_cap {
                    (self.min_fee_cap - pending_base_fee).min(self.min_tip)
                } else {
                    0
                };
                let than_effective_tip = if pending_base_fee <= than.min_fee_cap {
                    (than.min_fee_cap - pending_base_fee).min(than.min_tip)
                } else {
                    0
                };
                if effective_tip != than_effective_tip {
                    return effective_tip > than_effective_tip;
                }
            }
            SubPoolType::BaseFee => {
                if self.min_fee_cap != than.min_fee_cap {
                    return self.min_fee_cap > than.min_fee_cap;
                }
            }
            SubPoolType::Queued => {
                if self.nonce_distance != than.nonce_distance {
                    return self.nonce_distance < than.nonce_distance;
                }
                if self.cumulative_balance_distance != than.cumulative_balance_distance {
                    return self.cumulative_balance_distance < than.cumulative_balance_distance;
                }
            }
            SubPoolType::None => {}
        }
        self.timestamp < than.timestamp
    }

    /// Worst-first ordering predicate; a worst heap popping this first
    /// yields the eviction candidate.
    ///
    /// Not the exact mirror of [`Self::better`]: the pending branch demotes
    /// by absolute minimum fee cap so that the transactions most exposed to
    /// a base-fee rise leave first.
    pub(crate) fn worse(&self, than: &MetaTx, pending_base_fee: u64) -> bool {
        let sub_pool = self.effective_marker(pending_base_fee);
        let than_sub_pool = than.effective_marker(pending_base_fee);
        if sub_pool != than_sub_pool {
            return sub_pool < than_sub_pool;
        }

        match self.current_sub_pool {
            SubPoolType::Pending => {
                if self.min_fee_cap != than.min_fee_cap {
                    return self.min_fee_cap < than.min_fee_cap;
                }
                if self.nonce_distance != than.nonce_distance {
                    return self.nonce_distance > than.nonce_distance;
                }
                if self.cumulative_balance_distance != than.cumulative_balance_distance {
                    return self.cumulative_balance_distance > than.cumulative_balance_distance;
                }
            }
            SubPoolType::BaseFee | SubPoolType::Queued => {
                if self.nonce_distance != than.nonce_distance {
                    return self.nonce_distance > than.nonce_distance;
                }
                if self.cumulative_balance_distance != than.cumulative_balance_distance {
                    return self.cumulative_balance_distance > than.cumulative_balance_distance;
                }
            }
            SubPoolType::None => {}
        }
        self.timestamp > than.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::meta_tx_with;

    #[test]
    fn test_better_prefers_higher_marker() {
        let mut a = meta_tx_with(100, 10, SubPoolType::Pending);
        let mut b = meta_tx_with(100, 10, SubPoolType::Pending);
        a.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        b.sub_pool = SubPoolMarker::QUEUED_POOL_BITS;

        assert!(a.better(&b, 0));
        assert!(!b.better(&a, 0));
        assert!(b.worse(&a, 0));
    }

    #[test]
    fn test_virtual_block_fee_bit_flips_order() {
        let mut a = meta_tx_with(50, 10, SubPoolType::Pending);
        let mut b = meta_tx_with(100, 10, SubPoolType::Pending);
        a.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        b.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;

        // Base fee below both caps: equal effective markers, `a` loses on
        // effective tip only if tips differ; both have tip 10 -> timestamp.
        a.timestamp = 1;
        b.timestamp = 2;
        assert!(a.better(&b, 40));

        // Base fee between the caps: only `b` gains the virtual bit.
        assert!(b.better(&a, 60));
        assert!(a.worse(&b, 60));
    }

    #[test]
    fn test_pending_orders_by_effective_tip() {
        let mut a = meta_tx_with(100, 30, SubPoolType::Pending);
        let mut b = meta_tx_with(100, 20, SubPoolType::Pending);
        a.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        b.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;

        // effective tip = min(fee_cap - base_fee, tip) = min(90, 30) vs min(90, 20)
        assert!(a.better(&b, 10));

        // base fee so high the caps saturate both tips to the cap distance
        // min(100-95, 30) = 5 for both -> FIFO on timestamp
        a.timestamp = 2;
        b.timestamp = 1;
        assert!(b.better(&a, 95));
    }

    #[test]
    fn test_queued_orders_by_nonce_distance() {
        let mut a = meta_tx_with(100, 10, SubPoolType::Queued);
        let mut b = meta_tx_with(100, 10, SubPoolType::Queued);
        a.sub_pool = SubPoolMarker::QUEUED_POOL_BITS;
        b.sub_pool = SubPoolMarker::QUEUED_POOL_BITS;
        a.nonce_distance = 1;
        b.nonce_distance = 3;

        assert!(a.better(&b, 0));
        assert!(b.worse(&a, 0));

        b.nonce_distance = 1;
        a.cumulative_balance_distance = 10;
        b.cumulative_balance_distance = 20;
        assert!(a.better(&b, 0));
    }

    #[test]
    fn test_pending_worse_uses_absolute_fee_cap() {
        let mut a = meta_tx_with(50, 40, SubPoolType::Pending);
        let mut b = meta_tx_with(60, 10, SubPoolType::Pending);
        a.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;
        b.sub_pool = SubPoolMarker::BASE_FEE_POOL_BITS;

        // a has the better effective tip at base fee 10 (min(40,40)=40 vs
        // min(50,10)=10) but the lower cap, so it is still the first to go.
        assert!(a.better(&b, 10));
        assert!(a.worse(&b, 10));
    }
}
