use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::info;

use crate::{
    identifiers::SenderId,
    pool::{
        meta::MetaId,
        state::{SubPoolMarker, SubPoolType},
        PoolInner,
    },
    result::DiscardReason,
    senders::SenderInfo,
    types::TxSlot,
};

impl PoolInner {
    /// Recalculates the ephemeral fields of every transaction of one sender
    /// after its account state changed, walking the nonce index in ascending
    /// order with running accumulators for gaps, cumulative cost and fee
    /// minima.
    ///
    /// With `unsafe_pass` set the per-element heap fixes are skipped; the
    /// caller re-establishes all heap invariants in one pass afterwards.
    pub(crate) fn on_sender_state_change(
        &mut self,
        sender: SenderId,
        info: &SenderInfo,
        protocol_base_fee: u64,
        block_gas_limit: u64,
        unsafe_pass: bool,
    ) {
        let mut no_gaps_nonce = info.nonce;
        let mut cumulative_required_balance = U256::ZERO;
        let mut min_fee_cap = u64::MAX;
        let mut min_tip = u64::MAX;
        let mut to_del: Vec<MetaId> = Vec::new();

        let walk: Vec<MetaId> = self.all.ascend(sender).map(|(_, id)| id).collect();
        for id in walk {
            let tx_nonce = self.arena[id].tx.nonce;
            if info.nonce > tx_nonce {
                if self.arena[id].tx.traced {
                    info!(target: "txpool",
                        id_hash = %self.arena[id].tx.id_hash, sender = %sender,
                        state_nonce = info.nonce, tx_nonce,
                        "reclassify: removing due to low nonce");
                }
                self.remove_from_current(id);
                to_del.push(id);
                continue;
            }

            {
                let mt = &mut self.arena[id];
                min_fee_cap = min_fee_cap.min(mt.tx.fee_cap);
                mt.min_fee_cap = min_fee_cap;
                min_tip = min_tip.min(mt.tx.tip);
                mt.min_tip = min_tip;
                mt.nonce_distance = tx_nonce - info.nonce;

                mt.sub_pool.remove(SubPoolMarker::ENOUGH_FEE_CAP_PROTOCOL);
                if mt.min_fee_cap >= protocol_base_fee {
                    mt.sub_pool.insert(SubPoolMarker::ENOUGH_FEE_CAP_PROTOCOL);

                    mt.sub_pool.remove(SubPoolMarker::NO_NONCE_GAPS);
                    if no_gaps_nonce == tx_nonce {
                        mt.sub_pool.insert(SubPoolMarker::NO_NONCE_GAPS);
                        no_gaps_nonce += 1;
                    }

                    // Sender must cover gas * fee_cap + value of this and
                    // every prior pooled transaction.
                    mt.sub_pool.remove(SubPoolMarker::ENOUGH_BALANCE);
                    mt.cumulative_balance_distance = u64::MAX;
                    let need_balance =
                        U256::from(mt.tx.gas) * U256::from(mt.tx.fee_cap) + mt.tx.value;
                    cumulative_required_balance += need_balance;
                    if info.balance >= cumulative_required_balance {
                        mt.sub_pool.insert(SubPoolMarker::ENOUGH_BALANCE);
                    } else {
                        let shortfall = cumulative_required_balance - info.balance;
                        mt.cumulative_balance_distance =
                            u64::try_from(shortfall).unwrap_or(u64::MAX);
                    }

                    mt.sub_pool.remove(SubPoolMarker::NOT_TOO_MUCH_GAS);
                    if mt.tx.gas < block_gas_limit {
                        mt.sub_pool.insert(SubPoolMarker::NOT_TOO_MUCH_GAS);
                    }
                } else {
                    // Below the protocol floor this transaction can never
                    // execute here; the promoter evicts it through the
                    // queued-pool floor on this same pass.
                    mt.sub_pool = SubPoolMarker::empty();
                }

                if mt.tx.traced {
                    info!(target: "txpool",
                        id_hash = %mt.tx.id_hash, sender = %sender,
                        marker = ?mt.sub_pool, current = %mt.current_sub_pool,
                        "reclassify: recomputed marker");
                }
            }

            if !unsafe_pass {
                let pool = self.arena[id].current_sub_pool;
                match pool {
                    SubPoolType::Pending => self.pending.updated(&mut self.arena, id),
                    SubPoolType::BaseFee => self.base_fee.updated(&mut self.arena, id),
                    SubPoolType::Queued => self.queued.updated(&mut self.arena, id),
                    SubPoolType::None => {}
                }
            }
        }

        for id in to_del {
            self.discard_locked(id, DiscardReason::NonceTooLow);
        }
    }

    /// Restores sub-pool membership and capacity in six ordered phases.
    /// After phases 1-5 every element sits in the pool its marker demands;
    /// phase 6 only trims size.
    pub(crate) fn promote(&mut self, pending_base_fee: u64) {
        // Demote worst pending transactions that no longer qualify
        while let Some(worst) = self.pending.worst() {
            let (marker, min_fee_cap) = {
                let mt = &self.arena[worst];
                (mt.sub_pool, mt.min_fee_cap)
            };
            if marker.at_least(SubPoolMarker::BASE_FEE_POOL_BITS)
                && min_fee_cap >= pending_base_fee
            {
                break;
            }
            let id = self.pending.pop_worst(&mut self.arena).expect("peeked non-empty");
            if marker.at_least(SubPoolMarker::BASE_FEE_POOL_BITS) {
                self.base_fee.add(&mut self.arena, id);
            } else if marker.at_least(SubPoolMarker::QUEUED_POOL_BITS) {
                self.queued.add(&mut self.arena, id);
            } else {
                self.discard_locked(id, DiscardReason::FeeTooLow);
            }
        }

        // Promote best base-fee transactions that meet the pending base fee
        while let Some(best) = self.base_fee.best() {
            let (marker, min_fee_cap) = {
                let mt = &self.arena[best];
                (mt.sub_pool, mt.min_fee_cap)
            };
            if !marker.at_least(SubPoolMarker::BASE_FEE_POOL_BITS)
                || min_fee_cap < pending_base_fee
            {
                break;
            }
            let id = self.base_fee.pop_best(&mut self.arena).expect("peeked non-empty");
            self.pending.add(&mut self.arena, id);
        }

        // Demote worst base-fee transactions to queued, or discard
        while let Some(worst) = self.base_fee.worst() {
            let marker = self.arena[worst].sub_pool;
            if marker.at_least(SubPoolMarker::BASE_FEE_POOL_BITS) {
                break;
            }
            let id = self.base_fee.pop_worst(&mut self.arena).expect("peeked non-empty");
            if marker.at_least(SubPoolMarker::QUEUED_POOL_BITS) {
                self.queued.add(&mut self.arena, id);
            } else {
                self.discard_locked(id, DiscardReason::FeeTooLow);
            }
        }

        // Promote best queued transactions to pending or base-fee
        while let Some(best) = self.queued.best() {
            let (marker, min_fee_cap) = {
                let mt = &self.arena[best];
                (mt.sub_pool, mt.min_fee_cap)
            };
            if !marker.at_least(SubPoolMarker::BASE_FEE_POOL_BITS) {
                break;
            }
            let id = self.queued.pop_best(&mut self.arena).expect("peeked non-empty");
            if min_fee_cap >= pending_base_fee {
                self.pending.add(&mut self.arena, id);
            } else {
                self.base_fee.add(&mut self.arena, id);
            }
        }

        // Discard queued transactions below the queued-pool floor
        while let Some(worst) = self.queued.worst() {
            if self.arena[worst].sub_pool.at_least(SubPoolMarker::QUEUED_POOL_BITS) {
                break;
            }
            let id = self.queued.pop_worst(&mut self.arena).expect("peeked non-empty");
            self.discard_locked(id, DiscardReason::FeeTooLow);
        }

        // Capacity enforcement only from here on
        while self.pending.len() > self.pending.limit() {
            let id = self.pending.pop_worst(&mut self.arena).expect("over limit");
            self.discard_locked(id, DiscardReason::PendingPoolOverflow);
        }
        while self.base_fee.len() > self.base_fee.limit() {
            let id = self.base_fee.pop_worst(&mut self.arena).expect("over limit");
            self.discard_locked(id, DiscardReason::BaseFeePoolOverflow);
        }
        while self.queued.len() > self.queued.limit() {
            let id = self.queued.pop_worst(&mut self.arena).expect("over limit");
            self.discard_locked(id, DiscardReason::QueuedPoolOverflow);
        }
    }

    /// Deletes every pooled transaction a new block included: for each
    /// mined sender, all entries up to the highest mined nonce.
    pub(crate) fn remove_mined(&mut self, mined_txs: &[TxSlot]) {
        let mut nonces_to_remove: HashMap<SenderId, u64> = HashMap::new();
        for txn in mined_txs {
            let nonce = nonces_to_remove.entry(txn.sender_id).or_insert(txn.nonce);
            if txn.nonce > *nonce {
                *nonce = txn.nonce;
            }
        }

        for (sender, nonce) in nonces_to_remove {
            let to_del: Vec<MetaId> = self
                .all
                .ascend(sender)
                .take_while(|(id, _)| id.nonce <= nonce)
                .map(|(_, mt)| mt)
                .collect();
            for id in to_del {
                if self.arena[id].tx.traced {
                    info!(target: "txpool",
                        id_hash = %self.arena[id].tx.id_hash, sender = %sender,
                        current = %self.arena[id].current_sub_pool,
                        "removing mined transaction");
                }
                self.remove_from_current(id);
                self.discard_locked(id, DiscardReason::Mined);
            }
        }
    }
}
