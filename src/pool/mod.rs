pub(crate) mod all;
pub(crate) mod meta;
pub(crate) mod pending;
pub(crate) mod queues;
pub mod state;
pub(crate) mod subpool;
pub(crate) mod update;

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, Bytes, B256};
use lru::LruCache;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use slab::Slab;
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    config::Config,
    identifiers::{SenderId, TransactionId},
    kv::{Bucket, KvRead},
    pool::{
        all::NonceIndex,
        meta::{MetaId, MetaTx},
        pending::PendingPool,
        state::{SubPoolMarker, SubPoolType},
        subpool::SubPool,
    },
    result::{DiscardReason, PoolError, PoolResult},
    senders::{SenderInfo, SenderRegistry, StateError, StateView},
    types::{BestTx, PeerId, RecentlyConnectedPeers, StateChangeBatch, TxEnvelopeParser, TxSlot},
    validate::validate_tx,
};

/// Capacity of the discard-reason and local-history LRUs.
const LRU_CAPACITY: usize = 10_000;

/// Sender infos prefetched for one operation; fetching them before any
/// mutation keeps the mutation phase of every operation infallible.
pub(crate) type SenderInfos = HashMap<SenderId, SenderInfo>;

/// A discarded transaction awaiting deletion at the next persistence commit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeletedTx {
    pub(crate) sender: SenderId,
    pub(crate) id_hash: B256,
}

/// All mutable pool state, guarded by the engine's single RwLock.
pub(crate) struct PoolInner {
    pub(crate) arena: Slab<MetaTx>,
    /// Hash of every pooled transaction not yet committed to the db.
    pub(crate) by_hash: HashMap<B256, MetaId>,
    /// `(sender, nonce)` ordered index over all pooled transactions.
    pub(crate) all: NonceIndex,
    pub(crate) pending: PendingPool,
    pub(crate) base_fee: SubPool,
    pub(crate) queued: SubPool,
    pub(crate) senders: SenderRegistry,
    /// Remembers the local flag of recently seen transactions across reorgs.
    pub(crate) is_local_lru: LruCache<B256, ()>,
    /// Why a hash left the pool; answers late `add_local_txs` callers.
    pub(crate) discard_reasons_lru: LruCache<B256, DiscardReason>,
    /// Discards since the last successful commit.
    pub(crate) deleted_txs: Vec<DeletedTx>,
    /// Remote transactions buffered until the next processing tick.
    pub(crate) unprocessed_remote_txs: Vec<TxSlot>,
    pub(crate) unprocessed_remote_by_hash: HashMap<B256, usize>,
    pub(crate) peers: RecentlyConnectedPeers,
}

impl PoolInner {
    fn new(cfg: &Config) -> Self {
        let lru_capacity = NonZeroUsize::new(LRU_CAPACITY).expect("non-zero");
        Self {
            arena: Slab::new(),
            by_hash: HashMap::new(),
            all: NonceIndex::default(),
            pending: PendingPool::new(cfg.pending_sub_pool_limit),
            base_fee: SubPool::new(SubPoolType::BaseFee, cfg.base_fee_sub_pool_limit),
            queued: SubPool::new(SubPoolType::Queued, cfg.queued_sub_pool_limit),
            senders: SenderRegistry::new(&cfg.traced_senders),
            is_local_lru: LruCache::new(lru_capacity),
            discard_reasons_lru: LruCache::new(lru_capacity),
            deleted_txs: Vec::new(),
            unprocessed_remote_txs: Vec::new(),
            unprocessed_remote_by_hash: HashMap::new(),
            peers: RecentlyConnectedPeers::default(),
        }
    }

    pub(crate) fn sender_infos(
        &self,
        view: &dyn StateView,
        ids: impl IntoIterator<Item = SenderId>,
    ) -> Result<SenderInfos, StateError> {
        let mut infos = SenderInfos::new();
        for id in ids {
            if !infos.contains_key(&id) {
                infos.insert(id, self.senders.info(view, id)?);
            }
        }
        Ok(infos)
    }

    pub(crate) fn remove_from_current(&mut self, id: MetaId) {
        let pool = self.arena[id].current_sub_pool;
        match pool {
            SubPoolType::Pending => self.pending.remove(&mut self.arena, id),
            SubPoolType::BaseFee => self.base_fee.remove(&mut self.arena, id),
            SubPoolType::Queued => self.queued.remove(&mut self.arena, id),
            SubPoolType::None => {}
        }
    }

    /// Drops a transaction from every index. The caller must already have
    /// removed it from its sub-pool.
    pub(crate) fn discard_locked(&mut self, id: MetaId, reason: DiscardReason) {
        debug_assert_eq!(self.arena[id].current_sub_pool, SubPoolType::None);
        let mt = self.arena.remove(id);
        self.by_hash.remove(&mt.tx.id_hash);
        self.all.remove(&TransactionId::new(mt.tx.sender_id, mt.tx.nonce));
        self.note_discarded(mt.tx.sender_id, mt.tx.id_hash, reason);
        if mt.tx.traced {
            info!(target: "txpool",
                id_hash = %mt.tx.id_hash, sender = %mt.tx.sender_id, %reason, "discarded");
        }
    }

    /// Records the fate of a hash without touching the indices; also used
    /// for reinjected transactions that were rejected before insertion but
    /// may still sit in the database.
    pub(crate) fn note_discarded(&mut self, sender: SenderId, id_hash: B256, reason: DiscardReason) {
        self.deleted_txs.push(DeletedTx { sender, id_hash });
        self.discard_reasons_lru.put(id_hash, reason);
    }

    /// Inserts a new transaction, applying the replacement policy when the
    /// `(sender, nonce)` slot is taken. Every accepted transaction first
    /// lands in the queued sub-pool; the promoter relocates it.
    pub(crate) fn add_locked(&mut self, cfg: &Config, mt: MetaTx) -> Result<MetaId, DiscardReason> {
        if let Some(found) = self.all.get(mt.tx.sender_id, mt.tx.nonce) {
            let found_tx = &self.arena[found].tx;
            // both tip and fee cap must clear the bump to replace
            let tip_threshold = found_tx.tip as u128 * (100 + cfg.price_bump) as u128 / 100;
            let fee_cap_threshold = found_tx.fee_cap as u128 * (100 + cfg.price_bump) as u128 / 100;
            if (mt.tx.tip as u128) < tip_threshold || (mt.tx.fee_cap as u128) < fee_cap_threshold {
                if mt.tx.traced {
                    info!(target: "txpool",
                        id_hash = %mt.tx.id_hash, existing = %found_tx.id_hash,
                        "replacement under the price bump");
                }
                return Err(DiscardReason::NotReplaced);
            }
            self.remove_from_current(found);
            self.discard_locked(found, DiscardReason::ReplacedByHigherTip);
        }

        let id_hash = mt.tx.id_hash;
        let is_local = mt.sub_pool.contains(SubPoolMarker::IS_LOCAL);
        let tx_id = TransactionId::new(mt.tx.sender_id, mt.tx.nonce);

        let id = self.arena.insert(mt);
        self.by_hash.insert(id_hash, id);
        let replaced = self.all.insert(tx_id, id);
        debug_assert!(replaced.is_none(), "nonce slot vacated above");
        if is_local {
            self.is_local_lru.put(id_hash, ());
        }
        // an older discard verdict for this hash is obsolete now
        self.discard_reasons_lru.pop(&id_hash);
        self.queued.add(&mut self.arena, id);
        Ok(id)
    }

    /// Drops the highest-nonce half of a spamming sender's transactions.
    pub(crate) fn punish_spammer(&mut self, spammer: SenderId) {
        let count = self.all.count(spammer) / 2;
        if count == 0 {
            return;
        }
        let to_delete: Vec<MetaId> =
            self.all.descend(spammer).take(count).map(|(_, id)| id).collect();
        for id in to_delete {
            self.remove_from_current(id);
            self.discard_locked(id, DiscardReason::Spammer);
        }
    }

    /// Validates a batch; `None` marks a good transaction. A spammer
    /// verdict immediately punishes the sender.
    pub(crate) fn validate_txs(
        &mut self,
        cfg: &Config,
        infos: &SenderInfos,
        txs: &[TxSlot],
    ) -> Vec<Option<DiscardReason>> {
        let mut reasons = vec![None; txs.len()];
        for (i, txn) in txs.iter().enumerate() {
            let Some(info) = infos.get(&txn.sender_id) else {
                debug_assert!(false, "sender info prefetched for every candidate");
                continue;
            };
            let pooled = self.all.count(txn.sender_id) as u64;
            match validate_tx(cfg, txn, pooled, info) {
                Ok(()) => {}
                Err(reason) => {
                    if reason == DiscardReason::Spammer {
                        self.punish_spammer(txn.sender_id);
                    }
                    reasons[i] = Some(reason);
                }
            }
        }
        reasons
    }

    /// Shared admission path: insert each candidate, reclassify every
    /// touched sender, then promote. Returns one slot per input; `None`
    /// means accepted (the promoter may still have evicted it, which the
    /// caller resolves through the reason LRU).
    pub(crate) fn add_txs(
        &mut self,
        cfg: &Config,
        block_num: u64,
        infos: &SenderInfos,
        txs: Vec<TxSlot>,
        pending_base_fee: u64,
        block_gas_limit: u64,
    ) -> Vec<Option<DiscardReason>> {
        let mut discard_reasons = vec![None; txs.len()];
        let mut changed_senders = HashSet::new();
        for (i, mut txn) in txs.into_iter().enumerate() {
            if self.by_hash.contains_key(&txn.id_hash) {
                discard_reasons[i] = Some(DiscardReason::DuplicateHash);
                continue;
            }
            let rlp = std::mem::take(&mut txn.rlp);
            let sender_id = txn.sender_id;
            let id_hash = txn.id_hash;
            let is_local = txn.is_local;
            let traced = txn.traced;
            let mt = MetaTx::new(Arc::new(txn), rlp, is_local, block_num);
            match self.add_locked(cfg, mt) {
                Ok(_) => {
                    if traced {
                        info!(target: "txpool",
                            id_hash = %id_hash, sender = %sender_id,
                            "scheduled sender for reclassification");
                    }
                    changed_senders.insert(sender_id);
                }
                Err(reason) => discard_reasons[i] = Some(reason),
            }
        }

        for sender in changed_senders {
            let Some(info) = infos.get(&sender) else {
                debug_assert!(false, "sender info prefetched for every candidate");
                continue;
            };
            self.on_sender_state_change(
                sender,
                info,
                cfg.protocol_base_fee,
                block_gas_limit,
                false,
            );
        }
        self.promote(pending_base_fee);
        self.pending.enforce_best_invariants(&mut self.arena);
        discard_reasons
    }

    /// Reinjection path for unwound transactions. Rejections surface through
    /// the reason LRU and the deletion list exactly like fresh submissions;
    /// duplicates are silently kept.
    pub(crate) fn add_txs_on_new_block(&mut self, cfg: &Config, block_num: u64, txs: Vec<TxSlot>) {
        for mut txn in txs {
            if self.by_hash.contains_key(&txn.id_hash) {
                continue;
            }
            // restore the local flag lost while the transaction sat in a block
            txn.is_local = txn.is_local || self.is_local_lru.contains(&txn.id_hash);
            let rlp = std::mem::take(&mut txn.rlp);
            let sender_id = txn.sender_id;
            let id_hash = txn.id_hash;
            let is_local = txn.is_local;
            let mt = MetaTx::new(Arc::new(txn), rlp, is_local, block_num);
            if let Err(reason) = self.add_locked(cfg, mt) {
                self.note_discarded(sender_id, id_hash, reason);
            }
        }
    }

    /// Fetches a transaction's encoded form, memory first, then the
    /// persisted copy (20-byte sender prefix followed by the raw bytes).
    pub(crate) fn get_rlp_locked(
        &self,
        db: &dyn KvRead,
        hash: &B256,
    ) -> PoolResult<Option<(Bytes, Address, bool)>> {
        let pooled = self.by_hash.get(hash).map(|&id| &self.arena[id]);
        if let Some(mt) = pooled {
            if let Some(rlp) = &mt.rlp {
                let sender = self.senders.address(mt.tx.sender_id).unwrap_or_default();
                let is_local = mt.sub_pool.contains(SubPoolMarker::IS_LOCAL);
                return Ok(Some((rlp.clone(), sender, is_local)));
            }
        }
        match db.get(Bucket::PoolTransaction, hash.as_slice())? {
            Some(value) if value.len() > 20 => {
                let sender = Address::from_slice(&value[..20]);
                let is_local = pooled
                    .map(|mt| mt.sub_pool.contains(SubPoolMarker::IS_LOCAL))
                    .unwrap_or(false);
                Ok(Some((Bytes::from(value[20..].to_vec()), sender, is_local)))
            }
            _ => Ok(None),
        }
    }
}

/// The transaction pool engine.
///
/// Holds all pool data structures behind one RwLock; queries take the read
/// lock, mutations the write lock. Database transactions and state views are
/// acquired by the caller and passed in per operation, keeping the engine
/// free of I/O policy.
pub struct TxPool {
    pub(crate) inner: RwLock<PoolInner>,
    cfg: Config,
    parser: Arc<dyn TxEnvelopeParser>,
    pub(crate) started: AtomicBool,
    pub(crate) last_seen_block: AtomicU64,
    pub(crate) pending_base_fee: AtomicU64,
    pub(crate) block_gas_limit: AtomicU64,
    /// Outbound notifications: hashes promoted into the pending sub-pool.
    new_pending_txs: mpsc::Sender<Vec<B256>>,
}

impl TxPool {
    pub fn new(
        new_pending_txs: mpsc::Sender<Vec<B256>>,
        cfg: Config,
        parser: Arc<dyn TxEnvelopeParser>,
    ) -> Self {
        let inner = PoolInner::new(&cfg);
        Self {
            inner: RwLock::new(inner),
            cfg,
            parser,
            started: AtomicBool::new(false),
            last_seen_block: AtomicU64::new(0),
            pending_base_fee: AtomicU64::new(0),
            block_gas_limit: AtomicU64::new(0),
            new_pending_txs,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub(crate) fn parser(&self) -> &dyn TxEnvelopeParser {
        &*self.parser
    }

    /// Whether the pool has seen its first block.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn last_seen_block(&self) -> u64 {
        self.last_seen_block.load(Ordering::Relaxed)
    }

    pub fn pending_base_fee(&self) -> u64 {
        self.pending_base_fee.load(Ordering::Relaxed)
    }

    pub fn block_gas_limit(&self) -> u64 {
        self.block_gas_limit.load(Ordering::Relaxed)
    }

    /// Buffers remote transactions for the next processing tick, deduping
    /// by hash. Never fails.
    pub fn add_remote_txs(&self, new_txs: Vec<TxSlot>) {
        counter!("txpool_add_remote_txs").increment(new_txs.len() as u64);
        let mut inner = self.inner.write();
        for txn in new_txs {
            if inner.unprocessed_remote_by_hash.contains_key(&txn.id_hash) {
                continue;
            }
            let pos = inner.unprocessed_remote_txs.len();
            inner.unprocessed_remote_by_hash.insert(txn.id_hash, pos);
            inner.unprocessed_remote_txs.push(txn);
        }
    }

    /// Validates and admits local transactions, returning one reason per
    /// input. Promoted hashes go out on the notification channel.
    pub fn add_local_txs(
        &self,
        view: &dyn StateView,
        mut txs: Vec<TxSlot>,
    ) -> PoolResult<Vec<DiscardReason>> {
        if !self.started() {
            return Err(PoolError::NotStarted);
        }
        let cfg = &self.cfg;
        for txn in &mut txs {
            txn.is_local = true;
        }
        let hashes: Vec<B256> = txs.iter().map(|txn| txn.id_hash).collect();

        let mut inner = self.inner.write();
        let inner = &mut *inner;
        inner.senders.register_new_senders(&mut txs);
        let sender_ids: HashSet<SenderId> = txs.iter().map(|txn| txn.sender_id).collect();
        let infos = inner.sender_infos(view, sender_ids)?;

        let mut reasons = inner.validate_txs(cfg, &infos, &txs);
        let mut good = Vec::new();
        let mut good_idx = Vec::new();
        for (i, (txn, reason)) in txs.into_iter().zip(&reasons).enumerate() {
            if reason.is_none() {
                good_idx.push(i);
                good.push(txn);
            }
        }

        inner.pending.reset_added_hashes();
        inner.base_fee.reset_added_hashes();
        let add_reasons = inner.add_txs(
            cfg,
            self.last_seen_block(),
            &infos,
            good,
            self.pending_base_fee(),
            self.block_gas_limit(),
        );
        for (j, reason) in add_reasons.into_iter().enumerate() {
            if let Some(reason) = reason {
                reasons[good_idx[j]] = Some(reason);
            }
        }

        let mut promoted = Vec::new();
        inner.pending.append_added_hashes(&mut promoted);
        inner.base_fee.append_added_hashes(&mut promoted);

        // a transaction accepted above may have been evicted again by the
        // promoter within this very batch; the reason LRU knows
        let final_reasons: Vec<DiscardReason> = reasons
            .into_iter()
            .enumerate()
            .map(|(i, reason)| match reason {
                Some(reason) => reason,
                None => inner
                    .discard_reasons_lru
                    .peek(&hashes[i])
                    .copied()
                    .unwrap_or(DiscardReason::Success),
            })
            .collect();

        self.notify_promoted(dedup_hashes(promoted));
        Ok(final_reasons)
    }

    /// Drains the remote buffer through the same path as local submissions.
    /// Driven by the maintenance ticker.
    pub fn process_remote_txs(&self, view: &dyn StateView) -> PoolResult<()> {
        if !self.started() {
            return Err(PoolError::NotStarted);
        }
        let cfg = &self.cfg;
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        if inner.unprocessed_remote_txs.is_empty() {
            return Ok(());
        }

        // registration and info prefetch precede the drain so a state
        // failure leaves the whole batch buffered for the next tick
        inner.senders.register_new_senders(&mut inner.unprocessed_remote_txs);
        let sender_ids: HashSet<SenderId> =
            inner.unprocessed_remote_txs.iter().map(|txn| txn.sender_id).collect();
        let infos = inner.sender_infos(view, sender_ids)?;

        let txs = std::mem::take(&mut inner.unprocessed_remote_txs);
        inner.unprocessed_remote_by_hash.clear();
        counter!("txpool_process_remote_txs").increment(txs.len() as u64);

        let reasons = inner.validate_txs(cfg, &infos, &txs);
        let good: Vec<TxSlot> = txs
            .into_iter()
            .zip(reasons)
            .filter_map(|(txn, reason)| reason.is_none().then_some(txn))
            .collect();

        inner.pending.reset_added_hashes();
        inner.base_fee.reset_added_hashes();
        let _ = inner.add_txs(
            cfg,
            self.last_seen_block(),
            &infos,
            good,
            self.pending_base_fee(),
            self.block_gas_limit(),
        );
        let mut promoted = Vec::new();
        inner.pending.append_added_hashes(&mut promoted);
        inner.base_fee.append_added_hashes(&mut promoted);
        self.notify_promoted(dedup_hashes(promoted));
        Ok(())
    }

    /// Applies a new canonical block: restores from the database on first
    /// sight, advances the fee and gas parameters, removes mined
    /// transactions, reinjects unwound ones and reclassifies every touched
    /// sender.
    pub fn on_new_block(
        &self,
        pool_db: &dyn KvRead,
        view: &dyn StateView,
        state_changes: &StateChangeBatch,
        mut unwind_txs: Vec<TxSlot>,
        mut mined_txs: Vec<TxSlot>,
    ) -> PoolResult<()> {
        counter!("txpool_new_block").increment(1);
        let cfg = &self.cfg;
        let mut inner = self.inner.write();
        let inner = &mut *inner;

        self.last_seen_block.store(state_changes.block_height, Ordering::Relaxed);
        if !self.started() {
            self.restore_locked(inner, pool_db, view)?;
        }

        let (pending_base_fee, base_fee_changed) =
            self.set_base_fee(state_changes.pending_block_base_fee);
        if base_fee_changed {
            inner.pending.set_pending_base_fee(pending_base_fee);
            inner.base_fee.set_pending_base_fee(pending_base_fee);
            inner.queued.set_pending_base_fee(pending_base_fee);
        }
        self.block_gas_limit.store(state_changes.block_gas_limit, Ordering::Relaxed);

        inner.senders.on_new_block(state_changes, &mut unwind_txs, &mut mined_txs);

        let mut changed_senders: HashSet<SenderId> =
            unwind_txs.iter().map(|txn| txn.sender_id).collect();
        for address in &state_changes.changed_accounts {
            if let Some(id) = inner.senders.id(address) {
                changed_senders.insert(id);
            }
        }
        let infos = inner.sender_infos(view, changed_senders.iter().copied())?;

        // failed unwind transactions are already historical, drop silently
        let reasons = inner.validate_txs(cfg, &infos, &unwind_txs);
        let good_unwind: Vec<TxSlot> = unwind_txs
            .into_iter()
            .zip(reasons)
            .filter_map(|(txn, reason)| reason.is_none().then_some(txn))
            .collect();

        inner.remove_mined(&mined_txs);

        inner.pending.reset_added_hashes();
        inner.base_fee.reset_added_hashes();
        inner.add_txs_on_new_block(cfg, state_changes.block_height, good_unwind);

        for sender in &changed_senders {
            let Some(info) = infos.get(sender) else { continue };
            inner.on_sender_state_change(
                *sender,
                info,
                cfg.protocol_base_fee,
                state_changes.block_gas_limit,
                true,
            );
        }

        inner.pending.enforce_worst_invariants(&mut inner.arena);
        inner.base_fee.enforce_invariants(&mut inner.arena);
        inner.queued.enforce_invariants(&mut inner.arena);
        inner.promote(pending_base_fee);
        inner.pending.enforce_best_invariants(&mut inner.arena);

        let mut promoted = Vec::new();
        inner.pending.append_added_hashes(&mut promoted);
        inner.base_fee.append_added_hashes(&mut promoted);

        if !self.started.swap(true, Ordering::Relaxed) {
            info!(target: "txpool", "started");
        }

        self.notify_promoted(dedup_hashes(promoted));
        Ok(())
    }

    /// Snapshots up to `n` best pending transactions. Entries over the
    /// block gas limit or with no retrievable encoded form are skipped;
    /// nothing is mutated.
    pub fn best(&self, n: usize, out: &mut Vec<BestTx>, db: &dyn KvRead) -> PoolResult<()> {
        let inner = self.inner.read();
        out.clear();
        let block_gas_limit = self.block_gas_limit();
        for &id in inner.pending.best_ids() {
            if out.len() >= n {
                break;
            }
            let mt = &inner.arena[id];
            if mt.tx.gas >= block_gas_limit {
                continue;
            }
            let Some((rlp, sender, is_local)) = inner.get_rlp_locked(db, &mt.tx.id_hash)? else {
                continue;
            };
            out.push(BestTx { rlp, sender, is_local });
        }
        Ok(())
    }

    pub fn get_rlp(&self, db: &dyn KvRead, hash: &B256) -> PoolResult<Option<Bytes>> {
        let inner = self.inner.read();
        Ok(inner.get_rlp_locked(db, hash)?.map(|(rlp, _, _)| rlp))
    }

    /// Whether the pool has ever seen this hash: live, buffered, recently
    /// discarded or persisted.
    pub fn id_hash_known(&self, db: &dyn KvRead, hash: &B256) -> PoolResult<bool> {
        let inner = self.inner.read();
        if inner.discard_reasons_lru.contains(hash)
            || inner.unprocessed_remote_by_hash.contains_key(hash)
            || inner.by_hash.contains_key(hash)
        {
            return Ok(true);
        }
        Ok(db.has(Bucket::PoolTransaction, hash.as_slice())?)
    }

    pub fn is_local(&self, hash: &B256) -> bool {
        self.inner.read().is_local_lru.contains(hash)
    }

    /// Highest pooled nonce of an address.
    pub fn nonce_from_address(&self, address: &Address) -> Option<u64> {
        let inner = self.inner.read();
        let sender = inner.senders.id(address)?;
        inner.all.nonce(sender)
    }

    pub fn count_content(&self) -> (usize, usize, usize) {
        let inner = self.inner.read();
        (inner.pending.len(), inner.base_fee.len(), inner.queued.len())
    }

    pub fn append_local_hashes(&self, buf: &mut Vec<B256>) {
        let inner = self.inner.read();
        for (hash, &id) in &inner.by_hash {
            if inner.arena[id].sub_pool.contains(SubPoolMarker::IS_LOCAL) {
                buf.push(*hash);
            }
        }
    }

    pub fn append_remote_hashes(&self, buf: &mut Vec<B256>) {
        let inner = self.inner.read();
        for (hash, &id) in &inner.by_hash {
            if !inner.arena[id].sub_pool.contains(SubPoolMarker::IS_LOCAL) {
                buf.push(*hash);
            }
        }
        for hash in inner.unprocessed_remote_by_hash.keys() {
            buf.push(*hash);
        }
    }

    pub fn append_all_hashes(&self, buf: &mut Vec<B256>) {
        self.append_local_hashes(buf);
        self.append_remote_hashes(buf);
    }

    pub fn add_new_good_peer(&self, peer: PeerId) {
        self.inner.write().peers.add_peer(peer);
    }

    pub fn drain_recently_connected_peers(&self) -> Vec<PeerId> {
        self.inner.write().peers.get_and_clean()
    }

    pub fn log_stats(&self) {
        if !self.started() {
            return;
        }
        let (pending, base_fee, queued) = self.count_content();
        gauge!("txpool_pending").set(pending as f64);
        gauge!("txpool_base_fee").set(base_fee as f64);
        gauge!("txpool_queued").set(queued as f64);
        info!(target: "txpool",
            block = self.last_seen_block(), pending, base_fee, queued, "stat");
    }

    fn set_base_fee(&self, base_fee: u64) -> (u64, bool) {
        let mut changed = false;
        if base_fee > 0 {
            changed = base_fee != self.pending_base_fee.load(Ordering::Relaxed);
            self.pending_base_fee.store(base_fee, Ordering::Relaxed);
        }
        (self.pending_base_fee.load(Ordering::Relaxed), changed)
    }

    fn notify_promoted(&self, promoted: Vec<B256>) {
        if promoted.is_empty() {
            return;
        }
        // non-blocking by contract: a slow consumer drops batches
        let _ = self.new_pending_txs.try_send(promoted);
    }
}

fn dedup_hashes(hashes: Vec<B256>) -> Vec<B256> {
    let mut seen = HashSet::with_capacity(hashes.len());
    hashes.into_iter().filter(|hash| seen.insert(*hash)).collect()
}

#[cfg(test)]
impl TxPool {
    pub(crate) fn sub_pool_of(&self, hash: &B256) -> Option<SubPoolType> {
        let inner = self.inner.read();
        let id = *inner.by_hash.get(hash)?;
        Some(inner.arena[id].current_sub_pool)
    }

    pub(crate) fn marker_of(&self, hash: &B256) -> Option<SubPoolMarker> {
        let inner = self.inner.read();
        let id = *inner.by_hash.get(hash)?;
        Some(inner.arena[id].sub_pool)
    }

    pub(crate) fn nonce_distance_of(&self, hash: &B256) -> Option<u64> {
        let inner = self.inner.read();
        let id = *inner.by_hash.get(hash)?;
        Some(inner.arena[id].nonce_distance)
    }

    pub(crate) fn discard_reason_of(&self, hash: &B256) -> Option<DiscardReason> {
        self.inner.read().discard_reasons_lru.peek(hash).copied()
    }

    /// Structural invariants that must hold at every stable point.
    pub(crate) fn assert_invariants(&self) {
        let inner = self.inner.read();
        let total = inner.arena.len();
        assert_eq!(inner.by_hash.len(), total, "by_hash covers the arena");
        assert_eq!(inner.all.len(), total, "nonce index covers the arena");
        assert_eq!(
            inner.pending.len() + inner.base_fee.len() + inner.queued.len(),
            total,
            "every transaction sits in exactly one sub-pool"
        );
        assert!(inner.pending.len() <= inner.pending.limit());
        assert!(inner.base_fee.len() <= inner.base_fee.limit());
        assert!(inner.queued.len() <= inner.queued.limit());
        for (id, mt) in inner.arena.iter() {
            assert_ne!(mt.current_sub_pool, SubPoolType::None);
            assert_eq!(inner.by_hash.get(&mt.tx.id_hash).copied(), Some(id));
            assert_eq!(inner.all.get(mt.tx.sender_id, mt.tx.nonce), Some(id));
            if mt.current_sub_pool == SubPoolType::Pending {
                assert!(mt.sub_pool.at_least(SubPoolMarker::BASE_FEE_POOL_BITS));
                assert!(mt.min_fee_cap >= self.pending_base_fee());
            }
        }
    }
}
