use alloy_primitives::{Address, B256};
use metrics::counter;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::{
    config::ChainConfig,
    kv::{Bucket, KvError, KvRead, KvRw, PoolDb},
    pool::{meta::MetaId, PoolInner, TxPool},
    result::{PoolError, PoolResult},
    senders::StateView,
    types::TxSlot,
};

/// Reserved keys of the `PoolInfo` bucket.
pub const POOL_CHAIN_CONFIG_KEY: &[u8] = b"chain_config";
pub const POOL_LAST_SEEN_BLOCK_KEY: &[u8] = b"last_seen_block";
pub const POOL_PENDING_BASE_FEE_KEY: &[u8] = b"pending_base_fee";

impl TxPool {
    /// Commits the pool to its database: deletes discarded transactions,
    /// rewrites the recent-local bucket from the LRU, upserts every
    /// transaction whose encoded bytes are still held in memory and
    /// persists the info keys.
    ///
    /// The write transaction runs inside the pool lock so the committed
    /// snapshot matches what readers see. In-memory cleanup happens
    /// strictly after the commit: an aborted commit leaves the deletion
    /// list and the encoded bytes in place, so the next flush replays.
    pub fn flush(&self, db: &dyn PoolDb) -> PoolResult<()> {
        let mut inner = self.inner.write();
        let inner = &mut *inner;

        let mut tx = db.begin_rw()?;
        self.flush_locked(inner, &mut *tx)?;
        tx.commit()?;
        counter!("txpool_write_to_db").increment(1);

        inner.deleted_txs.clear();
        let persisted: Vec<MetaId> = inner
            .arena
            .iter()
            .filter(|(_, mt)| mt.rlp.is_some())
            .map(|(id, _)| id)
            .collect();
        for id in persisted {
            // ownership of the encoded bytes has moved to the database
            inner.arena[id].rlp = None;
        }
        Ok(())
    }

    fn flush_locked(&self, inner: &mut PoolInner, tx: &mut dyn KvRw) -> PoolResult<()> {
        for i in 0..inner.deleted_txs.len() {
            let deleted = inner.deleted_txs[i];
            if !inner.all.has_txs(deleted.sender) {
                inner.senders.evict(deleted.sender);
            }
            if tx.has(Bucket::PoolTransaction, deleted.id_hash.as_slice())? {
                tx.delete(Bucket::PoolTransaction, deleted.id_hash.as_slice())?;
            }
        }

        tx.clear_bucket(Bucket::RecentLocalTransaction)?;
        // LRU iterates newest first; the bucket wants insertion order
        for (i, (hash, _)) in inner.is_local_lru.iter().rev().enumerate() {
            tx.append(
                Bucket::RecentLocalTransaction,
                &(i as u64).to_be_bytes(),
                hash.as_slice(),
            )?;
        }

        let mut value = Vec::with_capacity(1024);
        for (_, mt) in inner.arena.iter() {
            let Some(rlp) = &mt.rlp else { continue };
            let Some(address) = inner.senders.address(mt.tx.sender_id) else { continue };
            value.clear();
            value.extend_from_slice(address.as_slice());
            value.extend_from_slice(rlp);
            if !tx.has(Bucket::PoolTransaction, mt.tx.id_hash.as_slice())? {
                tx.put(Bucket::PoolTransaction, mt.tx.id_hash.as_slice(), &value)?;
            }
        }

        tx.put(
            Bucket::PoolInfo,
            POOL_PENDING_BASE_FEE_KEY,
            &self.pending_base_fee().to_be_bytes(),
        )?;
        tx.put(
            Bucket::PoolInfo,
            POOL_LAST_SEEN_BLOCK_KEY,
            &self.last_seen_block().to_be_bytes(),
        )?;
        let chain = serde_json::to_vec(&self.config().chain)
            .map_err(|err| KvError::Backend(format!("encoding chain config: {err}")))?;
        tx.put(Bucket::PoolInfo, POOL_CHAIN_CONFIG_KEY, &chain)?;
        Ok(())
    }

    /// Re-populates the pool from its database on first start: local-hash
    /// history first, then every persisted transaction re-parsed (stored
    /// bytes are not trusted), re-validated against current state and fed
    /// through the standard admission path, and finally the persisted
    /// pending base fee.
    pub(crate) fn restore_locked(
        &self,
        inner: &mut PoolInner,
        db: &dyn KvRead,
        view: &dyn StateView,
    ) -> PoolResult<()> {
        if self.last_seen_block() == 0 {
            if let Some(value) = db.get(Bucket::PoolInfo, POOL_LAST_SEEN_BLOCK_KEY)? {
                if value.len() == 8 {
                    let block = u64::from_be_bytes(value.try_into().expect("checked length"));
                    self.last_seen_block.store(block, Ordering::Relaxed);
                }
            }
        }

        if let Some(value) = db.get(Bucket::PoolInfo, POOL_CHAIN_CONFIG_KEY)? {
            match serde_json::from_slice::<ChainConfig>(&value) {
                Ok(stored) if stored != self.config().chain => {
                    warn!(target: "txpool",
                        stored_chain_id = stored.chain_id,
                        configured_chain_id = self.config().chain.chain_id,
                        "pool db belongs to a different chain");
                }
                Ok(_) => {}
                Err(err) => warn!(target: "txpool", %err, "invalid chain config in pool db"),
            }
        }

        db.for_each(Bucket::RecentLocalTransaction, &mut |_, value| {
            if value.len() == 32 {
                inner.is_local_lru.put(B256::from_slice(value), ());
            }
            Ok(())
        })?;

        let mut raw = Vec::new();
        db.for_each(Bucket::PoolTransaction, &mut |key, value| {
            raw.push((key.to_vec(), value.to_vec()));
            Ok(())
        })?;

        let mut txs: Vec<TxSlot> = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            if value.len() <= 20 {
                warn!(target: "txpool", "undersized pool transaction record, skipping");
                continue;
            }
            let address = Address::from_slice(&value[..20]);
            let mut txn = self.parser().parse(&value[20..]).map_err(|err| PoolError::Parse {
                hash: B256::from_slice(&key),
                message: err.to_string(),
            })?;
            txn.sender = address;
            let (sender_id, traced) = inner.senders.get_or_create_id(address);
            txn.sender_id = sender_id;
            txn.traced = traced;
            txn.is_local = inner.is_local_lru.contains(&txn.id_hash);
            txs.push(txn);
        }

        let mut pending_base_fee = 0u64;
        if let Some(value) = db.get(Bucket::PoolInfo, POOL_PENDING_BASE_FEE_KEY)? {
            if value.len() == 8 {
                pending_base_fee = u64::from_be_bytes(value.try_into().expect("checked length"));
            }
        }
        inner.pending.set_pending_base_fee(pending_base_fee);
        inner.base_fee.set_pending_base_fee(pending_base_fee);
        inner.queued.set_pending_base_fee(pending_base_fee);

        let restored = txs.len();
        let infos = inner.sender_infos(view, txs.iter().map(|txn| txn.sender_id))?;
        let reasons = inner.validate_txs(self.config(), &infos, &txs);
        let good: Vec<TxSlot> = txs
            .into_iter()
            .zip(reasons)
            .filter_map(|(txn, reason)| reason.is_none().then_some(txn))
            .collect();
        let kept = good.len();
        let _ = inner.add_txs(
            self.config(),
            self.last_seen_block(),
            &infos,
            good,
            pending_base_fee,
            u64::MAX,
        );
        self.pending_base_fee.store(pending_base_fee, Ordering::Relaxed);

        info!(target: "txpool",
            restored, kept, block = self.last_seen_block(), "restored pool from db");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};

    use super::*;
    use crate::{
        kv::{KvWrite, MemDb},
        pool::state::SubPoolType,
        result::DiscardReason,
        test_utils::helpers::{simple_tx, start_pool, test_pool, TestStateView},
    };

    const ETH: u64 = 1_000_000_000_000_000_000;

    /// Wraps a MemDb but fails every commit.
    struct AbortingDb(MemDb);

    impl PoolDb for AbortingDb {
        fn begin_ro(&self) -> Result<Box<dyn KvRead + '_>, KvError> {
            self.0.begin_ro()
        }

        fn begin_rw(&self) -> Result<Box<dyn KvRw + '_>, KvError> {
            let tx = self.0.begin_rw()?;
            Ok(Box::new(AbortingTx(tx)))
        }
    }

    struct AbortingTx<'db>(Box<dyn KvRw + 'db>);

    impl KvRead for AbortingTx<'_> {
        fn has(&self, bucket: Bucket, key: &[u8]) -> Result<bool, KvError> {
            self.0.has(bucket, key)
        }

        fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
            self.0.get(bucket, key)
        }

        fn for_each(
            &self,
            bucket: Bucket,
            f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), KvError>,
        ) -> Result<(), KvError> {
            self.0.for_each(bucket, f)
        }
    }

    impl KvWrite for AbortingTx<'_> {
        fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError> {
            self.0.put(bucket, key, value)
        }

        fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<(), KvError> {
            self.0.delete(bucket, key)
        }

        fn append(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError> {
            self.0.append(bucket, key, value)
        }

        fn clear_bucket(&mut self, bucket: Bucket) -> Result<(), KvError> {
            self.0.clear_bucket(bucket)
        }
    }

    impl KvRw for AbortingTx<'_> {
        fn commit(self: Box<Self>) -> Result<(), KvError> {
            Err(KvError::Backend("commit aborted".into()))
        }
    }

    #[tokio::test]
    async fn test_flush_restore_roundtrip() {
        let db = MemDb::default();
        let (pool, _rx) = test_pool();
        let sender = Address::random();
        let view = TestStateView::default().with_account(sender, 0, U256::from(ETH));
        start_pool(&pool, &db, &view, 10, 30_000_000);

        let local = simple_tx(sender, 0, 20, 5);
        let remote = simple_tx(sender, 1, 20, 5);
        let (h_local, h_remote) = (local.id_hash, remote.id_hash);
        pool.add_local_txs(&view, vec![local]).unwrap();
        pool.add_remote_txs(vec![remote]);
        pool.process_remote_txs(&view).unwrap();

        pool.flush(&db).unwrap();

        // the encoded bytes moved to the db; reads fall through to it
        let ro = db.begin_ro().unwrap();
        assert!(pool.get_rlp(&*ro, &h_local).unwrap().is_some());

        // a fresh pool restores the same content on its first block
        let (restored, _rx) = test_pool();
        start_pool(&restored, &db, &view, 10, 30_000_000);

        assert_eq!(restored.count_content(), pool.count_content());
        assert_eq!(restored.sub_pool_of(&h_local), Some(SubPoolType::Pending));
        assert_eq!(restored.sub_pool_of(&h_remote), Some(SubPoolType::Pending));
        assert!(restored.is_local(&h_local));
        assert!(!restored.is_local(&h_remote));
        assert_eq!(restored.pending_base_fee(), 10);
        restored.assert_invariants();
    }

    #[tokio::test]
    async fn test_flush_deletes_discarded_txs() {
        let db = MemDb::default();
        let (pool, _rx) = test_pool();
        let sender = Address::random();
        let view = TestStateView::default().with_account(sender, 0, U256::from(ETH));
        start_pool(&pool, &db, &view, 10, 30_000_000);

        let t1 = simple_tx(sender, 0, 20, 5);
        let h1 = t1.id_hash;
        pool.add_local_txs(&view, vec![t1]).unwrap();
        pool.flush(&db).unwrap();
        let ro = db.begin_ro().unwrap();
        assert!(ro.has(Bucket::PoolTransaction, h1.as_slice()).unwrap());

        // replacement discards the original
        let replacement = simple_tx(sender, 0, 30, 10);
        let reasons = pool.add_local_txs(&view, vec![replacement]).unwrap();
        assert_eq!(reasons, vec![DiscardReason::Success]);
        pool.flush(&db).unwrap();

        let ro = db.begin_ro().unwrap();
        assert!(!ro.has(Bucket::PoolTransaction, h1.as_slice()).unwrap());
    }

    #[tokio::test]
    async fn test_restore_drops_txs_invalid_under_current_state() {
        let db = MemDb::default();
        let (pool, _rx) = test_pool();
        let sender = Address::random();
        let view = TestStateView::default().with_account(sender, 0, U256::from(ETH));
        start_pool(&pool, &db, &view, 10, 30_000_000);

        let t1 = simple_tx(sender, 0, 20, 5);
        let h1 = t1.id_hash;
        pool.add_local_txs(&view, vec![t1]).unwrap();
        pool.flush(&db).unwrap();

        // by restart time the sender's nonce has moved past the tx
        let view = TestStateView::default().with_account(sender, 5, U256::from(ETH));
        let (restored, _rx) = test_pool();
        start_pool(&restored, &db, &view, 10, 30_000_000);

        assert_eq!(restored.count_content(), (0, 0, 0));
        assert_eq!(restored.sub_pool_of(&h1), None);
    }

    #[tokio::test]
    async fn test_aborted_commit_is_replayable() {
        let db = MemDb::default();
        let (pool, _rx) = test_pool();
        let sender = Address::random();
        let view = TestStateView::default().with_account(sender, 0, U256::from(ETH));
        start_pool(&pool, &db, &view, 10, 30_000_000);

        let t1 = simple_tx(sender, 0, 20, 5);
        let h1 = t1.id_hash;
        pool.add_local_txs(&view, vec![t1]).unwrap();

        // first commit aborts: nothing lands in the db, the encoded bytes
        // stay in memory
        let aborting = AbortingDb(MemDb::default());
        assert!(pool.flush(&aborting).is_err());
        let ro = db.begin_ro().unwrap();
        assert!(!ro.has(Bucket::PoolTransaction, h1.as_slice()).unwrap());

        // the retry against a working db succeeds with the same content
        pool.flush(&db).unwrap();
        let ro = db.begin_ro().unwrap();
        assert!(ro.has(Bucket::PoolTransaction, h1.as_slice()).unwrap());
        let stored = ro.get(Bucket::PoolTransaction, h1.as_slice()).unwrap().unwrap();
        assert_eq!(&stored[..20], sender.as_slice());
    }

    #[tokio::test]
    async fn test_info_keys_layout() {
        let db = MemDb::default();
        let (pool, _rx) = test_pool();
        let sender = Address::random();
        let view = TestStateView::default().with_account(sender, 0, U256::from(ETH));
        start_pool(&pool, &db, &view, 10, 30_000_000);
        pool.flush(&db).unwrap();

        let ro = db.begin_ro().unwrap();
        let base_fee = ro.get(Bucket::PoolInfo, POOL_PENDING_BASE_FEE_KEY).unwrap().unwrap();
        assert_eq!(base_fee, 10u64.to_be_bytes().to_vec());
        let block = ro.get(Bucket::PoolInfo, POOL_LAST_SEEN_BLOCK_KEY).unwrap().unwrap();
        assert_eq!(block, 1u64.to_be_bytes().to_vec());
        assert!(ro.get(Bucket::PoolInfo, POOL_CHAIN_CONFIG_KEY).unwrap().is_some());
    }
}
