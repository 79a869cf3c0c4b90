use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Logical buckets of the pool database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// hash => 20-byte sender address followed by the raw serialized tx.
    PoolTransaction,
    /// big-endian insertion index => 32-byte id hash.
    RecentLocalTransaction,
    /// reserved keys: `last_seen_block`, `pending_base_fee`, `chain_config`.
    PoolInfo,
}

/// Persistence backend failure.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv backend: {0}")]
    Backend(String),
}

/// Read half of a database transaction.
pub trait KvRead {
    fn has(&self, bucket: Bucket, key: &[u8]) -> Result<bool, KvError>;

    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Visits every entry of a bucket in key order.
    fn for_each(
        &self,
        bucket: Bucket,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError>;
}

/// Write half of a database transaction.
pub trait KvWrite: KvRead {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<(), KvError>;

    /// Insert a key expected to sort after every existing key of the
    /// bucket; backends may exploit this for sequential writes.
    fn append(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    fn clear_bucket(&mut self, bucket: Bucket) -> Result<(), KvError>;
}

/// A read-write transaction. Nothing is durable until `commit` returns Ok;
/// dropping without committing discards all writes.
pub trait KvRw: KvWrite {
    fn commit(self: Box<Self>) -> Result<(), KvError>;
}

/// The pool's durable store; hands out transactions.
pub trait PoolDb: Send + Sync {
    fn begin_ro(&self) -> Result<Box<dyn KvRead + '_>, KvError>;
    fn begin_rw(&self) -> Result<Box<dyn KvRw + '_>, KvError>;
}

#[derive(Debug, Default, Clone)]
struct Tables {
    pool_transaction: BTreeMap<Vec<u8>, Vec<u8>>,
    recent_local_transaction: BTreeMap<Vec<u8>, Vec<u8>>,
    pool_info: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Tables {
    fn bucket(&self, bucket: Bucket) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        match bucket {
            Bucket::PoolTransaction => &self.pool_transaction,
            Bucket::RecentLocalTransaction => &self.recent_local_transaction,
            Bucket::PoolInfo => &self.pool_info,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BTreeMap<Vec<u8>, Vec<u8>> {
        match bucket {
            Bucket::PoolTransaction => &mut self.pool_transaction,
            Bucket::RecentLocalTransaction => &mut self.recent_local_transaction,
            Bucket::PoolInfo => &mut self.pool_info,
        }
    }

    fn has(&self, bucket: Bucket, key: &[u8]) -> bool {
        self.bucket(bucket).contains_key(key)
    }

    fn get(&self, bucket: Bucket, key: &[u8]) -> Option<Vec<u8>> {
        self.bucket(bucket).get(key).cloned()
    }

    fn for_each(
        &self,
        bucket: Bucket,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        for (key, value) in self.bucket(bucket) {
            f(key, value)?;
        }
        Ok(())
    }
}

/// In-memory [`PoolDb`] with transactional semantics: a read-write
/// transaction works on a private copy that only becomes visible on commit.
/// Backs tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemDb {
    tables: Mutex<Tables>,
}

impl PoolDb for MemDb {
    fn begin_ro(&self) -> Result<Box<dyn KvRead + '_>, KvError> {
        Ok(Box::new(MemRo { tables: self.tables.lock().clone() }))
    }

    fn begin_rw(&self) -> Result<Box<dyn KvRw + '_>, KvError> {
        Ok(Box::new(MemRw { db: self, tables: self.tables.lock().clone() }))
    }
}

struct MemRo {
    tables: Tables,
}

impl KvRead for MemRo {
    fn has(&self, bucket: Bucket, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.tables.has(bucket, key))
    }

    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.tables.get(bucket, key))
    }

    fn for_each(
        &self,
        bucket: Bucket,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        self.tables.for_each(bucket, f)
    }
}

struct MemRw<'db> {
    db: &'db MemDb,
    tables: Tables,
}

impl KvRead for MemRw<'_> {
    fn has(&self, bucket: Bucket, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.tables.has(bucket, key))
    }

    fn get(&self, bucket: Bucket, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.tables.get(bucket, key))
    }

    fn for_each(
        &self,
        bucket: Bucket,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        self.tables.for_each(bucket, f)
    }
}

impl KvWrite for MemRw<'_> {
    fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.tables.bucket_mut(bucket).insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket: Bucket, key: &[u8]) -> Result<(), KvError> {
        self.tables.bucket_mut(bucket).remove(key);
        Ok(())
    }

    fn append(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let table = self.tables.bucket_mut(bucket);
        if let Some((last, _)) = table.last_key_value() {
            if key <= last.as_slice() {
                return Err(KvError::Backend(format!(
                    "append out of order in {bucket:?}"
                )));
            }
        }
        table.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn clear_bucket(&mut self, bucket: Bucket) -> Result<(), KvError> {
        self.tables.bucket_mut(bucket).clear();
        Ok(())
    }
}

impl KvRw for MemRw<'_> {
    fn commit(self: Box<Self>) -> Result<(), KvError> {
        *self.db.tables.lock() = self.tables;
        Ok(())
    }
}
