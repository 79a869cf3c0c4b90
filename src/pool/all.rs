use std::collections::{hash_map, BTreeMap, HashMap};

use crate::{
    identifiers::{SenderId, TransactionId},
    pool::meta::MetaId,
};

/// The pool-wide nonce index: every pooled transaction keyed by
/// `(sender, nonce)` in one ordered map.
///
/// One large ordered structure beats a map of per-sender structures here:
/// the expensive pool operation is "walk a few transactions for many
/// distinct senders", and a single map keeps those walks cache-friendly.
/// A side map gives O(1) per-sender counts.
#[derive(Debug, Default)]
pub(crate) struct NonceIndex {
    txs: BTreeMap<TransactionId, MetaId>,
    counts: HashMap<SenderId, usize>,
}

impl NonceIndex {
    /// Inserts a transaction, returning the previous occupant of the
    /// `(sender, nonce)` slot if any. The count only grows for fresh slots.
    pub(crate) fn insert(&mut self, id: TransactionId, mt: MetaId) -> Option<MetaId> {
        let replaced = self.txs.insert(id, mt);
        if replaced.is_none() {
            *self.counts.entry(id.sender).or_default() += 1;
        }
        replaced
    }

    pub(crate) fn remove(&mut self, id: &TransactionId) -> Option<MetaId> {
        let removed = self.txs.remove(id)?;
        if let hash_map::Entry::Occupied(mut entry) = self.counts.entry(id.sender) {
            let count = entry.get_mut();
            if *count <= 1 {
                entry.remove();
            } else {
                *count -= 1;
            }
        }
        Some(removed)
    }

    pub(crate) fn get(&self, sender: SenderId, nonce: u64) -> Option<MetaId> {
        self.txs.get(&TransactionId::new(sender, nonce)).copied()
    }

    /// Number of pooled transactions of a sender.
    pub(crate) fn count(&self, sender: SenderId) -> usize {
        self.counts.get(&sender).copied().unwrap_or_default()
    }

    pub(crate) fn has_txs(&self, sender: SenderId) -> bool {
        self.count(sender) > 0
    }

    /// Highest pooled nonce of a sender.
    pub(crate) fn nonce(&self, sender: SenderId) -> Option<u64> {
        self.descend(sender).next().map(|(id, _)| id.nonce)
    }

    /// Transactions of one sender in nonce-ascending order.
    pub(crate) fn ascend(
        &self,
        sender: SenderId,
    ) -> impl Iterator<Item = (TransactionId, MetaId)> + '_ {
        self.sender_range(sender).map(|(id, mt)| (*id, *mt))
    }

    /// Transactions of one sender in nonce-descending order.
    pub(crate) fn descend(
        &self,
        sender: SenderId,
    ) -> impl Iterator<Item = (TransactionId, MetaId)> + '_ {
        self.sender_range(sender).rev().map(|(id, mt)| (*id, *mt))
    }

    pub(crate) fn len(&self) -> usize {
        self.txs.len()
    }

    fn sender_range(
        &self,
        sender: SenderId,
    ) -> impl DoubleEndedIterator<Item = (&TransactionId, &MetaId)> + '_ {
        self.txs
            .range(TransactionId::new(sender, 0)..=TransactionId::new(sender, u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(sender: u64, nonce: u64) -> TransactionId {
        TransactionId::new(SenderId::new(sender), nonce)
    }

    #[test]
    fn test_insert_and_count() {
        let mut index = NonceIndex::default();

        assert_eq!(index.insert(id(1, 0), 10), None);
        assert_eq!(index.insert(id(1, 1), 11), None);
        assert_eq!(index.insert(id(2, 0), 20), None);

        assert_eq!(index.count(SenderId::new(1)), 2);
        assert_eq!(index.count(SenderId::new(2)), 1);
        assert_eq!(index.len(), 3);

        // replacing the same slot keeps the count
        assert_eq!(index.insert(id(1, 0), 12), Some(10));
        assert_eq!(index.count(SenderId::new(1)), 2);
    }

    #[test]
    fn test_remove_drops_empty_count() {
        let mut index = NonceIndex::default();
        index.insert(id(1, 0), 10);
        index.insert(id(1, 1), 11);

        assert_eq!(index.remove(&id(1, 0)), Some(10));
        assert_eq!(index.count(SenderId::new(1)), 1);
        assert!(index.has_txs(SenderId::new(1)));

        assert_eq!(index.remove(&id(1, 1)), Some(11));
        assert!(!index.has_txs(SenderId::new(1)));
        assert_eq!(index.remove(&id(1, 1)), None);
    }

    #[test]
    fn test_ascend_is_bounded_to_sender() {
        let mut index = NonceIndex::default();
        index.insert(id(1, 5), 15);
        index.insert(id(1, 7), 17);
        index.insert(id(2, 0), 20);
        index.insert(id(2, u64::MAX), 21);

        let ones: Vec<_> = index.ascend(SenderId::new(1)).collect();
        assert_eq!(ones, vec![(id(1, 5), 15), (id(1, 7), 17)]);

        // the u64::MAX nonce of sender 2 must not leak into sender 1's walk
        // and must be reachable in sender 2's own walk
        let twos: Vec<_> = index.ascend(SenderId::new(2)).collect();
        assert_eq!(twos, vec![(id(2, 0), 20), (id(2, u64::MAX), 21)]);
    }

    #[test]
    fn test_descend_and_highest_nonce() {
        let mut index = NonceIndex::default();
        index.insert(id(1, 3), 13);
        index.insert(id(1, 9), 19);
        index.insert(id(1, 6), 16);

        let down: Vec<_> = index.descend(SenderId::new(1)).map(|(id, _)| id.nonce).collect();
        assert_eq!(down, vec![9, 6, 3]);
        assert_eq!(index.nonce(SenderId::new(1)), Some(9));
        assert_eq!(index.nonce(SenderId::new(2)), None);
    }
}
