use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
use tracing::info;

use crate::{
    identifiers::SenderId,
    types::{StateChangeBatch, TxSlot},
};

/// Read-only view of sender accounts at the current chain head.
///
/// Returns the encoded account (see [`decode_sender_info`]) or `None` for an
/// account absent from state. A fresh view is acquired by the caller per
/// operation so lookups never outlive the block they were taken against.
pub trait StateView {
    fn account(&self, address: &Address) -> Result<Option<Vec<u8>>, StateError>;
}

/// Produces a [`StateView`] pinned to the current chain head.
pub trait StateProvider: Send + Sync {
    fn view(&self) -> Result<Box<dyn StateView + '_>, StateError>;
}

/// State lookup failure.
#[derive(Debug, thiserror::Error)]
#[error("state view: {0}")]
pub struct StateError(pub String);

/// Nonce and balance of a sender, fetched on demand and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderInfo {
    pub nonce: u64,
    pub balance: U256,
}

/// Decodes an account as returned by [`StateView::account`]: 8-byte
/// big-endian nonce followed by the big-endian balance remainder.
pub fn decode_sender_info(encoded: &[u8]) -> Result<SenderInfo, StateError> {
    if encoded.len() < 8 || encoded.len() > 8 + 32 {
        return Err(StateError(format!("bad account encoding, len={}", encoded.len())));
    }
    let nonce = u64::from_be_bytes(encoded[..8].try_into().expect("sliced to 8 bytes"));
    let balance = U256::from_be_slice(&encoded[8..]);
    Ok(SenderInfo { nonce, balance })
}

/// Encodes an account for [`StateView::account`]. Inverse of
/// [`decode_sender_info`]; mainly useful for state-view implementations and
/// fixtures.
pub fn encode_sender_info(info: &SenderInfo) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + 32);
    out.extend_from_slice(&info.nonce.to_be_bytes());
    out.extend_from_slice(&info.balance.to_be_bytes::<32>());
    out
}

/// Interns sender addresses to compact [`SenderId`]s and remembers which
/// senders are traced.
///
/// Lives entirely under the pool lock; flushing evicts mappings for senders
/// that no longer have pooled transactions.
#[derive(Debug, Default)]
pub struct SenderRegistry {
    last_id: u64,
    sender_ids: HashMap<Address, SenderId>,
    sender_addrs: HashMap<SenderId, Address>,
    traced: HashSet<Address>,
}

impl SenderRegistry {
    pub fn new(traced_senders: &[Address]) -> Self {
        Self {
            traced: traced_senders.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn id(&self, address: &Address) -> Option<SenderId> {
        self.sender_ids.get(address).copied()
    }

    pub fn address(&self, id: SenderId) -> Option<Address> {
        self.sender_addrs.get(&id).copied()
    }

    /// Interns the address, allocating a fresh id on first sight. Also
    /// reports whether the sender is traced.
    pub fn get_or_create_id(&mut self, address: Address) -> (SenderId, bool) {
        let traced = self.traced.contains(&address);
        let id = match self.sender_ids.get(&address) {
            Some(id) => *id,
            None => {
                self.last_id += 1;
                let id = SenderId::new(self.last_id);
                self.sender_ids.insert(address, id);
                self.sender_addrs.insert(id, address);
                if traced {
                    info!(target: "txpool", sender = %address, id = %id, "allocated id to traced sender");
                }
                id
            }
        };
        (id, traced)
    }

    /// Assigns `sender_id` and `traced` on every slot of an incoming batch.
    pub fn register_new_senders(&mut self, txs: &mut [TxSlot]) {
        for txn in txs {
            let (id, traced) = self.get_or_create_id(txn.sender);
            txn.sender_id = id;
            txn.traced = traced;
        }
    }

    /// Registers every address a new block touches: changed accounts plus
    /// the senders of unwound and mined transactions.
    pub fn on_new_block(
        &mut self,
        state_changes: &StateChangeBatch,
        unwind_txs: &mut [TxSlot],
        mined_txs: &mut [TxSlot],
    ) {
        for address in &state_changes.changed_accounts {
            self.get_or_create_id(*address);
        }
        self.register_new_senders(unwind_txs);
        self.register_new_senders(mined_txs);
    }

    /// Looks up nonce and balance for an interned sender. Accounts missing
    /// from state read as zero nonce and zero balance.
    pub fn info(&self, view: &dyn StateView, id: SenderId) -> Result<SenderInfo, StateError> {
        let address = self
            .address(id)
            .ok_or_else(|| StateError(format!("unknown sender id {id}")))?;
        match view.account(&address)? {
            Some(encoded) if !encoded.is_empty() => decode_sender_info(&encoded),
            _ => Ok(SenderInfo::default()),
        }
    }

    /// Drops the mapping of a sender that no longer has pooled transactions.
    pub fn evict(&mut self, id: SenderId) {
        if let Some(address) = self.sender_addrs.remove(&id) {
            self.sender_ids.remove(&address);
        }
    }
}
