use alloy_primitives::{Address, Bytes, B256, U256};

use crate::identifiers::SenderId;

/// A parsed transaction as produced by the (external) envelope parser.
///
/// Immutable once admitted to the pool: the engine wraps it in an `Arc` and
/// every index shares that one copy. The only field touched after parsing is
/// `sender_id`/`traced`, which the sender registry assigns before the slot
/// becomes shared, and `rlp`, which the engine takes out of the slot at
/// admission so the encoded bytes can be released after persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxSlot {
    /// Keccak hash of the serialized transaction.
    pub id_hash: B256,
    /// Recovered sender address.
    pub sender: Address,
    /// Compact id assigned by the sender registry.
    pub sender_id: SenderId,
    pub nonce: u64,
    /// Maximum fee per gas the sender is willing to pay.
    pub fee_cap: u64,
    /// Maximum priority fee per gas.
    pub tip: u64,
    /// Gas limit of the transaction.
    pub gas: u64,
    /// Transferred value.
    pub value: U256,
    /// Length of the calldata.
    pub data_len: usize,
    /// Number of non-zero calldata bytes.
    pub data_nonzero_len: usize,
    /// Contract-creation transaction.
    pub creation: bool,
    /// Originated from local RPC rather than gossip.
    pub is_local: bool,
    /// Serialized form. Taken by the engine at admission.
    pub rlp: Bytes,
    /// Sender is on the traced list; movement through the pool is logged.
    pub traced: bool,
}

/// Re-parses a persisted transaction envelope.
///
/// Parsing lives outside the pool; this seam is only exercised on restore,
/// where stored bytes are never trusted to still be well-formed.
pub trait TxEnvelopeParser: Send + Sync {
    fn parse(&self, rlp: &[u8]) -> Result<TxSlot, ParseError>;
}

/// Envelope parse failure.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Everything a new canonical block tells the pool.
#[derive(Debug, Clone, Default)]
pub struct StateChangeBatch {
    /// Height of the newly canonical block.
    pub block_height: u64,
    /// Expected base fee of the next (pending) block.
    pub pending_block_base_fee: u64,
    /// Gas limit of the block.
    pub block_gas_limit: u64,
    /// Accounts whose nonce or balance changed in this block.
    pub changed_accounts: Vec<Address>,
}

/// One entry of a `best()` snapshot.
#[derive(Debug, Clone)]
pub struct BestTx {
    pub rlp: Bytes,
    pub sender: Address,
    pub is_local: bool,
}

/// Opaque peer identifier handed in by the gossip boundary.
pub type PeerId = B256;

/// Buffer of recently connected good peers.
///
/// All pooled hashes are propagated to these peers on the next sync tick,
/// after which the list is cleared. Disconnects are not tracked.
#[derive(Debug, Default)]
pub struct RecentlyConnectedPeers {
    peers: Vec<PeerId>,
}

impl RecentlyConnectedPeers {
    pub fn add_peer(&mut self, peer: PeerId) {
        self.peers.push(peer);
    }

    pub fn get_and_clean(&mut self) -> Vec<PeerId> {
        std::mem::take(&mut self.peers)
    }
}
