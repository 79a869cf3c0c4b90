//! In-memory transaction pool of an Ethereum-like execution client.
//!
//! Candidate transactions arrive pre-parsed from peer gossip and local RPC,
//! are validated against current chain state, and are continuously
//! re-classified across three sub-pools (Pending / BaseFee / Queued) so the
//! consensus layer can pull the best executable set via [`TxPool::best`].
//! New canonical blocks remove mined transactions; reorgs reinject unwound
//! ones.
//!
//! The engine starts no tasks and owns no database handles: callers pass a
//! [`senders::StateView`] and a [`kv::KvRead`]/[`kv::PoolDb`] per operation,
//! and [`maintain::main_loop`] drives the periodic work.

pub mod config;
pub mod identifiers;
pub mod kv;
pub mod maintain;
pub mod persist;
pub mod pool;
pub mod result;
pub mod senders;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ChainConfig, Config};
pub use pool::TxPool;
pub use result::{DiscardReason, PoolError, PoolResult};
pub use types::{BestTx, StateChangeBatch, TxEnvelopeParser, TxSlot};
