use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the pending sub-pool.
    pub pending_sub_pool_limit: usize,
    /// Capacity of the base-fee sub-pool.
    pub base_fee_sub_pool_limit: usize,
    /// Capacity of the queued sub-pool.
    pub queued_sub_pool_limit: usize,

    /// Minimum fee cap accepted for non-local transactions.
    pub min_fee_cap: u64,
    /// Number of transaction slots guaranteed per account.
    pub account_slots: u64,
    /// Price bump percentage required to replace an existing transaction.
    pub price_bump: u64,
    /// Fee-cap floor below which a transaction can never execute on this
    /// chain. The protocol pins it today; configurable in case of a hard
    /// fork.
    pub protocol_base_fee: u64,

    /// Persistence commit period.
    pub commit_every: Duration,
    /// Remote-batch drain period.
    pub process_remote_txs_every: Duration,
    /// Period of pooled-hash propagation to recently connected peers.
    pub sync_to_new_peers_every: Duration,
    /// Stats logging period.
    pub log_every: Duration,

    /// Senders for which the pool logs per-operation diagnostics.
    pub traced_senders: Vec<Address>,

    /// Chain parameters persisted alongside the pool.
    pub chain: ChainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pending_sub_pool_limit: 10_000,
            base_fee_sub_pool_limit: 10_000,
            queued_sub_pool_limit: 10_000,

            min_fee_cap: 1,
            account_slots: 16,
            price_bump: 10,
            protocol_base_fee: 7,

            commit_every: Duration::from_secs(15),
            process_remote_txs_every: Duration::from_millis(100),
            sync_to_new_peers_every: Duration::from_secs(2 * 60),
            log_every: Duration::from_secs(30),

            traced_senders: Vec::new(),

            chain: ChainConfig::default(),
        }
    }
}

/// Chain parameters the pool persists so a restarted node can detect that
/// its database belongs to a different network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
}
