use std::fmt;

use alloy_primitives::B256;

use crate::{kv::KvError, senders::StateError};

/// Outcome recorded for every transaction that passes through the pool.
///
/// `Success` means accepted; every other variant explains why the
/// transaction is not (or no longer) in the pool. Reasons are returned
/// index-aligned from `add_local_txs` and kept in a bounded LRU so late
/// callers can still ask what happened to a hash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DiscardReason {
    Success,
    AlreadyKnown,
    /// Transaction was included in a canonical block.
    Mined,
    /// Evicted because a same-sender same-nonce transaction with a
    /// sufficient price bump arrived.
    ReplacedByHigherTip,
    /// Non-local transaction below the pool's minimum fee cap.
    UnderPriced,
    /// Replacement attempted without the required price bump.
    ReplaceUnderpriced,
    /// Marker dropped below the floor of the queued sub-pool.
    FeeTooLow,
    OversizedData,
    InvalidSender,
    NegativeValue,
    /// Sender exceeded its account slots; half of its pooled transactions
    /// are dropped with this reason as well.
    Spammer,
    PendingPoolOverflow,
    BaseFeePoolOverflow,
    QueuedPoolOverflow,
    /// Intrinsic gas computation overflowed u64.
    GasUintOverflow,
    /// Transaction gas limit is below its intrinsic gas.
    IntrinsicGas,
    /// Serialized form exceeds the maximum accepted size.
    RlpTooLong,
    NonceTooLow,
    InsufficientFunds,
    /// Same (sender, nonce) exists and the newcomer did not clear the
    /// price-bump thresholds.
    NotReplaced,
    /// Same id hash already present.
    DuplicateHash,
}

impl DiscardReason {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::AlreadyKnown => "already known",
            Self::Mined => "mined",
            Self::ReplacedByHigherTip => "replaced by transaction with higher tip",
            Self::UnderPriced => "underpriced",
            Self::ReplaceUnderpriced => "replacement transaction underpriced",
            Self::FeeTooLow => "fee too low",
            Self::OversizedData => "oversized data",
            Self::InvalidSender => "invalid sender",
            Self::NegativeValue => "negative value",
            Self::Spammer => "spammer",
            Self::PendingPoolOverflow => "pending sub-pool is full",
            Self::BaseFeePoolOverflow => "baseFee sub-pool is full",
            Self::QueuedPoolOverflow => "queued sub-pool is full",
            Self::GasUintOverflow => "gas uint overflow",
            Self::IntrinsicGas => "intrinsic gas too low",
            Self::RlpTooLong => "rlp too long",
            Self::NonceTooLow => "nonce too low",
            Self::InsufficientFunds => "insufficient funds",
            Self::NotReplaced => "could not replace existing tx",
            Self::DuplicateHash => "existing tx with same hash",
        };
        f.write_str(s)
    }
}

/// Transaction pool result type.
pub type PoolResult<T> = Result<T, PoolError>;

/// Infrastructure failure of a pool operation.
///
/// Per-transaction rejections are never errors; they come back as
/// [`DiscardReason`]s. An error here means the whole call was aborted and
/// no in-memory mutation of that call survives.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool has not yet seen its first block.
    #[error("pool not started yet")]
    NotStarted,

    /// State view lookup failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// Pool persistence backend failed.
    #[error(transparent)]
    Db(#[from] KvError),

    /// A persisted transaction envelope could not be re-parsed.
    #[error("parsing persisted transaction {hash}: {message}")]
    Parse {
        /// Hash key the envelope was stored under.
        hash: B256,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_reason_display() {
        assert_eq!(DiscardReason::Success.to_string(), "success");
        assert_eq!(DiscardReason::NotReplaced.to_string(), "could not replace existing tx");
        assert!(DiscardReason::Success.is_success());
        assert!(!DiscardReason::Mined.is_success());
    }
}
