use std::fmt;

bitflags::bitflags! {
    /// Eligibility vector of a pooled transaction, from which its sub-pool
    /// is derived. The numeric value of the whole bitfield is the primary
    /// sort key of the `better`/`worse` predicates, so bit order is
    /// significance order.
    ///
    /// `ENOUGH_FEE_CAP_BLOCK` is virtual: comparators recompute it from the
    /// running minimum fee cap against the pending base fee, which keeps the
    /// heaps stable when the base fee moves between reclassification passes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct SubPoolMarker: u8 {
        /// Fee cap is at or above the in-protocol minimum base fee; unset
        /// means the transaction can never execute on this chain.
        const ENOUGH_FEE_CAP_PROTOCOL = 0b100000;
        /// All nonces between the state nonce and this one are pooled.
        const NO_NONCE_GAPS = 0b010000;
        /// Sender balance covers `gas * fee_cap + value` of this and all
        /// prior pooled transactions.
        const ENOUGH_BALANCE = 0b001000;
        /// Gas limit fits in a block.
        const NOT_TOO_MUCH_GAS = 0b000100;
        /// Fee cap meets the pending block's base fee.
        const ENOUGH_FEE_CAP_BLOCK = 0b000010;
        /// Transaction originated locally.
        const IS_LOCAL = 0b000001;

        /// Floor of the base-fee sub-pool.
        const BASE_FEE_POOL_BITS = Self::ENOUGH_FEE_CAP_PROTOCOL.bits()
            | Self::NO_NONCE_GAPS.bits()
            | Self::ENOUGH_BALANCE.bits()
            | Self::NOT_TOO_MUCH_GAS.bits();
        /// Floor of the queued sub-pool; anything below is discarded.
        const QUEUED_POOL_BITS = Self::ENOUGH_FEE_CAP_PROTOCOL.bits();
    }
}

impl SubPoolMarker {
    /// Numeric comparison against a pool floor. `contains` is the wrong tool
    /// here: the floors are order thresholds, not bit masks.
    #[inline]
    pub fn at_least(&self, floor: SubPoolMarker) -> bool {
        self.bits() >= floor.bits()
    }
}

/// Which sub-pool currently holds a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubPoolType {
    /// Not in any sub-pool (freshly created or already popped).
    #[default]
    None,
    Pending,
    BaseFee,
    Queued,
}

impl fmt::Display for SubPoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::Pending => "Pending",
            Self::BaseFee => "BaseFee",
            Self::Queued => "Queued",
        };
        f.write_str(s)
    }
}
