use alloy_primitives::U256;
use tracing::info;

use crate::{config::Config, result::DiscardReason, senders::SenderInfo, types::TxSlot};

/// Base gas of a plain transfer.
pub const TX_GAS: u64 = 21_000;
/// Base gas of a contract creation.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
/// Gas per zero calldata byte.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Gas per non-zero calldata byte (Istanbul pricing).
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Maximum accepted serialized transaction size. Larger transactions are
/// significantly more expensive to propagate and validate.
pub const TX_MAX_SIZE: usize = 128 * 1024;

/// Computes the intrinsic gas of a transaction from its calldata shape.
pub fn intrinsic_gas(
    data_len: u64,
    data_nonzero_len: u64,
    creation: bool,
) -> Result<u64, DiscardReason> {
    let mut gas = if creation { TX_GAS_CONTRACT_CREATION } else { TX_GAS };

    if data_len > 0 {
        // Zero and non-zero bytes are priced differently.
        let nz = data_nonzero_len;
        if (u64::MAX - gas) / TX_DATA_NON_ZERO_GAS < nz {
            return Err(DiscardReason::GasUintOverflow);
        }
        gas += nz * TX_DATA_NON_ZERO_GAS;

        let z = data_len - nz;
        if (u64::MAX - gas) / TX_DATA_ZERO_GAS < z {
            return Err(DiscardReason::GasUintOverflow);
        }
        gas += z * TX_DATA_ZERO_GAS;
    }
    Ok(gas)
}

/// Static checks against one candidate transaction.
///
/// `pooled_count` is the number of transactions this sender already has in
/// the pool. The balance check here uses the tip, not the fee cap; the
/// cumulative fee-cap check happens during reclassification, where it sets
/// the balance marker bit instead of rejecting.
pub(crate) fn validate_tx(
    cfg: &Config,
    txn: &TxSlot,
    pooled_count: u64,
    info: &SenderInfo,
) -> Result<(), DiscardReason> {
    if txn.rlp.len() > TX_MAX_SIZE {
        return Err(DiscardReason::RlpTooLong);
    }
    // Drop non-local transactions under our own minimal accepted fee cap
    if !txn.is_local && txn.fee_cap < cfg.min_fee_cap {
        if txn.traced {
            info!(target: "txpool",
                id_hash = %txn.id_hash, fee_cap = txn.fee_cap, min_fee_cap = cfg.min_fee_cap,
                "validate: underpriced");
        }
        return Err(DiscardReason::UnderPriced);
    }
    let gas = intrinsic_gas(txn.data_len as u64, txn.data_nonzero_len as u64, txn.creation)?;
    if gas > txn.gas {
        if txn.traced {
            info!(target: "txpool",
                id_hash = %txn.id_hash, intrinsic = gas, gas_limit = txn.gas,
                "validate: intrinsic gas exceeds gas limit");
        }
        return Err(DiscardReason::IntrinsicGas);
    }
    if pooled_count + 1 > cfg.account_slots {
        if txn.traced {
            info!(target: "txpool",
                id_hash = %txn.id_hash, slots = pooled_count, limit = cfg.account_slots,
                "validate: sender over account slots");
        }
        return Err(DiscardReason::Spammer);
    }
    if info.nonce > txn.nonce {
        if txn.traced {
            info!(target: "txpool",
                id_hash = %txn.id_hash, state_nonce = info.nonce, tx_nonce = txn.nonce,
                "validate: nonce too low");
        }
        return Err(DiscardReason::NonceTooLow);
    }
    // Transactor should have enough funds to cover the costs
    let total = U256::from(txn.gas) * U256::from(txn.tip) + txn.value;
    if info.balance < total {
        if txn.traced {
            info!(target: "txpool",
                id_hash = %txn.id_hash, balance = %info.balance, required = %total,
                "validate: insufficient funds");
        }
        return Err(DiscardReason::InsufficientFunds);
    }
    Ok(())
}
