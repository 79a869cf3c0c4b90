//! Fixtures for pool tests: parsed transaction slots with a reversible
//! test encoding, an in-memory state view and pre-wired pool instances.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use tokio::sync::mpsc;

use crate::{
    config::Config,
    kv::PoolDb,
    pool::{meta::MetaTx, state::SubPoolType, TxPool},
    senders::{encode_sender_info, SenderInfo, StateError, StateProvider, StateView},
    types::{ParseError, StateChangeBatch, TxEnvelopeParser, TxSlot},
};

const ENCODED_LEN: usize = 32 + 8 * 4 + 32 + 8 + 8 + 1;

pub(crate) fn tx_slot(
    sender: Address,
    nonce: u64,
    fee_cap: u64,
    tip: u64,
    gas: u64,
    value: U256,
) -> TxSlot {
    let mut txn = TxSlot {
        id_hash: B256::random(),
        sender,
        nonce,
        fee_cap,
        tip,
        gas,
        value,
        ..Default::default()
    };
    txn.rlp = encode_slot(&txn);
    txn
}

/// A plain transfer with default gas and zero value.
pub(crate) fn simple_tx(sender: Address, nonce: u64, fee_cap: u64, tip: u64) -> TxSlot {
    tx_slot(sender, nonce, fee_cap, tip, 21_000, U256::ZERO)
}

/// Fixed-width test encoding of a slot; [`TestParser`] is its inverse, so
/// persisted transactions survive a restore round-trip.
pub(crate) fn encode_slot(txn: &TxSlot) -> Bytes {
    let mut out = Vec::with_capacity(ENCODED_LEN);
    out.extend_from_slice(txn.id_hash.as_slice());
    out.extend_from_slice(&txn.nonce.to_be_bytes());
    out.extend_from_slice(&txn.fee_cap.to_be_bytes());
    out.extend_from_slice(&txn.tip.to_be_bytes());
    out.extend_from_slice(&txn.gas.to_be_bytes());
    out.extend_from_slice(&txn.value.to_be_bytes::<32>());
    out.extend_from_slice(&(txn.data_len as u64).to_be_bytes());
    out.extend_from_slice(&(txn.data_nonzero_len as u64).to_be_bytes());
    out.push(txn.creation as u8);
    Bytes::from(out)
}

pub(crate) struct TestParser;

impl TxEnvelopeParser for TestParser {
    fn parse(&self, rlp: &[u8]) -> Result<TxSlot, ParseError> {
        if rlp.len() != ENCODED_LEN {
            return Err(ParseError(format!("bad test envelope length {}", rlp.len())));
        }
        let u64_at = |offset: usize| {
            u64::from_be_bytes(rlp[offset..offset + 8].try_into().expect("sliced to 8 bytes"))
        };
        let mut txn = TxSlot {
            id_hash: B256::from_slice(&rlp[..32]),
            nonce: u64_at(32),
            fee_cap: u64_at(40),
            tip: u64_at(48),
            gas: u64_at(56),
            value: U256::from_be_slice(&rlp[64..96]),
            data_len: u64_at(96) as usize,
            data_nonzero_len: u64_at(104) as usize,
            creation: rlp[112] != 0,
            ..Default::default()
        };
        txn.rlp = Bytes::copy_from_slice(rlp);
        Ok(txn)
    }
}

/// In-memory state view mapping addresses to nonce and balance.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestStateView {
    accounts: HashMap<Address, SenderInfo>,
}

impl TestStateView {
    pub(crate) fn with_account(mut self, address: Address, nonce: u64, balance: U256) -> Self {
        self.accounts.insert(address, SenderInfo { nonce, balance });
        self
    }
}

impl StateView for TestStateView {
    fn account(&self, address: &Address) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.accounts.get(address).map(encode_sender_info))
    }
}

impl StateProvider for TestStateView {
    fn view(&self) -> Result<Box<dyn StateView + '_>, StateError> {
        Ok(Box::new(self.clone()))
    }
}

pub(crate) fn test_pool() -> (TxPool, mpsc::Receiver<Vec<B256>>) {
    test_pool_with_config(Config::default())
}

pub(crate) fn test_pool_with_config(cfg: Config) -> (TxPool, mpsc::Receiver<Vec<B256>>) {
    let (tx, rx) = mpsc::channel(32);
    (TxPool::new(tx, cfg, Arc::new(TestParser)), rx)
}

/// Feeds the pool its first block so submissions are accepted.
pub(crate) fn start_pool(
    pool: &TxPool,
    db: &dyn PoolDb,
    view: &dyn StateView,
    pending_base_fee: u64,
    block_gas_limit: u64,
) {
    let ro = db.begin_ro().expect("mem db read tx");
    pool.on_new_block(
        &*ro,
        view,
        &StateChangeBatch {
            block_height: 1,
            pending_block_base_fee: pending_base_fee,
            block_gas_limit,
            changed_accounts: vec![],
        },
        vec![],
        vec![],
    )
    .expect("first block");
}

/// Bare envelope for container and comparator tests; not wired into any
/// index.
pub(crate) fn meta_tx_with(fee_cap: u64, tip: u64, current: SubPoolType) -> MetaTx {
    let txn = TxSlot {
        id_hash: B256::random(),
        fee_cap,
        tip,
        gas: 21_000,
        ..Default::default()
    };
    let rlp = encode_slot(&txn);
    let mut mt = MetaTx::new(Arc::new(txn), rlp, false, 0);
    mt.min_fee_cap = fee_cap;
    mt.min_tip = tip;
    mt.current_sub_pool = current;
    mt
}
