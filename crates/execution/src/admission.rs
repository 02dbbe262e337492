//! Admission: choosing which collected transactions run in this block.
//!
//! [`admit`] filters the collected transactions, resolves duplicate nonces,
//! keeps each sender's contiguous nonce run starting at its on-chain nonce,
//! and prepays gas from the sender's balance. The admitted transactions come
//! back in standby order: every sender's first admitted nonce (senders by
//! ascending address), then every sender's second one, and so on.
//!
//! Nothing here is an error. A transaction that does not make it is counted
//! under a [`DiscardReason`] and dropped, except those waiting behind a
//! missing nonce: they are handed back as deferred so the engine can keep
//! them collected for a later block.

use crate::database::KvStore;
use crate::state::StateExt;
use crate::types::PendingTransaction;
use alloy_primitives::{Address, U256};
use parevm_metrics::admission::ADMISSION_DISCARDS;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Why a collected transaction was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscardReason {
    /// Gas price below the minimum.
    GasPriceTooLow,
    /// Gas limit above the per-transaction ceiling.
    GasLimitTooHigh,
    /// Another transaction with the same sender and nonce won the tie-break.
    DuplicateNonce,
    /// Nonce already used on chain.
    StaleNonce,
    /// Sender cannot prepay `gas_limit * gas_price`.
    Unaffordable,
    /// Deferred behind a nonce gap until it grew too old.
    Expired,
}

impl DiscardReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GasPriceTooLow => "gas_price_too_low",
            Self::GasLimitTooHigh => "gas_limit_too_high",
            Self::DuplicateNonce => "duplicate_nonce",
            Self::StaleNonce => "stale_nonce",
            Self::Unaffordable => "unaffordable",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of one admission pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Admitted transactions in standby order.
    pub admitted: Vec<PendingTransaction>,
    /// Transactions behind a nonce gap, to be retried later.
    pub deferred: Vec<PendingTransaction>,
    /// Senders whose balance was charged.
    pub touched: BTreeSet<Address>,
    /// Number of discarded transactions per reason.
    pub discarded: BTreeMap<DiscardReason, usize>,
}

impl Admission {
    fn discard(&mut self, tx: &PendingTransaction, reason: DiscardReason) {
        tracing::debug!(
            from = %tx.from,
            nonce = tx.nonce,
            reason = reason.as_str(),
            "Transaction not admitted"
        );
        *self.discarded.entry(reason).or_default() += 1;
    }

    fn defer(&mut self, tx: PendingTransaction) {
        tracing::debug!(from = %tx.from, nonce = tx.nonce, "Transaction deferred behind nonce gap");
        self.deferred.push(tx);
    }

    /// Total discarded transactions.
    pub fn discarded_count(&self) -> usize {
        self.discarded.values().sum()
    }
}

/// Select, order and prepay the transactions of `collected`.
///
/// Sender balances in `store` are reduced by the prepaid fee of every
/// admitted transaction.
pub fn admit(
    store: &dyn KvStore,
    collected: Vec<PendingTransaction>,
    min_gas_price: U256,
    max_tx_gas_limit: u64,
) -> Admission {
    let mut admission = Admission::default();

    let mut by_sender: BTreeMap<Address, BTreeMap<u64, PendingTransaction>> = BTreeMap::new();
    for tx in collected {
        if tx.gas_price < min_gas_price {
            admission.discard(&tx, DiscardReason::GasPriceTooLow);
            continue;
        }
        if tx.gas_limit > max_tx_gas_limit {
            admission.discard(&tx, DiscardReason::GasLimitTooHigh);
            continue;
        }
        match by_sender.entry(tx.from).or_default().entry(tx.nonce) {
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
            Entry::Occupied(mut slot) => {
                // lowest content hash wins
                if tx.hash() < slot.get().hash() {
                    let loser = slot.insert(tx);
                    admission.discard(&loser, DiscardReason::DuplicateNonce);
                } else {
                    admission.discard(&tx, DiscardReason::DuplicateNonce);
                }
            }
        }
    }

    let mut runs: Vec<Vec<PendingTransaction>> = Vec::with_capacity(by_sender.len());
    for (sender, txs) in by_sender {
        let run = admit_sender(store, sender, txs, &mut admission);
        if !run.is_empty() {
            admission.touched.insert(sender);
            runs.push(run);
        }
    }

    admission.admitted = interleave(runs);
    for (reason, count) in &admission.discarded {
        ADMISSION_DISCARDS
            .with_label_values(&[reason.as_str()])
            .inc_by(*count as f64);
    }
    admission
}

/// Keep the contiguous, affordable nonce run of one sender and charge it.
fn admit_sender(
    store: &dyn KvStore,
    sender: Address,
    txs: BTreeMap<u64, PendingTransaction>,
    admission: &mut Admission,
) -> Vec<PendingTransaction> {
    let Some(mut account) = store.account(&sender) else {
        for tx in txs.values() {
            admission.discard(tx, DiscardReason::Unaffordable);
        }
        return Vec::new();
    };
    let mut next_nonce = account.nonce;
    let mut run = Vec::new();
    let mut unaffordable = false;
    let mut gap = false;

    for (nonce, tx) in txs {
        if nonce < next_nonce {
            admission.discard(&tx, DiscardReason::StaleNonce);
            continue;
        }
        if unaffordable {
            admission.discard(&tx, DiscardReason::Unaffordable);
            continue;
        }
        if gap || nonce > next_nonce {
            gap = true;
            admission.defer(tx);
            continue;
        }
        match tx.max_fee() {
            Some(fee) if fee <= account.balance => {
                account.balance -= fee;
                next_nonce += 1;
                run.push(tx);
            }
            _ => {
                unaffordable = true;
                admission.discard(&tx, DiscardReason::Unaffordable);
            }
        }
    }

    if !run.is_empty() {
        store.set_account(&sender, &account);
    }
    run
}

/// Flatten per-sender runs level by level.
fn interleave(runs: Vec<Vec<PendingTransaction>>) -> Vec<PendingTransaction> {
    let total = runs.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = runs.into_iter().map(Vec::into_iter).collect();
    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for iter in &mut iters {
            if let Some(tx) = iter.next() {
                ordered.push(tx);
            }
        }
    }
    ordered
}
