//! Runner: runs one transaction against an isolated view of state.
//!
//! A [`Runner`] holds everything a transaction needs besides the state
//! itself: the execution backend, the precompile table, the system contract
//! registry, the block hash cache and the gas policy. It is cheap to clone
//! and shared by every worker of both pools.
//!
//! Each run opens an [`Overlay`] over the shared store. In block mode the
//! overlay's reads and writes come back as an [`OverlayDiff`] for the pool to
//! apply in queue order. In ad-hoc mode the overlay is discarded.

use crate::backend::{CallOutcome, CallRequest, ChangeSet, ExecutionBackend, Host};
use crate::account::{AccountInfo, BytecodeInfo};
use crate::database::{KvStore, Overlay, OverlayDiff};
use crate::gas::GasPolicy;
use crate::precompiles::{PrecompileCall, PrecompileSet};
use crate::standby::is_too_old;
use crate::state::{BlockHashCache, StateExt};
use crate::system::SystemContractRegistry;
use crate::types::{BlockInfo, CommittedResult, PendingTransaction, StatusCode};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use revm::primitives::hardfork::SpecId;
use std::sync::Arc;

/// Hard fork rules handed to the backend unless configured otherwise.
pub const DEFAULT_REVISION: SpecId = SpecId::ISTANBUL;

/// Result of one block-mode run.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    /// The transaction's outcome.
    pub result: CommittedResult,
    /// Keys the run read and the writes it wants applied.
    pub diff: OverlayDiff,
}

/// Result of one ad-hoc call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// Outcome status.
    pub status: StatusCode,
    /// Settled gas used.
    pub gas_used: u64,
    /// Returned data.
    pub output: Bytes,
    /// Logs the call would have emitted.
    pub logs: Vec<Log>,
    /// Contract the call would have created.
    pub created_address: Option<Address>,
    /// Backend gas estimate, set when one was requested.
    pub gas_estimate: u64,
}

/// Shared execution context of the worker pools.
#[derive(Clone)]
pub struct Runner {
    backend: Arc<dyn ExecutionBackend>,
    precompiles: Arc<PrecompileSet>,
    system: Arc<SystemContractRegistry>,
    block_hashes: Arc<BlockHashCache>,
    gas_policy: GasPolicy,
    revision: SpecId,
}

impl Runner {
    /// Create a runner context.
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        precompiles: Arc<PrecompileSet>,
        system: Arc<SystemContractRegistry>,
        block_hashes: Arc<BlockHashCache>,
        gas_policy: GasPolicy,
    ) -> Self {
        Self {
            backend,
            precompiles,
            system,
            block_hashes,
            gas_policy,
            revision: DEFAULT_REVISION,
        }
    }

    /// Use `revision` for subsequent calls.
    pub fn with_revision(mut self, revision: SpecId) -> Self {
        self.revision = revision;
        self
    }

    /// Hard fork rules in use.
    pub fn revision(&self) -> SpecId {
        self.revision
    }

    /// Gas policy in use.
    pub fn gas_policy(&self) -> GasPolicy {
        self.gas_policy
    }

    /// Tell the system contract a committed transaction was sent to, if any.
    pub fn notify_committed(&self, store: &dyn KvStore, result: &CommittedResult) {
        if let Some(contract) = result.tx.to.and_then(|to| self.system.get(&to)) {
            contract.committed(store, result);
        }
    }

    /// Run a standby transaction for block `block` on top of `base`.
    ///
    /// Nothing is written to `base`. The returned diff carries the writes.
    pub fn run_block_tx(
        &self,
        base: &dyn KvStore,
        block: &BlockInfo,
        tx: PendingTransaction,
    ) -> RunnerOutput {
        if is_too_old(&tx, block.number) {
            return RunnerOutput {
                result: CommittedResult::terminal(tx, StatusCode::TooOld),
                diff: OverlayDiff::default(),
            };
        }

        let view = Overlay::new(base);
        let result = self.run_in(&view, block, tx);
        RunnerOutput {
            result,
            diff: view.into_diff(),
        }
    }

    fn run_in(&self, view: &Overlay<'_>, block: &BlockInfo, tx: PendingTransaction) -> CommittedResult {
        let mut sender = match view.check_nonce(&tx.from, tx.nonce) {
            Ok(account) => account,
            Err(mismatch) => {
                tracing::debug!(
                    from = %tx.from,
                    nonce = tx.nonce,
                    status = %mismatch.status(),
                    "Nonce check failed"
                );
                return CommittedResult::terminal(tx, mismatch.status());
            }
        };
        sender.nonce += 1;
        view.set_account(&tx.from, &sender);

        if let Some(contract) = tx.to.and_then(|to| self.system.get(&to)) {
            let outcome = contract.execute(view, block, &tx);
            let gas_used = outcome.gas_used.min(tx.gas_limit);
            let fee_refund = credit_unused_gas(view, &tx, gas_used);
            let hash = tx.hash();
            return CommittedResult {
                tx,
                hash,
                status: outcome.status,
                gas_used,
                fee_refund,
                logs: outcome.logs,
                internal_calls: Vec::new(),
                internal_returns: Vec::new(),
                output: outcome.output,
                contract_address: None,
            };
        }

        let request = self.request_for(&tx, block);
        let outcome = self.call_backend(view, &request);
        let changes = outcome.changes.unwrap_or_default();
        apply_changes(view, &changes);

        let gas_used = self
            .gas_policy
            .settle(tx.gas_limit, outcome.gas_left, changes.refund);
        let fee_refund = credit_unused_gas(view, &tx, gas_used);
        let hash = tx.hash();
        CommittedResult {
            tx,
            hash,
            status: outcome.status,
            gas_used,
            fee_refund,
            logs: changes.logs,
            internal_calls: changes.internal_calls,
            internal_returns: changes.internal_returns,
            output: outcome.output,
            contract_address: outcome.created_address,
        }
    }

    /// Run a read-only call on top of `base`, discarding every write.
    pub fn run_call(&self, base: &dyn KvStore, request: &CallRequest) -> CallResult {
        let view = Overlay::new(base);

        if let Some(contract) = request.destination.and_then(|to| self.system.get(&to)) {
            let tx = PendingTransaction {
                from: request.sender,
                to: request.destination,
                nonce: request.nonce,
                value: request.value,
                gas_price: request.gas_price,
                gas_limit: request.gas_limit,
                data: request.input.clone(),
                height: request.block.number,
            };
            let outcome = contract.execute(&view, &request.block, &tx);
            view.close(false);
            let gas_used = outcome.gas_used.min(request.gas_limit);
            return CallResult {
                status: outcome.status,
                gas_used,
                output: outcome.output,
                logs: outcome.logs,
                created_address: None,
                gas_estimate: if request.estimate_gas { gas_used } else { 0 },
            };
        }

        let outcome = self.call_backend(&view, request);
        view.close(false);

        let changes = outcome.changes.unwrap_or_default();
        CallResult {
            status: outcome.status,
            gas_used: self
                .gas_policy
                .settle(request.gas_limit, outcome.gas_left, changes.refund),
            output: outcome.output,
            logs: changes.logs,
            created_address: outcome.created_address,
            gas_estimate: outcome.gas_estimate,
        }
    }

    fn call_backend(&self, view: &dyn KvStore, request: &CallRequest) -> CallOutcome {
        let host = RunnerHost {
            store: view,
            precompiles: &self.precompiles,
            system: &self.system,
            block_hashes: &self.block_hashes,
        };
        self.backend.call(request, &host)
    }

    fn request_for(&self, tx: &PendingTransaction, block: &BlockInfo) -> CallRequest {
        CallRequest {
            sender: tx.from,
            destination: tx.to,
            nonce: tx.nonce,
            value: tx.value,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            input: tx.data.clone(),
            block: block.clone(),
            revision: self.revision,
            estimate_gas: false,
        }
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("precompiles", &self.precompiles)
            .field("system", &self.system)
            .field("gas_policy", &self.gas_policy)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

/// Host callbacks over one runner's overlay.
struct RunnerHost<'a> {
    store: &'a dyn KvStore,
    precompiles: &'a PrecompileSet,
    system: &'a SystemContractRegistry,
    block_hashes: &'a BlockHashCache,
}

impl Host for RunnerHost<'_> {
    fn creation_counter(&self, lsb: u8) -> u64 {
        self.store.creation_counter(lsb)
    }

    fn account(&self, address: &Address) -> Option<AccountInfo> {
        self.store.account(address)
    }

    fn bytecode(&self, address: &Address) -> Option<BytecodeInfo> {
        self.store.bytecode(address)
    }

    fn storage(&self, sequence: u64, slot: &B256) -> Option<Vec<u8>> {
        self.store.storage(sequence, slot)
    }

    fn block_hash(&self, number: u64) -> B256 {
        self.block_hashes.get(number)
    }

    fn call_precompile(
        &self,
        address: &Address,
        input: &[u8],
        gas_left: u64,
    ) -> Option<PrecompileCall> {
        self.precompiles
            .call(address, input, gas_left)
            .or_else(|| {
                self.system
                    .call_as_precompile(self.store, address, input, gas_left)
            })
    }
}

/// Write a backend change-set into `store`.
///
/// # Panics
///
/// Panics if the change-set reassigns the sequence of an existing contract.
pub fn apply_changes(store: &dyn KvStore, changes: &ChangeSet) {
    for change in &changes.accounts {
        match &change.account {
            Some(account) => {
                if let Some(previous) = store.account(&change.address) {
                    assert!(
                        !previous.has_sequence() || previous.sequence == account.sequence,
                        "sequence of {} changed from {} to {}",
                        change.address,
                        previous.sequence,
                        account.sequence
                    );
                }
                store.set_account(&change.address, account);
            }
            None => store.delete_account(&change.address),
        }
    }
    for (lsb, counter) in &changes.creation_counters {
        store.set_creation_counter(*lsb, *counter);
    }
    for change in &changes.bytecodes {
        match &change.code {
            Some(code) => store.set_bytecode(&change.address, code),
            None => store.delete_bytecode(&change.address),
        }
    }
    for change in &changes.storage {
        let value = change.value.as_ref().map(|v| v.to_vec()).unwrap_or_default();
        store.set_storage(change.sequence, &change.slot, value);
    }
}

/// Return the prepaid fee for unused gas to the sender.
fn credit_unused_gas(store: &dyn KvStore, tx: &PendingTransaction, gas_used: u64) -> U256 {
    let unused = tx.gas_limit.saturating_sub(gas_used);
    let refund = U256::from(unused).saturating_mul(tx.gas_price);
    if refund.is_zero() {
        return refund;
    }
    let mut sender = store.account(&tx.from).unwrap_or_default();
    sender.balance = sender.balance.saturating_add(refund);
    store.set_account(&tx.from, &sender);
    refund
}
