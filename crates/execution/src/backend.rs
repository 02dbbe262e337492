//! Contract between the runners and the EVM core.
//!
//! The execution core never interprets bytecode. For every top-level call a
//! runner hands a [`CallRequest`] and a [`Host`] to an [`ExecutionBackend`];
//! the backend reads state through the host and reports everything it
//! changed as a [`ChangeSet`] inside the returned [`CallOutcome`]. The runner
//! then applies the change-set and settles gas.

use crate::account::{AccountInfo, BytecodeInfo};
use crate::precompiles::PrecompileCall;
use crate::types::{BlockInfo, InternalCall, InternalReturn, StatusCode};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use revm::primitives::hardfork::SpecId;

/// One top-level call to run.
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Caller.
    pub sender: Address,
    /// Callee. `None` creates a contract.
    pub destination: Option<Address>,
    /// Nonce of the transaction being run.
    pub nonce: u64,
    /// Value transferred.
    pub value: U256,
    /// Gas price.
    pub gas_price: U256,
    /// Gas available to the call.
    pub gas_limit: u64,
    /// Input data or init code.
    pub input: Bytes,
    /// Block context.
    pub block: BlockInfo,
    /// Hard fork rules to apply.
    pub revision: SpecId,
    /// Whether the caller wants a gas estimate.
    pub estimate_gas: bool,
}

/// Read callbacks and precompile dispatch offered to the backend.
pub trait Host {
    /// Creation counter for addresses whose first byte is `lsb`.
    fn creation_counter(&self, lsb: u8) -> u64;

    /// Account state, `None` if the account does not exist.
    fn account(&self, address: &Address) -> Option<AccountInfo>;

    /// Deployed code.
    fn bytecode(&self, address: &Address) -> Option<BytecodeInfo>;

    /// Storage slot value under an account sequence.
    fn storage(&self, sequence: u64, slot: &B256) -> Option<Vec<u8>>;

    /// Hash of a recent block, zero if unknown.
    fn block_hash(&self, number: u64) -> B256;

    /// Run the precompile or system contract at `address`, if there is one.
    fn call_precompile(&self, address: &Address, input: &[u8], gas_left: u64)
        -> Option<PrecompileCall>;
}

/// A changed or deleted account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountChange {
    /// Account address.
    pub address: Address,
    /// New state, `None` to delete.
    pub account: Option<AccountInfo>,
}

/// A deployed or destroyed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeChange {
    /// Contract address.
    pub address: Address,
    /// New code, `None` to delete.
    pub code: Option<BytecodeInfo>,
}

/// A written or cleared storage slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Sequence of the owning account.
    pub sequence: u64,
    /// Slot key.
    pub slot: B256,
    /// New value, `None` to clear.
    pub value: Option<Bytes>,
}

/// Everything one call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Account changes.
    pub accounts: Vec<AccountChange>,
    /// Creation counter updates as `(lsb, counter)`.
    pub creation_counters: Vec<(u8, u64)>,
    /// Code changes.
    pub bytecodes: Vec<BytecodeChange>,
    /// Storage changes.
    pub storage: Vec<StorageChange>,
    /// Emitted logs.
    pub logs: Vec<Log>,
    /// Internal messages.
    pub internal_calls: Vec<InternalCall>,
    /// Internal message returns.
    pub internal_returns: Vec<InternalReturn>,
    /// Gas refund earned by the call, before capping.
    pub refund: u64,
}

/// Result of one top-level call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Status reported by the core.
    pub status: StatusCode,
    /// Gas left after the call.
    pub gas_left: u64,
    /// Returned data.
    pub output: Bytes,
    /// Address of the created contract, if any.
    pub created_address: Option<Address>,
    /// State changes. `None` when the call faulted before touching state.
    pub changes: Option<ChangeSet>,
    /// Gas estimate, meaningful when the request asked for one.
    pub gas_estimate: u64,
}

impl CallOutcome {
    /// An outcome that changed nothing.
    pub fn fault(status: StatusCode, gas_left: u64) -> Self {
        Self {
            status,
            gas_left,
            output: Bytes::new(),
            created_address: None,
            changes: None,
            gas_estimate: 0,
        }
    }
}

/// EVM core consulted once per top-level call.
pub trait ExecutionBackend: Send + Sync {
    /// Run `request` against the state behind `host`.
    fn call(&self, request: &CallRequest, host: &dyn Host) -> CallOutcome;
}
