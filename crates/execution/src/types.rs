//! Core types for the execution core.
//!
//! This module defines the data that flows through collection, admission and
//! execution: pending transactions, block context, committed results and the
//! status codes attached to them.

use alloy_primitives::{keccak256, Address, Bytes, Log, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A signed transaction waiting to be scheduled.
///
/// The sender has already been recovered from the signature. The record is
/// immutable once collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Sender address.
    pub from: Address,

    /// Destination. `None` means contract creation.
    pub to: Option<Address>,

    /// Sender nonce this transaction consumes.
    pub nonce: u64,

    /// Value transferred to the destination (wei).
    pub value: U256,

    /// Price paid per unit of gas (wei).
    pub gas_price: U256,

    /// Maximum gas the transaction may use.
    pub gas_limit: u64,

    /// Call data, or init code for a creation.
    pub data: Bytes,

    /// Height of the block in which the transaction was collected.
    pub height: u64,
}

impl PendingTransaction {
    /// Content hash identifying this transaction.
    ///
    /// keccak256 over the big-endian concatenation of every field except
    /// `height`, so the same transaction collected at two heights has one id.
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(20 + 21 + 8 + 32 + 32 + 8 + self.data.len());
        buf.extend_from_slice(self.from.as_slice());
        match self.to {
            Some(to) => {
                buf.push(1);
                buf.extend_from_slice(to.as_slice());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.gas_price.to_be_bytes::<32>());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.data);
        keccak256(&buf)
    }

    /// Whether this transaction creates a contract.
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Fee prepaid at admission: `gas_limit * gas_price`.
    ///
    /// Returns `None` on overflow.
    pub fn max_fee(&self) -> Option<U256> {
        U256::from(self.gas_limit).checked_mul(self.gas_price)
    }
}

/// Context of the block being executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Fee beneficiary.
    pub coinbase: Address,

    /// Block hash.
    pub hash: B256,

    /// Block number.
    pub number: u64,

    /// Block timestamp (Unix seconds).
    pub timestamp: u64,

    /// Block gas limit.
    pub gas_limit: u64,

    /// Difficulty / prevrandao value exposed to contracts.
    pub difficulty: U256,

    /// Chain id exposed to contracts.
    pub chain_id: U256,
}

/// Outcome code of one transaction.
///
/// The first group mirrors the codes an EVM core reports; the second group is
/// assigned by the engine itself when a transaction never reaches the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum StatusCode {
    /// Execution finished successfully.
    Success = 0,
    /// Generic execution failure.
    Failure = 1,
    /// Execution reverted.
    Revert = 2,
    /// Gas ran out.
    OutOfGas = 3,
    /// Designated invalid instruction hit.
    InvalidInstruction = 4,
    /// Undefined opcode.
    UndefinedInstruction = 5,
    /// Stack overflow.
    StackOverflow = 6,
    /// Stack underflow.
    StackUnderflow = 7,
    /// Invalid jump destination.
    BadJumpDestination = 8,
    /// Out-of-range memory access.
    InvalidMemoryAccess = 9,
    /// Call depth limit exceeded.
    CallDepthExceeded = 10,
    /// State modification in a static call.
    StaticModeViolation = 11,
    /// A precompile failed.
    PrecompileFailure = 12,
    /// Contract code failed validation.
    ContractValidationFailure = 13,
    /// An argument was out of range.
    ArgumentOutOfRange = 14,
    /// Sender balance could not cover the transferred value.
    InsufficientBalance = 17,
    /// Internal error of the EVM core.
    InternalError = -1,
    /// The EVM core rejected the call.
    Rejected = -2,
    /// The EVM core ran out of memory.
    OutOfMemory = -3,
    /// Standby entry expired before it could run.
    TooOld = 1024,
    /// The transaction could not be committed.
    FailedToCommit = 1025,
    /// Sender account does not exist.
    AccountNotExist = 1026,
    /// Transaction nonce is below the account nonce.
    NonceTooSmall = 1027,
    /// Transaction nonce is above the account nonce.
    NonceTooLarge = 1029,
}

impl StatusCode {
    const ALL: [StatusCode; 24] = [
        Self::Success,
        Self::Failure,
        Self::Revert,
        Self::OutOfGas,
        Self::InvalidInstruction,
        Self::UndefinedInstruction,
        Self::StackOverflow,
        Self::StackUnderflow,
        Self::BadJumpDestination,
        Self::InvalidMemoryAccess,
        Self::CallDepthExceeded,
        Self::StaticModeViolation,
        Self::PrecompileFailure,
        Self::ContractValidationFailure,
        Self::ArgumentOutOfRange,
        Self::InsufficientBalance,
        Self::InternalError,
        Self::Rejected,
        Self::OutOfMemory,
        Self::TooOld,
        Self::FailedToCommit,
        Self::AccountNotExist,
        Self::NonceTooSmall,
        Self::NonceTooLarge,
    ];

    /// Numeric code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a status by numeric code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Stable kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Revert => "revert",
            Self::OutOfGas => "out-of-gas",
            Self::InvalidInstruction => "invalid-instruction",
            Self::UndefinedInstruction => "undefined-instruction",
            Self::StackOverflow => "stack-overflow",
            Self::StackUnderflow => "stack-underflow",
            Self::BadJumpDestination => "bad-jump-destination",
            Self::InvalidMemoryAccess => "invalid-memory-access",
            Self::CallDepthExceeded => "call-depth-exceeded",
            Self::StaticModeViolation => "static-mode-violation",
            Self::PrecompileFailure => "precompile-failure",
            Self::ContractValidationFailure => "contract-validation-failure",
            Self::ArgumentOutOfRange => "argument-out-of-range",
            Self::InsufficientBalance => "insufficient-balance",
            Self::InternalError => "internal-error",
            Self::Rejected => "rejected",
            Self::OutOfMemory => "out-of-memory",
            Self::TooOld => "too-old-and-ignored",
            Self::FailedToCommit => "failed-to-commit",
            Self::AccountNotExist => "account-not-exist",
            Self::NonceTooSmall => "nonce-too-small",
            Self::NonceTooLarge => "nonce-too-large",
        }
    }

    /// Name for a raw numeric code, `"unknown"` if it is not recognized.
    pub fn name_of(code: i32) -> &'static str {
        Self::from_code(code).map_or("unknown", Self::as_str)
    }

    /// Whether the transaction succeeded.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Whether the status was assigned by the engine without running the
    /// transaction.
    pub fn is_engine_assigned(self) -> bool {
        self.code() >= Self::TooOld.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an internal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// CALL.
    Call,
    /// DELEGATECALL.
    DelegateCall,
    /// CALLCODE.
    CallCode,
    /// CREATE.
    Create,
    /// CREATE2.
    Create2,
}

/// An internal message sent during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalCall {
    /// Message kind.
    pub kind: CallKind,
    /// Whether the message is static.
    pub is_static: bool,
    /// Call depth, 0 for the top-level call.
    pub depth: u32,
    /// Gas handed to the message.
    pub gas: u64,
    /// Callee.
    pub destination: Address,
    /// Caller.
    pub sender: Address,
    /// Input data.
    pub input: Bytes,
    /// Value transferred.
    pub value: U256,
}

/// The return of an internal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalReturn {
    /// Status of the message.
    pub status: StatusCode,
    /// Gas left after the message.
    pub gas_left: u64,
    /// Returned data.
    pub output: Bytes,
    /// Address created by a successful create message.
    pub created_address: Option<Address>,
}

/// Final outcome of one transaction in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedResult {
    /// The transaction.
    pub tx: PendingTransaction,
    /// Its content hash.
    pub hash: B256,
    /// Outcome status.
    pub status: StatusCode,
    /// Settled gas used.
    pub gas_used: u64,
    /// Wei returned to the sender for unused gas.
    pub fee_refund: U256,
    /// Logs emitted.
    pub logs: Vec<Log>,
    /// Internal messages sent.
    pub internal_calls: Vec<InternalCall>,
    /// Returns of the internal messages.
    pub internal_returns: Vec<InternalReturn>,
    /// Returned data.
    pub output: Bytes,
    /// Contract created by this transaction, if any.
    pub contract_address: Option<Address>,
}

impl CommittedResult {
    /// Result for a transaction that never reached execution.
    pub(crate) fn terminal(tx: PendingTransaction, status: StatusCode) -> Self {
        let hash = tx.hash();
        Self {
            tx,
            hash,
            status,
            gas_used: 0,
            fee_refund: U256::ZERO,
            logs: Vec::new(),
            internal_calls: Vec::new(),
            internal_returns: Vec::new(),
            output: Bytes::new(),
            contract_address: None,
        }
    }

    /// Fee charged for the settled gas.
    pub fn gas_fee(&self) -> U256 {
        U256::from(self.gas_used).saturating_mul(self.tx.gas_price)
    }
}

/// Gas totals over the committed results of the last executed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasUsedInfo {
    /// Total settled gas.
    pub gas_used: u64,
    /// Total wei refunded to senders.
    pub gas_refund: U256,
    /// Total fees credited to the beneficiary.
    pub gas_fee: U256,
}
