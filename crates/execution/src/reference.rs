//! Reference execution backend.
//!
//! [`TransferBackend`] implements the backend contract without a bytecode
//! interpreter. It charges intrinsic gas, moves value, dispatches calls to
//! precompiles and system contracts through the host, and deploys init code
//! verbatim as contract code. Calls to deployed contracts move value only.
//!
//! It exists so the scheduling, settlement and dispatch layers can be driven
//! end to end without a native EVM core.

use crate::account::{AccountInfo, BytecodeInfo};
use crate::backend::{
    AccountChange, BytecodeChange, CallOutcome, CallRequest, ChangeSet, ExecutionBackend, Host,
};
use crate::types::{CallKind, InternalCall, InternalReturn, StatusCode};
use alloy_primitives::{Address, Bytes};

/// Gas charged for every transaction.
pub const TX_GAS: u64 = 21_000;

/// Extra gas charged for contract creation.
pub const TX_CREATE_GAS: u64 = 32_000;

/// Gas per zero byte of input.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Gas per non-zero byte of input.
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// Intrinsic gas of a transaction, `None` on overflow.
pub fn intrinsic_gas(input: &[u8], is_create: bool) -> Option<u64> {
    let zeros = input.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = input.len() as u64 - zeros;
    let base = if is_create {
        TX_GAS + TX_CREATE_GAS
    } else {
        TX_GAS
    };
    non_zeros
        .checked_mul(TX_DATA_NON_ZERO_GAS)?
        .checked_add(zeros.checked_mul(TX_DATA_ZERO_GAS)?)?
        .checked_add(base)
}

/// Sequence minted for the `counter`-th contract whose address starts with
/// `lsb`.
pub fn mint_sequence(counter: u64, lsb: u8) -> u64 {
    (counter << 8) | u64::from(lsb)
}

/// Value-transfer backend with no interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferBackend;

impl TransferBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }

    fn create(&self, request: &CallRequest, host: &dyn Host, gas_left: u64) -> CallOutcome {
        let address = request.sender.create(request.nonce);
        if host.bytecode(&address).is_some() {
            tracing::debug!(%address, "Create collides with deployed contract");
            return CallOutcome::fault(StatusCode::Failure, 0);
        }

        let lsb = address[0];
        let counter = host.creation_counter(lsb) + 1;
        let mut created = host.account(&address).unwrap_or_default();
        created.sequence = mint_sequence(counter, lsb);
        created.nonce = 1;
        created.balance += request.value;

        let mut changes = transfer_from(request, host);
        changes.accounts.push(AccountChange {
            address,
            account: Some(created),
        });
        changes.creation_counters.push((lsb, counter));
        changes.bytecodes.push(BytecodeChange {
            address,
            code: Some(BytecodeInfo::new(request.input.clone())),
        });
        trace(&mut changes, request, CallKind::Create, address);
        changes.internal_returns.push(InternalReturn {
            status: StatusCode::Success,
            gas_left,
            output: Bytes::new(),
            created_address: Some(address),
        });

        CallOutcome {
            status: StatusCode::Success,
            gas_left,
            output: Bytes::new(),
            created_address: Some(address),
            changes: Some(changes),
            gas_estimate: estimate(request, gas_left),
        }
    }

    fn call_address(
        &self,
        request: &CallRequest,
        host: &dyn Host,
        destination: Address,
        gas_left: u64,
    ) -> CallOutcome {
        let mut gas_left = gas_left;
        let mut output = Bytes::new();

        if let Some(call) = host.call_precompile(&destination, &request.input, gas_left) {
            if call.out_of_gas {
                return CallOutcome::fault(StatusCode::OutOfGas, 0);
            }
            if !call.success {
                return CallOutcome::fault(StatusCode::PrecompileFailure, 0);
            }
            gas_left = call.gas_left;
            output = call.output.into_bytes();
        }

        let mut changes = if destination == request.sender {
            ChangeSet::default()
        } else {
            let mut changes = transfer_from(request, host);
            let mut receiver = host.account(&destination).unwrap_or_default();
            receiver.balance += request.value;
            changes.accounts.push(AccountChange {
                address: destination,
                account: Some(receiver),
            });
            changes
        };
        trace(&mut changes, request, CallKind::Call, destination);
        changes.internal_returns.push(InternalReturn {
            status: StatusCode::Success,
            gas_left,
            output: output.clone(),
            created_address: None,
        });

        CallOutcome {
            status: StatusCode::Success,
            gas_left,
            output,
            created_address: None,
            changes: Some(changes),
            gas_estimate: estimate(request, gas_left),
        }
    }
}

impl ExecutionBackend for TransferBackend {
    fn call(&self, request: &CallRequest, host: &dyn Host) -> CallOutcome {
        let is_create = request.destination.is_none();
        let intrinsic = match intrinsic_gas(&request.input, is_create) {
            Some(gas) if gas <= request.gas_limit => gas,
            _ => return CallOutcome::fault(StatusCode::OutOfGas, 0),
        };
        let gas_left = request.gas_limit - intrinsic;

        let balance = host
            .account(&request.sender)
            .map(|a| a.balance)
            .unwrap_or_default();
        if balance < request.value {
            return CallOutcome::fault(StatusCode::InsufficientBalance, gas_left);
        }

        match request.destination {
            None => self.create(request, host, gas_left),
            Some(destination) => self.call_address(request, host, destination, gas_left),
        }
    }
}

/// Change-set debiting `request.value` from the sender.
fn transfer_from(request: &CallRequest, host: &dyn Host) -> ChangeSet {
    let mut sender: AccountInfo = host.account(&request.sender).unwrap_or_default();
    sender.balance -= request.value;
    ChangeSet {
        accounts: vec![AccountChange {
            address: request.sender,
            account: Some(sender),
        }],
        ..Default::default()
    }
}

fn trace(changes: &mut ChangeSet, request: &CallRequest, kind: CallKind, destination: Address) {
    changes.internal_calls.push(InternalCall {
        kind,
        is_static: false,
        depth: 0,
        gas: request.gas_limit,
        destination,
        sender: request.sender,
        input: request.input.clone(),
        value: request.value,
    });
}

fn estimate(request: &CallRequest, gas_left: u64) -> u64 {
    if request.estimate_gas {
        request.gas_limit - gas_left
    } else {
        0
    }
}
