//! System contracts.
//!
//! A system contract is a native executor registered at a fixed address. When
//! a transaction is sent straight to that address the executor replaces the
//! execution backend for the whole transaction, with full read/write access
//! to state. Nested calls reach the same executor read-only through
//! [`SystemContract::run`], dispatched like a precompile.
//!
//! Registered contracts:
//! - Staking at address 0x2710

pub mod staking;

pub use staking::{StakingContract, STAKING_ADDRESS, STAKING_SEQUENCE};

use crate::database::KvStore;
use crate::error::ExecutionError;
use crate::precompiles::{charge_and_run, PrecompileCall};
use crate::types::{BlockInfo, CommittedResult, PendingTransaction, StatusCode};
use alloy_primitives::{Address, Bytes, Log};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a system contract reports for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemOutcome {
    /// Outcome status.
    pub status: StatusCode,
    /// Logs emitted.
    pub logs: Vec<Log>,
    /// Gas consumed. Taken as final, with no refund applied.
    pub gas_used: u64,
    /// Returned data.
    pub output: Bytes,
}

impl SystemOutcome {
    /// Successful outcome with no logs.
    pub fn success(gas_used: u64, output: Bytes) -> Self {
        Self {
            status: StatusCode::Success,
            logs: Vec::new(),
            gas_used,
            output,
        }
    }

    /// Failed outcome that consumed `gas_used`.
    pub fn failed(status: StatusCode, gas_used: u64) -> Self {
        Self {
            status,
            logs: Vec::new(),
            gas_used,
            output: Bytes::new(),
        }
    }
}

/// A native executor owning one or more addresses.
pub trait SystemContract: Send + Sync {
    /// Whether this executor handles calls to `address`.
    fn owns_address(&self, address: &Address) -> bool;

    /// Prepare persistent state. Runs once, at registration.
    fn init(&self, store: &dyn KvStore);

    /// Run a whole transaction sent to this contract.
    ///
    /// The sender nonce has already been bumped and the gas prepaid. Any
    /// value transfer is the executor's job.
    fn execute(&self, store: &dyn KvStore, block: &BlockInfo, tx: &PendingTransaction)
        -> SystemOutcome;

    /// Gas charged when called as a precompile.
    fn required_gas(&self, input: &[u8]) -> u64;

    /// Read-only entry point for nested calls.
    fn run(&self, store: &dyn KvStore, input: &[u8]) -> Result<Bytes, ExecutionError>;

    /// Called once `result` has been applied to `store`.
    ///
    /// [`execute`](Self::execute) also runs for read-only calls and for
    /// block runs whose writes are dropped, so anything that must only
    /// reflect committed transactions belongs here.
    fn committed(&self, _store: &dyn KvStore, _result: &CommittedResult) {}
}

/// Address to executor table.
#[derive(Clone, Default)]
pub struct SystemContractRegistry {
    contracts: BTreeMap<Address, Arc<dyn SystemContract>>,
}

impl SystemContractRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `contract` at `address` and initialize it against `store`.
    ///
    /// # Panics
    ///
    /// Panics if the contract does not claim `address`.
    pub fn register(
        &mut self,
        store: &dyn KvStore,
        address: Address,
        contract: Arc<dyn SystemContract>,
    ) {
        assert!(
            contract.owns_address(&address),
            "system contract does not own address {address}"
        );
        contract.init(store);
        tracing::info!(%address, "System contract registered");
        self.contracts.insert(address, contract);
    }

    /// Executor at `address`.
    pub fn get(&self, address: &Address) -> Option<&Arc<dyn SystemContract>> {
        self.contracts.get(address)
    }

    /// Whether `address` has an executor.
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Registered addresses, ascending.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.contracts.keys()
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Dispatch a nested call to the executor at `address` as a precompile.
    pub fn call_as_precompile(
        &self,
        store: &dyn KvStore,
        address: &Address,
        input: &[u8],
        gas_left: u64,
    ) -> Option<PrecompileCall> {
        let contract = self.contracts.get(address)?;
        Some(charge_and_run(contract.required_gas(input), gas_left, || {
            contract.run(store, input)
        }))
    }
}

impl std::fmt::Debug for SystemContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContractRegistry")
            .field("addresses", &self.contracts.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use alloy_primitives::address;
    use parking_lot::Mutex;

    const OWNED: Address = address!("0x00000000000000000000000000000000000000ee");

    #[derive(Default)]
    struct Recorder {
        inits: Mutex<u32>,
    }

    impl SystemContract for Recorder {
        fn owns_address(&self, address: &Address) -> bool {
            *address == OWNED
        }

        fn init(&self, store: &dyn KvStore) {
            *self.inits.lock() += 1;
            store.set(b"recorder", vec![1]);
        }

        fn execute(
            &self,
            _store: &dyn KvStore,
            _block: &BlockInfo,
            _tx: &PendingTransaction,
        ) -> SystemOutcome {
            SystemOutcome::success(1, Bytes::new())
        }

        fn required_gas(&self, _input: &[u8]) -> u64 {
            10
        }

        fn run(&self, store: &dyn KvStore, _input: &[u8]) -> Result<Bytes, ExecutionError> {
            store
                .get(b"recorder")
                .map(Bytes::from)
                .ok_or_else(|| ExecutionError::precompile("not initialized"))
        }
    }

    #[test]
    fn test_register_runs_init_once() {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        let mut registry = SystemContractRegistry::new();
        registry.register(&store, OWNED, recorder.clone());

        assert_eq!(*recorder.inits.lock(), 1);
        assert!(registry.contains(&OWNED));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.get(b"recorder"), Some(vec![1]));
    }

    #[test]
    #[should_panic(expected = "does not own address")]
    fn test_register_foreign_address_panics() {
        let store = MemoryStore::new();
        let mut registry = SystemContractRegistry::new();
        registry.register(&store, Address::with_last_byte(1), Arc::new(Recorder::default()));
    }

    #[test]
    fn test_call_as_precompile() {
        let store = MemoryStore::new();
        let mut registry = SystemContractRegistry::new();
        registry.register(&store, OWNED, Arc::new(Recorder::default()));

        let call = registry.call_as_precompile(&store, &OWNED, b"", 50).unwrap();
        assert!(call.success);
        assert_eq!(call.gas_left, 40);
        assert_eq!(call.output.as_slice(), &[1]);

        let starved = registry.call_as_precompile(&store, &OWNED, b"", 9).unwrap();
        assert!(starved.out_of_gas);

        assert!(registry
            .call_as_precompile(&store, &Address::with_last_byte(2), b"", 50)
            .is_none());
    }
}
