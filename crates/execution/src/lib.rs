//! parevm Execution Core
//!
//! This crate schedules and executes EVM transactions for one block at a
//! time. Execution of a single call is delegated to a pluggable
//! [`ExecutionBackend`]; the crate owns everything around it: admission,
//! the persisted standby queue, parallel runners, gas settlement,
//! precompiles and system contracts.
//!
//! # Architecture
//!
//! A block moves through four stages:
//! 1. **Collect**: incoming transactions are buffered by the engine
//! 2. **Prepare**: admission filters them, keeps each sender's contiguous
//!    nonce run, prepays gas and appends them to the standby queue
//! 3. **Execute**: the block runner pool runs the queue in parallel rounds
//!    over isolated overlays and applies results in queue order
//! 4. **Publish**: committed results are read back in queue order
//!
//! Read-only calls go through a separate ad-hoc pool and may run while a
//! block executes.
//!
//! # Example
//!
//! ```rust,ignore
//! use parevm_execution::*;
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut engine = TxEngine::new(store, Arc::new(TransferBackend::new()), EngineConfig::default())?;
//!
//! engine.collect(tx);
//! engine.prepare(seed, min_gas_price, max_tx_gas_limit);
//! engine.execute(&block);
//!
//! for result in engine.committed_txs() {
//!     println!("{} {}", result.hash, result.status);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod adhoc;
pub mod admission;
pub mod backend;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod gas;
pub mod keys;
pub mod pool;
pub mod precompiles;
pub mod reference;
pub mod runner;
pub mod standby;
pub mod state;
pub mod system;
pub mod types;

// Re-export main types for convenience
pub use account::{AccountInfo, BytecodeInfo};
pub use adhoc::{AdhocRunnerPool, AdhocSlot};
pub use admission::{admit, Admission, DiscardReason};
pub use backend::{CallOutcome, CallRequest, ChangeSet, ExecutionBackend, Host};
pub use config::EngineConfig;
pub use database::{KvStore, MemoryStore, Overlay, OverlayDiff};
pub use engine::{TxEngine, TxExecutor};
pub use error::{ConfigError, ExecutionError, Result, VrfError};
pub use gas::GasPolicy;
pub use pool::{BlockExecution, BlockRunnerPool};
pub use precompiles::{NativeContract, PrecompileCall, PrecompileSet};
pub use reference::TransferBackend;
pub use runner::{CallResult, Runner, RunnerOutput, DEFAULT_REVISION};
pub use standby::{StandbyEntry, StandbyQueue};
pub use state::{BlockHashCache, StateExt};
pub use system::{
    StakingContract, SystemContract, SystemContractRegistry, SystemOutcome, STAKING_ADDRESS,
};
pub use types::{
    BlockInfo, CommittedResult, GasUsedInfo, InternalCall, InternalReturn, PendingTransaction,
    StatusCode,
};

// Re-export commonly used external types
pub use alloy_primitives::{Address, Bytes, Log, B256, U256};
