//! Transaction engine.
//!
//! This module ties the execution core together: it collects transactions,
//! admits them into the standby queue, runs the queue on the block runner
//! pool and publishes the committed results of each block.

use crate::{
    adhoc::AdhocRunnerPool,
    admission::{admit, Admission, DiscardReason},
    backend::{CallRequest, ExecutionBackend},
    config::EngineConfig,
    database::KvStore,
    error::Result,
    pool::BlockRunnerPool,
    precompiles::PrecompileSet,
    runner::{CallResult, Runner},
    standby::{is_too_old, StandbyQueue},
    state::{BlockHashCache, StateExt},
    system::{SystemContract, SystemContractRegistry},
    types::{BlockInfo, CommittedResult, GasUsedInfo, PendingTransaction},
};
use alloy_primitives::{Address, B256, U256};
use parevm_metrics::admission::{
    ADMISSION_ADMITTED, ADMISSION_COLLECTED, ADMISSION_DISCARDS, ADMISSION_PREPARE_TIME,
    ADMISSION_STANDBY_QUEUE_LENGTH,
};
use parevm_metrics::execution::{
    EXECUTION_BLOCKS_EXECUTED, EXECUTION_BLOCK_TIME, EXECUTION_GAS_PER_BLOCK,
    EXECUTION_TXS_PER_BLOCK, EXECUTION_TX_FAILED, EXECUTION_TX_SUCCESS,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// TxExecutor defines the block-production surface of the engine.
///
/// A block goes through [`collect`](Self::collect) for every incoming
/// transaction, one [`prepare`](Self::prepare) and one
/// [`execute`](Self::execute), after which the committed results can be read.
pub trait TxExecutor {
    /// Add a transaction to the collected list.
    fn collect(&mut self, tx: PendingTransaction);

    /// Admit the collected transactions into the standby queue.
    ///
    /// # Arguments
    /// * `reorder_seed` - Seed for distributing work over runners
    /// * `min_gas_price` - Lowest acceptable gas price
    /// * `max_tx_gas_limit` - Highest acceptable per-transaction gas limit
    ///
    /// # Returns
    /// * Senders whose balance was charged
    fn prepare(
        &mut self,
        reorder_seed: u64,
        min_gas_price: U256,
        max_tx_gas_limit: u64,
    ) -> BTreeSet<Address>;

    /// Run the standby queue for `block`.
    fn execute(&mut self, block: &BlockInfo);

    /// Committed results of the last executed block, in queue order.
    fn committed_txs(&self) -> &[CommittedResult];

    /// Hashes of the committed transactions, in queue order.
    fn committed_tx_ids(&self) -> Vec<B256> {
        self.committed_txs().iter().map(|r| r.hash).collect()
    }

    /// Gas totals of the last executed block.
    fn gas_used_info(&self) -> GasUsedInfo;

    /// Entries waiting in the standby queue.
    fn standby_queue_len(&self) -> u64;

    /// Transactions waiting for the next prepare, including those deferred
    /// behind a nonce gap.
    fn collected_count(&self) -> usize;
}

/// Main transaction engine implementation.
///
/// TxEngine coordinates:
/// - the collected transaction list and admission
/// - the standby queue persisted in the store
/// - the block runner pool and the ad-hoc pool
/// - system contracts and the block hash cache
pub struct TxEngine<S: KvStore + 'static> {
    /// Shared state store.
    store: Arc<S>,

    /// Engine configuration.
    config: EngineConfig,

    /// Backend handed to every runner.
    backend: Arc<dyn ExecutionBackend>,

    /// Precompiles reachable from every call.
    precompiles: Arc<PrecompileSet>,

    /// Registered system contracts.
    system: SystemContractRegistry,

    /// Recent block hashes served to the backend.
    block_hashes: Arc<BlockHashCache>,

    /// Runner context shared by both pools.
    runner: Runner,

    /// Parallel block execution.
    pool: BlockRunnerPool,

    /// Read-only calls.
    adhoc: AdhocRunnerPool,

    /// Transactions waiting for the next prepare.
    collected: Vec<PendingTransaction>,

    /// Seed of the last prepare.
    reorder_seed: u64,

    /// Number of the last executed block.
    last_height: u64,

    /// Results of the last executed block.
    committed: Vec<CommittedResult>,
}

impl<S: KvStore + 'static> TxEngine<S> {
    /// Create a new engine over `store`.
    ///
    /// # Arguments
    /// * `store` - State store, shared with ad-hoc callers
    /// * `backend` - Execution backend for non-system transactions
    /// * `config` - Engine configuration, validated here
    pub fn new(
        store: Arc<S>,
        backend: Arc<dyn ExecutionBackend>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let precompiles = Arc::new(PrecompileSet::istanbul());
        let system = SystemContractRegistry::new();
        let block_hashes = Arc::new(BlockHashCache::new());
        let runner = Runner::new(
            backend.clone(),
            precompiles.clone(),
            Arc::new(system.clone()),
            block_hashes.clone(),
            config.gas_policy,
        );
        let pool = BlockRunnerPool::new(
            config.parallel_num,
            config.runner_count,
            config.exe_round_count,
        )?;
        let adhoc = AdhocRunnerPool::new(
            store.clone() as Arc<dyn KvStore>,
            runner.clone(),
            config.adhoc_runner_count,
        );

        tracing::info!(
            exe_round_count = config.exe_round_count,
            runner_count = config.runner_count,
            parallel_num = config.parallel_num,
            adhoc_runner_count = config.adhoc_runner_count,
            smoothing = config.gas_policy.smoothing,
            "Transaction engine created"
        );

        Ok(Self {
            collected: Vec::with_capacity(config.default_tx_list_cap),
            store,
            config,
            backend,
            precompiles,
            system,
            block_hashes,
            runner,
            pool,
            adhoc,
            reorder_seed: 0,
            last_height: 0,
            committed: Vec::new(),
        })
    }

    /// Register a system contract at `address` and initialize it.
    ///
    /// Pools handed out by [`adhoc_pool`](Self::adhoc_pool) before this call
    /// do not see the new contract.
    ///
    /// # Panics
    ///
    /// Panics if `contract` does not claim `address`.
    pub fn register_system_contract(&mut self, address: Address, contract: Arc<dyn SystemContract>) {
        self.system.register(&*self.store, address, contract);
        self.rebuild_runners();
    }

    fn rebuild_runners(&mut self) {
        self.runner = Runner::new(
            self.backend.clone(),
            self.precompiles.clone(),
            Arc::new(self.system.clone()),
            self.block_hashes.clone(),
            self.config.gas_policy,
        )
        .with_revision(self.runner.revision());
        self.adhoc = AdhocRunnerPool::new(
            self.store.clone() as Arc<dyn KvStore>,
            self.runner.clone(),
            self.config.adhoc_runner_count,
        );
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered system contracts.
    pub fn system_contracts(&self) -> &SystemContractRegistry {
        &self.system
    }

    /// A handle to the ad-hoc pool, usable from other threads while blocks
    /// execute.
    pub fn adhoc_pool(&self) -> AdhocRunnerPool {
        self.adhoc.clone()
    }

    /// Run one read-only call against current state.
    ///
    /// `block` and `estimate` replace the request's block context and gas
    /// estimation flag. Writes are discarded.
    pub fn call(&self, request: CallRequest, block: &BlockInfo, estimate: bool) -> Result<CallResult> {
        let request = CallRequest {
            block: block.clone(),
            estimate_gas: estimate,
            revision: self.runner.revision(),
            ..request
        };
        self.adhoc.call(&request)
    }

    /// Record the hash of block `number` for the backend's BLOCKHASH lookups.
    pub fn record_block_hash(&self, number: u64, hash: B256) {
        self.block_hashes.insert(number, hash);
    }

    fn credit_beneficiary(&self, coinbase: &Address, fees: U256) {
        if fees.is_zero() {
            return;
        }
        let mut account = self.store.account(coinbase).unwrap_or_default();
        account.balance = account.balance.saturating_add(fees);
        self.store.set_account(coinbase, &account);
    }
}

impl<S: KvStore + 'static> TxExecutor for TxEngine<S> {
    fn collect(&mut self, tx: PendingTransaction) {
        self.collected.push(tx);
    }

    fn prepare(
        &mut self,
        reorder_seed: u64,
        min_gas_price: U256,
        max_tx_gas_limit: u64,
    ) -> BTreeSet<Address> {
        let start = Instant::now();
        let collected = std::mem::replace(
            &mut self.collected,
            Vec::with_capacity(self.config.default_tx_list_cap),
        );
        let collected_count = collected.len();
        ADMISSION_COLLECTED.inc_by(collected_count as f64);

        let Admission {
            admitted,
            deferred,
            touched,
            discarded,
        } = admit(&*self.store, collected, min_gas_price, max_tx_gas_limit);
        let admitted_count = admitted.len();
        let discarded_count: usize = discarded.values().sum();
        let range = StandbyQueue::new(&*self.store).append(admitted);

        // behind a gap: retried until old enough to expire
        let (kept, expired): (Vec<_>, Vec<_>) = deferred
            .into_iter()
            .partition(|tx| !is_too_old(tx, self.last_height));
        if !expired.is_empty() {
            ADMISSION_DISCARDS
                .with_label_values(&[DiscardReason::Expired.as_str()])
                .inc_by(expired.len() as f64);
        }
        let deferred_count = kept.len();
        self.collected.extend(kept);
        self.reorder_seed = reorder_seed;

        ADMISSION_ADMITTED.inc_by(admitted_count as f64);
        ADMISSION_STANDBY_QUEUE_LENGTH.set(range.len() as f64);
        ADMISSION_PREPARE_TIME.observe(start.elapsed().as_secs_f64());

        tracing::info!(
            collected = collected_count,
            admitted = admitted_count,
            deferred = deferred_count,
            expired = expired.len(),
            discarded = discarded_count,
            queue_start = range.start,
            queue_end = range.end,
            "Prepare complete"
        );

        touched
    }

    fn execute(&mut self, block: &BlockInfo) {
        let start = Instant::now();
        tracing::info!(
            block_number = block.number,
            queued = self.standby_queue_len(),
            "Executing block"
        );

        let execution = self.pool.execute(
            &self.runner,
            &*self.store,
            block,
            self.reorder_seed,
        );

        let info = total_gas(&execution.results);
        self.credit_beneficiary(&block.coinbase, info.gas_fee);
        self.record_block_hash(block.number, block.hash);
        self.last_height = block.number;

        for result in &execution.results {
            if result.status.is_success() {
                EXECUTION_TX_SUCCESS.inc();
            } else {
                EXECUTION_TX_FAILED
                    .with_label_values(&[result.status.as_str()])
                    .inc();
            }
        }
        let remaining = self.standby_queue_len();
        EXECUTION_BLOCKS_EXECUTED.inc();
        EXECUTION_TXS_PER_BLOCK.observe(execution.results.len() as f64);
        EXECUTION_GAS_PER_BLOCK.observe(info.gas_used as f64);
        EXECUTION_BLOCK_TIME.observe(start.elapsed().as_secs_f64());
        ADMISSION_STANDBY_QUEUE_LENGTH.set(remaining as f64);

        if remaining > 0 {
            tracing::warn!(
                block_number = block.number,
                remaining,
                "Standby entries rolled over to the next block"
            );
        }
        tracing::info!(
            block_number = block.number,
            committed = execution.results.len(),
            rounds = execution.rounds,
            reappended = execution.reappended,
            expired = execution.expired,
            gas_used = info.gas_used,
            "Block execution complete"
        );

        self.committed = execution.results;
    }

    fn committed_txs(&self) -> &[CommittedResult] {
        &self.committed
    }

    fn gas_used_info(&self) -> GasUsedInfo {
        total_gas(&self.committed)
    }

    fn standby_queue_len(&self) -> u64 {
        StandbyQueue::new(&*self.store).len()
    }

    fn collected_count(&self) -> usize {
        self.collected.len()
    }
}

impl<S: KvStore + 'static> std::fmt::Debug for TxEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxEngine")
            .field("config", &self.config)
            .field("system", &self.system)
            .field("pool", &self.pool)
            .field("adhoc", &self.adhoc)
            .field("collected", &self.collected.len())
            .field("committed", &self.committed.len())
            .finish_non_exhaustive()
    }
}

fn total_gas(results: &[CommittedResult]) -> GasUsedInfo {
    results.iter().fold(GasUsedInfo::default(), |mut info, r| {
        info.gas_used = info.gas_used.saturating_add(r.gas_used);
        info.gas_refund = info.gas_refund.saturating_add(r.fee_refund);
        info.gas_fee = info.gas_fee.saturating_add(r.gas_fee());
        info
    })
}
