//! Execution metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Histogram, Registry};

// Block Execution
pub static EXECUTION_BLOCKS_EXECUTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_execution_blocks_executed_total",
        "Total blocks executed",
    )
    .expect("metric can be created")
});

pub static EXECUTION_BLOCK_TIME: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "parevm_execution_block_time_seconds",
        "Time to execute a block",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ))
    .expect("metric can be created")
});

pub static EXECUTION_TXS_PER_BLOCK: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "parevm_execution_txs_per_block",
        "Committed transactions per block",
        vec![1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    ))
    .expect("metric can be created")
});

pub static EXECUTION_GAS_PER_BLOCK: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "parevm_execution_gas_per_block",
        "Gas used per block",
        vec![
            21000.0, 42000.0, 84000.0, 168000.0, 336000.0, 672000.0, 1344000.0, 2688000.0,
            5376000.0, 10752000.0, 21504000.0
        ]
    ))
    .expect("metric can be created")
});

pub static EXECUTION_ROUNDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "parevm_execution_rounds_per_block",
        "Execution rounds run per block",
        vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0]
    ))
    .expect("metric can be created")
});

pub static EXECUTION_CONFLICT_REAPPENDS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_execution_conflict_reappends_total",
        "Standby entries re-appended after a conflict within a round",
    )
    .expect("metric can be created")
});

// Transaction Execution
pub static EXECUTION_TX_SUCCESS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_execution_tx_success_total",
        "Total successful transactions",
    )
    .expect("metric can be created")
});

pub static EXECUTION_TX_FAILED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "parevm_execution_tx_failed_total",
            "Total committed transactions with a failure status"
        ),
        &["status"], // "out-of-gas", "revert", "nonce-too-small", ...
    )
    .expect("metric can be created")
});

// Ad-hoc Calls
pub static EXECUTION_ADHOC_CALLS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_execution_adhoc_calls_total",
        "Total read-only calls served by the ad-hoc pool",
    )
    .expect("metric can be created")
});

pub static EXECUTION_ADHOC_BUSY_SLOTS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "parevm_execution_adhoc_busy_slots",
        "Ad-hoc runner slots currently in use",
    )
    .expect("metric can be created")
});

// Precompiles
pub static EXECUTION_PRECOMPILE_CALLS: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "parevm_execution_precompile_calls_total",
            "Total precompile calls"
        ),
        &["address"], // "0x01", "0x02", ..., "0x2713" (vrf)
    )
    .expect("metric can be created")
});

// Staking System Contract
pub static STAKING_DEPOSITS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_staking_deposits_total",
        "Total successful stake() calls",
    )
    .expect("metric can be created")
});

pub static STAKING_WITHDRAWALS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "parevm_staking_withdrawals_total",
        "Total successful unstake() calls",
    )
    .expect("metric can be created")
});

pub static STAKING_TOTAL_STAKE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "parevm_staking_total_stake",
        "Total stake held by the staking contract (in wei)",
    )
    .expect("metric can be created")
});

/// Register all execution metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(EXECUTION_BLOCKS_EXECUTED.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_BLOCK_TIME.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_TXS_PER_BLOCK.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_GAS_PER_BLOCK.clone()))
        .ok();
    registry.register(Box::new(EXECUTION_ROUNDS.clone())).ok();
    registry
        .register(Box::new(EXECUTION_CONFLICT_REAPPENDS.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_TX_SUCCESS.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_TX_FAILED.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_ADHOC_CALLS.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_ADHOC_BUSY_SLOTS.clone()))
        .ok();
    registry
        .register(Box::new(EXECUTION_PRECOMPILE_CALLS.clone()))
        .ok();
    registry.register(Box::new(STAKING_DEPOSITS.clone())).ok();
    registry
        .register(Box::new(STAKING_WITHDRAWALS.clone()))
        .ok();
    registry
        .register(Box::new(STAKING_TOTAL_STAKE.clone()))
        .ok();
}
