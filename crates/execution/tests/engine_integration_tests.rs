//! Integration tests for the transaction engine.
//!
//! These tests drive Collect, Prepare and Execute end to end over a
//! `MemoryStore` with the reference transfer backend:
//! - Admission (duplicates, gaps, affordability, price and limit filters)
//! - Round scheduling and conflict re-appends
//! - Gas settlement and fee crediting
//! - Determinism and rollover

use alloy_primitives::{Address, Bytes, U256};
use parevm_execution::{
    AccountInfo, BlockInfo, EngineConfig, MemoryStore, PendingTransaction, StandbyQueue,
    StateExt, StatusCode, TransferBackend, TxEngine, TxExecutor,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

const INITIAL_BALANCE: u64 = 10_000_000_000_000;
const MAX_TX_GAS: u64 = 10_000_000;

fn from1() -> Address {
    Address::with_last_byte(0x01)
}

fn from2() -> Address {
    Address::with_last_byte(0x02)
}

fn to1() -> Address {
    Address::with_last_byte(0x10)
}

fn to2() -> Address {
    Address::with_last_byte(0x20)
}

/// Engine over a fresh store with both senders funded.
fn create_test_engine(config: EngineConfig) -> TxEngine<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for sender in [from1(), from2()] {
        store.set_account(
            &sender,
            &AccountInfo::with_balance(U256::from(INITIAL_BALANCE)),
        );
    }
    TxEngine::new(store, Arc::new(TransferBackend::new()), config).unwrap()
}

fn transfer(from: Address, to: Address, nonce: u64, value: u64) -> PendingTransaction {
    PendingTransaction {
        from,
        to: Some(to),
        nonce,
        value: U256::from(value),
        gas_price: U256::from(1),
        gas_limit: 100_000,
        data: Bytes::new(),
        height: 1,
    }
}

fn balance(engine: &TxEngine<MemoryStore>, address: Address) -> U256 {
    engine
        .store()
        .account(&address)
        .map(|a| a.balance)
        .unwrap_or_default()
}

fn nonce(engine: &TxEngine<MemoryStore>, address: Address) -> u64 {
    engine
        .store()
        .account(&address)
        .map(|a| a.nonce)
        .unwrap_or_default()
}

#[test]
fn test_different_accounts() {
    let mut engine = create_test_engine(EngineConfig::new(1, 100, 2, 10));
    let txs = [
        transfer(from1(), to1(), 0, 100),
        transfer(from2(), to2(), 0, 100),
    ];
    for tx in &txs {
        engine.collect(tx.clone());
    }

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    let queue = StandbyQueue::new(&**engine.store());
    let standby = queue.load(queue.range().start, queue.range().end);
    assert_eq!(standby.len(), 2);
    assert_eq!(standby[0].tx.to, txs[0].to);
    assert_eq!(standby[1].tx.to, txs[1].to);

    engine.execute(&BlockInfo::default());
    assert_eq!(engine.committed_txs().len(), 2);
    assert_eq!(balance(&engine, to1()), U256::from(100));
    assert_eq!(balance(&engine, to2()), U256::from(100));
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 21_000 - 100)
    );
    assert_eq!(
        balance(&engine, from2()),
        U256::from(INITIAL_BALANCE - 21_000 - 100)
    );

    let range = StandbyQueue::new(&**engine.store()).range();
    assert_eq!(range.start, range.end);
    assert_eq!(range.end, 2);
}

#[test]
fn test_same_account() {
    let mut engine = create_test_engine(EngineConfig::new(5, 100, 2, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.collect(transfer(from2(), to2(), 0, 100));
    engine.collect(transfer(from1(), to1(), 0, 101));
    engine.collect(transfer(from1(), to1(), 2, 102));
    engine.collect(transfer(from1(), to1(), 1, 103));
    engine.collect(transfer(from1(), to1(), 2, 104));

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    assert_eq!(engine.standby_queue_len(), 4);

    engine.execute(&BlockInfo::default());
    let committed = engine.committed_txs();
    assert_eq!(committed.len(), 4);
    assert!(committed.iter().all(|r| r.status == StatusCode::Success));

    let from1_nonces: Vec<u64> = committed
        .iter()
        .filter(|r| r.tx.from == from1())
        .map(|r| r.tx.nonce)
        .collect();
    assert_eq!(from1_nonces, vec![0, 1, 2]);

    // duplicates at nonce 0 and 2 resolve to the lowest hash
    let winner = |nonce: u64, values: [u64; 2]| {
        values
            .into_iter()
            .map(|v| transfer(from1(), to1(), nonce, v))
            .min_by_key(|tx| tx.hash())
            .unwrap()
    };
    let expected = [winner(0, [100, 101]), winner(2, [102, 104])];
    for tx in &expected {
        assert!(committed.iter().any(|r| r.hash == tx.hash()));
    }

    let sent: u64 = committed
        .iter()
        .filter(|r| r.tx.from == from1())
        .map(|r| r.tx.value.to::<u64>())
        .sum();
    assert_eq!(balance(&engine, to1()), U256::from(sent));
    assert_eq!(balance(&engine, to2()), U256::from(100));
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 3 * 21_000 - sent)
    );
    assert_eq!(
        balance(&engine, from2()),
        U256::from(INITIAL_BALANCE - 21_000 - 100)
    );

    // end key: 0 => 4 => 6 => 7
    let range = StandbyQueue::new(&**engine.store()).range();
    assert_eq!(range.start, range.end);
    assert_eq!(range.end, 7);
}

#[test]
fn test_empty_txs() {
    let mut engine = create_test_engine(EngineConfig::new(5, 2, 2, 10));
    assert_eq!(engine.collected_count(), 0);
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    engine.execute(&BlockInfo::default());
    assert!(engine.committed_txs().is_empty());
}

#[test]
fn test_tx_count_bigger_than_runner_count() {
    let mut engine = create_test_engine(EngineConfig::new(5, 1, 2, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.collect(transfer(from2(), to2(), 0, 100));
    assert_eq!(engine.collected_count(), 2);

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    engine.execute(&BlockInfo::default());
    assert_eq!(engine.committed_txs().len(), 2);
}

#[test]
fn test_sender_run_longer_than_runner_count() {
    let mut engine = create_test_engine(EngineConfig::new(10, 2, 2, 10));
    for nonce in 0..4 {
        engine.collect(transfer(from1(), to1(), nonce, 100));
    }
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    engine.execute(&BlockInfo::default());

    let committed = engine.committed_txs();
    assert_eq!(
        committed.iter().map(|r| r.tx.nonce).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert!(committed.iter().all(|r| r.status == StatusCode::Success));
    assert_eq!(nonce(&engine, from1()), 4);
    assert_eq!(balance(&engine, to1()), U256::from(400));
    assert_eq!(engine.standby_queue_len(), 0);
}

#[test]
fn test_balance_not_enough_for_value() {
    let mut engine = create_test_engine(EngineConfig::new(5, 5, 2, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.collect(transfer(from2(), to2(), 0, 100));
    engine.collect(transfer(from1(), to1(), 1, 2 * INITIAL_BALANCE));
    assert_eq!(engine.collected_count(), 3);

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    assert_eq!(engine.standby_queue_len(), 3);
    engine.execute(&BlockInfo::default());

    // the value transfer fails at execution, the transaction still commits
    let committed = engine.committed_txs();
    assert_eq!(committed.len(), 3);
    let failed = committed.iter().find(|r| r.tx.nonce == 1).unwrap();
    assert_eq!(failed.status, StatusCode::InsufficientBalance);
    assert_eq!(failed.gas_used, 21_000);

    assert_eq!(balance(&engine, to1()), U256::from(100));
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 21_000 * 2 - 100)
    );
    assert_eq!(nonce(&engine, from1()), 2);
}

#[test]
fn test_contract_creation() {
    let mut engine = create_test_engine(EngineConfig::new(5, 5, 2, 10));
    let code = hex::decode(concat!(
        "608060405234801561001057600080fd5b5060cc8061001f6000396000f3fe60",
        "80604052348015600f57600080fd5b506004361060325760003560e01c806361",
        "bc221a1460375780636299a6ef146053575b600080fd5b603d607e565b604051",
        "8082815260200191505060405180910390f35b607c6004803603602081101560",
        "6757600080fd5b81019080803590602001909291905050506084565b005b6000",
        "5481565b8060008082825401925050819055505056fea2646970667358221220",
        "37865cfcfd438966956583c78d31220c05c0f1ebfd116aced883214fcb1096c6",
        "64736f6c634300060c0033",
    ))
    .unwrap();
    let tx = PendingTransaction {
        to: None,
        value: U256::ZERO,
        data: Bytes::from(code.clone()),
        ..transfer(from1(), to1(), 0, 0)
    };
    engine.collect(tx);
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    engine.execute(&BlockInfo::default());

    let committed = engine.committed_txs();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].status, StatusCode::Success);
    let contract = from1().create(0);
    assert_eq!(committed[0].contract_address, Some(contract));

    let store = engine.store();
    assert_eq!(store.bytecode(&contract).unwrap().code.as_ref(), &code[..]);
    let account = store.account(&contract).unwrap();
    assert_eq!(account.nonce, 1);
    assert!(account.has_sequence());
    assert_eq!(account.sequence & 0xff, u64::from(contract[0]));
}

#[test]
fn test_random_prepare() {
    let mut engine = create_test_engine(EngineConfig::new(5, 5, 5, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    let mut txs = vec![
        transfer(from1(), to1(), 0, 200),
        transfer(from1(), to1(), 1, 200),
    ];
    txs.extend((2..12).map(|n| transfer(from1(), to1(), n, 400)));

    // nothing executes in between, so each prepare admits the same run again
    for i in 0..2u64 {
        for tx in &txs {
            engine.collect(tx.clone());
        }
        engine.prepare(0, U256::ZERO, MAX_TX_GAS);
        assert_eq!(engine.standby_queue_len(), 12 * i + 12);
    }
}

#[test]
fn test_nonce_gap() {
    let mut engine = create_test_engine(EngineConfig::new(5, 10, 2, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.collect(transfer(from1(), to1(), 2, 100));

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    assert_eq!(engine.standby_queue_len(), 1);
    // nonce 2 waits for the missing nonce 1
    assert_eq!(engine.collected_count(), 1);
    engine.execute(&BlockInfo::default());
    assert_eq!(engine.committed_tx_ids(), vec![transfer(from1(), to1(), 0, 100).hash()]);
    assert_eq!(nonce(&engine, from1()), 1);

    engine.collect(transfer(from1(), to1(), 1, 100));
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    assert_eq!(engine.standby_queue_len(), 2);
    assert_eq!(engine.collected_count(), 0);
    engine.execute(&BlockInfo::default());
    assert_eq!(
        engine.committed_tx_ids(),
        vec![
            transfer(from1(), to1(), 1, 100).hash(),
            transfer(from1(), to1(), 2, 100).hash(),
        ]
    );
    assert_eq!(nonce(&engine, from1()), 3);
}

#[test]
fn test_admission_filters() {
    let mut engine = create_test_engine(EngineConfig::new(5, 10, 2, 10));
    let poor = Address::with_last_byte(0x03);
    engine
        .store()
        .set_account(&poor, &AccountInfo::with_balance(U256::from(50_000)));

    let cheap = PendingTransaction {
        gas_price: U256::ZERO,
        ..transfer(from1(), to1(), 0, 1)
    };
    let greedy = PendingTransaction {
        gas_limit: MAX_TX_GAS + 1,
        ..transfer(from2(), to2(), 0, 1)
    };
    engine.collect(cheap);
    engine.collect(greedy);
    engine.collect(transfer(poor, to1(), 0, 1));
    engine.collect(transfer(Address::with_last_byte(0x04), to1(), 0, 1));

    let touched = engine.prepare(0, U256::from(1), MAX_TX_GAS);
    assert!(touched.is_empty());
    assert_eq!(engine.standby_queue_len(), 0);
    assert_eq!(engine.collected_count(), 0);
    assert_eq!(balance(&engine, poor), U256::from(50_000));
}

#[test]
fn test_prepay_and_fee_settlement() {
    let mut engine = create_test_engine(EngineConfig::new(5, 10, 2, 10));
    let coinbase = Address::with_last_byte(0xcb);
    let tx = PendingTransaction {
        gas_price: U256::from(3),
        ..transfer(from1(), to1(), 0, 100)
    };
    engine.collect(tx);

    let touched = engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    assert!(touched.contains(&from1()));
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 300_000)
    );

    engine.execute(&BlockInfo {
        coinbase,
        number: 1,
        ..Default::default()
    });
    let info = engine.gas_used_info();
    assert_eq!(info.gas_used, 21_000);
    assert_eq!(info.gas_fee, U256::from(63_000));
    assert_eq!(info.gas_refund, U256::from(237_000));
    assert_eq!(balance(&engine, coinbase), U256::from(63_000));
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 63_000 - 100)
    );
}

#[test]
fn test_too_old_entries_expire() {
    let mut engine = create_test_engine(EngineConfig::new(5, 10, 2, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);

    engine.execute(&BlockInfo {
        number: 12,
        ..Default::default()
    });
    let committed = engine.committed_txs();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].status, StatusCode::TooOld);
    assert_eq!(committed[0].gas_used, 0);
    assert_eq!(engine.standby_queue_len(), 0);
    assert_eq!(nonce(&engine, from1()), 0);
    // the prepaid fee is not returned
    assert_eq!(
        balance(&engine, from1()),
        U256::from(INITIAL_BALANCE - 100_000)
    );
}

#[test]
fn test_leftovers_roll_over() {
    let mut engine = create_test_engine(EngineConfig::new(1, 1, 1, 10));
    engine.collect(transfer(from1(), to1(), 0, 100));
    engine.collect(transfer(from2(), to2(), 0, 100));
    engine.prepare(0, U256::ZERO, MAX_TX_GAS);

    engine.execute(&BlockInfo {
        number: 1,
        ..Default::default()
    });
    assert_eq!(engine.committed_txs().len(), 1);
    assert_eq!(engine.committed_txs()[0].tx.from, from1());
    assert_eq!(engine.standby_queue_len(), 1);

    engine.prepare(0, U256::ZERO, MAX_TX_GAS);
    engine.execute(&BlockInfo {
        number: 2,
        ..Default::default()
    });
    assert_eq!(engine.committed_txs().len(), 1);
    assert_eq!(engine.committed_txs()[0].tx.from, from2());
    assert_eq!(engine.standby_queue_len(), 0);
}

fn random_txs(seed: u64, count: usize, nonce_range: u64) -> Vec<PendingTransaction> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .flat_map(|_| {
            let a = transfer(
                from1(),
                to1(),
                rng.gen_range(0..nonce_range),
                rng.gen_range(1..=100),
            );
            let b = transfer(
                from2(),
                to2(),
                rng.gen_range(0..nonce_range),
                rng.gen_range(1..=100),
            );
            [a, b]
        })
        .collect()
}

#[test]
fn test_random_txs_execute_consistently() {
    let txs = random_txs(7, 200, 40);
    let run = |reorder_seed: u64| {
        let mut engine = create_test_engine(EngineConfig::new(2000, 200, 30, 2000));
        for tx in &txs {
            engine.collect(tx.clone());
        }
        engine.prepare(reorder_seed, U256::ZERO, MAX_TX_GAS);
        let queue = StandbyQueue::new(&**engine.store());
        let standby: Vec<_> = queue
            .load(queue.range().start, queue.range().end)
            .into_iter()
            .map(|entry| entry.tx)
            .collect();
        engine.execute(&BlockInfo::default());
        let committed = engine.committed_txs().to_vec();
        (standby, committed, engine.store().snapshot())
    };

    let (standby, committed, state) = run(0);
    assert_eq!(standby.len(), committed.len());
    assert!(committed.iter().all(|r| r.status == StatusCode::Success));

    for seed in [0, 1, 12345] {
        let (standby2, committed2, state2) = run(seed);
        assert_eq!(standby2, standby);
        assert_eq!(committed2, committed);
        assert_eq!(state2, state);
    }
}
