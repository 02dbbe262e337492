//! Block runner pool.
//!
//! Executes the standby queue in rounds. Each round takes up to
//! `runner_count` entries from the head of the queue and runs them in
//! parallel on a dedicated rayon pool, each against its own overlay of the
//! same store. The round is then applied in queue order by a single thread:
//! an entry whose reads or writes touch a key already written earlier in the
//! round saw stale state, so its result is dropped and the transaction goes
//! back to the tail of the queue.
//!
//! Only a sender's lowest queued nonce may run. Its later nonces are sent
//! back to the tail without running, so a re-appended entry never lets the
//! rest of its sender's run overtake it.
//!
//! The reorder seed only shuffles the order in which work is handed to the
//! threads. Every run sees the same base state whatever the order, so results
//! do not depend on it.

use crate::database::KvStore;
use crate::error::{ExecutionError, Result};
use crate::runner::{Runner, RunnerOutput};
use crate::standby::{is_too_old, StandbyEntry, StandbyQueue};
use crate::types::{BlockInfo, CommittedResult, PendingTransaction, StatusCode};
use alloy_primitives::Address;
use parevm_metrics::execution::{EXECUTION_CONFLICT_REAPPENDS, EXECUTION_ROUNDS};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Summary of one block's execution.
#[derive(Debug, Clone, Default)]
pub struct BlockExecution {
    /// Committed results in commit order.
    pub results: Vec<CommittedResult>,
    /// Rounds run.
    pub rounds: usize,
    /// Entries sent back to the queue tail, after a conflict or while an
    /// earlier nonce of their sender was still queued.
    pub reappended: usize,
    /// Entries skipped as too old.
    pub expired: usize,
}

/// Queued nonces per sender.
struct NonceGate {
    queued: HashMap<Address, BTreeSet<u64>>,
}

impl NonceGate {
    fn new(entries: &[StandbyEntry]) -> Self {
        let mut queued: HashMap<Address, BTreeSet<u64>> = HashMap::new();
        for entry in entries {
            queued.entry(entry.tx.from).or_default().insert(entry.tx.nonce);
        }
        Self { queued }
    }

    /// Whether `tx` may run now. Expired entries always may.
    fn may_run(&self, tx: &PendingTransaction, height: u64) -> bool {
        is_too_old(tx, height)
            || self
                .queued
                .get(&tx.from)
                .and_then(|nonces| nonces.first())
                .map_or(true, |lowest| tx.nonce <= *lowest)
    }

    fn settle(&mut self, tx: &PendingTransaction) {
        if let Some(nonces) = self.queued.get_mut(&tx.from) {
            nonces.remove(&tx.nonce);
            if nonces.is_empty() {
                self.queued.remove(&tx.from);
            }
        }
    }
}

/// Fixed-size pool of block runners.
pub struct BlockRunnerPool {
    pool: rayon::ThreadPool,
    runner_count: usize,
    exe_round_count: usize,
}

impl BlockRunnerPool {
    /// Build a pool of `parallel_num` threads.
    pub fn new(parallel_num: usize, runner_count: usize, exe_round_count: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallel_num)
            .thread_name(|i| format!("block-runner-{}", i))
            .build()
            .map_err(|e| ExecutionError::thread_pool(e.to_string()))?;
        Ok(Self {
            pool,
            runner_count,
            exe_round_count,
        })
    }

    /// Entries taken per round.
    pub fn runner_count(&self) -> usize {
        self.runner_count
    }

    /// Worker threads.
    pub fn parallel_num(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run the standby queue stored in `store` for `block`.
    ///
    /// Applied writes land in `store`. Entries left after the last round stay
    /// queued.
    pub fn execute(
        &self,
        runner: &Runner,
        store: &dyn KvStore,
        block: &BlockInfo,
        reorder_seed: u64,
    ) -> BlockExecution {
        let queue = StandbyQueue::new(store);
        let range = queue.range();
        let mut gate = NonceGate::new(&queue.load(range.start, range.end));
        let mut rng = ChaCha8Rng::seed_from_u64(reorder_seed);
        let mut summary = BlockExecution::default();

        for round in 0..self.exe_round_count {
            let entries = queue.pop_front(self.runner_count);
            if entries.is_empty() {
                break;
            }
            summary.rounds += 1;

            let mut order: Vec<usize> = (0..entries.len())
                .filter(|&i| gate.may_run(&entries[i].tx, block.number))
                .collect();
            order.shuffle(&mut rng);
            let ran: Vec<(usize, RunnerOutput)> = self.pool.install(|| {
                order
                    .par_iter()
                    .map(|&i| (i, runner.run_block_tx(store, block, entries[i].tx.clone())))
                    .collect()
            });
            let mut outputs: Vec<Option<RunnerOutput>> = entries.iter().map(|_| None).collect();
            for (i, output) in ran {
                outputs[i] = Some(output);
            }

            let mut written = HashSet::new();
            let mut retry = Vec::new();
            let mut conflicts = 0usize;
            for (entry, output) in entries.iter().zip(outputs) {
                let Some(output) = output else {
                    retry.push(entry.tx.clone());
                    continue;
                };
                if output.diff.conflicts_with(&written) {
                    conflicts += 1;
                    retry.push(entry.tx.clone());
                    continue;
                }
                if output.result.status == StatusCode::TooOld {
                    summary.expired += 1;
                    tracing::warn!(
                        from = %output.result.tx.from,
                        nonce = output.result.tx.nonce,
                        height = output.result.tx.height,
                        "Standby entry expired"
                    );
                }
                output.diff.apply_to(store, &mut written);
                gate.settle(&output.result.tx);
                runner.notify_committed(store, &output.result);
                summary.results.push(output.result);
            }

            if !retry.is_empty() {
                tracing::debug!(
                    round,
                    count = retry.len(),
                    conflicts,
                    "Re-appending entries"
                );
                summary.reappended += retry.len();
                EXECUTION_CONFLICT_REAPPENDS.inc_by(conflicts as f64);
                queue.append(retry);
            }
        }

        EXECUTION_ROUNDS.observe(summary.rounds as f64);
        summary
    }
}

impl std::fmt::Debug for BlockRunnerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRunnerPool")
            .field("parallel_num", &self.pool.current_num_threads())
            .field("runner_count", &self.runner_count)
            .field("exe_round_count", &self.exe_round_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountInfo;
    use crate::database::MemoryStore;
    use crate::gas::GasPolicy;
    use crate::precompiles::PrecompileSet;
    use crate::reference::TransferBackend;
    use crate::state::{BlockHashCache, StateExt};
    use crate::error::ExecutionError;
    use crate::system::{SystemContract, SystemContractRegistry, SystemOutcome};
    use alloy_primitives::{address, Bytes, U256};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const COUNTER: Address = address!("0x00000000000000000000000000000000000000c0");

    /// Bumps one shared key per transaction and counts commits.
    #[derive(Default)]
    struct Counter {
        committed: Mutex<Vec<u64>>,
    }

    impl SystemContract for Counter {
        fn owns_address(&self, address: &Address) -> bool {
            *address == COUNTER
        }

        fn init(&self, _store: &dyn KvStore) {}

        fn execute(
            &self,
            store: &dyn KvStore,
            _block: &BlockInfo,
            _tx: &PendingTransaction,
        ) -> SystemOutcome {
            let count = store.get(b"count").map_or(0, |v| v[0]);
            store.set(b"count", vec![count + 1]);
            SystemOutcome::success(21_000, Bytes::new())
        }

        fn required_gas(&self, _input: &[u8]) -> u64 {
            0
        }

        fn run(&self, _store: &dyn KvStore, _input: &[u8]) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        fn committed(&self, _store: &dyn KvStore, result: &CommittedResult) {
            self.committed.lock().push(result.tx.nonce);
        }
    }

    fn runner_with(system: SystemContractRegistry) -> Runner {
        Runner::new(
            Arc::new(TransferBackend::new()),
            Arc::new(PrecompileSet::istanbul()),
            Arc::new(system),
            Arc::new(BlockHashCache::new()),
            GasPolicy::default(),
        )
    }

    fn runner() -> Runner {
        runner_with(SystemContractRegistry::new())
    }

    fn tx(from: u8, nonce: u64) -> PendingTransaction {
        PendingTransaction {
            from: Address::with_last_byte(from),
            to: Some(Address::with_last_byte(0x10 + from)),
            nonce,
            value: U256::from(100),
            gas_price: U256::from(1),
            gas_limit: 100_000,
            data: Bytes::new(),
            height: 1,
        }
    }

    fn store_with(senders: &[u8]) -> MemoryStore {
        let store = MemoryStore::new();
        for from in senders {
            store.set_account(
                &Address::with_last_byte(*from),
                &AccountInfo::with_balance(U256::from(1_000_000_000u64)),
            );
        }
        store
    }

    #[test]
    fn test_independent_entries_run_in_one_round() {
        let store = store_with(&[1, 2, 3]);
        StandbyQueue::new(&store).append([tx(1, 0), tx(2, 0), tx(3, 0)]);

        let pool = BlockRunnerPool::new(2, 10, 5).unwrap();
        let out = pool.execute(&runner(), &store, &BlockInfo::default(), 7);

        assert_eq!(out.rounds, 1);
        assert_eq!(out.reappended, 0);
        let senders: Vec<_> = out.results.iter().map(|r| r.tx.from).collect();
        assert_eq!(
            senders,
            vec![
                Address::with_last_byte(1),
                Address::with_last_byte(2),
                Address::with_last_byte(3)
            ]
        );
        assert!(StandbyQueue::new(&store).is_empty());
    }

    #[test]
    fn test_conflicting_entry_is_reappended() {
        let store = store_with(&[1]);
        StandbyQueue::new(&store).append([tx(1, 0), tx(1, 1), tx(1, 2)]);

        let pool = BlockRunnerPool::new(2, 10, 5).unwrap();
        let out = pool.execute(&runner(), &store, &BlockInfo::default(), 0);

        assert_eq!(out.rounds, 3);
        assert_eq!(out.reappended, 3);
        assert_eq!(
            out.results.iter().map(|r| r.tx.nonce).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(out.results.iter().all(|r| r.status == StatusCode::Success));
        // 0..3 admitted, 3..5 re-appended, then 5
        assert_eq!(StandbyQueue::new(&store).range().end, 6);
        assert_eq!(store.account(&Address::with_last_byte(1)).unwrap().nonce, 3);
    }

    #[test]
    fn test_sender_run_longer_than_round() {
        let store = store_with(&[1]);
        StandbyQueue::new(&store).append((0..5).map(|n| tx(1, n)));

        let pool = BlockRunnerPool::new(2, 2, 10).unwrap();
        let out = pool.execute(&runner(), &store, &BlockInfo::default(), 3);

        assert_eq!(
            out.results.iter().map(|r| r.tx.nonce).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert!(out.results.iter().all(|r| r.status == StatusCode::Success));
        assert!(StandbyQueue::new(&store).is_empty());
        assert_eq!(store.account(&Address::with_last_byte(1)).unwrap().nonce, 5);
    }

    #[test]
    fn test_waiting_nonces_survive_rollover() {
        let store = store_with(&[1]);
        StandbyQueue::new(&store).append((0..4).map(|n| tx(1, n)));
        let pool = BlockRunnerPool::new(1, 2, 1).unwrap();

        let mut nonces = Vec::new();
        for _ in 0..5 {
            let out = pool.execute(&runner(), &store, &BlockInfo::default(), 0);
            assert!(out.results.iter().all(|r| r.status == StatusCode::Success));
            nonces.extend(out.results.iter().map(|r| r.tx.nonce));
        }
        assert_eq!(nonces, vec![0, 1, 2, 3]);
        assert_eq!(store.account(&Address::with_last_byte(1)).unwrap().nonce, 4);
    }

    #[test]
    fn test_commit_hook_skips_dropped_runs() {
        let store = store_with(&[1, 2, 3]);
        let counter = Arc::new(Counter::default());
        let mut system = SystemContractRegistry::new();
        system.register(&store, COUNTER, counter.clone());
        let to_counter = |from: u8| PendingTransaction {
            to: Some(COUNTER),
            value: U256::ZERO,
            ..tx(from, 0)
        };
        StandbyQueue::new(&store).append([to_counter(1), to_counter(2), to_counter(3)]);

        let pool = BlockRunnerPool::new(3, 3, 5).unwrap();
        let out = pool.execute(&runner_with(system), &store, &BlockInfo::default(), 0);

        // all three touch the same key: one commit per round
        assert_eq!(out.rounds, 3);
        assert_eq!(out.reappended, 3);
        assert_eq!(counter.committed.lock().len(), 3);
        assert_eq!(store.get(b"count"), Some(vec![3]));
    }

    #[test]
    fn test_leftovers_roll_over() {
        let store = store_with(&[1, 2, 3]);
        StandbyQueue::new(&store).append([tx(1, 0), tx(2, 0), tx(3, 0)]);

        let pool = BlockRunnerPool::new(1, 1, 2).unwrap();
        let out = pool.execute(&runner(), &store, &BlockInfo::default(), 0);
        assert_eq!(out.results.len(), 2);
        assert_eq!(StandbyQueue::new(&store).len(), 1);
    }

    #[test]
    fn test_seed_does_not_change_results() {
        let run = |seed: u64| {
            let store = store_with(&[1, 2, 3, 4]);
            StandbyQueue::new(&store).append([
                tx(1, 0),
                tx(2, 0),
                tx(1, 1),
                tx(3, 0),
                tx(4, 0),
                tx(2, 1),
            ]);
            let pool = BlockRunnerPool::new(4, 8, 10).unwrap();
            let out = pool.execute(&runner(), &store, &BlockInfo::default(), seed);
            (out.results, store.snapshot())
        };
        let (first, first_state) = run(1);
        for seed in [2, 99, u64::MAX] {
            let (results, state) = run(seed);
            assert_eq!(results, first);
            assert_eq!(state, first_state);
        }
    }

    #[test]
    fn test_expired_entries_are_published() {
        let store = store_with(&[1]);
        StandbyQueue::new(&store).append([tx(1, 0)]);

        let pool = BlockRunnerPool::new(1, 4, 1).unwrap();
        let block = BlockInfo {
            number: 20,
            ..Default::default()
        };
        let out = pool.execute(&runner(), &store, &block, 0);
        assert_eq!(out.expired, 1);
        assert_eq!(out.results[0].status, StatusCode::TooOld);
        assert_eq!(store.account(&Address::with_last_byte(1)).unwrap().nonce, 0);
    }
}
