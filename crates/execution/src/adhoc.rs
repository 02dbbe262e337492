//! Ad-hoc runner pool.
//!
//! Serves read-only calls (simulation, gas estimation) next to block
//! execution. The pool owns a fixed number of slots whose indices sit in a
//! bounded channel acting as the free list: acquiring takes an index out,
//! dropping the [`AdhocSlot`] puts it back. Every call runs on its own
//! overlay of the store and all of its writes are discarded, so calls never
//! affect the standby queue or committed state.

use crate::backend::CallRequest;
use crate::database::KvStore;
use crate::error::{ExecutionError, Result};
use crate::runner::{CallResult, Runner};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parevm_metrics::execution::{EXECUTION_ADHOC_BUSY_SLOTS, EXECUTION_ADHOC_CALLS};
use std::sync::Arc;

struct Inner {
    store: Arc<dyn KvStore>,
    runner: Runner,
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    slots: usize,
}

/// Fixed-size pool of runners for read-only calls.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct AdhocRunnerPool {
    inner: Arc<Inner>,
}

impl AdhocRunnerPool {
    /// Create a pool of `slots` runners over `store`.
    pub fn new(store: Arc<dyn KvStore>, runner: Runner, slots: usize) -> Self {
        let (free_tx, free_rx) = crossbeam_channel::bounded(slots);
        for index in 0..slots {
            // capacity equals the slot count
            let _ = free_tx.try_send(index);
        }
        Self {
            inner: Arc::new(Inner {
                store,
                runner,
                free_tx,
                free_rx,
                slots,
            }),
        }
    }

    /// Total slots.
    pub fn slots(&self) -> usize {
        self.inner.slots
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.inner.free_rx.len()
    }

    /// Claim a slot, waiting until one is released if all are busy.
    pub fn acquire(&self) -> Result<AdhocSlot<'_>> {
        let index = self
            .inner
            .free_rx
            .recv()
            .map_err(|_| ExecutionError::internal("ad-hoc free list closed"))?;
        Ok(AdhocSlot::claimed(self, index))
    }

    /// Claim a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<AdhocSlot<'_>> {
        match self.inner.free_rx.try_recv() {
            Ok(index) => Some(AdhocSlot::claimed(self, index)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Run one read-only call on a free slot.
    pub fn call(&self, request: &CallRequest) -> Result<CallResult> {
        let slot = self.acquire()?;
        Ok(slot.call(request))
    }
}

impl std::fmt::Debug for AdhocRunnerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdhocRunnerPool")
            .field("slots", &self.inner.slots)
            .field("available", &self.available())
            .finish()
    }
}

/// A claimed slot of the ad-hoc pool, released on drop.
pub struct AdhocSlot<'a> {
    pool: &'a AdhocRunnerPool,
    index: usize,
}

impl<'a> AdhocSlot<'a> {
    fn claimed(pool: &'a AdhocRunnerPool, index: usize) -> Self {
        EXECUTION_ADHOC_BUSY_SLOTS.inc();
        Self { pool, index }
    }

    /// Index of this slot.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Run `request` on this slot. Writes are discarded.
    pub fn call(&self, request: &CallRequest) -> CallResult {
        let inner = &self.pool.inner;
        let result = inner.runner.run_call(inner.store.as_ref(), request);
        EXECUTION_ADHOC_CALLS.inc();
        tracing::debug!(
            slot = self.index,
            sender = %request.sender,
            status = %result.status,
            gas_used = result.gas_used,
            "Ad-hoc call finished"
        );
        result
    }
}

impl Drop for AdhocSlot<'_> {
    fn drop(&mut self) {
        EXECUTION_ADHOC_BUSY_SLOTS.dec();
        // never full: each index is out at most once
        let _ = self.pool.inner.free_tx.try_send(self.index);
    }
}
