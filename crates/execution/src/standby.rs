//! Durable standby queue.
//!
//! Admitted transactions wait here between admission and execution. The
//! queue lives in the same [`KvStore`] as account state: a pointer record at
//! [`STANDBY_QUEUE_KEY`] holds `start || end` (both big-endian `u64`), and
//! entry `n` for `start <= n < end` is stored at [`standby_entry_key`]`(n)`
//! as a bincode-encoded [`PendingTransaction`].
//!
//! Sequence numbers are never reset. Execution consumes a prefix and may
//! re-append entries at the tail, so keys stay ascending and gap-free and
//! their order is the commit order.

use crate::database::KvStore;
use crate::keys::{standby_entry_key, STANDBY_QUEUE_KEY};
use crate::types::PendingTransaction;

/// Number of blocks an entry may wait before it is skipped as too old.
pub const TOO_OLD_THRESHOLD: u64 = 10;

/// Whether an entry collected at `tx.height` has expired at `current_height`.
pub fn is_too_old(tx: &PendingTransaction, current_height: u64) -> bool {
    tx.height.saturating_add(TOO_OLD_THRESHOLD) < current_height
}

/// Half-open range `[start, end)` of live queue positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueRange {
    /// First live position.
    pub start: u64,
    /// One past the last live position.
    pub end: u64,
}

impl QueueRange {
    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A queued transaction and its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandbyEntry {
    /// Queue position.
    pub position: u64,
    /// The admitted transaction.
    pub tx: PendingTransaction,
}

/// Standby queue view over a store.
pub struct StandbyQueue<'a> {
    store: &'a dyn KvStore,
}

impl<'a> StandbyQueue<'a> {
    /// Open the queue stored in `store`.
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Current live range.
    pub fn range(&self) -> QueueRange {
        match self.store.get(&STANDBY_QUEUE_KEY) {
            None => QueueRange::default(),
            Some(bytes) => {
                assert_eq!(bytes.len(), 16, "invalid length for standby queue pointers");
                let mut start = [0u8; 8];
                let mut end = [0u8; 8];
                start.copy_from_slice(&bytes[..8]);
                end.copy_from_slice(&bytes[8..]);
                QueueRange {
                    start: u64::from_be_bytes(start),
                    end: u64::from_be_bytes(end),
                }
            }
        }
    }

    fn set_range(&self, range: QueueRange) {
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&range.start.to_be_bytes());
        bytes.extend_from_slice(&range.end.to_be_bytes());
        self.store.set(&STANDBY_QUEUE_KEY, bytes);
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.range().len()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.range().is_empty()
    }

    /// Append transactions at the tail, returning the new range.
    pub fn append<I>(&self, txs: I) -> QueueRange
    where
        I: IntoIterator<Item = PendingTransaction>,
    {
        let mut range = self.range();
        for tx in txs {
            let bytes = bincode::serialize(&tx).expect("pending transaction serializes");
            self.store.set(&standby_entry_key(range.end), bytes);
            range.end += 1;
        }
        self.set_range(range);
        range
    }

    /// Read entries in `[start, end)` without removing them.
    pub fn load(&self, start: u64, end: u64) -> Vec<StandbyEntry> {
        (start..end)
            .map(|position| StandbyEntry {
                position,
                tx: self.read_entry(position),
            })
            .collect()
    }

    /// Remove and return up to `max` entries from the head.
    pub fn pop_front(&self, max: usize) -> Vec<StandbyEntry> {
        let mut range = self.range();
        let take = range.len().min(max as u64);
        let entries = self.load(range.start, range.start + take);
        for entry in &entries {
            self.store.delete(&standby_entry_key(entry.position));
        }
        range.start += take;
        self.set_range(range);
        entries
    }

    fn read_entry(&self, position: u64) -> PendingTransaction {
        let bytes = self
            .store
            .get(&standby_entry_key(position))
            .unwrap_or_else(|| panic!("missing standby entry at position {position}"));
        bincode::deserialize(&bytes)
            .unwrap_or_else(|e| panic!("corrupt standby entry at position {position}: {e}"))
    }
}
