//! Typed access to account state.
//!
//! [`StateExt`] layers account, bytecode, storage-slot and creation-counter
//! reads and writes over any [`KvStore`], using the record layouts from
//! [`crate::account`] and the keys from [`crate::keys`]. [`BlockHashCache`]
//! serves recent block hashes to the execution backend.

use crate::account::{AccountInfo, BytecodeInfo};
use crate::database::KvStore;
use crate::keys;
use crate::types::StatusCode;
use alloy_primitives::{Address, B256};
use parking_lot::RwLock;
use std::num::NonZeroUsize;

/// Number of recent block hashes kept for the backend.
const BLOCK_HASH_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(n) => n,
    None => unreachable!(),
};

/// Why a transaction nonce does not match its sender's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceMismatch {
    /// The sender has no account.
    AccountNotExist,
    /// The nonce was already used.
    TooSmall,
    /// The nonce is ahead of the account.
    TooLarge,
}

impl NonceMismatch {
    /// Status recorded for a transaction rejected for this reason.
    pub fn status(self) -> StatusCode {
        match self {
            Self::AccountNotExist => StatusCode::AccountNotExist,
            Self::TooSmall => StatusCode::NonceTooSmall,
            Self::TooLarge => StatusCode::NonceTooLarge,
        }
    }
}

/// Typed state access over a key-value store.
pub trait StateExt: KvStore {
    /// Read an account.
    fn account(&self, address: &Address) -> Option<AccountInfo> {
        self.get(&keys::account_key(address))
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| AccountInfo::decode(&bytes))
    }

    /// Write an account.
    fn set_account(&self, address: &Address, account: &AccountInfo) {
        self.set(&keys::account_key(address), account.encode().to_vec());
    }

    /// Remove an account.
    fn delete_account(&self, address: &Address) {
        self.delete(&keys::account_key(address));
    }

    /// Read a contract's code.
    fn bytecode(&self, address: &Address) -> Option<BytecodeInfo> {
        self.get(&keys::bytecode_key(address))
            .map(|bytes| BytecodeInfo::decode(&bytes))
    }

    /// Write a contract's code.
    fn set_bytecode(&self, address: &Address, code: &BytecodeInfo) {
        self.set(&keys::bytecode_key(address), code.encode());
    }

    /// Remove a contract's code.
    fn delete_bytecode(&self, address: &Address) {
        self.delete(&keys::bytecode_key(address));
    }

    /// Read a storage slot.
    fn storage(&self, sequence: u64, slot: &B256) -> Option<Vec<u8>> {
        self.get(&keys::value_key(sequence, slot))
    }

    /// Write a storage slot. An empty value deletes the slot.
    fn set_storage(&self, sequence: u64, slot: &B256, value: Vec<u8>) {
        let key = keys::value_key(sequence, slot);
        if value.is_empty() {
            self.delete(&key);
        } else {
            self.set(&key, value);
        }
    }

    /// Read the creation counter for addresses starting with `lsb`.
    fn creation_counter(&self, lsb: u8) -> u64 {
        self.get(&keys::creation_counter_key(lsb))
            .map(|bytes| {
                let mut buf = [0u8; 8];
                assert_eq!(bytes.len(), 8, "invalid length for creation counter");
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            })
            .unwrap_or(0)
    }

    /// Write the creation counter for addresses starting with `lsb`.
    fn set_creation_counter(&self, lsb: u8, counter: u64) {
        self.set(&keys::creation_counter_key(lsb), counter.to_be_bytes().to_vec());
    }

    /// Load `address` and check that its nonce equals `nonce`.
    fn check_nonce(&self, address: &Address, nonce: u64) -> Result<AccountInfo, NonceMismatch> {
        let account = self
            .account(address)
            .ok_or(NonceMismatch::AccountNotExist)?;
        match nonce.cmp(&account.nonce) {
            std::cmp::Ordering::Less => Err(NonceMismatch::TooSmall),
            std::cmp::Ordering::Greater => Err(NonceMismatch::TooLarge),
            std::cmp::Ordering::Equal => Ok(account),
        }
    }
}

impl<T: KvStore + ?Sized> StateExt for T {}

/// Recent block hashes by number.
pub struct BlockHashCache {
    hashes: RwLock<lru::LruCache<u64, B256>>,
}

impl BlockHashCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            hashes: RwLock::new(lru::LruCache::new(BLOCK_HASH_CACHE_SIZE)),
        }
    }

    /// Record the hash of block `number`.
    pub fn insert(&self, number: u64, hash: B256) {
        self.hashes.write().put(number, hash);
    }

    /// Hash of block `number`, zero if unknown.
    pub fn get(&self, number: u64) -> B256 {
        self.hashes
            .write()
            .get(&number)
            .copied()
            .unwrap_or(B256::ZERO)
    }
}

impl Default for BlockHashCache {
    fn default() -> Self {
        Self::new()
    }
}
