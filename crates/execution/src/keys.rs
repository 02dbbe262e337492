//! Persisted key layout.
//!
//! Every record lives in one flat key space. Account-state keys start with a
//! one-byte prefix; standby entries are raised into the `0xC0..` range so they
//! sort after every state key.

use alloy_primitives::{Address, B256};

/// Prefix of creation-counter keys.
pub const CREATION_COUNTER_PREFIX: u8 = 21;
/// Prefix of account keys.
pub const ACCOUNT_PREFIX: u8 = 23;
/// Prefix of bytecode keys.
pub const BYTECODE_PREFIX: u8 = 25;
/// Prefix of storage-slot keys.
pub const VALUE_PREFIX: u8 = 27;

/// Key holding the standby queue's `start || end` pointers.
pub const STANDBY_QUEUE_KEY: [u8; 8] = [255, 255, 255, 255, 255, 255, 255, 0];

const STANDBY_ENTRY_BASE: u64 = (128 + 64) << 56;

/// Key of the creation counter for addresses whose first byte is `lsb`.
pub fn creation_counter_key(lsb: u8) -> [u8; 2] {
    [CREATION_COUNTER_PREFIX, lsb]
}

/// Key of an account record.
pub fn account_key(address: &Address) -> [u8; 21] {
    prefixed_address(ACCOUNT_PREFIX, address)
}

/// Key of a bytecode record.
pub fn bytecode_key(address: &Address) -> [u8; 21] {
    prefixed_address(BYTECODE_PREFIX, address)
}

/// Key of a storage slot under an account sequence.
pub fn value_key(sequence: u64, slot: &B256) -> [u8; 41] {
    let mut key = [0u8; 41];
    key[0] = VALUE_PREFIX;
    key[1..9].copy_from_slice(&sequence.to_be_bytes());
    key[9..].copy_from_slice(slot.as_slice());
    key
}

/// Key of the `n`-th standby entry.
pub fn standby_entry_key(n: u64) -> [u8; 8] {
    n.wrapping_add(STANDBY_ENTRY_BASE).to_be_bytes()
}

fn prefixed_address(prefix: u8, address: &Address) -> [u8; 21] {
    let mut key = [0u8; 21];
    key[0] = prefix;
    key[1..].copy_from_slice(address.as_slice());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_account_key() {
        let addr = address!("0x00000000000000000000000000000000000000ff");
        let key = account_key(&addr);
        assert_eq!(key[0], ACCOUNT_PREFIX);
        assert_eq!(key[20], 0xff);
        assert_ne!(account_key(&addr), bytecode_key(&addr));
    }

    #[test]
    fn test_value_key_layout() {
        let key = value_key(0x0102, &B256::repeat_byte(0xaa));
        assert_eq!(key[0], VALUE_PREFIX);
        assert_eq!(&key[1..9], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert!(key[9..].iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn test_standby_keys_are_ordered_and_raised() {
        assert_eq!(standby_entry_key(0)[0], 0xc0);
        assert!(standby_entry_key(1) < standby_entry_key(2));
        assert!(standby_entry_key(255) < standby_entry_key(256));
        assert!(standby_entry_key(u32::MAX as u64) < STANDBY_QUEUE_KEY);
    }
}
