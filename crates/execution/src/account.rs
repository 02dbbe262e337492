//! Fixed-width account and bytecode records.
//!
//! An account is stored as exactly 48 bytes:
//!
//! ```text
//! | balance (32, BE) | nonce (8, BE) | sequence (8, BE) |
//! ```
//!
//! A bytecode record is a version byte (`0`), the 32-byte code hash and the
//! code itself. Records of any other shape mean the store is corrupt, and
//! decoding them panics.

use alloy_primitives::{keccak256, Bytes, B256, U256};

/// Encoded length of an account record.
pub const ACCOUNT_RECORD_LEN: usize = 48;

/// Sequence value of an account that never had one assigned.
pub const SEQUENCE_UNASSIGNED: u64 = u64::MAX;

const BYTECODE_VERSION: u8 = 0;
const BYTECODE_HEADER_LEN: usize = 33;

/// Balance, nonce and storage sequence of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    /// Balance in wei.
    pub balance: U256,
    /// Number of transactions sent.
    pub nonce: u64,
    /// Storage namespace assigned at contract creation.
    pub sequence: u64,
}

impl AccountInfo {
    /// A fresh account holding `balance`, with no sequence assigned.
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            nonce: 0,
            sequence: SEQUENCE_UNASSIGNED,
        }
    }

    /// Whether a storage sequence has been assigned.
    pub fn has_sequence(&self) -> bool {
        self.sequence != SEQUENCE_UNASSIGNED
    }

    /// Encode to the 48-byte record.
    pub fn encode(&self) -> [u8; ACCOUNT_RECORD_LEN] {
        let mut out = [0u8; ACCOUNT_RECORD_LEN];
        out[0..32].copy_from_slice(&self.balance.to_be_bytes::<32>());
        out[32..40].copy_from_slice(&self.nonce.to_be_bytes());
        out[40..48].copy_from_slice(&self.sequence.to_be_bytes());
        out
    }

    /// Decode a 48-byte record.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly 48 bytes long.
    pub fn decode(bytes: &[u8]) -> Self {
        assert_eq!(
            bytes.len(),
            ACCOUNT_RECORD_LEN,
            "invalid length for account record"
        );
        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&bytes[32..40]);
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[40..48]);
        Self {
            balance: U256::from_be_slice(&bytes[0..32]),
            nonce: u64::from_be_bytes(nonce),
            sequence: u64::from_be_bytes(sequence),
        }
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::with_balance(U256::ZERO)
    }
}

/// Deployed code of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeInfo {
    /// keccak256 of `code`.
    pub code_hash: B256,
    /// Runtime bytecode.
    pub code: Bytes,
}

impl BytecodeInfo {
    /// Wrap `code`, computing its hash.
    pub fn new(code: Bytes) -> Self {
        Self {
            code_hash: keccak256(&code),
            code,
        }
    }

    /// Encode to `version || code_hash || code`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BYTECODE_HEADER_LEN + self.code.len());
        out.push(BYTECODE_VERSION);
        out.extend_from_slice(self.code_hash.as_slice());
        out.extend_from_slice(&self.code);
        out
    }

    /// Decode a bytecode record.
    ///
    /// # Panics
    ///
    /// Panics if the record is shorter than its header or carries an unknown
    /// version byte.
    pub fn decode(bytes: &[u8]) -> Self {
        assert!(
            bytes.len() >= BYTECODE_HEADER_LEN,
            "invalid length for bytecode record"
        );
        assert_eq!(bytes[0], BYTECODE_VERSION, "unknown bytecode record version");
        Self {
            code_hash: B256::from_slice(&bytes[1..BYTECODE_HEADER_LEN]),
            code: Bytes::copy_from_slice(&bytes[BYTECODE_HEADER_LEN..]),
        }
    }
}
