//! Fixed-capacity output buffer for native contracts.
//!
//! A native contract may produce any amount of data, but the caller only ever
//! receives the first `N` bytes. [`BoundedOutput`] makes that cut explicit and
//! remembers how long the original output was.

use alloy_primitives::Bytes;

/// Capacity of the buffer handed back from a precompile call.
pub const SMALL_BUF_SIZE: usize = 256;

/// Output buffer used by precompile dispatch.
pub type PrecompileBuffer = BoundedOutput<SMALL_BUF_SIZE>;

/// At most `N` bytes of a contract's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedOutput<const N: usize> {
    data: Bytes,
    original_len: usize,
}

impl<const N: usize> BoundedOutput<N> {
    /// Maximum number of bytes kept.
    pub const CAPACITY: usize = N;

    /// An empty buffer.
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            original_len: 0,
        }
    }

    /// Keep the first `N` bytes of `output`, dropping the rest.
    pub fn truncating(output: &[u8]) -> Self {
        let kept = output.len().min(N);
        Self {
            data: Bytes::copy_from_slice(&output[..kept]),
            original_len: output.len(),
        }
    }

    /// Kept bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of kept bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing was kept.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length of the output before truncation.
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Whether bytes were dropped.
    pub fn is_truncated(&self) -> bool {
        self.original_len > self.data.len()
    }

    /// Take the kept bytes.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
