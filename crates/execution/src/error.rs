//! Error types for the execution core.
//!
//! Most outcomes of scheduling and execution are data, not errors: admission
//! discards are silent and execution faults are recorded as [`StatusCode`]s on
//! committed results. The types here cover what is left: configuration,
//! engine construction and native-contract failures.
//!
//! Corrupted persisted records (a malformed fixed-width account, a standby
//! entry that does not decode) are not represented here. They abort.
//!
//! [`StatusCode`]: crate::types::StatusCode

use std::path::PathBuf;

/// Result type alias for execution core operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Main error type for the execution core.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Configuration is invalid or could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The worker thread pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A native contract failed.
    #[error("Precompile error: {0}")]
    Precompile(String),

    /// Internal error that should not occur.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error type for engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Reading or writing the config file failed.
    #[error("config file {path}: {source}")]
    Io {
        /// File that was accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`EngineConfig`](crate::EngineConfig).
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure while verifying a VRF proof.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VrfError {
    /// Input is not `alpha || public key || proof`.
    #[error("input too short: {0} bytes")]
    InputTooShort(usize),

    /// Public key is not a valid compressed secp256k1 point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Proof has the wrong length or encodes an invalid point or scalar.
    #[error("malformed proof")]
    MalformedProof,

    /// Hash-to-curve found no valid point.
    #[error("hash to curve failed")]
    HashToCurve,

    /// Proof does not verify against the public key and alpha.
    #[error("proof verification failed")]
    VerificationFailed,
}

impl ExecutionError {
    /// Create a thread pool error.
    pub fn thread_pool(msg: impl Into<String>) -> Self {
        Self::ThreadPool(msg.into())
    }

    /// Create a precompile error.
    pub fn precompile(msg: impl Into<String>) -> Self {
        Self::Precompile(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
