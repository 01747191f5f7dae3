//! Error Types
//!
//! This module defines the error types used throughout the shader cache.
//!
//! # Overview
//!
//! The main error type [`CacheError`] covers the failure modes that abort a
//! save, load or apply:
//! - Stream I/O failures (including truncated cache files)
//! - Corrupt payloads (unknown enum discriminants, invalid UTF-8)
//! - Shader compilation failures reported by a compile worker
//! - Worker thread failures
//!
//! Recoverable conditions are *not* errors. A cache written by an
//! incompatible build is reported through
//! [`LoadStatus::Rejected`](crate::cache::LoadStatus::Rejected), and a cache
//! that does not match the live environment through
//! [`ApplyOutcome::Skipped`](crate::cache::ApplyOutcome::Skipped).
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_shader_cache::errors::{CacheError, Result};
//!
//! fn save(cache: &DiskCache, out: &mut Vec<u8>) -> Result<()> {
//!     cache.save_to(out)
//! }
//! ```

use thiserror::Error;

/// Boxed error returned by the live material system's compile entry points.
pub type BoxedCompileError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for the shader cache.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// Stream I/O error. Truncated caches surface as `UnexpectedEof`.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A length does not fit the on-disk `u32` length prefix.
    #[error("Length {0} does not fit in a u32 length prefix")]
    LengthOverflow(usize),

    // ========================================================================
    // Payload Errors
    // ========================================================================
    /// An enum discriminant read from the stream is not known to this build.
    #[error("Invalid {kind} value in cache stream: {value}")]
    InvalidEnum {
        /// Name of the enum being decoded
        kind: &'static str,
        /// The raw discriminant
        value: u8,
    },

    /// A string in the stream is not valid UTF-8.
    #[error("Invalid UTF-8 string in cache stream: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The state-block pool has no free lifetime id left.
    #[error("State block pool exhausted ({capacity} live {kind} blocks)")]
    StateBlockPoolExhausted {
        /// Which pool ran out
        kind: &'static str,
        /// Maximum number of blocks the pool can hold
        capacity: usize,
    },

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The first shader compilation failure observed by any worker.
    #[error("Shader compilation failed for cache entry {index}: {source}")]
    Compile {
        /// Index of the failing source record
        index: usize,
        /// The error reported by the material system
        #[source]
        source: BoxedCompileError,
    },

    // ========================================================================
    // Threading Errors
    // ========================================================================
    /// A compile worker could not be spawned.
    #[error("Failed to spawn shader compiler thread: {0}")]
    ThreadSpawn(std::io::Error),

    /// A compile worker panicked.
    #[error("Shader compiler thread panicked: {0}")]
    WorkerPanicked(String),
}

/// Alias for `Result<T, CacheError>`.
pub type Result<T> = std::result::Result<T, CacheError>;
