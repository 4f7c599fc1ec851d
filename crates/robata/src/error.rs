//! Error taxonomy for the orchestration layer.
//!
//! Errors split into two families with different propagation rules:
//!
//! - Batch-level errors ([`ChunkError`], [`ConfigError`]) are fatal and reject
//!   the whole operation before any work is dispatched.
//! - Per-chunk errors ([`ClientError`]) are retried up to the ceiling and then
//!   downgraded to data: an error-marker string recorded at the chunk's index
//!   slot. They never fail the batch.

use thiserror::Error;

/// Errors raised by the text splitter before any dispatch happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// The caller-supplied maximum chunk length leaves no room for content.
    #[error("invalid max_length: {0} (must be greater than zero)")]
    InvalidMaxLength(usize),
}

/// Errors raised while resolving model or supplier configuration.
///
/// Configuration is resolved once at batch start, so these surface before the
/// first chunk worker is spawned, never mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The requested model has no profile in the registry.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The requested supplier has no profile in the registry.
    #[error("unknown supplier: {0}")]
    UnknownSupplier(String),

    /// A profile failed validation at load time.
    #[error("invalid profile for model {model}: {reason}")]
    InvalidProfile {
        /// Model whose profile was rejected.
        model: String,
        /// What the validation found.
        reason: String,
    },

    /// The registry source was not valid TOML.
    #[error("malformed registry: {0}")]
    Malformed(String),
}

/// Errors surfaced by a [`ChatClient`](crate::client::ChatClient)
/// implementation.
///
/// The dispatcher treats both variants the same way: retry with backoff, then
/// record the message behind an error marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transport to the backend failed (connection, timeout, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered, but with an error payload.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Umbrella error for the caller-facing batch and comparison entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Chunking rejected the input before dispatch.
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// Configuration lookup failed at batch start.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A comparison run was requested with more models than supported.
    #[error("comparison supports at most {limit} models, got {requested}")]
    TooManyComparisons {
        /// Number of models the caller asked for.
        requested: usize,
        /// Hard limit on concurrent comparison streams.
        limit: usize,
    },
}
