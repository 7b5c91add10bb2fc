//! Error taxonomy for store access and synchronization.

use thiserror::Error;

/// Every failure a synchronizer can surface.
///
/// Classification happens at the store-call boundary; nothing escapes as a
/// raw transport error string. Only `Transport { retryable: true }` failures
/// are ever retried automatically, and only by the config save path, exactly
/// once.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Network-class failure talking to the store. `retryable` is true for
    /// timeout/connect-class failures.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable description of the underlying failure.
        message: String,
        /// Whether the failure is timeout/network-class and worth one retry.
        retryable: bool,
    },

    /// A document (or an entry inside one) that was expected to exist is
    /// absent. Plain absence of an optional document is *not* an error and
    /// is reported as `None` by the store instead.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected a write because the supplied revision token no
    /// longer matches the document. Never retried automatically with the
    /// same token.
    #[error("revision conflict writing {path}")]
    Conflict {
        /// Path of the contested document.
        path: String,
    },

    /// A document body is invalid JSON beyond structural repair.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// The caller is not authorized for this operation. No write happened.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A guarded mutation was refused (reserved id, duplicate member, empty
    /// input, category still in use, …). No write happened.
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// A document grew past the store's hard size cap; the write was aborted
    /// rather than truncated.
    #[error("document too large ({size} bytes)")]
    TooLarge {
        /// Serialized size that exceeded the cap.
        size: usize,
    },

    /// The deployment configuration is unusable (missing owner/repo/token).
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Classify a reqwest failure into the taxonomy.
    pub fn from_transport(err: reqwest::Error) -> Self {
        SyncError::Transport {
            message: err.to_string(),
            retryable: err.is_timeout() || err.is_connect(),
        }
    }

    /// True for failures worth a single automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }
}
