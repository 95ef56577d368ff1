//! Runtime error types.
//!
//! [`SyncError`] is the error surface of the whole runtime. It is `Clone`
//! because deduplicated requests share one settlement between every waiting
//! caller, and a failed settlement has to be handed to all of them.
//!
//! Two conditions are deliberately *not* errors and never appear here: a
//! mutation accepted while offline is an [`Ok`] outcome
//! ([`crate::orchestrator::MutateOutcome::Queued`]), and a collapsed duplicate
//! request is invisible to its callers.

use thiserror::Error;

/// Errors surfaced by the sync runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Offline with no cached copy to fall back on; the read fails outright.
    #[error("offline and no cached copy for '{key}'")]
    NetworkUnavailable {
        /// Cache key of the read that could not be served.
        key: String,
    },

    /// A queued mutation exhausted its attempts during replay.
    ///
    /// Also published asynchronously as
    /// [`crate::queue::QueueEvent::ActionFailed`] so UI layers can offer
    /// manual retry or discard.
    #[error("{operation} on '{resource}' failed after {attempts} attempts: {message}")]
    MutationFailed {
        /// Target resource of the failed action.
        resource: String,
        /// Operation name (`insert`, `update` or `delete`).
        operation: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last transport failure message.
        message: String,
    },

    /// Generic transport failure from the resource client or push channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// Persistent storage failed underneath the cache store or action queue.
    #[error("storage error: {0}")]
    Storage(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The runtime is shutting down and dropped the operation.
    #[error("runtime is shutting down")]
    ShuttingDown,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}
