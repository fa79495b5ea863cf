//! Error types for the generation worker.
//!
//! ## Error Cases
//! - `NotFound`: the item vanished (or never existed) for the requested key.
//! - `InvalidKey`: the caller supplied an empty or oversized word.
//! - `Backend`: the generation backend failed or returned garbage.
//! - `Store`: the persistence layer could not be read or written.
//! - `DuplicateSuppressed`: the in-flight guard rejected the work. This is a
//!   normal concurrency-control outcome, not a fault. The worker itself never
//!   returns it (see the variant docs).
//! - `ServiceShutdown`: work arrived after shutdown was requested.

use crate::{backend::BackendError, store::StoreError};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the generation worker.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No item is stored under the key.
    #[error("Item not found: {key}")]
    NotFound { key: String },

    /// The key failed normalization.
    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },

    /// The generation backend failed for this task.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The item store is unavailable or returned corrupt data.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another dispatcher owns the key, or it is cooling down.
    ///
    /// [`GenerationWorker`](crate::GenerationWorker) never returns this:
    /// enqueueing always succeeds and duplicates are dropped later by the
    /// dispatcher, which reports them as
    /// [`DispatchOutcome::Suppressed`](crate::DispatchOutcome::Suppressed).
    /// It exists for callers that gate work on
    /// [`InFlightTracker`](crate::InFlightTracker) directly.
    #[error("Duplicate task suppressed for {key}")]
    DuplicateSuppressed { key: String },

    /// The worker is shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}
