//! Error types for the gRPC service layer.
//!
//! `Error` wraps the worker's own [`ordbok::Error`] and implements
//! `From<Error>` for `tonic::Status` so handlers can use `?` and still answer
//! with a meaningful status code.
//!
//! ## Error Cases
//! - `Worker`: the generation worker rejected or failed the request.
//! - `ServiceShutdown`: a request arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the gRPC service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error reported by the generation worker.
    #[error(transparent)]
    Worker(#[from] ordbok::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Worker(e) => worker_status(e),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}

fn worker_status(err: ordbok::Error) -> Status {
    match err {
        ordbok::Error::NotFound { key } => Status::not_found(format!("No item for '{key}'")),
        ordbok::Error::InvalidKey { reason } => Status::invalid_argument(reason),
        ordbok::Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        ordbok::Error::DuplicateSuppressed { key } => {
            Status::aborted(format!("Generation for '{key}' is already in progress"))
        }
        e @ (ordbok::Error::Backend(_) | ordbok::Error::Store(_)) => {
            Status::internal(e.to_string())
        }
    }
}
