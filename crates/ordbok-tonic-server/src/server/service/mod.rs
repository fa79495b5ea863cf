//! gRPC service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - `OrdbokService`, the entry point for all client requests.

pub mod handler;
