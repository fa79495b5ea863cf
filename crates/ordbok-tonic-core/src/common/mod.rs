//! Shared protocol types and error definitions for the `ordbok` gRPC service.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping onto `tonic::Status`.
//! - [`convert`] - Domain to protobuf conversions.
//! - [`proto`] - Generated messages, client and server.

pub mod convert;
pub mod error;
pub use error::*;
pub mod proto {
    tonic::include_proto!("ordbok");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("ordbok_descriptor");
}
