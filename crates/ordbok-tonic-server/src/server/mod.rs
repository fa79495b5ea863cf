//! Server internals: configuration, telemetry, the gRPC service and the
//! generation backends it can be wired to.

pub mod backend;
pub mod config;
pub mod service;
pub mod telemetry;
