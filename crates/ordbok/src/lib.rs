#![doc = include_str!("../README.md")]

mod backend;
mod dispatcher;
mod error;
mod events;
mod inflight;
mod model;
mod queue;
mod scanner;
mod store;
pub mod telemetry;
#[cfg(test)]
mod testing;
mod time;
mod worker;

pub use crate::backend::*;
pub use crate::dispatcher::*;
pub use crate::error::*;
pub use crate::events::*;
pub use crate::inflight::*;
pub use crate::model::*;
pub use crate::queue::*;
pub use crate::scanner::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::worker::*;
