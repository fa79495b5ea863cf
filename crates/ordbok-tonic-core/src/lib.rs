#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can access `ordbok` via
// `ordbok_tonic_core::ordbok`
pub use ordbok;
