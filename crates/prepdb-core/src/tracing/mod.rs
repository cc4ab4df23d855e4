//! Tracing setup for prepdb.

pub mod setup;

pub use setup::{init_tracing, init_tracing_with};
