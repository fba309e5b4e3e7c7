//! Shared utilities that glue the experiment and sweep modules together.
pub mod config;
pub mod error;
pub mod ids;
pub mod json;
pub mod log;
pub mod time;

pub use error::{SweepCode, SweepError, SweepResult};
