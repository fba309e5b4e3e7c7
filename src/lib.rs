//! Layer-wise representation sweeps: merge per-layer overrides into an experiment
//! configuration and run an external trainer once per layer.
pub mod api;
pub mod common;
pub mod experiment;
pub mod sweep;

pub use common::{SweepCode, SweepError, SweepResult};
