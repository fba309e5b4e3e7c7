//! Layer sweep: one trainer invocation per representation layer.

pub mod domain;
pub mod repo_fs;
pub mod runner;
pub mod service;

pub use domain::{
    FailurePolicy, LayerRange, LayerRun, RunStatus, SweepPlan, SweepReport, TrainerCommand,
    TrainerRunner,
};
