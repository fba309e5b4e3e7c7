//! Experiment configuration documents consumed by the external trainer.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{ConfigRepo, ExperimentConfig, Issue, Sections, Severity};
