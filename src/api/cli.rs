//! Command line surface of the `layersweep` binary.
//!
//! The CLI only routes: flags become a `SweepPlan` or a document operation,
//! and the library does the work.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use crate::common::config::RunnerCfg;
use crate::common::json::{self, ParseMode};
use crate::common::{SweepCode, SweepError};
use crate::experiment::service as experiment_service;
use crate::sweep::domain::{ReportRepo, DEFAULT_READER_KEYS};
use crate::sweep::repo_fs::FsReportRepo;
use crate::sweep::runner::{DryRunRunner, ProcessRunner};
use crate::sweep::service as sweep_service;
use crate::sweep::{FailurePolicy, LayerRange, SweepPlan, TrainerCommand, TrainerRunner};

/// Exit status when every run succeeded.
pub const EXIT_OK: u8 = 0;
/// Exit status when a run failed or a document has errors.
pub const EXIT_FAILED: u8 = 1;
/// Exit status for configuration and usage errors.
pub const EXIT_USAGE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "layersweep",
    version,
    about = "Run an external trainer once per representation layer with merged config overrides."
)]
pub struct Cli {
    /// Reject comments and trailing commas in configuration files.
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Invoke the trainer once per layer.
    Sweep(SweepArgs),
    /// Print the override fragment for one layer.
    Overrides(OverridesArgs),
    /// Print a configuration document with an override fragment merged in.
    Merge(MergeArgs),
    /// Check a configuration document for missing sections.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Base configuration document.
    pub config: PathBuf,

    /// Serialization directory per run; `{layer}` is replaced by the index.
    #[arg(short = 's', long = "serialization-dir")]
    pub serialization_dir: String,

    /// Layer count (`12` = 0..12) or half-open range (`4..8`).
    #[arg(long, default_value = "12")]
    pub layers: LayerRange,

    /// Trainer program (env: LAYERSWEEP_TRAINER).
    #[arg(long)]
    pub trainer: Option<String>,

    /// Package passed to `--include-package` (env: LAYERSWEEP_PACKAGE).
    #[arg(long)]
    pub include_package: Option<String>,

    /// Reader sections that receive the layer index; repeatable.
    #[arg(long = "reader-key")]
    pub reader_keys: Vec<String>,

    /// Extra JSON fragment merged under the layer override.
    #[arg(long)]
    pub overrides: Option<String>,

    /// Shortcut for `trainer.cuda_device`.
    #[arg(long, allow_hyphen_values = true)]
    pub cuda_device: Option<i64>,

    /// Stop at the first failing layer.
    #[arg(long)]
    pub fail_fast: bool,

    /// Print the trainer commands without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON report of all runs to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct OverridesArgs {
    #[arg(long)]
    pub layer: u32,

    #[arg(long = "reader-key")]
    pub reader_keys: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    pub config: PathBuf,

    /// JSON fragment; dotted keys such as `trainer.cuda_device` are allowed.
    #[arg(long)]
    pub overrides: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    pub config: PathBuf,
}

impl Cli {
    /// Dispatch the subcommand and return the process exit status.
    pub fn run(self, env: &RunnerCfg) -> Result<u8> {
        let mode = if self.strict {
            ParseMode::Strict
        } else {
            env.parse_mode
        };
        match self.command {
            Commands::Sweep(args) => run_sweep(args, env, mode),
            Commands::Overrides(args) => run_overrides(args),
            Commands::Merge(args) => run_merge(args, mode),
            Commands::Validate(args) => run_validate(args, mode),
        }
    }
}

fn reader_keys_or_default(keys: Vec<String>) -> Vec<String> {
    if keys.is_empty() {
        DEFAULT_READER_KEYS.iter().map(|k| k.to_string()).collect()
    } else {
        keys
    }
}

fn run_sweep(args: SweepArgs, env: &RunnerCfg, mode: ParseMode) -> Result<u8> {
    let base = experiment_service::load_experiment(&args.config, mode)
        .context("cannot load base configuration")?;

    let mut extra_overrides: Vec<Value> = Vec::new();
    if let Some(text) = &args.overrides {
        extra_overrides.push(json::parse_fragment(text).context("invalid --overrides")?);
    }
    if let Some(device) = args.cuda_device {
        extra_overrides.push(json::fragment_at("trainer.cuda_device", Value::from(device))?);
    }

    // extra overrides may supply sections the base lacks
    let reader_keys = reader_keys_or_default(args.reader_keys);
    let effective = experiment_service::merge_overrides(&base, &extra_overrides);
    let issues = experiment_service::validate_with_readers(&effective, &reader_keys);
    for issue in &issues {
        warn!(ev = "config_issue", severity = ?issue.severity, path = %issue.path, msg = %issue.message);
    }
    if experiment_service::has_errors(&issues) {
        let msgs: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        return Err(anyhow::Error::new(SweepError::invalid_config(msgs.join("; ")))
            .context("configuration has errors"));
    }

    let plan = SweepPlan {
        config_path: args.config.clone(),
        serialization_template: args.serialization_dir,
        layers: args.layers,
        reader_keys,
        extra_overrides,
        trainer: TrainerCommand {
            program: args.trainer.unwrap_or_else(|| env.trainer_program.clone()),
            include_package: args
                .include_package
                .unwrap_or_else(|| env.include_package.clone()),
        },
    };
    let runs = sweep_service::plan_runs(&plan, &base).context("cannot plan sweep")?;

    let policy = if args.fail_fast {
        FailurePolicy::StopOnFailure
    } else {
        FailurePolicy::ContinueOnFailure
    };
    let runner: &dyn TrainerRunner = if args.dry_run {
        &DryRunRunner
    } else {
        &ProcessRunner
    };
    let report = sweep_service::run_sweep(&plan, &runs, runner, policy);

    if let Some(path) = args.report {
        let repo = FsReportRepo::new(path);
        repo.put_report(&report).context("cannot write sweep report")?;
        info!(ev = "report_written", path = %repo.path().display());
    }

    if report.all_succeeded() {
        Ok(EXIT_OK)
    } else {
        eprintln!(
            "{} of {} layers failed",
            report.failed() + report.skipped_layers.len(),
            runs.len()
        );
        Ok(EXIT_FAILED)
    }
}

fn run_overrides(args: OverridesArgs) -> Result<u8> {
    let keys = reader_keys_or_default(args.reader_keys);
    let fragment = sweep_service::layer_overrides(args.layer, &keys);
    println!("{}", sweep_service::render_overrides(&fragment));
    Ok(EXIT_OK)
}

fn run_merge(args: MergeArgs, mode: ParseMode) -> Result<u8> {
    let base = experiment_service::load_experiment(&args.config, mode)?;
    let fragment = json::parse_fragment(&args.overrides).context("invalid --overrides")?;
    let merged = experiment_service::merge_overrides(&base, &[fragment]);
    println!("{}", merged.to_pretty_json()?);
    Ok(EXIT_OK)
}

fn run_validate(args: ValidateArgs, mode: ParseMode) -> Result<u8> {
    let cfg = experiment_service::load_experiment(&args.config, mode)?;
    let issues = experiment_service::validate(&cfg);
    for issue in &issues {
        println!("{issue}");
    }
    if experiment_service::has_errors(&issues) {
        Ok(EXIT_FAILED)
    } else {
        println!("ok: {}", args.config.display());
        Ok(EXIT_OK)
    }
}

/// Exit status for errors that escape `Cli::run`.
pub fn exit_status_for(err: &anyhow::Error) -> u8 {
    let code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<crate::common::SweepError>())
        .map(|e| e.code)
        .unwrap_or(SweepCode::Internal);
    match code {
        SweepCode::Ok => EXIT_OK,
        _ => EXIT_USAGE,
    }
}
