//! Domain types for the layer sweep: plans, runs and their outcomes.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::common::error::{SweepError, SweepResult};

/// Layers swept when nothing else is asked for (`0..12`).
pub const DEFAULT_LAYER_COUNT: u32 = 12;

pub use crate::experiment::domain::DEFAULT_READER_KEYS;

/// Placeholder substituted into the serialization directory template.
pub const LAYER_PLACEHOLDER: &str = "{layer}";

/// Half-open range of layer indices.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LayerRange {
    start: u32,
    end: u32,
}

impl LayerRange {
    pub fn new(start: u32, end: u32) -> SweepResult<Self> {
        if start >= end {
            return Err(SweepError::invalid_override(format!(
                "layer range {start}..{end} is empty"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

impl Default for LayerRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: DEFAULT_LAYER_COUNT,
        }
    }
}

/// Accepts a count (`12`, meaning `0..12`) or a range (`4..8`).
impl FromStr for LayerRange {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| -> SweepResult<u32> {
            part.trim().parse::<u32>().map_err(|_| {
                SweepError::invalid_override(format!("`{s}` is not a layer count or A..B range"))
            })
        };
        match s.split_once("..") {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Self::new(0, parse(s)?),
        }
    }
}

impl fmt::Display for LayerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// External trainer entry point.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TrainerCommand {
    pub program: String,
    pub include_package: String,
}

/// Everything needed to expand a sweep into runs.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepPlan {
    pub config_path: PathBuf,
    /// Output directory template; must contain `{layer}`.
    pub serialization_template: String,
    pub layers: LayerRange,
    pub reader_keys: Vec<String>,
    /// Merged before the layer fragment, so the layer index always wins.
    pub extra_overrides: Vec<Value>,
    pub trainer: TrainerCommand,
}

impl SweepPlan {
    /// Plan with the default layer range and reader keys.
    pub fn new(
        config_path: impl Into<PathBuf>,
        serialization_template: impl Into<String>,
        trainer: TrainerCommand,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            serialization_template: serialization_template.into(),
            layers: LayerRange::default(),
            reader_keys: DEFAULT_READER_KEYS.iter().map(|k| k.to_string()).collect(),
            extra_overrides: Vec::new(),
            trainer,
        }
    }
}

/// One trainer invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LayerRun {
    pub layer: u32,
    pub config_path: PathBuf,
    pub serialization_dir: PathBuf,
    /// Compact override JSON passed as `--overrides`.
    pub overrides: String,
    /// Fingerprint of the base document with the overrides applied.
    pub fingerprint: String,
}

impl LayerRun {
    /// Arguments following the trainer program. Paths are passed through
    /// as-is, without a UTF-8 round trip.
    pub fn args(&self, trainer: &TrainerCommand) -> Vec<OsString> {
        vec![
            "train".into(),
            self.config_path.clone().into_os_string(),
            "-s".into(),
            self.serialization_dir.clone().into_os_string(),
            "--include-package".into(),
            trainer.include_package.clone().into(),
            "--overrides".into(),
            self.overrides.clone().into(),
        ]
    }

    /// Shell-ready rendering of the full invocation, for logs and dry runs.
    pub fn command_line(&self, trainer: &TrainerCommand) -> String {
        std::iter::once(OsString::from(&trainer.program))
            .chain(self.args(trainer))
            .map(|arg| shell_quote(&arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ','));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// What the runner observed for one invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TrainerExit {
    Success,
    Failure { exit_code: Option<i32> },
    /// Nothing was executed.
    DryRun,
}

/// Recorded status of one layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// `exit_code` is absent when the process was killed by a signal.
    Failed { exit_code: Option<i32> },
    SpawnFailed { reason: String },
    Planned,
}

impl RunStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Planned)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RunOutcome {
    pub layer: u32,
    pub serialization_dir: PathBuf,
    pub overrides: String,
    pub fingerprint: String,
    #[serde(flatten)]
    pub status: RunStatus,
    pub dur_ms: u64,
}

/// Whether a failing run stops the remaining layers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    #[default]
    ContinueOnFailure,
    StopOnFailure,
}

/// Aggregated result of a sweep.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SweepReport {
    pub started_ms: u64,
    pub config_path: PathBuf,
    pub trainer: TrainerCommand,
    pub runs: Vec<RunOutcome>,
    /// Layers never attempted because of `StopOnFailure`.
    pub skipped_layers: Vec<u32>,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.runs.iter().filter(|r| r.status.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.runs.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && self.skipped_layers.is_empty()
    }
}

/// Executes a single trainer invocation.
pub trait TrainerRunner {
    /// `Err` only when the trainer could not be started at all.
    fn run(&self, trainer: &TrainerCommand, run: &LayerRun) -> SweepResult<TrainerExit>;
}

/// Destination for finished sweep reports.
pub trait ReportRepo {
    fn put_report(&self, report: &SweepReport) -> SweepResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer() -> TrainerCommand {
        TrainerCommand {
            program: "allennlp".to_string(),
            include_package: "contexteval".to_string(),
        }
    }

    #[test]
    fn layer_range_parses_counts_and_ranges() {
        assert_eq!("12".parse::<LayerRange>().unwrap(), LayerRange::default());
        let r: LayerRange = "4..8".parse().unwrap();
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        assert_eq!(r.to_string(), "4..8");
        assert!("0".parse::<LayerRange>().is_err());
        assert!("8..4".parse::<LayerRange>().is_err());
        assert!("twelve".parse::<LayerRange>().is_err());
    }

    #[test]
    fn args_follow_trainer_cli_shape() {
        let run = LayerRun {
            layer: 3,
            config_path: PathBuf::from("configs/pos.json"),
            serialization_dir: PathBuf::from("runs/pos/layer_3"),
            overrides: r#"{"a":1}"#.to_string(),
            fingerprint: String::new(),
        };
        assert_eq!(
            run.args(&trainer()),
            vec![
                "train",
                "configs/pos.json",
                "-s",
                "runs/pos/layer_3",
                "--include-package",
                "contexteval",
                "--overrides",
                r#"{"a":1}"#
            ]
        );
        assert_eq!(
            run.command_line(&trainer()),
            r#"allennlp train configs/pos.json -s runs/pos/layer_3 --include-package contexteval --overrides '{"a":1}'"#
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_reach_args_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = OsStr::from_bytes(b"runs/\xffpos/layer_0");
        let run = LayerRun {
            layer: 0,
            config_path: PathBuf::from("pos.json"),
            serialization_dir: PathBuf::from(dir),
            overrides: "{}".to_string(),
            fingerprint: String::new(),
        };
        assert_eq!(run.args(&trainer())[3].as_os_str(), dir);
        // the rendered command line is lossy, the args are not
        assert!(run.command_line(&trainer()).contains('\u{FFFD}'));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn planned_and_succeeded_count_as_ok() {
        assert!(RunStatus::Planned.is_ok());
        assert!(RunStatus::Succeeded.is_ok());
        assert!(!RunStatus::Failed { exit_code: Some(1) }.is_ok());
    }
}
