//! Configuration documents handed to the external trainer.
//!
//! The raw JSON tree is the source of truth: it is what gets merged and
//! forwarded. `Sections` is a read-only typed view over the keys this crate
//! knows about; unknown keys are ignored by the view and kept in the tree.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::common::error::{SweepError, SweepResult};
use crate::common::{ids, json};

/// A parsed configuration document.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    source: Option<PathBuf>,
    raw: Value,
}

impl ExperimentConfig {
    /// Wrap an already parsed document. The top level must be an object.
    pub fn from_value(raw: Value, source: Option<PathBuf>) -> SweepResult<Self> {
        if !raw.is_object() {
            return Err(SweepError::invalid_config(
                "configuration document must be a JSON object",
            ));
        }
        Ok(Self { source, raw })
    }

    /// File the document was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Typed view over the known sections.
    pub fn sections(&self) -> SweepResult<Sections> {
        Sections::deserialize(&self.raw).map_err(|err| {
            SweepError::invalid_config(format!("unexpected configuration shape: {err}"))
        })
    }

    /// Typed view of the reader stored under any top-level key.
    pub fn reader(&self, key: &str) -> SweepResult<Option<ReaderSection>> {
        self.raw
            .get(key)
            .map(|value| {
                ReaderSection::deserialize(value).map_err(|err| {
                    SweepError::invalid_config(format!("unexpected shape for `{key}`: {err}"))
                })
            })
            .transpose()
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        json::get_path(&self.raw, path)
    }

    /// New document with `fragment` deep-merged on top.
    pub fn merged(&self, fragment: Value) -> Self {
        let mut raw = self.raw.clone();
        json::deep_merge(&mut raw, fragment);
        Self {
            source: self.source.clone(),
            raw,
        }
    }

    pub fn fingerprint(&self) -> String {
        ids::fingerprint(&self.raw)
    }

    /// Pretty JSON rendering of the whole document.
    pub fn to_pretty_json(&self) -> SweepResult<String> {
        serde_json::to_string_pretty(&self.raw)
            .map_err(|err| SweepError::internal(format!("cannot render document: {err}")))
    }
}

/// Readers whose contextualizer receives the layer index during a sweep.
pub const DEFAULT_READER_KEYS: [&str; 2] = ["dataset_reader", "validation_dataset_reader"];

/// Known sections of an experiment document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Sections {
    pub dataset_reader: Option<ReaderSection>,
    pub validation_dataset_reader: Option<ReaderSection>,
    pub train_data_path: Option<String>,
    pub validation_data_path: Option<String>,
    pub test_data_path: Option<String>,
    pub model: Option<ModelSection>,
    pub iterator: Option<IteratorSection>,
    pub trainer: Option<TrainerSection>,
}

/// `dataset_reader` / `validation_dataset_reader`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ReaderSection {
    /// Registry key resolved by the external framework.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub contextualizer: Option<ContextualizerSection>,
    pub max_instances: Option<MaxInstances>,
    pub seed: Option<i64>,
    pub lazy: Option<bool>,
    /// Keep raw tokens in instances; needed when fine-tuning the contextualizer.
    pub include_raw_tokens: Option<bool>,
    /// Dependency arc readers only: `false` adds child->head pairs too.
    pub directed: Option<bool>,
}

/// Training subset size: an absolute count, or a proportion in (0, 1].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MaxInstances {
    Count(u64),
    Proportion(f64),
}

impl MaxInstances {
    /// Reason the value would be rejected by the reader, if any.
    pub fn problem(&self) -> Option<String> {
        match self {
            MaxInstances::Count(0) => Some("count must be positive".to_string()),
            MaxInstances::Count(_) => None,
            MaxInstances::Proportion(p) if *p > 0.0 && *p <= 1.0 => None,
            MaxInstances::Proportion(p) => Some(format!("proportion {p} is outside (0, 1]")),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ContextualizerSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Stored file of precomputed token representations.
    pub representations_path: Option<String>,
    pub layer_num: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ModelSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub token_representation_dim: Option<u64>,
    pub combination: Option<String>,
    pub label_encoding: Option<String>,
    pub calculate_span_f1: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct IteratorSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub batch_size: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TrainerSection {
    pub num_epochs: Option<u64>,
    pub patience: Option<u64>,
    pub cuda_device: Option<CudaDevice>,
    pub validation_metric: Option<String>,
    pub optimizer: Option<OptimizerSpec>,
}

/// GPU index (or indices); `-1` means CPU for the external framework.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CudaDevice {
    Single(i64),
    Many(Vec<i64>),
}

impl fmt::Display for CudaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CudaDevice::Single(idx) => write!(f, "{idx}"),
            CudaDevice::Many(idxs) => {
                let joined: Vec<String> = idxs.iter().map(i64::to_string).collect();
                write!(f, "[{}]", joined.join(","))
            }
        }
    }
}

/// `"optimizer": "adam"` or `"optimizer": {"type": "adam", "lr": 0.001}`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OptimizerSpec {
    Name(String),
    Full(OptimizerSection),
}

impl OptimizerSpec {
    pub fn kind(&self) -> Option<&str> {
        match self {
            OptimizerSpec::Name(name) => Some(name.as_str()),
            OptimizerSpec::Full(section) => section.kind.as_deref(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct OptimizerSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub lr: Option<f64>,
}

/// How serious a validation finding is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding, anchored at a dotted path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}: {}: {}", self.path, self.message)
    }
}

/// Source of configuration documents.
pub trait ConfigRepo {
    fn load(&self, path: &Path) -> SweepResult<ExperimentConfig>;
}
