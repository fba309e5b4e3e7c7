//! Loading, checking and merging experiment documents.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::common::error::SweepResult;
use crate::common::json::ParseMode;

use super::domain::{ConfigRepo, ExperimentConfig, Issue, Severity, DEFAULT_READER_KEYS};
use super::repo_fs::FsConfigRepo;

/// Read a document from disk.
pub fn load_experiment(path: &Path, mode: ParseMode) -> SweepResult<ExperimentConfig> {
    let cfg = FsConfigRepo::new(mode).load(path)?;
    info!(
        ev = "config_loaded",
        path = %path.display(),
        mode = ?mode,
        fingerprint = %cfg.fingerprint(),
    );
    Ok(cfg)
}

/// Check the document for problems the trainer would otherwise hit late,
/// assuming the default reader keys receive the layer index.
pub fn validate(cfg: &ExperimentConfig) -> Vec<Issue> {
    validate_with_readers(cfg, &DEFAULT_READER_KEYS)
}

/// Same as [`validate`], for an explicit set of swept reader keys.
///
/// Nothing here is authoritative; the external framework owns the schema.
pub fn validate_with_readers<S: AsRef<str>>(cfg: &ExperimentConfig, reader_keys: &[S]) -> Vec<Issue> {
    let sections = match cfg.sections() {
        Ok(sections) => sections,
        Err(err) => return vec![Issue::error("$", err.msg)],
    };
    let mut issues = Vec::new();

    for key in reader_keys {
        check_reader(cfg, key.as_ref(), &mut issues);
    }

    if sections.train_data_path.is_none() {
        issues.push(Issue::error("train_data_path", "training data path is missing"));
    }
    if sections.validation_data_path.is_none() {
        issues.push(Issue::warning(
            "validation_data_path",
            "no validation data; early stopping has nothing to watch",
        ));
    }

    match &sections.model {
        Some(model) if model.kind.is_some() => {}
        _ => issues.push(Issue::error("model.type", "model type is missing")),
    }

    if sections.trainer.is_none() {
        issues.push(Issue::error("trainer", "section is missing"));
    }

    debug!(ev = "config_validated", issues = issues.len());
    issues
}

fn check_reader(cfg: &ExperimentConfig, key: &str, issues: &mut Vec<Issue>) {
    let reader = match cfg.reader(key) {
        Ok(Some(reader)) => reader,
        Ok(None) => {
            // the layer override would create a reader that has only a contextualizer
            issues.push(Issue::error(key, "section is missing but receives the layer override"));
            return;
        }
        Err(err) => {
            issues.push(Issue::error(key, err.msg));
            return;
        }
    };

    if reader.kind.is_none() {
        issues.push(Issue::error(format!("{key}.type"), "reader type is missing"));
    }
    match &reader.contextualizer {
        None => issues.push(Issue::warning(
            format!("{key}.contextualizer"),
            "no contextualizer; layer overrides will add one with only layer_num",
        )),
        Some(ctx) if ctx.representations_path.is_none() => issues.push(Issue::warning(
            format!("{key}.contextualizer.representations_path"),
            "no stored representations configured",
        )),
        Some(_) => {}
    }
    if let Some(problem) = reader.max_instances.as_ref().and_then(|m| m.problem()) {
        issues.push(Issue::error(format!("{key}.max_instances"), problem));
    }
}

/// True when any issue is an error rather than a warning.
pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Merge fragments onto the document in order; later fragments win.
pub fn merge_overrides(cfg: &ExperimentConfig, fragments: &[Value]) -> ExperimentConfig {
    fragments
        .iter()
        .fold(cfg.clone(), |acc, fragment| acc.merged(fragment.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ExperimentConfig {
        ExperimentConfig::from_value(value, None).unwrap()
    }

    #[test]
    fn complete_document_only_warns() {
        let reader = json!({"type": "ontonotes_ner", "contextualizer": {"type": "precomputed_contextualizer"}});
        let cfg = doc(json!({
            "dataset_reader": reader.clone(),
            "validation_dataset_reader": reader,
            "train_data_path": "train.conll",
            "model": {"type": "tagger", "label_encoding": "BIOUL"},
            "trainer": {"num_epochs": 50, "optimizer": "adam"}
        }));
        let issues = validate(&cfg);
        assert!(!has_errors(&issues));
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn empty_document_lists_every_required_section() {
        let issues = validate(&doc(json!({})));
        let paths: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec!["dataset_reader", "validation_dataset_reader", "train_data_path", "model.type", "trainer"]
        );
    }

    #[test]
    fn missing_validation_reader_is_reported() {
        let cfg = doc(json!({
            "dataset_reader": {"type": "ontonotes_pos", "contextualizer": {"representations_path": "reps.hdf5"}},
            "train_data_path": "train.conll",
            "validation_data_path": "dev.conll",
            "model": {"type": "tagger"},
            "trainer": {}
        }));
        let issues = validate(&cfg);
        assert_eq!(issues, vec![Issue::error(
            "validation_dataset_reader",
            "section is missing but receives the layer override"
        )]);

        // only sweeping the training reader leaves nothing to report
        assert!(validate_with_readers(&cfg, &["dataset_reader"]).is_empty());
    }

    #[test]
    fn validation_reader_needs_type_and_contextualizer() {
        let cfg = doc(json!({
            "dataset_reader": {"type": "ontonotes_pos", "contextualizer": {"representations_path": "reps.hdf5"}},
            "validation_dataset_reader": {"lazy": true},
            "train_data_path": "train.conll",
            "validation_data_path": "dev.conll",
            "model": {"type": "tagger"},
            "trainer": {}
        }));
        let paths: Vec<(Severity, String)> = validate(&cfg)
            .into_iter()
            .map(|i| (i.severity, i.path))
            .collect();
        assert_eq!(
            paths,
            vec![
                (Severity::Error, "validation_dataset_reader.type".to_string()),
                (Severity::Warning, "validation_dataset_reader.contextualizer".to_string()),
            ]
        );
    }

    #[test]
    fn max_instances_proportion_out_of_range() {
        let cfg = doc(json!({
            "dataset_reader": {"type": "ontonotes_pos", "max_instances": 1.5,
                               "contextualizer": {"representations_path": "reps.hdf5"}},
            "validation_dataset_reader": {"type": "ontonotes_pos", "max_instances": 0.5,
                                          "contextualizer": {"representations_path": "reps.hdf5"}},
            "train_data_path": "train.conll",
            "validation_data_path": "dev.conll",
            "model": {"type": "tagger"},
            "trainer": {}
        }));
        let issues = validate(&cfg);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "dataset_reader.max_instances");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn shape_errors_become_a_single_issue() {
        let issues = validate(&doc(json!({"trainer": {"num_epochs": "many"}})));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "$");
        assert!(has_errors(&issues));
    }

    #[test]
    fn later_fragments_win() {
        let cfg = doc(json!({"trainer": {"cuda_device": 0, "patience": 3}}));
        let merged = merge_overrides(
            &cfg,
            &[
                json!({"trainer": {"cuda_device": 1}}),
                json!({"trainer": {"cuda_device": 2}}),
            ],
        );
        assert_eq!(merged.raw(), &json!({"trainer": {"cuda_device": 2, "patience": 3}}));
    }
}
