//! Override generation, run planning and the sequential sweep loop.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::common::error::{SweepError, SweepResult};
use crate::common::{json, time};
use crate::experiment::ExperimentConfig;

use super::domain::{
    FailurePolicy, LayerRun, RunOutcome, RunStatus, SweepPlan, SweepReport, TrainerExit,
    TrainerRunner, LAYER_PLACEHOLDER,
};

/// Fragment setting `contextualizer.layer_num` under every reader key.
pub fn layer_overrides<S: AsRef<str>>(layer: u32, reader_keys: &[S]) -> Value {
    let mut root = Map::new();
    for key in reader_keys {
        let mut contextualizer = Map::new();
        contextualizer.insert("layer_num".to_string(), Value::from(layer));
        let mut reader = Map::new();
        reader.insert("contextualizer".to_string(), Value::Object(contextualizer));
        root.insert(key.as_ref().to_string(), Value::Object(reader));
    }
    Value::Object(root)
}

/// Compact JSON for `--overrides`. Equal fragments render to equal bytes.
pub fn render_overrides(fragment: &Value) -> String {
    fragment.to_string()
}

/// Expand a plan into one run per layer.
pub fn plan_runs(plan: &SweepPlan, base: &ExperimentConfig) -> SweepResult<Vec<LayerRun>> {
    if !plan.serialization_template.contains(LAYER_PLACEHOLDER) {
        return Err(SweepError::invalid_override(format!(
            "serialization directory `{}` must contain {LAYER_PLACEHOLDER} so each layer gets its own directory",
            plan.serialization_template
        )));
    }
    if plan.reader_keys.is_empty() {
        return Err(SweepError::invalid_override("at least one reader key is required"));
    }

    let mut shared = Value::Object(Map::new());
    for fragment in &plan.extra_overrides {
        json::deep_merge(&mut shared, json::unflatten(fragment.clone())?);
    }

    let runs = plan
        .layers
        .iter()
        .map(|layer| {
            let mut fragment = shared.clone();
            json::deep_merge(&mut fragment, layer_overrides(layer, &plan.reader_keys));
            let fingerprint = base.merged(fragment.clone()).fingerprint();
            LayerRun {
                layer,
                config_path: plan.config_path.clone(),
                serialization_dir: plan
                    .serialization_template
                    .replace(LAYER_PLACEHOLDER, &layer.to_string())
                    .into(),
                overrides: render_overrides(&fragment),
                fingerprint,
            }
        })
        .collect();
    Ok(runs)
}

/// Run every layer in order, one trainer process at a time.
pub fn run_sweep(
    plan: &SweepPlan,
    runs: &[LayerRun],
    runner: &dyn TrainerRunner,
    policy: FailurePolicy,
) -> SweepReport {
    let mut report = SweepReport {
        started_ms: time::now_ms() as u64,
        config_path: plan.config_path.clone(),
        trainer: plan.trainer.clone(),
        runs: Vec::with_capacity(runs.len()),
        skipped_layers: Vec::new(),
    };

    info!(ev = "sweep_start", layers = runs.len(), config = %plan.config_path.display());

    for (idx, run) in runs.iter().enumerate() {
        info!(
            ev = "layer_start",
            layer = run.layer,
            dir = %run.serialization_dir.display(),
            overrides = %run.overrides,
        );
        let start = Instant::now();
        let status = match runner.run(&plan.trainer, run) {
            Ok(TrainerExit::Success) => RunStatus::Succeeded,
            Ok(TrainerExit::DryRun) => RunStatus::Planned,
            Ok(TrainerExit::Failure { exit_code }) => RunStatus::Failed { exit_code },
            Err(err) => RunStatus::SpawnFailed { reason: err.msg },
        };
        let dur_ms = time::elapsed_ms(start) as u64;

        match &status {
            RunStatus::Failed { exit_code } => {
                warn!(ev = "layer_failed", layer = run.layer, code = ?exit_code, dur_ms)
            }
            RunStatus::SpawnFailed { reason } => {
                error!(ev = "layer_spawn_failed", layer = run.layer, reason = %reason)
            }
            _ => info!(ev = "layer_done", layer = run.layer, dur_ms),
        }

        let failed = !status.is_ok();
        report.runs.push(RunOutcome {
            layer: run.layer,
            serialization_dir: run.serialization_dir.clone(),
            overrides: run.overrides.clone(),
            fingerprint: run.fingerprint.clone(),
            status,
            dur_ms,
        });

        if failed && policy == FailurePolicy::StopOnFailure {
            report.skipped_layers = runs[idx + 1..].iter().map(|r| r.layer).collect();
            warn!(ev = "sweep_stopped", skipped = report.skipped_layers.len());
            break;
        }
    }

    info!(
        ev = "sweep_done",
        succeeded = report.succeeded(),
        failed = report.failed(),
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::domain::{TrainerCommand, DEFAULT_READER_KEYS};
    use serde_json::json;
    use std::cell::RefCell;

    fn base() -> ExperimentConfig {
        ExperimentConfig::from_value(
            json!({
                "dataset_reader": {"type": "ontonotes_pos", "contextualizer": {"type": "precomputed_contextualizer", "layer_num": 0}},
                "validation_dataset_reader": {"type": "ontonotes_pos", "contextualizer": {"type": "precomputed_contextualizer", "layer_num": 0}},
                "trainer": {"cuda_device": 0}
            }),
            None,
        )
        .unwrap()
    }

    fn plan() -> SweepPlan {
        SweepPlan::new(
            "configs/pos.json",
            "runs/pos/layer_{layer}",
            TrainerCommand {
                program: "allennlp".to_string(),
                include_package: "contexteval".to_string(),
            },
        )
    }

    /// Fails on the listed layers, records every call.
    struct ScriptedRunner {
        fail_on: Vec<u32>,
        seen: RefCell<Vec<u32>>,
    }

    impl TrainerRunner for ScriptedRunner {
        fn run(&self, _trainer: &TrainerCommand, run: &LayerRun) -> SweepResult<TrainerExit> {
            self.seen.borrow_mut().push(run.layer);
            if self.fail_on.contains(&run.layer) {
                Ok(TrainerExit::Failure { exit_code: Some(1) })
            } else {
                Ok(TrainerExit::Success)
            }
        }
    }

    #[test]
    fn fragment_sets_layer_in_both_readers() {
        let fragment = layer_overrides(4, &DEFAULT_READER_KEYS);
        assert_eq!(
            render_overrides(&fragment),
            r#"{"dataset_reader":{"contextualizer":{"layer_num":4}},"validation_dataset_reader":{"contextualizer":{"layer_num":4}}}"#
        );
    }

    #[test]
    fn every_layer_appears_once_per_reader() {
        let runs = plan_runs(&plan(), &base()).unwrap();
        assert_eq!(runs.len(), 12);
        for (i, run) in runs.iter().enumerate() {
            assert_eq!(run.layer, i as u32);
            let parsed: Value = serde_json::from_str(&run.overrides).unwrap();
            for key in DEFAULT_READER_KEYS {
                assert_eq!(parsed[key]["contextualizer"]["layer_num"], json!(i));
            }
            let needle = format!("\"layer_num\":{i}");
            assert_eq!(run.overrides.matches(&needle).count(), 2);
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let first = plan_runs(&plan(), &base()).unwrap();
        let second = plan_runs(&plan(), &base()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn directories_are_distinct() {
        let runs = plan_runs(&plan(), &base()).unwrap();
        let mut dirs: Vec<_> = runs.iter().map(|r| r.serialization_dir.clone()).collect();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), runs.len());
        assert_eq!(runs[7].serialization_dir.to_str(), Some("runs/pos/layer_7"));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let mut p = plan();
        p.serialization_template = "runs/pos".to_string();
        assert!(plan_runs(&p, &base()).is_err());
    }

    #[test]
    fn layer_fragment_wins_over_extra_overrides() {
        let mut p = plan();
        p.layers = "2..3".parse().unwrap();
        p.extra_overrides = vec![json!({
            "trainer.cuda_device": 1,
            "dataset_reader": {"contextualizer": {"layer_num": 99}}
        })];
        let runs = plan_runs(&p, &base()).unwrap();
        let parsed: Value = serde_json::from_str(&runs[0].overrides).unwrap();
        assert_eq!(parsed["trainer"]["cuda_device"], 1);
        assert_eq!(parsed["dataset_reader"]["contextualizer"]["layer_num"], 2);
    }

    #[test]
    fn failure_does_not_halt_the_loop_by_default() {
        let runs = plan_runs(&plan(), &base()).unwrap();
        let runner = ScriptedRunner {
            fail_on: vec![3],
            seen: RefCell::new(Vec::new()),
        };
        let report = run_sweep(&plan(), &runs, &runner, FailurePolicy::ContinueOnFailure);
        assert_eq!(runner.seen.borrow().len(), 12);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.runs[3].status, RunStatus::Failed { exit_code: Some(1) });
        assert!(!report.all_succeeded());
    }

    #[test]
    fn stop_policy_skips_remaining_layers() {
        let runs = plan_runs(&plan(), &base()).unwrap();
        let runner = ScriptedRunner {
            fail_on: vec![9],
            seen: RefCell::new(Vec::new()),
        };
        let report = run_sweep(&plan(), &runs, &runner, FailurePolicy::StopOnFailure);
        assert_eq!(*runner.seen.borrow(), (0..10).collect::<Vec<u32>>());
        assert_eq!(report.skipped_layers, vec![10, 11]);
    }
}
