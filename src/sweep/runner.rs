//! Trainer runners: a real subprocess and a dry run that only prints.

use std::process::Command;

use tracing::debug;

use crate::common::error::{SweepError, SweepResult};

use super::domain::{LayerRun, TrainerCommand, TrainerExit, TrainerRunner};

/// Spawns the trainer and waits for it. Stdio is inherited so the trainer's
/// own progress output reaches the terminal unchanged.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProcessRunner;

impl TrainerRunner for ProcessRunner {
    fn run(&self, trainer: &TrainerCommand, run: &LayerRun) -> SweepResult<TrainerExit> {
        debug!(ev = "spawn", cmd = %run.command_line(trainer));
        // TODO: tee stderr into the serialization dir so failed runs carry an excerpt in the report.
        let status = Command::new(&trainer.program)
            .args(run.args(trainer))
            .status()
            .map_err(|err| SweepError::spawn(&trainer.program, err))?;

        if status.success() {
            Ok(TrainerExit::Success)
        } else {
            Ok(TrainerExit::Failure {
                exit_code: status.code(),
            })
        }
    }
}

/// Prints each command line on stdout instead of running it.
#[derive(Copy, Clone, Debug, Default)]
pub struct DryRunRunner;

impl TrainerRunner for DryRunRunner {
    fn run(&self, trainer: &TrainerCommand, run: &LayerRun) -> SweepResult<TrainerExit> {
        println!("{}", run.command_line(trainer));
        Ok(TrainerExit::DryRun)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::common::SweepCode;
    use std::path::PathBuf;

    fn run() -> LayerRun {
        LayerRun {
            layer: 0,
            config_path: PathBuf::from("pos.json"),
            serialization_dir: PathBuf::from("layer_0"),
            overrides: "{}".to_string(),
            fingerprint: String::new(),
        }
    }

    fn trainer(program: &str) -> TrainerCommand {
        TrainerCommand {
            program: program.to_string(),
            include_package: "contexteval".to_string(),
        }
    }

    #[test]
    fn exit_status_is_reported() {
        assert_eq!(ProcessRunner.run(&trainer("true"), &run()).unwrap(), TrainerExit::Success);
        assert_eq!(
            ProcessRunner.run(&trainer("false"), &run()).unwrap(),
            TrainerExit::Failure { exit_code: Some(1) }
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = ProcessRunner
            .run(&trainer("layersweep-no-such-trainer"), &run())
            .unwrap_err();
        assert_eq!(err.code, SweepCode::Spawn);
    }

    #[test]
    fn dry_run_never_executes() {
        assert_eq!(
            DryRunRunner.run(&trainer("layersweep-no-such-trainer"), &run()).unwrap(),
            TrainerExit::DryRun
        );
    }
}
