//! Filesystem-backed loader for configuration documents.

use std::fs;
use std::path::Path;

use crate::common::error::{SweepError, SweepResult};
use crate::common::json::{self, ParseMode};

use super::domain::{ConfigRepo, ExperimentConfig};

/// Reads documents from disk with a fixed parse mode.
#[derive(Copy, Clone, Debug, Default)]
pub struct FsConfigRepo {
    mode: ParseMode,
}

impl FsConfigRepo {
    pub fn new(mode: ParseMode) -> Self {
        Self { mode }
    }
}

impl ConfigRepo for FsConfigRepo {
    fn load(&self, path: &Path) -> SweepResult<ExperimentConfig> {
        let text = fs::read_to_string(path)
            .map_err(|err| SweepError::io(format!("reading {}", path.display()), err))?;
        let value = json::parse_document(&text, self.mode).map_err(|err| {
            SweepError::new(err.code, format!("{}: {}", path.display(), err.msg))
        })?;
        ExperimentConfig::from_value(value, Some(path.to_path_buf()))
    }
}
