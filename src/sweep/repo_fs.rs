//! Filesystem persistence for sweep reports.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{SweepError, SweepResult};

use super::domain::{ReportRepo, SweepReport};

/// Writes the report as pretty JSON to a fixed path.
pub struct FsReportRepo {
    path: PathBuf,
}

impl FsReportRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportRepo for FsReportRepo {
    fn put_report(&self, report: &SweepReport) -> SweepResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| SweepError::io(format!("creating {}", parent.display()), err))?;
        }
        let body = serde_json::to_string_pretty(report)
            .map_err(|err| SweepError::internal(format!("cannot render report: {err}")))?;
        fs::write(&self.path, body)
            .map_err(|err| SweepError::io(format!("writing {}", self.path.display()), err))
    }
}
