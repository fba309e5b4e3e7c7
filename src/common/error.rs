//! Error handling primitives shared across the crate.

use std::fmt;
use std::io;

/// Stable error codes, also used to pick the process exit status.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SweepCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// A configuration document could not be parsed or has the wrong shape.
    InvalidConfig = 1,
    /// An override fragment or sweep parameter was rejected.
    InvalidOverride = 2,
    /// Filesystem access failed.
    Io = 3,
    /// The external trainer could not be started.
    Spawn = 4,
    /// Catch-all for bugs.
    Internal = 5,
}

impl SweepCode {
    /// Short machine readable label used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepCode::Ok => "ok",
            SweepCode::InvalidConfig => "invalid_config",
            SweepCode::InvalidOverride => "invalid_override",
            SweepCode::Io => "io",
            SweepCode::Spawn => "spawn",
            SweepCode::Internal => "internal",
        }
    }
}

/// Canonical error type for the crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SweepError {
    /// Machine parsable error code.
    pub code: SweepCode,
    /// Developer facing message.
    pub msg: String,
}

/// Result alias used throughout the crate.
pub type SweepResult<T> = Result<T, SweepError>;

impl SweepError {
    /// Create a new error with the provided code and message.
    pub fn new(code: SweepCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    /// Configuration document helper.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(SweepCode::InvalidConfig, msg)
    }

    /// Override helper.
    pub fn invalid_override(msg: impl Into<String>) -> Self {
        Self::new(SweepCode::InvalidOverride, msg)
    }

    /// IO helper that keeps the path in the message.
    pub fn io(context: impl fmt::Display, err: io::Error) -> Self {
        Self::new(SweepCode::Io, format!("{context}: {err}"))
    }

    /// Spawn helper.
    pub fn spawn(program: &str, err: io::Error) -> Self {
        Self::new(SweepCode::Spawn, format!("failed to start `{program}`: {err}"))
    }

    /// Internal error helper.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(SweepCode::Internal, msg)
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.msg)
    }
}

impl std::error::Error for SweepError {}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}
