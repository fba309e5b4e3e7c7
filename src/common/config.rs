//! Runtime settings loaded from the process environment.
//!
//! Command line flags take precedence; these are the fallbacks.

use std::env;

use crate::common::json::ParseMode;

/// Snapshot of the settings consumed by the sweep driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunnerCfg {
    /// Program invoked as `<trainer> train ...`.
    pub trainer_program: String,
    /// Package handed to `--include-package`.
    pub include_package: String,
    /// `EnvFilter` directive for the log subscriber.
    pub log_filter: String,
    pub parse_mode: ParseMode,
}

impl RunnerCfg {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let parse_mode = match env_or("LAYERSWEEP_PARSE", "lenient").as_str() {
            "strict" => ParseMode::Strict,
            _ => ParseMode::Lenient,
        };

        Self {
            trainer_program: env_or("LAYERSWEEP_TRAINER", "allennlp"),
            include_package: env_or("LAYERSWEEP_PACKAGE", "contexteval"),
            log_filter: env_or("LAYERSWEEP_LOG", "info"),
            parse_mode,
        }
    }
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
