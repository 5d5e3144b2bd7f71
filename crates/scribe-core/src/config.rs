//! Process-wide instrumentation settings.
//!
//! Read once when the pipeline is constructed and immutable afterwards.

use serde::{Deserialize, Serialize};
use tracing::info;

pub const ENV_TRACE_VALUE_CHANGE: &str = "SCRIBE_TRACE_VALUE_CHANGE";
pub const ENV_TRACE_ON_ERROR: &str = "SCRIBE_TRACE_ON_ERROR";
pub const ENV_TRACE_RETURNING: &str = "SCRIBE_TRACE_RETURNING";
pub const ENV_ANNOTATED_ONLY: &str = "SCRIBE_ANNOTATED_ONLY";
pub const ENV_RUNTIME_CLASS: &str = "SCRIBE_RUNTIME_CLASS";

/// Class that receives the injected runtime calls
pub const DEFAULT_RUNTIME_CLASS: &str = "scribe.runtime.Scribe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Report assignments and extract return expressions
    pub trace_value_changes: bool,
    /// Report uncaught errors before they leave the method
    pub trace_on_error: bool,
    /// Report the value of each `return`
    pub trace_returning: bool,
    /// Only instrument classes or methods carrying an inclusion marker
    pub annotated_only: bool,
    pub runtime_class: String,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            trace_value_changes: true,
            trace_on_error: true,
            trace_returning: true,
            annotated_only: false,
            runtime_class: DEFAULT_RUNTIME_CLASS.to_string(),
        }
    }
}

impl InstrumentationConfig {
    /// Read the settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`; absent keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| match lookup(key) {
            Some(raw) => parse_flag(&raw),
            None => default,
        };

        let config = Self {
            trace_value_changes: flag(ENV_TRACE_VALUE_CHANGE, defaults.trace_value_changes),
            trace_on_error: flag(ENV_TRACE_ON_ERROR, defaults.trace_on_error),
            trace_returning: flag(ENV_TRACE_RETURNING, defaults.trace_returning),
            annotated_only: flag(ENV_ANNOTATED_ONLY, defaults.annotated_only),
            runtime_class: lookup(ENV_RUNTIME_CLASS)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .unwrap_or(defaults.runtime_class),
        };
        config.log();
        config
    }

    pub fn log(&self) {
        info!(enabled = self.trace_value_changes, "instrument value change tracing");
        info!(enabled = self.trace_on_error, "instrument error tracing");
        info!(enabled = self.trace_returning, "instrument method returning tracing");
        info!(enabled = self.annotated_only, "annotated only mode");
        info!(runtime_class = %self.runtime_class, "runtime class");
    }
}

/// Only a case-insensitive `true` enables a flag; anything else disables it
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}
