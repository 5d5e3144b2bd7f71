//! Scribe CLI - command line front end for the instrumentation pipeline
//!
//! Compilation units are read as JSON documents of the `scribe_core::ast`
//! tree. The binary either prints the instrumented unit or instruments and
//! evaluates one method against a logging trace sink.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::info;

use scribe_core::{
    CompilationUnit, InstrumentationConfig, InstrumentationPipeline, Interpreter, LoggingSink,
    ToSource, UnitReport, Value,
};

/// Output format of `scribe instrument`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Emit {
    /// Rendered Java-like source
    #[default]
    Source,
    /// The instrumented tree as JSON
    Json,
}

/// Command line switches layered over the environment configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub annotated_only: bool,
    pub no_value_changes: bool,
    pub no_errors: bool,
    pub no_returning: bool,
}

impl ConfigOverrides {
    /// Switches can only switch tracing off or restrict the selection
    pub fn apply(self, mut config: InstrumentationConfig) -> InstrumentationConfig {
        if self.annotated_only {
            config.annotated_only = true;
        }
        if self.no_value_changes {
            config.trace_value_changes = false;
        }
        if self.no_errors {
            config.trace_on_error = false;
        }
        if self.no_returning {
            config.trace_returning = false;
        }
        config
    }
}

pub fn load_unit(path: &Path) -> Result<CompilationUnit> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read compilation unit {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse compilation unit {}", path.display()))
}

pub fn render(unit: &CompilationUnit, emit: Emit) -> Result<String> {
    match emit {
        Emit::Source => Ok(unit.to_source()),
        Emit::Json => serde_json::to_string_pretty(unit).context("Failed to serialize unit"),
    }
}

/// Instrument the unit stored at `path`, returning the rendered result
pub fn instrument_file(
    path: &Path,
    config: InstrumentationConfig,
    emit: Emit,
) -> Result<(String, UnitReport)> {
    let mut unit = load_unit(path)?;
    let report = InstrumentationPipeline::new(config)
        .instrument_unit(&mut unit)
        .with_context(|| format!("Failed to instrument {}", path.display()))?;
    info!(
        instrumented = report.instrumented(),
        skipped = report.skipped(),
        "instrumented {}",
        path.display()
    );
    Ok((render(&unit, emit)?, report))
}

/// Instrument the unit at `path` and call `class.method(args)` on it
pub fn run_file(
    path: &Path,
    config: InstrumentationConfig,
    class: &str,
    method: &str,
    args: &[i64],
) -> Result<Value> {
    let mut unit = load_unit(path)?;
    let runtime_class = config.runtime_class.clone();
    InstrumentationPipeline::new(config)
        .instrument_unit(&mut unit)
        .with_context(|| format!("Failed to instrument {}", path.display()))?;

    let sink = LoggingSink::new();
    let mut interp = Interpreter::new(&unit, &sink, runtime_class);
    let args = args.iter().copied().map(Value::Int).collect();
    let value = interp
        .call(class, method, args)
        .with_context(|| format!("Evaluation of {class}.{method} failed"))?;
    Ok(value)
}
