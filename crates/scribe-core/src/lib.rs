//! # Scribe Core
//!
//! Source-level method instrumentation:
//! - Syntax tree for compilation units, with source rendering
//! - Rewriting passes that inject entry, exit, return, assignment, error
//!   and timeout reports into method bodies
//! - The pipeline that selects methods and applies the passes in order
//! - Trace sinks receiving the injected runtime calls
//! - A reference evaluator used to observe instrumented code
//!
//! Front ends (command line, build plugins) drive [`InstrumentationPipeline`]
//! and decide what to do with the rewritten tree.

#![warn(clippy::all)]

pub mod ast;
pub mod builder;
pub mod config;
pub mod error;
pub mod interp;
pub mod markers;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod translator;

// Re-export commonly used types
pub use ast::{CompilationUnit, ToSource};
pub use builder::TreeBuilder;
pub use config::InstrumentationConfig;
pub use error::{InstrumentError, TransformResult};
pub use interp::{EvalError, Interpreter, ThrownValue, Unwind, Value};
pub use markers::{AnnotationMarkers, MarkerNames, MarkerSet, MarkerSource};
pub use model::{ClassInfo, Method};
pub use pipeline::{InstrumentationPipeline, MethodReport, Outcome, PipelineBuilder, UnitReport};
pub use resolver::{Decision, SkipReason};
pub use runtime::{LoggingSink, RecordingSink, TraceEvent, TraceSink, TraceValue};
pub use translator::{Pass, Translator};

/// Scribe version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for Scribe components; `RUST_LOG` overrides the default filter
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scribe_core=info,scribe::trace=info"));
    // a subscriber installed by the host application wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
