use thiserror::Error;

/// Failures of the instrumentation pipeline.
///
/// None of them are recoverable: a run either instruments every eligible
/// method or fails as a whole.
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// A collaborator service was not provided when the pipeline was built
    #[error("Configuration error: missing {0}")]
    MissingService(&'static str),

    /// A pass met a tree shape it cannot rewrite safely
    #[error("Unsupported {construct}: {reason}")]
    Structural { construct: String, reason: String },

    /// A pass failed; carries the location of the offending method
    #[error("Failed to instrument {class}.{method} ({pass}): {source}")]
    Translation {
        class: String,
        method: String,
        pass: &'static str,
        #[source]
        source: Box<InstrumentError>,
    },
}

impl InstrumentError {
    /// Create a structural precondition violation
    pub fn structural(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            construct: construct.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for a single rewriting step
pub type TransformResult<T> = std::result::Result<T, InstrumentError>;
