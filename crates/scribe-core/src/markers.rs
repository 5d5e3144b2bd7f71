//! Marker lookup on class and method declarations.
//!
//! The pipeline only asks "which markers does this declaration carry"; how
//! the markers are encoded is up to the [`MarkerSource`] implementation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::{Annotation, ClassDecl, Literal, MethodDecl};

/// Markers attached to one declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerSet {
    pub excluded: bool,
    pub included: bool,
    /// Declared maximum duration in milliseconds
    pub timeout_ms: Option<u64>,
}

impl MarkerSet {
    pub fn excluded() -> Self {
        Self {
            excluded: true,
            ..Self::default()
        }
    }

    pub fn included() -> Self {
        Self {
            included: true,
            ..Self::default()
        }
    }
}

/// Capability: given a declaration node, return its marker set
pub trait MarkerSource: Send + Sync {
    fn class_markers(&self, class: &ClassDecl) -> MarkerSet;

    fn method_markers(&self, method: &MethodDecl) -> MarkerSet;
}

/// Annotation names recognized by [`AnnotationMarkers`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerNames {
    pub exclude: String,
    pub include: String,
    pub timeout: String,
}

impl Default for MarkerNames {
    fn default() -> Self {
        Self {
            exclude: "Exclude".to_string(),
            include: "Include".to_string(),
            timeout: "Timeout".to_string(),
        }
    }
}

/// Reads markers from annotations, matching on the simple annotation name
#[derive(Debug, Clone, Default)]
pub struct AnnotationMarkers {
    names: MarkerNames,
}

impl AnnotationMarkers {
    pub fn new(names: MarkerNames) -> Self {
        Self { names }
    }

    fn collect(&self, owner: &str, annotations: &[Annotation]) -> MarkerSet {
        let mut markers = MarkerSet::default();
        for annotation in annotations {
            let name = annotation.simple_name();
            if name == self.names.exclude {
                markers.excluded = true;
            } else if name == self.names.include {
                markers.included = true;
            } else if name == self.names.timeout {
                markers.timeout_ms = timeout_value(owner, annotation);
            }
        }
        markers
    }
}

impl MarkerSource for AnnotationMarkers {
    fn class_markers(&self, class: &ClassDecl) -> MarkerSet {
        self.collect(&class.name, &class.annotations)
    }

    fn method_markers(&self, method: &MethodDecl) -> MarkerSet {
        self.collect(&method.name, &method.annotations)
    }
}

fn timeout_value(owner: &str, annotation: &Annotation) -> Option<u64> {
    match annotation.arg("value") {
        Some(Literal::Int(ms) | Literal::Long(ms)) if *ms >= 0 => Some(*ms as u64),
        Some(Literal::Str(raw)) => match raw.trim().parse::<u64>() {
            Ok(ms) => Some(ms),
            Err(_) => {
                warn!(owner, value = %raw, "ignoring unparsable timeout marker");
                None
            }
        },
        other => {
            warn!(owner, value = ?other, "ignoring timeout marker without a duration");
            None
        }
    }
}
