//! Decides whether a method takes part in instrumentation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::InstrumentationConfig;
use crate::model::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The class or the method carries the exclusion marker
    Excluded,
    /// Annotated-only mode and neither the class nor the method is included
    NotAnnotated,
    /// Abstract or native declaration
    NoBody,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Excluded => "excluded by marker",
            SkipReason::NotAnnotated => "not annotated for tracing",
            SkipReason::NoBody => "no body",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Instrument,
    Skip(SkipReason),
}

/// Exclusion wins over inclusion on either level
pub fn should_instrument(method: &Method<'_>, config: &InstrumentationConfig) -> Decision {
    if !method.has_body() {
        return Decision::Skip(SkipReason::NoBody);
    }
    let class = &method.class().markers;
    let own = method.markers();
    if class.excluded || own.excluded {
        return Decision::Skip(SkipReason::Excluded);
    }
    if config.annotated_only && !(class.included || own.included) {
        return Decision::Skip(SkipReason::NotAnnotated);
    }
    Decision::Instrument
}
