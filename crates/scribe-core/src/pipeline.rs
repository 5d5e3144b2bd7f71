/*!
# Instrumentation pipeline

Drives one method at a time through the resolver and the canonical passes.
A compilation unit is instrumented on a staged copy and committed only when
every method succeeded, so a failed run leaves the caller's tree untouched.
*/

use serde::Serialize;
use tracing::{debug, trace};

use crate::ast::{CompilationUnit, ToSource};
use crate::builder::TreeBuilder;
use crate::config::InstrumentationConfig;
use crate::error::{InstrumentError, TransformResult};
use crate::markers::{AnnotationMarkers, MarkerSource};
use crate::model::{ClassInfo, Method};
use crate::resolver::{should_instrument, Decision, SkipReason};
use crate::translator::{Pass, PassContext};

/// What happened to one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Passes applied, in order
    Instrumented { applied: Vec<Pass> },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodReport {
    pub class: String,
    pub method: String,
    pub outcome: Outcome,
}

impl MethodReport {
    pub fn is_instrumented(&self) -> bool {
        matches!(self.outcome, Outcome::Instrumented { .. })
    }
}

/// Summary of a unit run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub methods: Vec<MethodReport>,
}

impl UnitReport {
    pub fn instrumented(&self) -> usize {
        self.methods.iter().filter(|m| m.is_instrumented()).count()
    }

    pub fn skipped(&self) -> usize {
        self.methods.len() - self.instrumented()
    }

    pub fn find(&self, class: &str, method: &str) -> Option<&MethodReport> {
        self.methods
            .iter()
            .find(|m| m.class == class && m.method == method)
    }
}

pub struct InstrumentationPipeline {
    config: InstrumentationConfig,
    builder: TreeBuilder,
    markers: Box<dyn MarkerSource>,
}

impl InstrumentationPipeline {
    /// Pipeline with annotation markers and a builder for the configured runtime class
    pub fn new(config: InstrumentationConfig) -> Self {
        let builder = TreeBuilder::new(config.runtime_class.as_str());
        Self {
            config,
            builder,
            markers: Box::new(AnnotationMarkers::default()),
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    pub fn markers(&self) -> &dyn MarkerSource {
        self.markers.as_ref()
    }

    pub fn should_instrument(&self, method: &Method<'_>) -> Decision {
        should_instrument(method, &self.config)
    }

    /// Run every applicable pass over one method, in canonical order
    pub fn translate(&self, method: &mut Method<'_>) -> TransformResult<MethodReport> {
        let class = method.class().fqn.clone();
        let name = method.name().to_string();

        if let Decision::Skip(reason) = self.should_instrument(method) {
            debug!(class = %class, method = %name, %reason, "skipping method");
            return Ok(MethodReport {
                class,
                method: name,
                outcome: Outcome::Skipped(reason),
            });
        }

        let cx = PassContext::new(&self.builder, &self.config);
        let mut applied = Vec::new();
        for pass in Pass::CANONICAL {
            if !pass.applies(method, &self.config) {
                continue;
            }
            trace!(class = %class, method = %name, pass = pass.name(), "applying pass");
            pass.run(method, &cx)
                .map_err(|source| InstrumentError::Translation {
                    class: class.clone(),
                    method: name.clone(),
                    pass: pass.name(),
                    source: Box::new(source),
                })?;
            applied.push(pass);
        }

        debug!(
            class = %class,
            method = %name,
            source = %method.representation().to_source(),
            "instrumented method"
        );
        Ok(MethodReport {
            class,
            method: name,
            outcome: Outcome::Instrumented { applied },
        })
    }

    /// Instrument every method of `unit`; on error `unit` is left as it was
    pub fn instrument_unit(&self, unit: &mut CompilationUnit) -> TransformResult<UnitReport> {
        let mut staged = unit.clone();
        let mut report = UnitReport::default();

        let names: Vec<String> = staged
            .classes
            .iter()
            .map(|class| staged.qualified_name(class))
            .collect();
        for (class, fqn) in staged.classes.iter_mut().zip(names) {
            let info = ClassInfo::new(fqn, self.markers.class_markers(class));
            for decl in class.methods.iter_mut() {
                let markers = self.markers.method_markers(decl);
                let mut method = Method::new(&info, decl, markers);
                report.methods.push(self.translate(&mut method)?);
            }
        }

        debug!(
            instrumented = report.instrumented(),
            skipped = report.skipped(),
            "instrumented compilation unit"
        );
        *unit = staged;
        Ok(report)
    }
}

impl std::fmt::Debug for InstrumentationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentationPipeline")
            .field("config", &self.config)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

/// Assembles a pipeline from explicitly provided services
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<InstrumentationConfig>,
    builder: Option<TreeBuilder>,
    markers: Option<Box<dyn MarkerSource>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: InstrumentationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn tree_builder(mut self, builder: TreeBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn marker_source(mut self, markers: impl MarkerSource + 'static) -> Self {
        self.markers = Some(Box::new(markers));
        self
    }

    pub fn build(self) -> TransformResult<InstrumentationPipeline> {
        Ok(InstrumentationPipeline {
            config: self
                .config
                .ok_or(InstrumentError::MissingService("instrumentation config"))?,
            builder: self
                .builder
                .ok_or(InstrumentError::MissingService("tree builder"))?,
            markers: self
                .markers
                .ok_or(InstrumentError::MissingService("marker source"))?,
        })
    }
}
