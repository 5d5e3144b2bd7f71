//! The unit of instrumentation and its read-only class context.

use crate::ast::{Block, MethodDecl};
use crate::error::{InstrumentError, TransformResult};
use crate::markers::MarkerSet;

/// Prefix reserved for locals introduced by the passes
pub const SYNTHETIC_PREFIX: &str = "$scribe_";

/// Snapshot of the class that declares a method; never mutated by the passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub fqn: String,
    pub markers: MarkerSet,
}

impl ClassInfo {
    pub fn new(fqn: impl Into<String>, markers: MarkerSet) -> Self {
        Self {
            fqn: fqn.into(),
            markers,
        }
    }
}

/// One method declaration checked out for a translation session.
///
/// Holds the only mutable borrow of the declaration; every pass gets it in
/// turn through `&mut Method`.
#[derive(Debug)]
pub struct Method<'a> {
    class: &'a ClassInfo,
    decl: &'a mut MethodDecl,
    markers: MarkerSet,
    next_local: usize,
}

impl<'a> Method<'a> {
    pub fn new(class: &'a ClassInfo, decl: &'a mut MethodDecl, markers: MarkerSet) -> Self {
        Self {
            class,
            decl,
            markers,
            next_local: 0,
        }
    }

    pub fn class(&self) -> &ClassInfo {
        self.class
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    /// Identifier passed to every runtime call: `<class fqn>.<method>`
    pub fn id(&self) -> String {
        format!("{}.{}", self.class.fqn, self.decl.name)
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn has_body(&self) -> bool {
        self.decl.body.is_some()
    }

    pub fn is_constructor(&self) -> bool {
        self.decl.is_constructor()
    }

    pub fn representation(&self) -> &MethodDecl {
        self.decl
    }

    pub fn representation_mut(&mut self) -> &mut MethodDecl {
        self.decl
    }

    pub fn body_mut(&mut self) -> TransformResult<&mut Block> {
        let name = self.decl.name.clone();
        self.decl.body.as_mut().ok_or_else(|| {
            InstrumentError::structural("method without body", format!("'{name}' has no body"))
        })
    }

    /// A local name that cannot clash with user code or earlier passes
    pub fn fresh_local(&mut self, purpose: &str) -> String {
        let name = format!("{SYNTHETIC_PREFIX}{purpose}_{}", self.next_local);
        self.next_local += 1;
        name
    }
}
