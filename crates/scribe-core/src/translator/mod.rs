/*!
# Translators

One stateless translator per instrumentation pass. The pipeline runs them in
the fixed order of [`Pass::CANONICAL`]; later passes rely on the shapes
produced by earlier ones (normalized blocks, the entry/exit wrapper).
*/

pub mod constructor;
pub mod entering_exiting;
pub mod on_error;
pub mod return_extraction;
pub mod returning;
pub mod timeout;
pub mod value_change;
pub mod wrap_in_block;

use serde::{Deserialize, Serialize};

use crate::ast::{Block, Stmt, TryStmt};
use crate::builder::TreeBuilder;
use crate::config::InstrumentationConfig;
use crate::error::{InstrumentError, TransformResult};
use crate::model::Method;

pub use constructor::ConstructorTranslator;
pub use entering_exiting::EnteringExitingTranslator;
pub use on_error::OnErrorTranslator;
pub use returning::ReturningTranslator;
pub use timeout::TimeoutTranslator;
pub use value_change::ValueChangeTranslator;
pub use wrap_in_block::BlockNormalizer;

/// Read-only services shared by every pass of a run
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub builder: &'a TreeBuilder,
    pub config: &'a InstrumentationConfig,
}

impl<'a> PassContext<'a> {
    pub fn new(builder: &'a TreeBuilder, config: &'a InstrumentationConfig) -> Self {
        Self { builder, config }
    }
}

/// A single rewriting step over one method body
pub trait Translator {
    /// Human-readable name for logs and error reports
    fn name(&self) -> &'static str;

    /// Rewrite the method in place
    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()>;
}

/// The instrumentation passes, in the order they must run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pass {
    Normalize,
    ValueChange,
    EnteringExiting,
    Returning,
    Timeout,
    OnError,
    Constructor,
}

impl Pass {
    pub const CANONICAL: [Pass; 7] = [
        Pass::Normalize,
        Pass::ValueChange,
        Pass::EnteringExiting,
        Pass::Returning,
        Pass::Timeout,
        Pass::OnError,
        Pass::Constructor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::Normalize => BlockNormalizer.name(),
            Pass::ValueChange => ValueChangeTranslator.name(),
            Pass::EnteringExiting => EnteringExitingTranslator.name(),
            Pass::Returning => ReturningTranslator.name(),
            Pass::Timeout => TimeoutTranslator.name(),
            Pass::OnError => OnErrorTranslator.name(),
            Pass::Constructor => ConstructorTranslator.name(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Pass::Normalize => "Wrap every controlled statement in a block",
            Pass::ValueChange => "Extract return values and report assignments",
            Pass::EnteringExiting => "Report method entry and guarantee the exit report",
            Pass::Returning => "Report the value of each return",
            Pass::Timeout => "Arm the declared timeout at method entry",
            Pass::OnError => "Report uncaught errors and rethrow them",
            Pass::Constructor => "Keep the delegating constructor call first",
        }
    }

    /// Whether this pass runs for `method` under `config`
    pub fn applies(self, method: &Method<'_>, config: &InstrumentationConfig) -> bool {
        match self {
            Pass::Normalize | Pass::EnteringExiting => true,
            Pass::ValueChange => config.trace_value_changes,
            Pass::Returning => config.trace_returning,
            Pass::Timeout => method.markers().timeout_ms.is_some(),
            Pass::OnError => config.trace_on_error,
            Pass::Constructor => method.is_constructor(),
        }
    }

    pub fn run(self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        match self {
            Pass::Normalize => BlockNormalizer.translate(method, cx),
            Pass::ValueChange => ValueChangeTranslator.translate(method, cx),
            Pass::EnteringExiting => EnteringExitingTranslator.translate(method, cx),
            Pass::Returning => ReturningTranslator.translate(method, cx),
            Pass::Timeout => TimeoutTranslator.translate(method, cx),
            Pass::OnError => OnErrorTranslator.translate(method, cx),
            Pass::Constructor => ConstructorTranslator.translate(method, cx),
        }
    }
}

/// Run `f` on the method body detached from the declaration, so `f` can
/// still use the method (fresh names, id) while rewriting the body.
pub(crate) fn with_detached_body<T, F>(method: &mut Method<'_>, f: F) -> TransformResult<T>
where
    F: FnOnce(&mut Method<'_>, &mut Block) -> TransformResult<T>,
{
    let mut body = std::mem::take(method.body_mut()?);
    let result = f(method, &mut body);
    *method.body_mut()? = body;
    result
}

/// The `try { ... } finally { exiting(..); }` statement of an instrumented body
pub(crate) fn entry_exit_wrapper<'b>(
    body: &'b mut Block,
    builder: &TreeBuilder,
) -> TransformResult<&'b mut TryStmt> {
    body.stmts
        .iter_mut()
        .find_map(|stmt| match stmt {
            Stmt::Try(try_stmt) if is_wrapper(try_stmt, builder) => Some(try_stmt),
            _ => None,
        })
        .ok_or_else(|| {
            InstrumentError::structural(
                "method body",
                "the entry/exit wrapper is missing; it must be added before this pass",
            )
        })
}

fn is_wrapper(try_stmt: &TryStmt, builder: &TreeBuilder) -> bool {
    try_stmt
        .finally
        .as_ref()
        .and_then(|finally| finally.stmts.last())
        .is_some_and(|last| builder.is_exiting_stmt(last))
}
