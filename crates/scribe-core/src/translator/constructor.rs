use crate::ast::{Block, Stmt};
use crate::builder::TreeBuilder;
use crate::error::TransformResult;
use crate::model::Method;

use super::{entry_exit_wrapper, PassContext, Translator};

/// Moves the delegating `super(..)`/`this(..)` call back to the first
/// statement of a constructor, ahead of the entry report and the wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructorTranslator;

impl Translator for ConstructorTranslator {
    fn name(&self) -> &'static str {
        "constructor"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        if !method.is_constructor() {
            return Ok(());
        }
        let body = method.body_mut()?;
        if let Some(call) = detach_delegating_call(body, cx.builder) {
            body.stmts.insert(0, call);
        }
        Ok(())
    }
}

fn detach_delegating_call(body: &mut Block, builder: &TreeBuilder) -> Option<Stmt> {
    if let Some(index) = body.stmts.iter().position(Stmt::is_delegating_call) {
        return Some(body.stmts.remove(index));
    }
    let wrapper = entry_exit_wrapper(body, builder).ok()?;
    let index = wrapper.body.stmts.iter().position(Stmt::is_delegating_call)?;
    Some(wrapper.body.stmts.remove(index))
}
