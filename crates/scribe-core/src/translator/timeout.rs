use crate::error::TransformResult;
use crate::model::Method;

use super::{entry_exit_wrapper, PassContext, Translator};

/// Arms the declared timeout as the first guarded statement; the runtime
/// disarms it at `exiting`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutTranslator;

impl Translator for TimeoutTranslator {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        let Some(millis) = method.markers().timeout_ms else {
            return Ok(());
        };
        let arm = cx.builder.timeout(&method.id(), millis);
        let wrapper = entry_exit_wrapper(method.body_mut()?, cx.builder)?;
        wrapper.body.stmts.insert(0, arm);
        Ok(())
    }
}
