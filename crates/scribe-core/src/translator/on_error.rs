use crate::error::TransformResult;
use crate::model::Method;

use super::{entry_exit_wrapper, PassContext, Translator};

/// Reports an uncaught error and rethrows it unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct OnErrorTranslator;

impl Translator for OnErrorTranslator {
    fn name(&self) -> &'static str {
        "on_error"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        let catch = cx.builder.on_error_catch(&method.id());
        let wrapper = entry_exit_wrapper(method.body_mut()?, cx.builder)?;
        wrapper.catches.push(catch);
        Ok(())
    }
}
