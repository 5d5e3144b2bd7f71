use crate::ast::{Block, Stmt, TryStmt};
use crate::error::TransformResult;
use crate::model::Method;

use super::{PassContext, Translator};

/// Reports entry with the parameter values and guarantees exactly one exit
/// report on every path out of the body:
///
/// ```text
/// entering(id, new String[]{..}, new Object[]{..});
/// try { <body> } finally { exiting(id); }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EnteringExitingTranslator;

impl Translator for EnteringExitingTranslator {
    fn name(&self) -> &'static str {
        "entering_exiting"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        let id = method.id();
        let entering = cx.builder.entering(&id, &method.representation().params);
        let exiting = cx.builder.exiting(&id);

        let body = method.body_mut()?;
        let original = std::mem::take(&mut body.stmts);
        body.stmts = vec![
            entering,
            Stmt::Try(TryStmt {
                body: Block::new(original),
                catches: Vec::new(),
                finally: Some(Block::new(vec![exiting])),
            }),
        ];
        Ok(())
    }
}
