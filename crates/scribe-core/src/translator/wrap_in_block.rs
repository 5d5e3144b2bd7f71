use crate::ast::Stmt;
use crate::error::{InstrumentError, TransformResult};
use crate::model::Method;

use super::{PassContext, Translator};

/// Gives every branch and loop a block body, so later passes always have a
/// statement list to insert into.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockNormalizer;

impl Translator for BlockNormalizer {
    fn name(&self) -> &'static str {
        "block_normalizer"
    }

    fn translate(&self, method: &mut Method<'_>, _cx: &PassContext<'_>) -> TransformResult<()> {
        normalize_list(&mut method.body_mut()?.stmts)
    }
}

fn normalize_list(stmts: &mut [Stmt]) -> TransformResult<()> {
    stmts.iter_mut().try_for_each(normalize_stmt)
}

fn normalize_stmt(stmt: &mut Stmt) -> TransformResult<()> {
    match stmt {
        Stmt::Block(block) => normalize_list(&mut block.stmts),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            ensure_block(then_branch)?;
            match else_branch {
                // keep `else if` chains flat
                Some(else_branch) if matches!(**else_branch, Stmt::If { .. }) => {
                    normalize_stmt(else_branch)
                }
                Some(else_branch) => ensure_block(else_branch),
                None => Ok(()),
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForEach { body, .. } => ensure_block(body),
        Stmt::Labeled { body, .. } => {
            // the label must stay on the loop for `continue label` to resolve
            if body.is_loop() || matches!(**body, Stmt::Labeled { .. }) {
                normalize_stmt(body)
            } else {
                ensure_block(body)
            }
        }
        Stmt::Switch { cases, .. } => cases
            .iter_mut()
            .try_for_each(|case| normalize_list(&mut case.body)),
        Stmt::Try(try_stmt) => {
            normalize_list(&mut try_stmt.body.stmts)?;
            for catch in try_stmt.catches.iter_mut() {
                normalize_list(&mut catch.body.stmts)?;
            }
            if let Some(finally) = &mut try_stmt.finally {
                normalize_list(&mut finally.stmts)?;
            }
            Ok(())
        }
        Stmt::Synchronized { body, .. } => normalize_list(&mut body.stmts),
        Stmt::Opaque(text) => Err(InstrumentError::structural(
            "statement",
            format!("cannot instrument around unmodelled code `{text}`"),
        )),
        Stmt::Local { .. }
        | Stmt::Expr(_)
        | Stmt::Break(_)
        | Stmt::Continue(_)
        | Stmt::Return(_)
        | Stmt::Throw(_) => Ok(()),
    }
}

fn ensure_block(body: &mut Stmt) -> TransformResult<()> {
    if !body.is_block() {
        let inner = std::mem::replace(body, Stmt::block(Vec::new()));
        *body = Stmt::block(vec![inner]);
    }
    normalize_stmt(body)
}
