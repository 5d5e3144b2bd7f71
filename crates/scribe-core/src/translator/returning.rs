use std::convert::Infallible;

use crate::ast::visit::{walk_stmts, StmtListVisitor};
use crate::ast::{Expr, Stmt};
use crate::builder::TreeBuilder;
use crate::error::TransformResult;
use crate::model::Method;

use super::return_extraction::extract_returns;
use super::{PassContext, Translator};

/// Inserts `returning(id, x)` in front of every `return x;`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturningTranslator;

impl Translator for ReturningTranslator {
    fn name(&self) -> &'static str {
        "returning"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        if !method.representation().returns_value() {
            return Ok(());
        }
        // the report re-reads the value, so it must be a name or a constant
        extract_returns(method, Expr::is_trivial)?;

        let method_id = method.id();
        let mut reporter = ReturnReporter {
            builder: cx.builder,
            method_id: &method_id,
        };
        match reporter.visit_block(method.body_mut()?) {
            Ok(()) => Ok(()),
            Err(never) => match never {},
        }
    }
}

struct ReturnReporter<'c> {
    builder: &'c TreeBuilder,
    method_id: &'c str,
}

impl StmtListVisitor for ReturnReporter<'_> {
    type Error = Infallible;

    fn visit_stmts(&mut self, stmts: &mut Vec<Stmt>) -> Result<(), Infallible> {
        walk_stmts(self, stmts)?;

        let original = std::mem::take(stmts);
        for stmt in original {
            if let Stmt::Return(Some(value)) = &stmt {
                stmts.push(self.builder.returning(self.method_id, value.clone()));
            }
            stmts.push(stmt);
        }
        Ok(())
    }
}
