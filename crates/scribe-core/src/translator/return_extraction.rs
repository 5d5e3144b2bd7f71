// Moves return expressions into fresh locals:
//   return a + b;   =>   int $scribe_return_0 = a + b; return $scribe_return_0;
// so the returned value can be reported without evaluating it twice.

use crate::ast::visit::{walk_stmts, StmtListVisitor};
use crate::ast::{Expr, Stmt, TypeRef};
use crate::builder::RETURN_PURPOSE;
use crate::error::{InstrumentError, TransformResult};
use crate::model::Method;

use super::with_detached_body;

/// Extract every value return whose expression does not satisfy `keep`
pub(crate) fn extract_returns(method: &mut Method<'_>, keep: fn(&Expr) -> bool) -> TransformResult<()> {
    let return_type = method
        .representation()
        .return_type
        .clone()
        .filter(|ty| !ty.is_void());
    with_detached_body(method, |method, body| {
        let mut extractor = ReturnExtractor {
            method,
            return_type,
            keep,
        };
        extractor.visit_block(body)
    })
}

struct ReturnExtractor<'m, 'a> {
    method: &'m mut Method<'a>,
    return_type: Option<TypeRef>,
    keep: fn(&Expr) -> bool,
}

impl ReturnExtractor<'_, '_> {
    fn value_type(&self) -> TransformResult<TypeRef> {
        self.return_type.clone().ok_or_else(|| {
            InstrumentError::structural(
                "return statement",
                format!("'{}' returns a value but declares no return type", self.method.name()),
            )
        })
    }
}

impl StmtListVisitor for ReturnExtractor<'_, '_> {
    type Error = InstrumentError;

    fn visit_stmts(&mut self, stmts: &mut Vec<Stmt>) -> TransformResult<()> {
        walk_stmts(self, stmts)?;
        if !stmts.iter().any(|stmt| matches!(stmt, Stmt::Return(Some(_)))) {
            return Ok(());
        }

        let original = std::mem::take(stmts);
        stmts.reserve(original.len() + 1);
        for stmt in original {
            match stmt {
                Stmt::Return(Some(value)) => {
                    let ty = self.value_type()?;
                    if (self.keep)(&value) {
                        stmts.push(Stmt::Return(Some(value)));
                        continue;
                    }
                    let local = self.method.fresh_local(RETURN_PURPOSE);
                    stmts.push(Stmt::Local {
                        ty,
                        name: local.clone(),
                        init: Some(value),
                    });
                    stmts.push(Stmt::Return(Some(Expr::Name(local))));
                }
                other => stmts.push(other),
            }
        }
        Ok(())
    }
}
