// Mutable traversal over statement lists.
//
// Instrumentation inserts statements next to existing ones, so the unit of
// rewriting is a statement list (block, switch case, try/catch/finally
// bodies), not a single node.

use super::{Block, Stmt};

/// Visitor invoked once for every statement list reachable from a body.
///
/// The default `visit_stmts` only recurses; implementations usually recurse
/// first with [`walk_stmts`] and then rebuild the list they were handed.
pub trait StmtListVisitor {
    type Error;

    fn visit_stmts(&mut self, stmts: &mut Vec<Stmt>) -> Result<(), Self::Error> {
        walk_stmts(self, stmts)
    }

    fn visit_block(&mut self, block: &mut Block) -> Result<(), Self::Error> {
        self.visit_stmts(&mut block.stmts)
    }
}

/// Recurse into every statement of `stmts`
pub fn walk_stmts<V>(visitor: &mut V, stmts: &mut [Stmt]) -> Result<(), V::Error>
where
    V: StmtListVisitor + ?Sized,
{
    for stmt in stmts.iter_mut() {
        walk_stmt(visitor, stmt)?;
    }
    Ok(())
}

/// Hand every statement list nested in `stmt` to the visitor
pub fn walk_stmt<V>(visitor: &mut V, stmt: &mut Stmt) -> Result<(), V::Error>
where
    V: StmtListVisitor + ?Sized,
{
    match stmt {
        Stmt::Block(block) => visitor.visit_block(block),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            walk_stmt(visitor, then_branch)?;
            if let Some(else_branch) = else_branch {
                walk_stmt(visitor, else_branch)?;
            }
            Ok(())
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForEach { body, .. }
        | Stmt::Labeled { body, .. } => walk_stmt(visitor, body),
        Stmt::Switch { cases, .. } => {
            for case in cases.iter_mut() {
                visitor.visit_stmts(&mut case.body)?;
            }
            Ok(())
        }
        Stmt::Try(try_stmt) => {
            visitor.visit_block(&mut try_stmt.body)?;
            for catch in try_stmt.catches.iter_mut() {
                visitor.visit_block(&mut catch.body)?;
            }
            if let Some(finally) = &mut try_stmt.finally {
                visitor.visit_block(finally)?;
            }
            Ok(())
        }
        Stmt::Synchronized { body, .. } => visitor.visit_block(body),
        Stmt::Local { .. }
        | Stmt::Expr(_)
        | Stmt::Break(_)
        | Stmt::Continue(_)
        | Stmt::Return(_)
        | Stmt::Throw(_)
        | Stmt::Opaque(_) => Ok(()),
    }
}
