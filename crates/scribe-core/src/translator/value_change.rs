/*!
# Value change tracing

Reports every assignment, compound assignment, increment and initialized local
with `valueChanged(id, "<target>", <target>)` once the write has completed.

Reports are never spliced into the middle of an expression. They go after the
enclosing statement, or for conditions at the start of the guarded block. A
write inside the right operand of `&&`/`||` or inside a `?:` branch may not
execute at all and is not reported.

A loop whose condition writes is turned into `while (true)` with the test
moved into the body, so every evaluation of the condition is reported once
on the path it takes:

```text
while (true) {
    if (!(cond)) { <reports> break; }
    <reports>
    <body>
}
```

A `do` body is wrapped in a labeled block ahead of the test and its
`continue` statements become breaks out of that block.
*/

use crate::ast::visit::{walk_stmts, StmtListVisitor};
use crate::ast::{Block, Expr, ForInit, Stmt, ToSource, UnaryOp};
use crate::builder::TreeBuilder;
use crate::error::{InstrumentError, TransformResult};
use crate::model::Method;

use super::return_extraction::extract_returns;
use super::{with_detached_body, PassContext, Translator};

#[derive(Debug, Clone, Copy, Default)]
pub struct ValueChangeTranslator;

impl Translator for ValueChangeTranslator {
    fn name(&self) -> &'static str {
        "value_change"
    }

    fn translate(&self, method: &mut Method<'_>, cx: &PassContext<'_>) -> TransformResult<()> {
        extract_returns(method, Expr::is_name)?;

        let method_id = method.id();
        with_detached_body(method, |method, body| {
            let mut tracer = AssignmentTracer {
                builder: cx.builder,
                method_id: &method_id,
                method,
            };
            tracer.visit_block(body)
        })
    }
}

/// A completed write: display path and the expression that re-reads it
type Write = (String, Expr);

/// A statement split into what goes in front of it, itself, and what follows
struct Placed {
    before: Vec<Stmt>,
    stmt: Stmt,
    after: Vec<Stmt>,
}

impl Placed {
    fn alone(stmt: Stmt) -> Self {
        Self {
            before: Vec::new(),
            stmt,
            after: Vec::new(),
        }
    }

    fn followed_by(stmt: Stmt, after: Vec<Stmt>) -> Self {
        Self {
            before: Vec::new(),
            stmt,
            after,
        }
    }
}

struct AssignmentTracer<'c, 'm> {
    builder: &'c TreeBuilder,
    method_id: &'c str,
    method: &'c mut Method<'m>,
}

impl StmtListVisitor for AssignmentTracer<'_, '_> {
    type Error = InstrumentError;

    fn visit_stmts(&mut self, stmts: &mut Vec<Stmt>) -> TransformResult<()> {
        walk_stmts(self, stmts)?;

        let original = std::mem::take(stmts);
        for stmt in original {
            let placed = self.place(stmt);
            if placed.before.is_empty() {
                stmts.push(placed.stmt);
                stmts.extend(placed.after);
            } else {
                // hoisted declarations keep their loop scope
                let mut scoped = placed.before;
                scoped.push(placed.stmt);
                scoped.extend(placed.after);
                stmts.push(Stmt::block(scoped));
            }
        }
        Ok(())
    }
}

impl AssignmentTracer<'_, '_> {
    fn reports(&self, writes: Vec<Write>) -> Vec<Stmt> {
        writes
            .into_iter()
            .map(|(path, target)| self.builder.value_changed(self.method_id, &path, target))
            .collect()
    }

    fn report_exprs(&self, writes: Vec<Write>) -> Vec<Expr> {
        writes
            .into_iter()
            .map(|(path, target)| self.builder.value_changed_expr(self.method_id, &path, target))
            .collect()
    }

    /// The in-body form of a loop test: leave with the reports when `cond`
    /// fails, otherwise report and carry on
    fn checked_condition(&self, cond: Expr, writes: Vec<Write>) -> Vec<Stmt> {
        let mut exit = self.reports(writes.clone());
        exit.push(Stmt::Break(None));
        let mut stmts = vec![Stmt::if_then(
            Expr::unary(UnaryOp::Not, cond),
            Stmt::block(exit),
            None,
        )];
        stmts.extend(self.reports(writes));
        stmts
    }

    fn place(&mut self, stmt: Stmt) -> Placed {
        match stmt {
            Stmt::Expr(expr) => {
                let after = self.reports(writes_in(&expr));
                Placed::followed_by(Stmt::Expr(expr), after)
            }
            Stmt::Local { ty, name, init } => {
                let mut writes = Vec::new();
                if let Some(init) = &init {
                    collect_writes(init, &mut writes);
                    writes.push((name.clone(), Expr::name(name.as_str())));
                }
                let after = self.reports(writes);
                Placed::followed_by(Stmt::Local { ty, name, init }, after)
            }
            Stmt::If {
                cond,
                mut then_branch,
                mut else_branch,
            } => {
                // an `else if` keeps its own condition, which the walk does not reach
                if let Some(nested) = else_branch.as_mut() {
                    if matches!(**nested, Stmt::If { .. }) {
                        let chained = std::mem::replace(&mut **nested, Stmt::block(Vec::new()));
                        **nested = self.place(chained).stmt;
                    }
                }
                let writes = writes_in(&cond);
                if !writes.is_empty() {
                    prepend(&mut then_branch, self.reports(writes.clone()));
                    let else_body =
                        else_branch.get_or_insert_with(|| Box::new(Stmt::block(Vec::new())));
                    prepend(else_body, self.reports(writes));
                }
                Placed::alone(Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Stmt::While { cond, mut body } => {
                let writes = writes_in(&cond);
                if writes.is_empty() {
                    return Placed::alone(Stmt::While { cond, body });
                }
                prepend(&mut body, self.checked_condition(cond, writes));
                Placed::alone(Stmt::While {
                    cond: Expr::bool(true),
                    body,
                })
            }
            Stmt::DoWhile { body, cond } => Placed::alone(self.place_do_while(body, cond, None)),
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.place_for(init, cond, update, body),
            Stmt::ForEach {
                ty,
                name,
                iterable,
                mut body,
            } => {
                prepend(
                    &mut body,
                    self.reports(vec![(name.clone(), Expr::name(name.as_str()))]),
                );
                let after = self.reports(writes_in(&iterable));
                Placed::followed_by(
                    Stmt::ForEach {
                        ty,
                        name,
                        iterable,
                        body,
                    },
                    after,
                )
            }
            Stmt::Labeled { label, body } => {
                let inner = match *body {
                    Stmt::DoWhile { body, cond } => {
                        Placed::alone(self.place_do_while(body, cond, Some(label.as_str())))
                    }
                    other => self.place(other),
                };
                Placed {
                    before: inner.before,
                    stmt: Stmt::Labeled {
                        label,
                        body: Box::new(inner.stmt),
                    },
                    after: inner.after,
                }
            }
            Stmt::Switch { selector, cases } => {
                let after = self.reports(writes_in(&selector));
                Placed::followed_by(Stmt::Switch { selector, cases }, after)
            }
            Stmt::Synchronized { lock, mut body } => {
                let reports = self.reports(writes_in(&lock));
                body.stmts.splice(0..0, reports);
                Placed::alone(Stmt::Synchronized { lock, body })
            }
            // nested lists were rewritten by the walk; a throw leaves nothing to run after it
            other @ (Stmt::Throw(_)
            | Stmt::Return(_)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Block(_)
            | Stmt::Try(_)
            | Stmt::Opaque(_)) => Placed::alone(other),
        }
    }

    fn place_do_while(&mut self, body: Box<Stmt>, cond: Expr, loop_label: Option<&str>) -> Stmt {
        let writes = writes_in(&cond);
        if writes.is_empty() {
            return Stmt::DoWhile { body, cond };
        }

        let iteration = self.method.fresh_local("iteration");
        let mut body = *body;
        if !body.is_block() {
            body = Stmt::block(vec![body]);
        }
        retarget_continues(&mut body, loop_label, &iteration, false);

        let mut stmts = vec![Stmt::Labeled {
            label: iteration,
            body: Box::new(body),
        }];
        stmts.extend(self.checked_condition(cond, writes));
        Stmt::while_loop(Expr::bool(true), Stmt::block(stmts))
    }

    fn place_for(
        &self,
        init: ForInit,
        mut cond: Option<Expr>,
        mut update: Vec<Expr>,
        mut body: Box<Stmt>,
    ) -> Placed {
        let update_writes: Vec<Write> = update.iter().flat_map(writes_in).collect();
        update.extend(self.report_exprs(update_writes));

        // the update list still runs on `continue`; only the test moves
        let cond_writes = cond.as_ref().map(writes_in).unwrap_or_default();
        if !cond_writes.is_empty() {
            if let Some(test) = cond.take() {
                prepend(&mut body, self.checked_condition(test, cond_writes));
            }
        }

        match init {
            ForInit::Exprs(mut exprs) => {
                let init_writes: Vec<Write> = exprs.iter().flat_map(writes_in).collect();
                exprs.extend(self.report_exprs(init_writes));
                Placed::alone(Stmt::For {
                    init: ForInit::Exprs(exprs),
                    cond,
                    update,
                    body,
                })
            }
            ForInit::Decl { ty, name, init } => {
                let mut writes = writes_in(&init);
                writes.push((name.clone(), Expr::name(name.as_str())));
                let mut before = vec![Stmt::Local {
                    ty,
                    name,
                    init: Some(init),
                }];
                before.extend(self.reports(writes));
                Placed {
                    before,
                    stmt: Stmt::For {
                        init: ForInit::default(),
                        cond,
                        update,
                        body,
                    },
                    after: Vec::new(),
                }
            }
        }
    }
}

/// Insert `stmts` at the start of a controlled body
fn prepend(body: &mut Stmt, stmts: Vec<Stmt>) {
    if stmts.is_empty() {
        return;
    }
    match body {
        Stmt::Block(Block { stmts: existing }) => {
            existing.splice(0..0, stmts);
        }
        other => {
            let inner = std::mem::replace(other, Stmt::block(Vec::new()));
            let mut wrapped = stmts;
            wrapped.push(inner);
            *other = Stmt::block(wrapped);
        }
    }
}

/// Turn every `continue` of the loop owning `body` into `break <target>`
fn retarget_continues(
    stmt: &mut Stmt,
    loop_label: Option<&str>,
    target: &str,
    in_inner_loop: bool,
) {
    let owned = match stmt {
        Stmt::Continue(None) => !in_inner_loop,
        Stmt::Continue(Some(label)) => Some(label.as_str()) == loop_label,
        _ => false,
    };
    if owned {
        *stmt = Stmt::Break(Some(target.to_string()));
        return;
    }

    match stmt {
        Stmt::Block(block) | Stmt::Synchronized { body: block, .. } => block
            .stmts
            .iter_mut()
            .for_each(|s| retarget_continues(s, loop_label, target, in_inner_loop)),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            retarget_continues(then_branch, loop_label, target, in_inner_loop);
            if let Some(else_branch) = else_branch {
                retarget_continues(else_branch, loop_label, target, in_inner_loop);
            }
        }
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::For { body, .. }
        | Stmt::ForEach { body, .. } => retarget_continues(body, loop_label, target, true),
        Stmt::Labeled { body, .. } => retarget_continues(body, loop_label, target, in_inner_loop),
        Stmt::Switch { cases, .. } => cases
            .iter_mut()
            .flat_map(|case| case.body.iter_mut())
            .for_each(|s| retarget_continues(s, loop_label, target, in_inner_loop)),
        Stmt::Try(try_stmt) => {
            let blocks = std::iter::once(&mut try_stmt.body)
                .chain(try_stmt.catches.iter_mut().map(|catch| &mut catch.body))
                .chain(try_stmt.finally.as_mut());
            for block in blocks {
                block
                    .stmts
                    .iter_mut()
                    .for_each(|s| retarget_continues(s, loop_label, target, in_inner_loop));
            }
        }
        _ => {}
    }
}

fn writes_in(expr: &Expr) -> Vec<Write> {
    let mut writes = Vec::new();
    collect_writes(expr, &mut writes);
    writes
}

/// Collect writes of `expr` in the order they complete
fn collect_writes(expr: &Expr, out: &mut Vec<Write>) {
    match expr {
        Expr::Assign { target, value, .. } => {
            collect_target_operands(target, out);
            collect_writes(value, out);
            out.extend(write_of(target));
        }
        Expr::Unary { op, operand } => {
            if op.is_mutating() {
                collect_target_operands(operand, out);
                out.extend(write_of(operand));
            } else {
                collect_writes(operand, out);
            }
        }
        Expr::Binary { op, left, right } => {
            collect_writes(left, out);
            if !op.is_short_circuit() {
                collect_writes(right, out);
            }
        }
        Expr::Conditional { cond, .. } => collect_writes(cond, out),
        Expr::Field { target, .. } => collect_writes(target, out),
        Expr::Index { target, index } => {
            collect_writes(target, out);
            collect_writes(index, out);
        }
        Expr::Call { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                collect_writes(receiver, out);
            }
            args.iter().for_each(|arg| collect_writes(arg, out));
        }
        Expr::New { args, .. } | Expr::SuperCall(args) | Expr::ThisCall(args) => {
            args.iter().for_each(|arg| collect_writes(arg, out));
        }
        Expr::ArrayInit { elements, .. } => {
            elements.iter().for_each(|element| collect_writes(element, out));
        }
        Expr::Literal(_) | Expr::Name(_) | Expr::This => {}
    }
}

// Sub-expressions of an assignment target evaluated before the write
fn collect_target_operands(target: &Expr, out: &mut Vec<Write>) {
    match target {
        Expr::Field { target, .. } => collect_writes(target, out),
        Expr::Index { target, index } => {
            collect_writes(target, out);
            collect_writes(index, out);
        }
        _ => {}
    }
}

/// The reportable form of an assignment target. An element write reports
/// the whole array; targets that cannot be re-read safely are skipped.
fn write_of(target: &Expr) -> Option<Write> {
    match target {
        Expr::Index { target, .. } => write_of(target),
        path if is_stable_path(path) => Some((path.to_source(), path.clone())),
        _ => None,
    }
}

fn is_stable_path(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_) => true,
        Expr::Field { target, .. } => matches!(**target, Expr::This) || is_stable_path(target),
        _ => false,
    }
}
