// Source code generation from the syntax tree.
// Renders Java-like text for debug logging and for `scribe instrument --emit source`.

use super::*;

const INDENT: &str = "    ";

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

// Precedence of an expression node; children binding looser than their
// context get parenthesized.
fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Assign { .. } => 1,
        Expr::Conditional { .. } => 2,
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { op, .. } => match op {
            UnaryOp::PostInc | UnaryOp::PostDec => 15,
            _ => 14,
        },
        _ => 16,
    }
}

fn write_expr(expr: &Expr, min_precedence: u8, out: &mut String) {
    let parenthesize = expr_precedence(expr) < min_precedence;
    if parenthesize {
        out.push('(');
    }
    match expr {
        Expr::Literal(lit) => out.push_str(&lit.to_string()),
        Expr::Name(name) => out.push_str(name),
        Expr::This => out.push_str("this"),
        Expr::Field { target, name } => {
            write_expr(target, 16, out);
            out.push('.');
            out.push_str(name);
        }
        Expr::Index { target, index } => {
            write_expr(target, 16, out);
            out.push('[');
            write_expr(index, 1, out);
            out.push(']');
        }
        Expr::Assign { op, target, value } => {
            write_expr(target, 16, out);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(value, 1, out);
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::Neg => {
                out.push('-');
                write_expr(operand, 14, out);
            }
            UnaryOp::Not => {
                out.push('!');
                write_expr(operand, 14, out);
            }
            UnaryOp::PreInc => {
                out.push_str("++");
                write_expr(operand, 14, out);
            }
            UnaryOp::PreDec => {
                out.push_str("--");
                write_expr(operand, 14, out);
            }
            UnaryOp::PostInc => {
                write_expr(operand, 16, out);
                out.push_str("++");
            }
            UnaryOp::PostDec => {
                write_expr(operand, 16, out);
                out.push_str("--");
            }
        },
        Expr::Binary { op, left, right } => {
            // left associative: the right operand needs a strictly tighter binding
            write_expr(left, op.precedence(), out);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(right, op.precedence() + 1, out);
        }
        Expr::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            write_expr(cond, 3, out);
            out.push_str(" ? ");
            write_expr(then_expr, 1, out);
            out.push_str(" : ");
            write_expr(else_expr, 2, out);
        }
        Expr::Call {
            receiver,
            name,
            args,
        } => {
            if let Some(receiver) = receiver {
                write_expr(receiver, 16, out);
                out.push('.');
            }
            out.push_str(name);
            write_args(args, out);
        }
        Expr::New { class, args } => {
            out.push_str("new ");
            out.push_str(class);
            write_args(args, out);
        }
        Expr::ArrayInit { elem_ty, elements } => {
            out.push_str("new ");
            out.push_str(elem_ty.as_str());
            out.push_str("[]{");
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(element, 1, out);
            }
            out.push('}');
        }
        Expr::SuperCall(args) => {
            out.push_str("super");
            write_args(args, out);
        }
        Expr::ThisCall(args) => {
            out.push_str("this");
            write_args(args, out);
        }
    }
    if parenthesize {
        out.push(')');
    }
}

fn write_args(args: &[Expr], out: &mut String) {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(arg, 1, out);
    }
    out.push(')');
}

fn pad(indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}

fn write_block(stmts: &[Stmt], indent: usize, out: &mut String) {
    out.push_str("{\n");
    for stmt in stmts {
        pad(indent + 1, out);
        write_stmt(stmt, indent + 1, out);
        out.push('\n');
    }
    pad(indent, out);
    out.push('}');
}

// Controlled body of a branch or loop, written after its header
fn write_body(body: &Stmt, indent: usize, out: &mut String) {
    match body {
        Stmt::Block(block) => {
            out.push(' ');
            write_block(&block.stmts, indent, out);
        }
        other => {
            out.push('\n');
            pad(indent + 1, out);
            write_stmt(other, indent + 1, out);
        }
    }
}

fn write_for_init(init: &ForInit, out: &mut String) {
    match init {
        ForInit::Exprs(exprs) => {
            for (i, expr) in exprs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(expr, 1, out);
            }
        }
        ForInit::Decl { ty, name, init } => {
            out.push_str(&format!("{ty} {name} = "));
            write_expr(init, 1, out);
        }
    }
}

fn write_stmt(stmt: &Stmt, indent: usize, out: &mut String) {
    match stmt {
        Stmt::Block(block) => write_block(&block.stmts, indent, out),
        Stmt::Local { ty, name, init } => {
            out.push_str(&format!("{ty} {name}"));
            if let Some(init) = init {
                out.push_str(" = ");
                write_expr(init, 1, out);
            }
            out.push(';');
        }
        Stmt::Expr(expr) => {
            write_expr(expr, 0, out);
            out.push(';');
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("if (");
            write_expr(cond, 0, out);
            out.push(')');
            write_body(then_branch, indent, out);
            if let Some(else_branch) = else_branch {
                if then_branch.is_block() {
                    out.push_str(" else");
                } else {
                    out.push('\n');
                    pad(indent, out);
                    out.push_str("else");
                }
                if let Stmt::If { .. } = else_branch.as_ref() {
                    out.push(' ');
                    write_stmt(else_branch, indent, out);
                } else {
                    write_body(else_branch, indent, out);
                }
            }
        }
        Stmt::While { cond, body } => {
            out.push_str("while (");
            write_expr(cond, 0, out);
            out.push(')');
            write_body(body, indent, out);
        }
        Stmt::DoWhile { body, cond } => {
            out.push_str("do");
            write_body(body, indent, out);
            if body.is_block() {
                out.push(' ');
            } else {
                out.push('\n');
                pad(indent, out);
            }
            out.push_str("while (");
            write_expr(cond, 0, out);
            out.push_str(");");
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            out.push_str("for (");
            write_for_init(init, out);
            out.push(';');
            if let Some(cond) = cond {
                out.push(' ');
                write_expr(cond, 0, out);
            }
            out.push(';');
            for (i, expr) in update.iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                write_expr(expr, 1, out);
            }
            out.push(')');
            write_body(body, indent, out);
        }
        Stmt::ForEach {
            ty,
            name,
            iterable,
            body,
        } => {
            out.push_str(&format!("for ({ty} {name} : "));
            write_expr(iterable, 0, out);
            out.push(')');
            write_body(body, indent, out);
        }
        Stmt::Labeled { label, body } => {
            out.push_str(label);
            out.push_str(": ");
            write_stmt(body, indent, out);
        }
        Stmt::Switch { selector, cases } => {
            out.push_str("switch (");
            write_expr(selector, 0, out);
            out.push_str(") {\n");
            for case in cases {
                if case.labels.is_empty() {
                    pad(indent + 1, out);
                    out.push_str("default:\n");
                }
                for label in &case.labels {
                    pad(indent + 1, out);
                    out.push_str(&format!("case {label}:\n"));
                }
                for stmt in &case.body {
                    pad(indent + 2, out);
                    write_stmt(stmt, indent + 2, out);
                    out.push('\n');
                }
            }
            pad(indent, out);
            out.push('}');
        }
        Stmt::Break(label) => match label {
            Some(label) => out.push_str(&format!("break {label};")),
            None => out.push_str("break;"),
        },
        Stmt::Continue(label) => match label {
            Some(label) => out.push_str(&format!("continue {label};")),
            None => out.push_str("continue;"),
        },
        Stmt::Return(value) => match value {
            Some(value) => {
                out.push_str("return ");
                write_expr(value, 0, out);
                out.push(';');
            }
            None => out.push_str("return;"),
        },
        Stmt::Throw(value) => {
            out.push_str("throw ");
            write_expr(value, 0, out);
            out.push(';');
        }
        Stmt::Try(try_stmt) => {
            out.push_str("try ");
            write_block(&try_stmt.body.stmts, indent, out);
            for catch in &try_stmt.catches {
                out.push_str(&format!(" catch ({} {}) ", catch.ty, catch.name));
                write_block(&catch.body.stmts, indent, out);
            }
            if let Some(finally) = &try_stmt.finally {
                out.push_str(" finally ");
                write_block(&finally.stmts, indent, out);
            }
        }
        Stmt::Synchronized { lock, body } => {
            out.push_str("synchronized (");
            write_expr(lock, 0, out);
            out.push_str(") ");
            write_block(&body.stmts, indent, out);
        }
        Stmt::Opaque(text) => out.push_str(text),
    }
}

fn write_method(method: &MethodDecl, indent: usize, out: &mut String) {
    for annotation in &method.annotations {
        pad(indent, out);
        out.push_str(&annotation.to_source());
        out.push('\n');
    }
    pad(indent, out);
    out.push_str("public ");
    if method.body.is_none() && !method.is_constructor() {
        out.push_str("abstract ");
    }
    if method.is_static && !method.is_constructor() && method.body.is_some() {
        out.push_str("static ");
    }
    if let Some(return_type) = &method.return_type {
        out.push_str(return_type.as_str());
        out.push(' ');
    }
    out.push_str(&method.name);
    let params = method
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("({params})"));
    match &method.body {
        Some(body) => {
            out.push(' ');
            write_block(&body.stmts, indent, out);
        }
        None => out.push(';'),
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_expr(self, 0, &mut out);
        out
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_stmt(self, 0, &mut out);
        out
    }
}

impl ToSource for Block {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_block(&self.stmts, 0, &mut out);
        out
    }
}

impl ToSource for Annotation {
    fn to_source(&self) -> String {
        if self.args.is_empty() {
            return format!("@{}", self.name);
        }
        let args = self
            .args
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("@{}({args})", self.name)
    }
}

impl ToSource for MethodDecl {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_method(self, 0, &mut out);
        out
    }
}

impl ToSource for ClassDecl {
    fn to_source(&self) -> String {
        let mut out = String::new();
        for annotation in &self.annotations {
            out.push_str(&annotation.to_source());
            out.push('\n');
        }
        out.push_str(&format!("public class {} {{\n", self.name));
        for field in &self.fields {
            pad(1, &mut out);
            out.push_str("private ");
            if field.is_static {
                out.push_str("static ");
            }
            out.push_str(&format!("{} {}", field.ty, field.name));
            if let Some(init) = &field.init {
                out.push_str(" = ");
                write_expr(init, 1, &mut out);
            }
            out.push_str(";\n");
        }
        for (i, method) in self.methods.iter().enumerate() {
            if i > 0 || !self.fields.is_empty() {
                out.push('\n');
            }
            write_method(method, 1, &mut out);
            out.push('\n');
        }
        out.push('}');
        out
    }
}

impl ToSource for CompilationUnit {
    fn to_source(&self) -> String {
        let mut out = String::new();
        if let Some(package) = &self.package {
            out.push_str(&format!("package {package};\n\n"));
        }
        let classes = self
            .classes
            .iter()
            .map(|c| c.to_source())
            .collect::<Vec<_>>()
            .join("\n\n");
        out.push_str(&classes);
        out.push('\n');
        out
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '"' => r#"\""#.to_string(),
            '\\' => r"\\".to_string(),
            '\n' => r"\n".to_string(),
            '\r' => r"\r".to_string(),
            '\t' => r"\t".to_string(),
            c => c.to_string(),
        })
        .collect()
}
