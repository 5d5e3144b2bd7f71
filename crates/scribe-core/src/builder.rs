//! Constructs the nodes injected by the instrumentation passes.
//!
//! Every generated call targets the configured runtime class, so this is the
//! only place that knows the shape of the runtime boundary.

use crate::ast::{Block, CatchClause, Expr, Param, Stmt, TypeRef};

/// Name of the catch variable bound by the error wrapper
pub const ERROR_VAR: &str = "$scribe_error";

/// Purpose tag of extracted return values, see [`crate::model::Method::fresh_local`]
pub const RETURN_PURPOSE: &str = "return";

pub const ENTERING: &str = "entering";
pub const EXITING: &str = "exiting";
pub const RETURNING: &str = "returning";
pub const VALUE_CHANGED: &str = "valueChanged";
pub const ON_ERROR: &str = "onError";
pub const TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBuilder {
    runtime_class: String,
}

impl TreeBuilder {
    pub fn new(runtime_class: impl Into<String>) -> Self {
        Self {
            runtime_class: runtime_class.into(),
        }
    }

    pub fn runtime_class(&self) -> &str {
        &self.runtime_class
    }

    /// `<runtime>.<name>(args...)`
    pub fn runtime_call(&self, name: &str, args: Vec<Expr>) -> Expr {
        Expr::method_call(Expr::name(self.runtime_class.as_str()), name, args)
    }

    fn runtime_stmt(&self, name: &str, args: Vec<Expr>) -> Stmt {
        Stmt::expr(self.runtime_call(name, args))
    }

    /// `entering(id, new String[]{"a", ...}, new Object[]{a, ...})`
    pub fn entering(&self, method_id: &str, params: &[Param]) -> Stmt {
        let names = params.iter().map(|p| Expr::string(p.name.as_str())).collect();
        let values = params.iter().map(|p| Expr::name(p.name.as_str())).collect();
        self.runtime_stmt(
            ENTERING,
            vec![
                Expr::string(method_id),
                Expr::ArrayInit {
                    elem_ty: TypeRef::new("String"),
                    elements: names,
                },
                Expr::ArrayInit {
                    elem_ty: TypeRef::new("Object"),
                    elements: values,
                },
            ],
        )
    }

    pub fn exiting(&self, method_id: &str) -> Stmt {
        self.runtime_stmt(EXITING, vec![Expr::string(method_id)])
    }

    pub fn returning(&self, method_id: &str, value: Expr) -> Stmt {
        self.runtime_stmt(RETURNING, vec![Expr::string(method_id), value])
    }

    /// `valueChanged(id, "<path>", <target>)`
    pub fn value_changed(&self, method_id: &str, path: &str, target: Expr) -> Stmt {
        self.runtime_stmt(
            VALUE_CHANGED,
            vec![Expr::string(method_id), Expr::string(path), target],
        )
    }

    /// Same report as [`Self::value_changed`], as a bare expression for `for` headers
    pub fn value_changed_expr(&self, method_id: &str, path: &str, target: Expr) -> Expr {
        self.runtime_call(
            VALUE_CHANGED,
            vec![Expr::string(method_id), Expr::string(path), target],
        )
    }

    pub fn timeout(&self, method_id: &str, millis: u64) -> Stmt {
        let millis = i64::try_from(millis).unwrap_or(i64::MAX);
        self.runtime_stmt(TIMEOUT, vec![Expr::string(method_id), Expr::long(millis)])
    }

    /// `catch (Throwable $scribe_error) { onError(id, $scribe_error); throw $scribe_error; }`
    pub fn on_error_catch(&self, method_id: &str) -> CatchClause {
        CatchClause {
            ty: TypeRef::new("Throwable"),
            name: ERROR_VAR.to_string(),
            body: Block::new(vec![
                self.runtime_stmt(ON_ERROR, vec![Expr::string(method_id), Expr::name(ERROR_VAR)]),
                Stmt::Throw(Expr::name(ERROR_VAR)),
            ]),
        }
    }

    /// Whether `expr` is a call into the runtime class
    pub fn is_runtime_call(&self, expr: &Expr, name: &str) -> bool {
        match expr {
            Expr::Call {
                receiver: Some(receiver),
                name: called,
                ..
            } => called == name && matches!(receiver.as_ref(), Expr::Name(r) if *r == self.runtime_class),
            _ => false,
        }
    }

    /// Whether `stmt` is the `exiting` report of the entry/exit wrapper
    pub fn is_exiting_stmt(&self, stmt: &Stmt) -> bool {
        matches!(stmt, Stmt::Expr(expr) if self.is_runtime_call(expr, EXITING))
    }
}
