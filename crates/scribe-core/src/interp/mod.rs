/*!
# Reference evaluator

Tree-walking evaluator for compilation units, used to observe what
instrumented code does at runtime. It covers the statement and expression
forms of the syntax tree with a deliberately small value model:

- integers (both `int` and `long`), booleans, strings, `null` and arrays
- fields live per class; `this.f` and `Class.f` address the same slot
- `new X(..)` for a class of the unit runs its constructor, any other class
  name creates an exception value carrying the first argument as message
- calls on the runtime class are routed to a [`TraceSink`]
*/

pub mod errors;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

pub use errors::{EvalError, ThrownValue, Unwind};

use crate::ast::{
    AssignOp, BinaryOp, ClassDecl, CompilationUnit, Expr, ForInit, Literal, MethodDecl, Stmt,
    SwitchCase, ToSource, TryStmt, TypeRef, UnaryOp,
};
use crate::builder::{ENTERING, EXITING, ON_ERROR, RETURNING, TIMEOUT, VALUE_CHANGED};
use crate::runtime::{TraceSink, TraceValue};

/// Calls nested deeper than this raise `StackOverflowError`
const MAX_CALL_DEPTH: usize = 256;

pub type EvalResult<T> = std::result::Result<T, Unwind>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    /// Instance of a class of the unit
    Object(String),
    Throwable(ThrownValue),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "String",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Throwable(_) => "Throwable",
        }
    }

    /// Detached copy handed to trace sinks
    pub fn snapshot(&self) -> TraceValue {
        match self {
            Value::Null => TraceValue::Null,
            Value::Int(n) => TraceValue::Int(*n),
            Value::Bool(b) => TraceValue::Bool(*b),
            Value::Str(s) => TraceValue::Str(s.clone()),
            Value::Array(items) => {
                TraceValue::Array(items.borrow().iter().map(Value::snapshot).collect())
            }
            Value::Object(class) => TraceValue::Object(class.clone()),
            Value::Throwable(thrown) => TraceValue::Error {
                class: thrown.class.clone(),
                message: thrown.message.clone(),
            },
        }
    }

    /// Text used by string concatenation
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.snapshot().to_string(),
        }
    }
}

#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

enum LoopControl {
    Next,
    Stop,
    Propagate(Flow),
}

fn loop_control(flow: Flow, label: Option<&str>) -> LoopControl {
    match flow {
        Flow::Normal | Flow::Continue(None) => LoopControl::Next,
        Flow::Break(None) => LoopControl::Stop,
        Flow::Continue(Some(ref target)) if Some(target.as_str()) == label => LoopControl::Next,
        Flow::Break(Some(ref target)) if Some(target.as_str()) == label => LoopControl::Stop,
        other => LoopControl::Propagate(other),
    }
}

/// Activation of one method: its class and nested block scopes
#[derive(Debug)]
struct Frame {
    class: String,
    scopes: Vec<HashMap<String, Value>>,
}

impl Frame {
    fn new(class: &str, locals: HashMap<String, Value>) -> Self {
        Self {
            class: class.to_string(),
            scopes: vec![locals],
        }
    }
}

/// A storage location an assignment writes to
enum Place {
    Local(String),
    Static { class: String, field: String },
    Element {
        array: Rc<RefCell<Vec<Value>>>,
        index: usize,
    },
}

pub struct Interpreter<'u> {
    unit: &'u CompilationUnit,
    sink: &'u dyn TraceSink,
    runtime_class: String,
    statics: HashMap<String, HashMap<String, Value>>,
    frame: Frame,
    callers: Vec<Frame>,
}

impl<'u> Interpreter<'u> {
    pub fn new(
        unit: &'u CompilationUnit,
        sink: &'u dyn TraceSink,
        runtime_class: impl Into<String>,
    ) -> Self {
        Self {
            unit,
            sink,
            runtime_class: runtime_class.into(),
            statics: HashMap::new(),
            frame: Frame::new("", HashMap::new()),
            callers: Vec::new(),
        }
    }

    /// Invoke `class.method(args)`; `class` is a simple or qualified name
    pub fn call(&mut self, class: &str, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        let class = self.class_decl(class)?;
        self.invoke(class, method, args)
    }

    /// Current value of a class field
    pub fn static_field(&mut self, class: &str, field: &str) -> EvalResult<Value> {
        self.read_static(class, field)
    }

    fn class_decl(&self, name: &str) -> Result<&'u ClassDecl, EvalError> {
        let unit = self.unit;
        unit.find_class(name).ok_or_else(|| EvalError::ClassNotFound {
            name: name.to_string(),
        })
    }

    fn is_class_name(&self, name: &str) -> bool {
        self.lookup_local(name).is_none() && self.unit.find_class(name).is_some()
    }

    fn invoke(&mut self, class: &'u ClassDecl, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let method = class
            .methods
            .iter()
            .find(|m| !m.is_constructor() && m.name == name && m.params.len() == args.len())
            .ok_or_else(|| EvalError::MethodNotFound {
                class: class.name.clone(),
                method: name.to_string(),
                arity: args.len(),
            })?;
        self.run_method(class, method, args)
    }

    fn construct(&mut self, class: &'u ClassDecl, args: Vec<Value>) -> EvalResult<Value> {
        self.ensure_statics(class)?;
        let constructor = class
            .methods
            .iter()
            .find(|m| m.is_constructor() && m.params.len() == args.len());
        match constructor {
            Some(constructor) => {
                self.run_method(class, constructor, args)?;
            }
            None if args.is_empty() => {}
            None => {
                return Err(EvalError::MethodNotFound {
                    class: class.name.clone(),
                    method: class.name.clone(),
                    arity: args.len(),
                }
                .into())
            }
        }
        Ok(Value::Object(class.name.clone()))
    }

    fn run_method(
        &mut self,
        class: &'u ClassDecl,
        method: &'u MethodDecl,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let body = method.body.as_ref().ok_or_else(|| {
            EvalError::Unsupported(format!("call to '{}.{}' without body", class.name, method.name))
        })?;
        if self.callers.len() >= MAX_CALL_DEPTH {
            return Err(Unwind::throw(
                "StackOverflowError",
                &format!("{}.{}", class.name, method.name),
            ));
        }
        self.ensure_statics(class)?;

        trace!(class = %class.name, method = %method.name, "invoking");
        let locals = method
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(args)
            .collect();
        let flow = self.with_frame(Frame::new(&class.name, locals), |this| {
            this.exec_stmts(&body.stmts)
        })?;
        match flow {
            Flow::Normal => Ok(Value::Null),
            Flow::Return(value) => Ok(value),
            Flow::Break(_) => Err(EvalError::UnexpectedControl("break".into()).into()),
            Flow::Continue(_) => Err(EvalError::UnexpectedControl("continue".into()).into()),
        }
    }

    fn with_frame<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let caller = std::mem::replace(&mut self.frame, frame);
        self.callers.push(caller);
        let result = f(self);
        if let Some(caller) = self.callers.pop() {
            self.frame = caller;
        }
        result
    }

    /// Run the field initializers of `class` on first use
    fn ensure_statics(&mut self, class: &'u ClassDecl) -> EvalResult<()> {
        if self.statics.contains_key(&class.name) {
            return Ok(());
        }
        self.statics.insert(class.name.clone(), HashMap::new());
        self.with_frame(Frame::new(&class.name, HashMap::new()), |this| {
            for field in &class.fields {
                let value = match &field.init {
                    Some(init) => this.eval(init)?,
                    None => default_value(&field.ty),
                };
                this.statics
                    .entry(class.name.clone())
                    .or_default()
                    .insert(field.name.clone(), value);
            }
            Ok(())
        })
    }

    fn read_static(&mut self, class: &str, field: &str) -> EvalResult<Value> {
        let class = self.class_decl(class)?;
        self.ensure_statics(class)?;
        self.statics
            .get(&class.name)
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or_else(|| EvalError::variable_not_found(&format!("{}.{field}", class.name)).into())
    }

    // Scopes

    fn push_scope(&mut self) {
        self.frame.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.frame.scopes.pop();
    }

    fn declare(&mut self, name: &str, value: Value) {
        match self.frame.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => self
                .frame
                .scopes
                .push(HashMap::from([(name.to_string(), value)])),
        }
    }

    fn lookup_local(&self, name: &str) -> Option<&Value> {
        self.frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    // Statements

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<Flow> {
        self.push_scope();
        let result = self.exec_stmts(stmts);
        self.pop_scope();
        result
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Block(block) => self.exec_block(&block.stmts),
            Stmt::Local { ty, name, init } => {
                let value = match init {
                    Some(init) => self.eval(init)?,
                    None => default_value(ty),
                };
                self.declare(name, value);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(cond, "if")? {
                    self.exec(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::For { .. } | Stmt::ForEach { .. } => {
                self.exec_loop(stmt, None)
            }
            Stmt::Labeled { label, body } => {
                if body.is_loop() {
                    return self.exec_loop(body, Some(label.as_str()));
                }
                match self.exec(body)? {
                    Flow::Break(Some(target)) if target == *label => Ok(Flow::Normal),
                    other => Ok(other),
                }
            }
            Stmt::Switch { selector, cases } => self.exec_switch(selector, cases),
            Stmt::Break(label) => Ok(Flow::Break(label.clone())),
            Stmt::Continue(label) => Ok(Flow::Continue(label.clone())),
            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(value) => match self.eval(value)? {
                Value::Throwable(thrown) => Err(Unwind::Thrown(thrown)),
                Value::Null => Err(Unwind::throw("NullPointerException", "throw null")),
                other => Err(EvalError::type_error("throw", "Throwable", other.type_name()).into()),
            },
            Stmt::Try(try_stmt) => self.exec_try(try_stmt),
            Stmt::Synchronized { lock, body } => {
                self.eval(lock)?;
                self.exec_block(&body.stmts)
            }
            Stmt::Opaque(text) => Err(EvalError::Unsupported(text.clone()).into()),
        }
    }

    fn exec_loop(&mut self, stmt: &Stmt, label: Option<&str>) -> EvalResult<Flow> {
        match stmt {
            Stmt::While { cond, body } => {
                while self.eval_bool(cond, "while")? {
                    match loop_control(self.exec(body)?, label) {
                        LoopControl::Next => {}
                        LoopControl::Stop => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::DoWhile { body, cond } => {
                loop {
                    match loop_control(self.exec(body)?, label) {
                        LoopControl::Next => {}
                        LoopControl::Stop => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                    if !self.eval_bool(cond, "do-while")? {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.push_scope();
                let result = self.exec_for(init, cond.as_ref(), update, body, label);
                self.pop_scope();
                result
            }
            Stmt::ForEach {
                name,
                iterable,
                body,
                ..
            } => {
                let items = match self.eval(iterable)? {
                    Value::Array(items) => items.borrow().clone(),
                    other => {
                        return Err(
                            EvalError::type_error("for-each", "array", other.type_name()).into()
                        )
                    }
                };
                for item in items {
                    self.push_scope();
                    self.declare(name, item);
                    let flow = self.exec(body);
                    self.pop_scope();
                    match loop_control(flow?, label) {
                        LoopControl::Next => {}
                        LoopControl::Stop => break,
                        LoopControl::Propagate(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            other => self.exec(other),
        }
    }

    fn exec_for(
        &mut self,
        init: &ForInit,
        cond: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
        label: Option<&str>,
    ) -> EvalResult<Flow> {
        match init {
            ForInit::Exprs(exprs) => {
                for expr in exprs {
                    self.eval(expr)?;
                }
            }
            ForInit::Decl { name, init, .. } => {
                let value = self.eval(init)?;
                self.declare(name, value);
            }
        }
        loop {
            if let Some(cond) = cond {
                if !self.eval_bool(cond, "for")? {
                    break;
                }
            }
            match loop_control(self.exec(body)?, label) {
                LoopControl::Next => {}
                LoopControl::Stop => break,
                LoopControl::Propagate(flow) => return Ok(flow),
            }
            for expr in update {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(&mut self, selector: &Expr, cases: &[SwitchCase]) -> EvalResult<Flow> {
        let value = self.eval(selector)?;
        let start = cases
            .iter()
            .position(|case| case.labels.iter().any(|label| literal_value(label) == value))
            .or_else(|| cases.iter().position(|case| case.labels.is_empty()));
        let Some(start) = start else {
            return Ok(Flow::Normal);
        };

        // cases share one scope and fall through until a break
        self.push_scope();
        let mut result = Ok(Flow::Normal);
        for case in &cases[start..] {
            match self.exec_stmts(&case.body) {
                Ok(Flow::Normal) => {}
                Ok(Flow::Break(None)) => break,
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.pop_scope();
        result
    }

    fn exec_try(&mut self, stmt: &TryStmt) -> EvalResult<Flow> {
        let mut result = self.exec_block(&stmt.body.stmts);

        let handler = match &result {
            Err(Unwind::Thrown(thrown)) => stmt
                .catches
                .iter()
                .find(|clause| catches(&clause.ty, thrown))
                .map(|clause| (clause, thrown.clone())),
            _ => None,
        };
        if let Some((clause, thrown)) = handler {
            self.push_scope();
            self.declare(&clause.name, Value::Throwable(thrown));
            result = self.exec_stmts(&clause.body.stmts);
            self.pop_scope();
        }

        if matches!(result, Err(Unwind::Fault(_))) {
            return result;
        }
        if let Some(finally) = &stmt.finally {
            // an abrupt finally replaces whatever the try produced
            match self.exec_block(&finally.stmts)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    // Expressions

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Name(name) => self.read_name(name),
            Expr::This => Ok(Value::Object(self.frame.class.clone())),
            Expr::Field { target, name } => self.eval_field(target, name),
            Expr::Index { target, index } => {
                let array = self.eval_array(target)?;
                let index = self.eval_int(index, "array index")?;
                let index = checked_index(index, array.borrow().len())?;
                let element = array.borrow().get(index).cloned().unwrap_or(Value::Null);
                Ok(element)
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_bool(cond, "?:")? {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            Expr::Call {
                receiver,
                name,
                args,
            } => self.eval_call(receiver.as_deref(), name, args),
            Expr::New { class, args } => {
                let args = self.eval_args(args)?;
                let unit = self.unit;
                match unit.find_class(class) {
                    Some(decl) => self.construct(decl, args),
                    None => Ok(Value::Throwable(ThrownValue::new(
                        class.as_str(),
                        args.first().filter(|a| **a != Value::Null).map(Value::to_text),
                    ))),
                }
            }
            Expr::ArrayInit { elements, .. } => {
                let items = self.eval_args(elements)?;
                Ok(Value::array(items))
            }
            Expr::SuperCall(args) => {
                self.eval_args(args)?;
                Ok(Value::Null)
            }
            Expr::ThisCall(args) => {
                let args = self.eval_args(args)?;
                let class = self.class_decl(&self.frame.class)?;
                self.construct(class, args)?;
                Ok(Value::Null)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> EvalResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn eval_bool(&mut self, expr: &Expr, operation: &str) -> EvalResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::type_error(operation, "boolean", other.type_name()).into()),
        }
    }

    fn eval_int(&mut self, expr: &Expr, operation: &str) -> EvalResult<i64> {
        match self.eval(expr)? {
            Value::Int(n) => Ok(n),
            other => Err(EvalError::type_error(operation, "int", other.type_name()).into()),
        }
    }

    fn eval_array(&mut self, expr: &Expr) -> EvalResult<Rc<RefCell<Vec<Value>>>> {
        match self.eval(expr)? {
            Value::Array(items) => Ok(items),
            Value::Null => Err(Unwind::throw("NullPointerException", "array is null")),
            other => Err(EvalError::type_error("indexing", "array", other.type_name()).into()),
        }
    }

    fn read_name(&mut self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.lookup_local(name) {
            return Ok(value.clone());
        }
        self.statics
            .get(&self.frame.class)
            .and_then(|fields| fields.get(name))
            .cloned()
            .ok_or_else(|| EvalError::variable_not_found(name).into())
    }

    fn eval_field(&mut self, target: &Expr, name: &str) -> EvalResult<Value> {
        match target {
            Expr::This => {
                let class = self.frame.class.clone();
                self.read_static(&class, name)
            }
            Expr::Name(owner) if self.is_class_name(owner) => self.read_static(owner, name),
            other => match self.eval(other)? {
                Value::Array(items) if name == "length" => Ok(Value::Int(items.borrow().len() as i64)),
                Value::Object(class) => self.read_static(&class, name),
                Value::Null => Err(Unwind::throw("NullPointerException", name)),
                value => Err(EvalError::type_error(
                    &format!("field access '{name}'"),
                    "object",
                    value.type_name(),
                )
                .into()),
            },
        }
    }

    fn resolve_place(&mut self, target: &Expr) -> EvalResult<Place> {
        match target {
            Expr::Name(name) => {
                if self.lookup_local(name).is_some() {
                    return Ok(Place::Local(name.clone()));
                }
                let is_field = self
                    .statics
                    .get(&self.frame.class)
                    .is_some_and(|fields| fields.contains_key(name));
                if is_field {
                    Ok(Place::Static {
                        class: self.frame.class.clone(),
                        field: name.clone(),
                    })
                } else {
                    Err(EvalError::variable_not_found(name).into())
                }
            }
            Expr::Field { target: owner, name } => {
                let class = match &**owner {
                    Expr::This => self.frame.class.clone(),
                    Expr::Name(owner) if self.is_class_name(owner) => {
                        self.class_decl(owner)?.name.clone()
                    }
                    other => match self.eval(other)? {
                        Value::Object(class) => class,
                        value => {
                            return Err(EvalError::InvalidTarget(format!(
                                "field '{name}' of {}",
                                value.type_name()
                            ))
                            .into())
                        }
                    },
                };
                let decl = self.class_decl(&class)?;
                self.ensure_statics(decl)?;
                Ok(Place::Static {
                    class,
                    field: name.clone(),
                })
            }
            Expr::Index { target, index } => {
                let array = self.eval_array(target)?;
                let index = self.eval_int(index, "array index")?;
                let index = checked_index(index, array.borrow().len())?;
                Ok(Place::Element { array, index })
            }
            other => Err(EvalError::InvalidTarget(other.to_source()).into()),
        }
    }

    fn read_place(&self, place: &Place) -> EvalResult<Value> {
        let value = match place {
            Place::Local(name) => self.lookup_local(name).cloned(),
            Place::Static { class, field } => self
                .statics
                .get(class)
                .and_then(|fields| fields.get(field))
                .cloned(),
            Place::Element { array, index } => array.borrow().get(*index).cloned(),
        };
        value.ok_or_else(|| EvalError::InvalidTarget("unreadable location".into()).into())
    }

    fn write_place(&mut self, place: Place, value: Value) -> EvalResult<()> {
        match place {
            Place::Local(name) => {
                let slot = self
                    .frame
                    .scopes
                    .iter_mut()
                    .rev()
                    .find_map(|scope| scope.get_mut(&name));
                match slot {
                    Some(slot) => *slot = value,
                    None => return Err(EvalError::variable_not_found(&name).into()),
                }
            }
            Place::Static { class, field } => {
                self.statics.entry(class).or_default().insert(field, value);
            }
            Place::Element { array, index } => {
                if let Some(slot) = array.borrow_mut().get_mut(index) {
                    *slot = value;
                }
            }
        }
        Ok(())
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> EvalResult<Value> {
        let place = self.resolve_place(target)?;
        let new_value = match op.binary() {
            None => self.eval(value)?,
            Some(arithmetic) => {
                let current = self.read_place(&place)?;
                let operand = self.eval(value)?;
                apply_binary(arithmetic, current, operand)?
            }
        };
        self.write_place(place, new_value.clone())?;
        Ok(new_value)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> EvalResult<Value> {
        match op {
            UnaryOp::Neg => Ok(Value::Int(self.eval_int(operand, "-")?.wrapping_neg())),
            UnaryOp::Not => Ok(Value::Bool(!self.eval_bool(operand, "!")?)),
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let place = self.resolve_place(operand)?;
                let old = match self.read_place(&place)? {
                    Value::Int(n) => n,
                    other => {
                        return Err(
                            EvalError::type_error("increment", "int", other.type_name()).into()
                        )
                    }
                };
                let new = match op {
                    UnaryOp::PreInc | UnaryOp::PostInc => old.wrapping_add(1),
                    _ => old.wrapping_sub(1),
                };
                self.write_place(place, Value::Int(new))?;
                let result = match op {
                    UnaryOp::PreInc | UnaryOp::PreDec => new,
                    _ => old,
                };
                Ok(Value::Int(result))
            }
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
        match op {
            BinaryOp::And => Ok(Value::Bool(
                self.eval_bool(left, "&&")? && self.eval_bool(right, "&&")?,
            )),
            BinaryOp::Or => Ok(Value::Bool(
                self.eval_bool(left, "||")? || self.eval_bool(right, "||")?,
            )),
            _ => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                apply_binary(op, left, right)
            }
        }
    }

    fn eval_call(&mut self, receiver: Option<&Expr>, name: &str, args: &[Expr]) -> EvalResult<Value> {
        match receiver {
            Some(Expr::Name(owner)) if *owner == self.runtime_class => {
                let args = self.eval_args(args)?;
                self.runtime_call(name, &args)
            }
            None | Some(Expr::This) => {
                let args = self.eval_args(args)?;
                let class = self.class_decl(&self.frame.class)?;
                self.invoke(class, name, args)
            }
            Some(Expr::Name(owner)) if self.is_class_name(owner) => {
                let class = self.class_decl(owner)?;
                let args = self.eval_args(args)?;
                self.invoke(class, name, args)
            }
            Some(Expr::Name(owner))
                if owner == "Thread" && name == "sleep" && self.lookup_local(owner).is_none() =>
            {
                let millis = match self.eval_args(args)?.as_slice() {
                    [Value::Int(ms)] if *ms >= 0 => *ms as u64,
                    _ => return Err(Unwind::throw("IllegalArgumentException", "sleep")),
                };
                std::thread::sleep(Duration::from_millis(millis));
                Ok(Value::Null)
            }
            Some(target) => {
                let value = self.eval(target)?;
                let args = self.eval_args(args)?;
                self.call_on_value(value, name, args)
            }
        }
    }

    fn call_on_value(&mut self, value: Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        if let Value::Object(class) = &value {
            let class = self.class_decl(class)?;
            return self.invoke(class, name, args);
        }
        match (&value, name, args.as_slice()) {
            (Value::Null, _, _) => Err(Unwind::throw("NullPointerException", name)),
            (Value::Throwable(thrown), "getMessage", []) => Ok(thrown
                .message
                .clone()
                .map(Value::Str)
                .unwrap_or(Value::Null)),
            (Value::Str(s), "length", []) => Ok(Value::Int(s.chars().count() as i64)),
            (Value::Str(_), "equals", [other]) => Ok(Value::Bool(value == *other)),
            _ => Err(EvalError::MethodNotFound {
                class: value.type_name().to_string(),
                method: name.to_string(),
                arity: args.len(),
            }
            .into()),
        }
    }

    fn runtime_call(&mut self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let method_id = args.first().map(Value::to_text).unwrap_or_default();
        match (name, args) {
            (ENTERING, [_, Value::Array(names), Value::Array(values)]) => {
                let names: Vec<String> = names.borrow().iter().map(Value::to_text).collect();
                let values: Vec<TraceValue> = values.borrow().iter().map(Value::snapshot).collect();
                self.sink.entering(&method_id, &names, &values);
            }
            (EXITING, [_]) => self.sink.exiting(&method_id),
            (RETURNING, [_, value]) => self.sink.returning(&method_id, &value.snapshot()),
            (VALUE_CHANGED, [_, path, value]) => {
                self.sink
                    .value_changed(&method_id, &path.to_text(), &value.snapshot())
            }
            (ON_ERROR, [_, error]) => self.sink.on_error(&method_id, &error.snapshot()),
            (TIMEOUT, [_, Value::Int(millis)]) => {
                self.sink
                    .on_timeout(&method_id, u64::try_from(*millis).unwrap_or(0))
            }
            _ => {
                return Err(EvalError::UnknownRuntimeCall {
                    name: name.to_string(),
                }
                .into())
            }
        }
        Ok(Value::Null)
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(n) | Literal::Long(n) => Value::Int(*n),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Null => Value::Null,
    }
}

fn default_value(ty: &TypeRef) -> Value {
    match ty.as_str() {
        "int" | "long" | "short" | "byte" | "char" => Value::Int(0),
        "boolean" => Value::Bool(false),
        _ => Value::Null,
    }
}

fn checked_index(index: i64, len: usize) -> EvalResult<usize> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(Unwind::throw(
            "ArrayIndexOutOfBoundsException",
            &format!("Index {index} out of bounds for length {len}"),
        )),
    }
}

/// `catch (T e)` handles the thrown value
fn catches(ty: &TypeRef, thrown: &ThrownValue) -> bool {
    let caught = ty.as_str().rsplit('.').next().unwrap_or(ty.as_str());
    match caught {
        "Throwable" | "Exception" => true,
        "RuntimeException" => thrown.simple_class().ends_with("Exception"),
        other => other == thrown.simple_class(),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    match (op, &left, &right) {
        (BinaryOp::Add, Value::Str(_), _) | (BinaryOp::Add, _, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", left.to_text(), right.to_text())))
        }
        (BinaryOp::Eq, _, _) => Ok(Value::Bool(left == right)),
        (BinaryOp::Ne, _, _) => Ok(Value::Bool(left != right)),
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let value = match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                    return Err(Unwind::throw("ArithmeticException", "/ by zero"))
                }
                BinaryOp::Div => Value::Int(a.wrapping_div(b)),
                BinaryOp::Rem => Value::Int(a.wrapping_rem(b)),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::Ge => Value::Bool(a >= b),
                BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => {
                    return Err(EvalError::type_error(op.symbol(), "boolean", "int").into())
                }
            };
            Ok(value)
        }
        _ => Err(EvalError::type_error(
            op.symbol(),
            "int operands",
            &format!("{} and {}", left.type_name(), right.type_name()),
        )
        .into()),
    }
}
