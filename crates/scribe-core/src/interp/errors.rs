use std::fmt;

use thiserror::Error;

/// An exception raised by evaluated code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownValue {
    pub class: String,
    pub message: Option<String>,
}

impl ThrownValue {
    pub fn new(class: impl Into<String>, message: Option<String>) -> Self {
        Self {
            class: class.into(),
            message,
        }
    }

    /// Simple class name, without the package
    pub fn simple_class(&self) -> &str {
        self.class.rsplit('.').next().unwrap_or(&self.class)
    }
}

impl fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.class),
            None => f.write_str(&self.class),
        }
    }
}

/// Evaluator faults: the program cannot be evaluated at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Class '{name}' not found")]
    ClassNotFound { name: String },

    #[error("Method '{class}.{method}' with {arity} argument(s) not found")]
    MethodNotFound {
        class: String,
        method: String,
        arity: usize,
    },

    #[error("Variable '{name}' not found")]
    VariableNotFound { name: String },

    #[error("Type error: {operation} requires {expected}, got {actual}")]
    TypeError {
        operation: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid assignment target: {0}")]
    InvalidTarget(String),

    #[error("Unexpected {0} outside of a loop or method")]
    UnexpectedControl(String),

    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    #[error("Unknown runtime call '{name}'")]
    UnknownRuntimeCall { name: String },
}

impl EvalError {
    pub fn type_error(operation: &str, expected: &str, actual: &str) -> Self {
        Self::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn variable_not_found(name: &str) -> Self {
        Self::VariableNotFound {
            name: name.to_string(),
        }
    }
}

/// Why evaluation stopped early
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unwind {
    /// An exception nobody caught
    #[error("uncaught {0}")]
    Thrown(ThrownValue),

    #[error(transparent)]
    Fault(#[from] EvalError),
}

impl Unwind {
    pub fn throw(class: &str, message: &str) -> Self {
        Unwind::Thrown(ThrownValue::new(class, Some(message.to_string())))
    }
}
