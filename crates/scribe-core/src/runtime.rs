/*!
# Trace sink boundary

Instrumented code reports to a [`TraceSink`]. Every call is fire-and-forget:
a sink never fails and never alters the control flow of the traced method.
*/

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// Snapshot of a runtime value handed to a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceValue {
    Null,
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Vec<TraceValue>),
    Object(String),
    Error {
        class: String,
        message: Option<String>,
    },
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Null => write!(f, "null"),
            TraceValue::Int(n) => write!(f, "{n}"),
            TraceValue::Bool(b) => write!(f, "{b}"),
            TraceValue::Str(s) => write!(f, "{s:?}"),
            TraceValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            TraceValue::Object(class) => write!(f, "{class}@instance"),
            TraceValue::Error { class, message } => match message {
                Some(message) => write!(f, "{class}: {message}"),
                None => write!(f, "{class}"),
            },
        }
    }
}

/// Receiver of the runtime calls injected by the passes
pub trait TraceSink: Send + Sync {
    fn entering(&self, method_id: &str, names: &[String], values: &[TraceValue]);

    fn exiting(&self, method_id: &str);

    fn returning(&self, method_id: &str, value: &TraceValue);

    fn value_changed(&self, method_id: &str, name: &str, value: &TraceValue);

    fn on_error(&self, method_id: &str, error: &TraceValue);

    /// Arms the declared deadline; checked when the method exits
    fn on_timeout(&self, method_id: &str, declared_ms: u64);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TraceEvent {
    Entering {
        method: String,
        params: Vec<(String, TraceValue)>,
    },
    Exiting {
        method: String,
    },
    Returning {
        method: String,
        value: TraceValue,
    },
    ValueChanged {
        method: String,
        name: String,
        value: TraceValue,
    },
    Error {
        method: String,
        error: TraceValue,
    },
    TimeoutArmed {
        method: String,
        declared_ms: u64,
    },
    TimedOut {
        method: String,
        declared_ms: u64,
        elapsed_ms: u64,
    },
}

impl TraceEvent {
    pub fn method(&self) -> &str {
        match self {
            TraceEvent::Entering { method, .. }
            | TraceEvent::Exiting { method }
            | TraceEvent::Returning { method, .. }
            | TraceEvent::ValueChanged { method, .. }
            | TraceEvent::Error { method, .. }
            | TraceEvent::TimeoutArmed { method, .. }
            | TraceEvent::TimedOut { method, .. } => method,
        }
    }
}

/// Armed deadlines per method; nested activations of the same method stack
#[derive(Debug, Default)]
struct Deadlines {
    armed: HashMap<String, Vec<(Instant, u64)>>,
}

impl Deadlines {
    fn arm(&mut self, method_id: &str, declared_ms: u64) {
        self.armed
            .entry(method_id.to_string())
            .or_default()
            .push((Instant::now(), declared_ms));
    }

    /// Disarm the latest deadline of `method_id`, returning it if it expired
    fn disarm(&mut self, method_id: &str) -> Option<(u64, Duration)> {
        let stack = self.armed.get_mut(method_id)?;
        let (started, declared_ms) = stack.pop()?;
        if stack.is_empty() {
            self.armed.remove(method_id);
        }
        let elapsed = started.elapsed();
        (elapsed > Duration::from_millis(declared_ms)).then_some((declared_ms, elapsed))
    }
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<TraceEvent>,
    deadlines: Deadlines,
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Recording>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.inner.lock().events.clone()
    }

    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }

    /// `(name, value)` of each value change reported by `method_id`
    pub fn value_changes(&self, method_id: &str) -> Vec<(String, TraceValue)> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::ValueChanged {
                    method,
                    name,
                    value,
                } if method == method_id => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: TraceEvent) {
        self.inner.lock().events.push(event);
    }
}

impl TraceSink for RecordingSink {
    fn entering(&self, method_id: &str, names: &[String], values: &[TraceValue]) {
        let params = names.iter().cloned().zip(values.iter().cloned()).collect();
        self.record(TraceEvent::Entering {
            method: method_id.to_string(),
            params,
        });
    }

    fn exiting(&self, method_id: &str) {
        let mut inner = self.inner.lock();
        if let Some((declared_ms, elapsed)) = inner.deadlines.disarm(method_id) {
            inner.events.push(TraceEvent::TimedOut {
                method: method_id.to_string(),
                declared_ms,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }
        inner.events.push(TraceEvent::Exiting {
            method: method_id.to_string(),
        });
    }

    fn returning(&self, method_id: &str, value: &TraceValue) {
        self.record(TraceEvent::Returning {
            method: method_id.to_string(),
            value: value.clone(),
        });
    }

    fn value_changed(&self, method_id: &str, name: &str, value: &TraceValue) {
        self.record(TraceEvent::ValueChanged {
            method: method_id.to_string(),
            name: name.to_string(),
            value: value.clone(),
        });
    }

    fn on_error(&self, method_id: &str, error: &TraceValue) {
        self.record(TraceEvent::Error {
            method: method_id.to_string(),
            error: error.clone(),
        });
    }

    fn on_timeout(&self, method_id: &str, declared_ms: u64) {
        let mut inner = self.inner.lock();
        inner.deadlines.arm(method_id, declared_ms);
        inner.events.push(TraceEvent::TimeoutArmed {
            method: method_id.to_string(),
            declared_ms,
        });
    }
}

/// Emits every report as a `tracing` event under the `scribe::trace` target
#[derive(Debug, Default)]
pub struct LoggingSink {
    deadlines: Mutex<Deadlines>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceSink for LoggingSink {
    fn entering(&self, method_id: &str, names: &[String], values: &[TraceValue]) {
        let params = names
            .iter()
            .zip(values)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(target: "scribe::trace", method = method_id, %params, "entering");
    }

    fn exiting(&self, method_id: &str) {
        if let Some((declared_ms, elapsed)) = self.deadlines.lock().disarm(method_id) {
            warn!(
                target: "scribe::trace",
                method = method_id,
                declared_ms,
                elapsed_ms = elapsed.as_millis() as u64,
                "timeout exceeded"
            );
        }
        info!(target: "scribe::trace", method = method_id, "exiting");
    }

    fn returning(&self, method_id: &str, value: &TraceValue) {
        info!(target: "scribe::trace", method = method_id, %value, "returning");
    }

    fn value_changed(&self, method_id: &str, name: &str, value: &TraceValue) {
        info!(target: "scribe::trace", method = method_id, name, %value, "value changed");
    }

    fn on_error(&self, method_id: &str, error: &TraceValue) {
        warn!(target: "scribe::trace", method = method_id, %error, "uncaught error");
    }

    fn on_timeout(&self, method_id: &str, declared_ms: u64) {
        self.deadlines.lock().arm(method_id, declared_ms);
    }
}
