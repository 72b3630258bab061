//! Process-wide channel for failures that must not unwind into the caller.
//!
//! A connect callback that panics while the engine is still dispatching
//! events cannot be propagated synchronously. The panic is caught and
//! reported here instead. Subscribers receive every fault reported after
//! they subscribed; with no subscribers the fault is logged.

use parking_lot::{const_mutex, Mutex};
use std::any::Any;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::error;

static SUBSCRIBERS: Mutex<Vec<Sender<Fault>>> = const_mutex(Vec::new());

/// A deferred failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Where the failure happened.
    pub context: &'static str,
    /// What went wrong.
    pub message: String,
}

impl Fault {
    /// Creates a fault.
    pub fn new(context: &'static str, message: impl Into<String>) -> Self {
        Self {
            context,
            message: message.into(),
        }
    }

    /// Creates a fault from a caught panic payload.
    pub fn from_panic(context: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(context, message)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Subscribes to future faults.
pub fn subscribe() -> Receiver<Fault> {
    let (tx, rx) = mpsc::channel();
    SUBSCRIBERS.lock().push(tx);
    rx
}

/// Reports a fault without blocking.
pub fn report(fault: Fault) {
    let mut subscribers = SUBSCRIBERS.lock();
    subscribers.retain(|tx| tx.send(fault.clone()).is_ok());
    if subscribers.is_empty() {
        error!(context = fault.context, message = %fault.message, "unhandled fault");
    }
}

/// Number of live subscribers.
pub fn subscriber_count() -> usize {
    SUBSCRIBERS.lock().len()
}
