//! One-shot result sinks for operations.

use crate::error::{TopologyError, TopologyResult};
use replset_protocol::Document;
use std::fmt;
use tokio::sync::oneshot;

/// Result delivered to an operation's completion.
pub type OpResult = TopologyResult<Document>;

/// Receiving half of [`Completion::channel`].
pub type CompletionReceiver = oneshot::Receiver<OpResult>;

/// Where an operation's result goes.
///
/// Consumed by [`complete`](Completion::complete), so each operation is
/// resolved at most once. Dropping an unresolved completion closes the
/// channel without a value.
pub struct Completion {
    inner: Box<dyn FnOnce(OpResult) + Send>,
}

impl Completion {
    /// Wraps a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(OpResult) + Send + 'static,
    {
        Self {
            inner: Box::new(callback),
        }
    }

    /// Creates a completion backed by a oneshot channel.
    pub fn channel() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            // Receiver may have been dropped; nothing to do then.
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    /// A completion that discards the result.
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Delivers the result.
    pub fn complete(self, result: OpResult) {
        (self.inner)(result)
    }

    /// Delivers an error.
    pub fn fail(self, error: TopologyError) {
        self.complete(Err(error))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn callback_receives_result() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let completion = Completion::new(move |result| *sink.lock() = Some(result));

        completion.complete(Ok(json!({"ok": 1})));
        assert_eq!(*seen.lock(), Some(Ok(json!({"ok": 1}))));
    }

    #[test]
    fn channel_receives_error() {
        let (completion, mut rx) = Completion::channel();
        completion.fail(TopologyError::NoConnection);
        assert_eq!(rx.try_recv().unwrap(), Err(TopologyError::NoConnection));
    }

    #[test]
    fn dropped_completion_closes_channel() {
        let (completion, mut rx) = Completion::channel();
        drop(completion);
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn channel_can_be_awaited() {
        let (completion, rx) = Completion::channel();
        std::thread::spawn(move || completion.complete(Ok(json!({"n": 3}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"n": 3}));
    }
}
