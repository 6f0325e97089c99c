//! Line-event log relay.
//!
//! The engine reports what it is doing (registrations, resolutions,
//! downloads, deletions of damaged binaries) as plain text lines. Hosts
//! that want to surface these in their own log UI subscribe a callback;
//! when nobody has subscribed, lines fall back to the `tracing` console
//! sink so they are never silently lost.

use std::sync::RwLock;

use tracing::debug;

/// Callback invoked for every emitted log line.
pub type LogSubscriber = Box<dyn Fn(&str) + Send + Sync>;

/// Fire-and-forget relay for line-structured log events.
///
/// Emission is infallible and performs no I/O of its own: subscribers are
/// invoked synchronously on the emitting thread and are expected to return
/// quickly. A panicking subscriber is contained; it never unwinds into the
/// emitting code. With zero subscribers, lines are mirrored to `tracing`
/// at debug level instead.
#[derive(Default)]
pub struct LogRelay {
    subscribers: RwLock<Vec<LogSubscriber>>,
}

impl LogRelay {
    /// Create a relay with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber that receives every subsequent line.
    pub fn subscribe(&self, subscriber: impl Fn(&str) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(subscriber));
    }

    /// Emit a line to all subscribers, or to `tracing` if there are none.
    pub fn emit(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if subscribers.is_empty() {
            debug!(target: "lodestone", "{line}");
            return;
        }
        for subscriber in subscribers.iter() {
            // A misbehaving subscriber must not take resolution down with it.
            let caught =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| subscriber(line)));
            if caught.is_err() {
                debug!(target: "lodestone", "log subscriber panicked, dropping it for this line");
            }
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for LogRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogRelay")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let relay = LogRelay::new();
        relay.emit("nobody is listening");
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[test]
    fn subscribers_receive_lines_in_order() {
        let relay = LogRelay::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        relay.subscribe(move |line| sink.lock().unwrap().push(line.to_string()));

        relay.emit("first");
        relay.emit("second");

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn panicking_subscriber_does_not_unwind_into_emit() {
        let relay = LogRelay::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        relay.subscribe(|_| panic!("bad subscriber"));
        relay.subscribe(move |line| sink.lock().unwrap().push(line.to_string()));

        relay.emit("still delivered");

        // Emission completed and the well-behaved subscriber still saw
        // the line.
        assert_eq!(*seen.lock().unwrap(), vec!["still delivered"]);
    }

    #[test]
    fn multiple_subscribers_all_notified() {
        let relay = LogRelay::new();
        let a = Arc::new(Mutex::new(0_u32));
        let b = Arc::new(Mutex::new(0_u32));
        let (ca, cb) = (Arc::clone(&a), Arc::clone(&b));
        relay.subscribe(move |_| *ca.lock().unwrap() += 1);
        relay.subscribe(move |_| *cb.lock().unwrap() += 1);

        relay.emit("hello");

        assert_eq!(*a.lock().unwrap(), 1);
        assert_eq!(*b.lock().unwrap(), 1);
        assert_eq!(relay.subscriber_count(), 2);
    }
}
