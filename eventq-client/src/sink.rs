//! The owner-facing event sink and panic-isolated dispatch.

use std::panic::{self, AssertUnwindSafe};

use crate::event::{EventBody, QueueEvent};

/// Receiver for channel notifications.
///
/// Implementations run synchronously inside the driver's completion
/// handling, so they should return quickly. A panicking sink is caught
/// and logged; it never breaks the channel or suppresses later events.
pub trait EventSink: Send + Sync + 'static {
    /// Called once, after the first request has been accepted by the
    /// transport.
    fn on_connected(&self) {}

    /// Called once per decoded event, in server-supplied order.
    fn on_event(&self, name: &str, body: &EventBody);
}

pub(crate) fn dispatch_connected(sink: &dyn EventSink) {
    tracing::debug!("capabilities event queue connected");
    if panic::catch_unwind(AssertUnwindSafe(|| sink.on_connected())).is_err() {
        tracing::error!("connected callback panicked; continuing");
    }
}

/// Deliver a batch to the sink, one event at a time. A panic from one
/// delivery does not interrupt the remainder of the batch.
pub(crate) fn dispatch_batch(sink: &dyn EventSink, events: &[QueueEvent]) {
    for event in events {
        if panic::catch_unwind(AssertUnwindSafe(|| sink.on_event(&event.name, &event.body)))
            .is_err()
        {
            tracing::error!(
                event = %event.name,
                "event callback panicked; continuing with remaining events"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PanickySink {
        seen: Mutex<Vec<String>>,
    }

    impl EventSink for PanickySink {
        fn on_event(&self, name: &str, _body: &EventBody) {
            self.seen.lock().unwrap().push(name.to_string());
            if name == "boom" {
                panic!("subscriber misbehaved");
            }
        }
    }

    fn event(name: &str) -> QueueEvent {
        QueueEvent {
            name: name.to_string(),
            body: EventBody::new(),
        }
    }

    #[test]
    fn test_panic_does_not_stop_batch_delivery() {
        let sink = PanickySink {
            seen: Mutex::new(Vec::new()),
        };
        let batch = vec![event("a"), event("boom"), event("c")];

        dispatch_batch(&sink, &batch);

        let seen = sink.seen.lock().unwrap();
        assert_eq!(*seen, vec!["a", "boom", "c"]);
    }

    #[test]
    fn test_connected_panic_is_contained() {
        struct Sink;
        impl EventSink for Sink {
            fn on_connected(&self) {
                panic!("bad subscriber");
            }
            fn on_event(&self, _: &str, _: &EventBody) {}
        }

        // Must not propagate.
        dispatch_connected(&Sink);
    }
}
