//! Publish-only telemetry events emitted by the pipeline and finalizer.
//!
//! No UI runtime sits above this core, so the usual "fire and forget named
//! payload" shape is captured behind a trait instead of a direct app-handle
//! emit.

use serde_json::Value;
use std::sync::mpsc::Sender;

/// A named event with a JSON payload, e.g. `index.indexing {hash, size, name, root, base}`.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: &'static str,
    pub fields: Value,
}

pub trait EventSink: Send + Sync {
    fn publish(&self, name: &'static str, fields: Value);
}

/// Discards every event. Used in tests and anywhere telemetry isn't wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _name: &'static str, _fields: Value) {}
}

/// Forwards events across a channel to whatever telemetry consumer is on the
/// other end (a logging thread, a UI bridge, a metrics exporter).
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: Sender<Event>,
}

impl ChannelEventSink {
    pub fn new(tx: Sender<Event>) -> Self {
        ChannelEventSink { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, name: &'static str, fields: Value) {
        // A disconnected receiver just means nobody is listening; not an error
        // the indexing core should care about.
        let _ = self.tx.send(Event { name, fields });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc::channel;

    #[test]
    fn null_sink_accepts_any_event() {
        let sink = NullEventSink;
        sink.publish("index.indexing", json!({"size": 10}));
    }

    #[test]
    fn channel_sink_forwards_published_events() {
        let (tx, rx) = channel();
        let sink = ChannelEventSink::new(tx);
        sink.publish("count.photos", json!({"count": 1}));
        let received = rx.recv().unwrap();
        assert_eq!(received.name, "count.photos");
        assert_eq!(received.fields, json!({"count": 1}));
    }

    #[test]
    fn channel_sink_publish_does_not_panic_after_receiver_dropped() {
        let (tx, rx) = channel();
        let sink = ChannelEventSink::new(tx);
        drop(rx);
        sink.publish("count.files", json!({"count": 1}));
    }
}
