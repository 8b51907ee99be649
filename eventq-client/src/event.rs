//! Event types decoded from queue responses.

use serde::Serialize;
use serde_json::Value;

/// A structured-data map, as carried by event payloads and request bodies.
pub type EventBody = serde_json::Map<String, Value>;

/// One event pulled from a queue response batch.
///
/// Transient by design: constructed from a response, handed to the sink,
/// then discarded. The driver never retains or deduplicates events.
/// Serializable so consumers can log or persist events they care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEvent {
    /// The event name, e.g. `"TeleportProgress"`.
    pub name: String,
    /// The event payload map.
    pub body: EventBody,
}
