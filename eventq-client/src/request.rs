//! Poll request body construction.

use serde_json::Value;

use crate::event::EventBody;

/// Build the next handshake body from the last received ack and the
/// shutdown flag.
///
/// The server expects `ack` to echo the `id` of the previous response
/// (null before any response has been received) and `done` to be true
/// only on the final request of a graceful shutdown.
pub(crate) fn poll_body(ack: Option<i64>, done: bool) -> EventBody {
    let mut map = EventBody::new();
    map.insert(
        "ack".to_string(),
        ack.map(Value::from).unwrap_or(Value::Null),
    );
    map.insert("done".to_string(), Value::Bool(done));
    map
}
