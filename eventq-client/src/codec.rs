//! Structured-data codec seam.
//!
//! The wire format for event queue bodies is LLSD, which lives outside
//! this crate. The driver only needs two operations: serialize a request
//! map, and deserialize a response body into a structured value. Tests
//! substitute a JSON codec; production callers plug in their LLSD
//! implementation.

use serde_json::Value;
use thiserror::Error;

use crate::event::EventBody;

/// Encode/decode between structured-data maps and wire bytes.
pub trait Codec: Send + Sync + 'static {
    /// Serialize a request body map to wire bytes.
    fn serialize(&self, map: &EventBody) -> Result<Vec<u8>, CodecError>;

    /// Deserialize wire bytes into a structured value.
    ///
    /// A successful parse that yields something other than a map is
    /// treated by the driver the same as a parse failure.
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Errors from a [`Codec`] implementation.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The request map could not be serialized.
    #[error("failed to serialize request body: {0}")]
    Serialize(String),

    /// The response bytes could not be parsed.
    #[error("failed to parse response body: {0}")]
    Parse(String),
}
