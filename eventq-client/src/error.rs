//! Error types for the event queue client.

use thiserror::Error;

/// Errors surfaced by the event queue client API.
///
/// Note that nothing about a failing *channel* appears here: transport
/// and protocol failures are recovered internally (or close the channel,
/// observable through [`is_running`](crate::EventQueueClient::is_running))
/// and are never surfaced as errors to the caller.
#[derive(Debug, Error)]
pub enum EventQueueError {
    /// `start` was called while a session is active or still draining.
    #[error("event queue is not idle (a session is active or draining)")]
    NotIdle,

    /// Invalid configuration provided.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal synchronization failure.
    #[error("session state lock poisoned")]
    LockPoisoned,
}

/// Result type for event queue operations.
pub type Result<T> = std::result::Result<T, EventQueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EventQueueError::NotIdle;
        assert!(error.to_string().contains("not idle"));

        let error = EventQueueError::Configuration("bad timeout".to_string());
        assert_eq!(error.to_string(), "configuration error: bad timeout");
    }
}
