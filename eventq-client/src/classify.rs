//! Response classification: the status-code policy table.
//!
//! One completed round trip maps to exactly one [`Verdict`], consumed
//! uniformly by the driver's resume routine. The status-code mapping
//! encodes a specific grid server contract (notably the 500-means-close
//! and 502-is-benign rules) and must not be generalized to ordinary HTTP
//! semantics.

use std::fmt;

use caps_transport::PollOutcome;
use serde_json::Value;
use url::Url;

use crate::codec::Codec;
use crate::event::QueueEvent;

/// How a round trip affects the consecutive-error streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreakEffect {
    /// A decodable body arrived; the streak resets to zero.
    Reset,
    /// The round trip neither failed nor fully succeeded; streak unchanged.
    Keep,
    /// A failed or unrecognized round trip; backoff escalates.
    Increment,
}

/// Events and ack extracted from one successful response.
#[derive(Debug, PartialEq)]
pub(crate) struct EventBatch {
    pub events: Vec<QueueEvent>,
    /// The new ack id to echo on the next request, if the server sent one.
    pub ack: Option<i64>,
}

/// Why the channel is closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// 404 or 410: the capability URI no longer exists.
    CapabilityGone(u16),
    /// 499: non-standard status observed for grid-side HTTP-out timeouts.
    HttpOutTimeout,
    /// 500: by grid convention, a server request to close the client.
    ServerRequestedClose,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityGone(status) => {
                write!(f, "capability URI no longer exists (HTTP {status})")
            }
            Self::HttpOutTimeout => write!(f, "HTTP-out timeout (status 499)"),
            Self::ServerRequestedClose => write!(f, "server requested close (HTTP 500)"),
        }
    }
}

/// The classifier's decision for one completed round trip.
#[derive(Debug, PartialEq)]
pub(crate) enum Verdict {
    /// Keep polling.
    Continue {
        streak: StreakEffect,
        batch: Option<EventBatch>,
    },
    /// Local cancellation or connection churn: resume without any
    /// bookkeeping at all.
    Ignore,
    /// Stop polling permanently.
    Close(CloseReason),
}

/// Map one round-trip outcome to a verdict.
///
/// Statuses are inspected before bodies: an error status closes or
/// escalates regardless of what the server attached to it. Bodies are
/// only decoded for success statuses.
pub(crate) fn classify(outcome: PollOutcome, codec: &dyn Codec, endpoint: &Url) -> Verdict {
    match outcome {
        PollOutcome::Failed(error) if error.is_benign() => {
            tracing::debug!("transport cancelled or reset at {endpoint}: {error}");
            Verdict::Ignore
        }
        PollOutcome::Failed(error) => {
            tracing::warn!("unrecognized caps connection problem at {endpoint}: {error}");
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        }
        PollOutcome::Response { status, body } => match status {
            404 | 410 => {
                tracing::info!("closing event queue at {endpoint} due to missing caps URI");
                Verdict::Close(CloseReason::CapabilityGone(status))
            }
            499 => {
                tracing::debug!("possible HTTP-out timeout error from {endpoint}");
                Verdict::Close(CloseReason::HttpOutTimeout)
            }
            500 => {
                // The grid uses 500 as a request to close the client. Any
                // detail the server attached is diagnostic only.
                if !body.is_empty() {
                    tracing::warn!(
                        "server close request from {endpoint} carried detail: {}",
                        String::from_utf8_lossy(&body)
                    );
                }
                tracing::debug!("grid sent a 500 at {endpoint}, closing connection");
                Verdict::Close(CloseReason::ServerRequestedClose)
            }
            502 => {
                // The event queue server fronts a cache proxy that times out
                // periodically and surfaces it as a 502. Expected; not an
                // error.
                tracing::debug!(
                    "bad gateway from {endpoint}, likely an upstream poll timeout; continuing"
                );
                Verdict::Continue {
                    streak: StreakEffect::Keep,
                    batch: None,
                }
            }
            status if (200..300).contains(&status) => {
                if body.is_empty() {
                    tracing::warn!(
                        "no response from the event queue but no reported error either"
                    );
                    return Verdict::Continue {
                        streak: StreakEffect::Increment,
                        batch: None,
                    };
                }
                match codec.deserialize(&body) {
                    Ok(Value::Object(map)) => Verdict::Continue {
                        streak: StreakEffect::Reset,
                        batch: Some(extract_batch(&map)),
                    },
                    Ok(_) | Err(_) => {
                        tracing::warn!(
                            "got an unparseable response from the event queue: {:?}",
                            String::from_utf8_lossy(&body)
                        );
                        Verdict::Continue {
                            streak: StreakEffect::Keep,
                            batch: None,
                        }
                    }
                }
            }
            status => {
                tracing::warn!("unrecognized caps connection problem at {endpoint}: HTTP {status}");
                Verdict::Continue {
                    streak: StreakEffect::Increment,
                    batch: None,
                }
            }
        },
    }
}

/// Pull the `events` list and `id` ack out of a decoded response map.
///
/// A missing or zero `id` means no ack update. Malformed entries in the
/// events list are skipped; server-supplied order is preserved.
fn extract_batch(map: &serde_json::Map<String, Value>) -> EventBatch {
    let ack = map.get("id").and_then(Value::as_i64).filter(|id| *id != 0);

    let mut events = Vec::new();
    if let Some(Value::Array(items)) = map.get("events") {
        for item in items {
            match parse_event(item) {
                Some(event) => events.push(event),
                None => tracing::warn!("skipping malformed event queue entry: {item}"),
            }
        }
    }

    EventBatch { events, ack }
}

fn parse_event(item: &Value) -> Option<QueueEvent> {
    let entry = item.as_object()?;
    let name = entry.get("message")?.as_str()?.to_string();
    let body = entry.get("body")?.as_object()?.clone();
    Some(QueueEvent { name, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::event::EventBody;
    use bytes::Bytes;
    use caps_transport::TransportError;
    use serde_json::json;

    struct JsonCodec;

    impl Codec for JsonCodec {
        fn serialize(&self, map: &EventBody) -> Result<Vec<u8>, CodecError> {
            serde_json::to_vec(map).map_err(|e| CodecError::Serialize(e.to_string()))
        }

        fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
            serde_json::from_slice(bytes).map_err(|e| CodecError::Parse(e.to_string()))
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://sim.example.com/cap/event-queue").unwrap()
    }

    fn response(status: u16, body: &str) -> PollOutcome {
        PollOutcome::Response {
            status,
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    fn run(outcome: PollOutcome) -> Verdict {
        classify(outcome, &JsonCodec, &endpoint())
    }

    #[test]
    fn test_decodable_body_resets_streak_and_extracts_batch() {
        let body = json!({
            "events": [
                {"message": "ChatterBoxInvitation", "body": {"from": "a"}},
                {"message": "TeleportProgress", "body": {}},
            ],
            "id": 12,
        })
        .to_string();

        match run(response(200, &body)) {
            Verdict::Continue {
                streak: StreakEffect::Reset,
                batch: Some(batch),
            } => {
                assert_eq!(batch.ack, Some(12));
                assert_eq!(batch.events.len(), 2);
                assert_eq!(batch.events[0].name, "ChatterBoxInvitation");
                assert_eq!(batch.events[1].name, "TeleportProgress");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_empty_batch_still_resets_streak() {
        let body = json!({"events": [], "id": 3}).to_string();
        match run(response(200, &body)) {
            Verdict::Continue {
                streak: StreakEffect::Reset,
                batch: Some(batch),
            } => {
                assert!(batch.events.is_empty());
                assert_eq!(batch.ack, Some(3));
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_body_continues_without_counting() {
        let verdict = run(response(200, "<not structured data>"));
        assert_eq!(
            verdict,
            Verdict::Continue {
                streak: StreakEffect::Keep,
                batch: None,
            }
        );
    }

    #[test]
    fn test_non_map_body_is_treated_as_unparseable() {
        let verdict = run(response(200, "[1, 2, 3]"));
        assert_eq!(
            verdict,
            Verdict::Continue {
                streak: StreakEffect::Keep,
                batch: None,
            }
        );
    }

    #[test]
    fn test_cancelled_and_reset_are_ignored() {
        assert_eq!(
            run(PollOutcome::Failed(TransportError::Cancelled)),
            Verdict::Ignore
        );
        assert_eq!(
            run(PollOutcome::Failed(TransportError::ConnectionReset)),
            Verdict::Ignore
        );
    }

    #[test]
    fn test_gone_statuses_close_the_channel() {
        assert_eq!(
            run(response(404, "")),
            Verdict::Close(CloseReason::CapabilityGone(404))
        );
        assert_eq!(
            run(response(410, "")),
            Verdict::Close(CloseReason::CapabilityGone(410))
        );
    }

    #[test]
    fn test_499_closes_the_channel() {
        assert_eq!(
            run(response(499, "")),
            Verdict::Close(CloseReason::HttpOutTimeout)
        );
    }

    #[test]
    fn test_500_closes_even_with_detail_body() {
        assert_eq!(
            run(response(500, "upstream exploded")),
            Verdict::Close(CloseReason::ServerRequestedClose)
        );
    }

    #[test]
    fn test_502_is_benign_and_uncounted() {
        assert_eq!(
            run(response(502, "")),
            Verdict::Continue {
                streak: StreakEffect::Keep,
                batch: None,
            }
        );
    }

    #[test]
    fn test_unrecognized_status_escalates() {
        assert_eq!(
            run(response(418, "")),
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        );
        assert_eq!(
            run(response(301, "")),
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        );
    }

    #[test]
    fn test_transport_error_without_status_escalates() {
        assert_eq!(
            run(PollOutcome::Failed(TransportError::Timeout)),
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        );
        assert_eq!(
            run(PollOutcome::Failed(TransportError::Other("tls".into()))),
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        );
    }

    #[test]
    fn test_success_with_empty_body_escalates() {
        assert_eq!(
            run(response(200, "")),
            Verdict::Continue {
                streak: StreakEffect::Increment,
                batch: None,
            }
        );
    }

    #[test]
    fn test_zero_or_missing_id_means_no_ack_update() {
        let body = json!({"events": [], "id": 0}).to_string();
        match run(response(200, &body)) {
            Verdict::Continue {
                batch: Some(batch), ..
            } => assert_eq!(batch.ack, None),
            other => panic!("unexpected verdict: {other:?}"),
        }

        let body = json!({"events": []}).to_string();
        match run(response(200, &body)) {
            Verdict::Continue {
                batch: Some(batch), ..
            } => assert_eq!(batch.ack, None),
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_entries_are_skipped_order_preserved() {
        let body = json!({
            "events": [
                {"message": "First", "body": {}},
                {"message": 17, "body": {}},
                "not even a map",
                {"message": "Last", "body": {"n": 2}},
            ],
            "id": 9,
        })
        .to_string();

        match run(response(200, &body)) {
            Verdict::Continue {
                batch: Some(batch), ..
            } => {
                let names: Vec<_> = batch.events.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["First", "Last"]);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }
}
