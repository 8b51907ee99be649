//! Long-poll capability event queue client.
//!
//! Virtual-world servers push asynchronous notifications (object updates,
//! chat, teleport progress) to clients through a per-session capability
//! URL using a pull-style long-poll protocol: POST a handshake body, wait
//! for the server to answer with a batch of events and an ack id, echo
//! the ack on the next POST, repeat for the lifetime of the session.
//!
//! # Protocol
//!
//! ```text
//! ┌──────────┐                                    ┌──────────┐
//! │  Client  │                                    │   Grid   │
//! └────┬─────┘                                    └────┬─────┘
//!      │  POST {ack: null, done: false}                │
//!      │ ─────────────────────────────────────────────►│
//!      │          ... (held open, up to 60s) ...       │
//!      │  200 {events: [{message, body}...], id: N}    │
//!      │ ◄─────────────────────────────────────────────│
//!      │  POST {ack: N, done: false}                   │
//!      │ ─────────────────────────────────────────────►│
//!      │                    ...                        │
//!      │  POST {ack: M, done: true}     (shutdown)     │
//!      │ ─────────────────────────────────────────────►│
//! ```
//!
//! The hard part is not the happy path but staying correctly connected
//! across an unreliable, proxy-fronted transport: 502s are routine proxy
//! churn to be ignored, 404/410 mean the capability is gone for good,
//! 500 is the grid's way of asking the client to close, and everything
//! unrecognized gets a capped, escalating retry backoff. The policy table
//! lives in the response classifier; [`EventQueueClient`] drives it.
//!
//! Transport and wire-format concerns stay behind seams: HTTP POST via
//! [`caps_transport::Transport`], LLSD encoding via [`Codec`].

mod classify;
mod config;
mod driver;
mod request;

pub mod codec;
pub mod error;
pub mod event;
pub mod sink;

pub use codec::{Codec, CodecError};
pub use config::EventQueueConfig;
pub use driver::EventQueueClient;
pub use error::{EventQueueError, Result};
pub use event::{EventBody, QueueEvent};
pub use sink::EventSink;

/// Content type for event queue request bodies.
pub const LLSD_XML_CONTENT_TYPE: &str = "application/llsd+xml";
