//! The event channel driver: session lifecycle and the long-poll loop.
//!
//! One background task owns the poll cycle; `start`/`stop`/`is_running`
//! may be called from any thread. All session state lives behind a single
//! mutex that is never held across an await point, so an immediate stop
//! is never blocked behind a backoff sleep or an open request.

use std::sync::{Arc, Mutex, MutexGuard};

use caps_transport::{OpenedSignal, PollOutcome, PollRequest, Transport, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::classify::{classify, StreakEffect, Verdict};
use crate::codec::Codec;
use crate::config::EventQueueConfig;
use crate::error::{EventQueueError, Result};
use crate::request::poll_body;
use crate::sink::{dispatch_batch, dispatch_connected, EventSink};
use crate::LLSD_XML_CONTENT_TYPE;

/// Shared session state, guarded by one mutex.
#[derive(Debug)]
struct SessionState {
    /// A request is in flight or about to be issued.
    running: bool,
    /// A close has been requested; the next request carries `done=true`.
    shutting_down: bool,
    /// Consecutive failed round trips, driving the backoff delay.
    error_streak: u32,
    /// The last server-acknowledged id, echoed on the next request.
    last_ack: Option<i64>,
}

struct Inner {
    endpoint: Url,
    config: EventQueueConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    sink: Arc<dyn EventSink>,
    state: Mutex<SessionState>,
    /// Set to true to abort the in-flight request during an immediate stop.
    abort_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock_state(&self) -> Option<MutexGuard<'_, SessionState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::error!("session state lock poisoned");
                None
            }
        }
    }
}

/// Long-poll client for one capability event queue endpoint.
///
/// Bound to a single endpoint for its lifetime. At most one request is
/// outstanding at any time: a new request is only issued from `start` or
/// from the completion handling of the previous one.
///
/// # Example
///
/// ```rust,ignore
/// use eventq_client::{EventQueueClient, EventQueueConfig, EventSink, EventBody};
/// use caps_transport::HttpTransport;
/// use std::sync::Arc;
///
/// struct Printer;
/// impl EventSink for Printer {
///     fn on_event(&self, name: &str, body: &EventBody) {
///         println!("{name}: {body:?}");
///     }
/// }
///
/// let client = EventQueueClient::new(
///     "https://sim.example.com/cap/event-queue".parse()?,
///     Arc::new(HttpTransport::new()),
///     Arc::new(MyLlsdCodec),
///     Arc::new(Printer),
/// )?;
/// client.start()?;
/// // ... later:
/// client.stop(false);
/// ```
pub struct EventQueueClient {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventQueueClient {
    /// Create a client with default configuration.
    pub fn new(
        endpoint: Url,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        Self::with_config(endpoint, transport, codec, sink, EventQueueConfig::default())
    }

    /// Create a client with custom configuration.
    pub fn with_config(
        endpoint: Url,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        sink: Arc<dyn EventSink>,
        config: EventQueueConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (abort_tx, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                transport,
                codec,
                sink,
                state: Mutex::new(SessionState {
                    running: false,
                    shutting_down: false,
                    error_streak: 0,
                    last_ack: None,
                }),
                abort_tx,
            }),
            task: Mutex::new(None),
        })
    }

    /// Start polling. The driver must be idle: never started, or fully
    /// drained after a stop or a server-initiated close.
    ///
    /// Resets the ack state, the error streak, and the shutdown flag.
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock().map_err(|_| EventQueueError::LockPoisoned)?;
        if let Some(handle) = task.as_ref() {
            // A graceful shutdown keeps the task alive until the final
            // handshake completes; starting during that window would put
            // two requests in flight on one endpoint.
            if !handle.is_finished() {
                return Err(EventQueueError::NotIdle);
            }
        }

        {
            let mut state = self
                .inner
                .state
                .lock()
                .map_err(|_| EventQueueError::LockPoisoned)?;
            *state = SessionState {
                running: true,
                shutting_down: false,
                error_streak: 0,
                last_ack: None,
            };
        }
        self.inner.abort_tx.send_replace(false);

        *task = Some(tokio::spawn(poll_task(Arc::clone(&self.inner))));
        Ok(())
    }

    /// Request shutdown.
    ///
    /// With `immediate` set, the in-flight request is aborted and no
    /// further requests are issued; `is_running` is false on return.
    /// Otherwise the channel keeps polling until it has sent one more
    /// request carrying `done=true`, letting the server release its
    /// resources, then stops itself.
    pub fn stop(&self, immediate: bool) {
        let Ok(mut state) = self.inner.state.lock() else {
            tracing::error!("session state lock poisoned during stop");
            return;
        };

        state.shutting_down = true;
        if immediate {
            state.running = false;
            drop(state);
            self.inner.abort_tx.send_replace(true);
        }
    }

    /// Whether the channel is connected (a request is in flight or about
    /// to be issued).
    pub fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.running)
            .unwrap_or(false)
    }

    /// The capability endpoint this client polls.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }
}

impl Drop for EventQueueClient {
    fn drop(&mut self) {
        self.stop(true);
    }
}

/// Resolves when an immediate stop has been requested.
async fn wait_aborted(rx: &mut watch::Receiver<bool>) {
    // The sender lives in Inner, which the poll task keeps alive, so
    // wait_for can only fail after the task itself is gone.
    if rx.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// The long-poll cycle: build, back off, issue, classify, dispatch.
async fn poll_task(inner: Arc<Inner>) {
    let mut abort_rx = inner.abort_tx.subscribe();
    let mut connected_fired = false;

    loop {
        // Build the next request under the lock, then release it for the
        // whole round trip.
        let (body, final_handshake, streak) = {
            let Some(state) = inner.lock_state() else { return };
            if !state.running {
                return;
            }
            (
                poll_body(state.last_ack, state.shutting_down),
                state.shutting_down,
                state.error_streak,
            )
        };

        // Back off after failed round trips so a broken endpoint is not
        // hammered. The sleep races the abort signal, and running is
        // re-checked afterwards, so an immediate stop requested mid-sleep
        // still prevents the next request.
        let delay = inner.config.backoff_delay(streak);
        if !delay.is_zero() {
            tracing::debug!(?delay, streak, "backing off before next event queue request");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_aborted(&mut abort_rx) => {}
            }
            match inner.lock_state() {
                Some(state) if state.running => {}
                _ => return,
            }
        }

        let bytes = match inner.codec.serialize(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("failed to serialize event queue request: {e}");
                if let Some(mut state) = inner.lock_state() {
                    state.running = false;
                    state.shutting_down = true;
                }
                return;
            }
        };

        let request = PollRequest {
            endpoint: inner.endpoint.clone(),
            content_type: LLSD_XML_CONTENT_TYPE,
            body: bytes,
            timeout: inner.config.request_timeout,
        };

        let (opened, mut opened_rx) = OpenedSignal::channel();
        let mut post = inner.transport.post(request, opened);
        let mut opened_pending = !connected_fired;

        if final_handshake {
            // The done marker is on the wire; nothing may follow it.
            if let Some(mut state) = inner.lock_state() {
                state.running = false;
            }
            tracing::debug!("sent event queue shutdown message");
        }

        let outcome = loop {
            tokio::select! {
                outcome = &mut post => break outcome,
                res = &mut opened_rx, if opened_pending => {
                    opened_pending = false;
                    if res.is_ok() {
                        connected_fired = true;
                        dispatch_connected(inner.sink.as_ref());
                    }
                }
                _ = wait_aborted(&mut abort_rx) => {
                    // Dropping the post future aborts the request.
                    break PollOutcome::Failed(TransportError::Cancelled);
                }
            }
        };

        match classify(outcome, inner.codec.as_ref(), &inner.endpoint) {
            Verdict::Close(reason) => {
                tracing::debug!("event queue closed: {reason}");
                if let Some(mut state) = inner.lock_state() {
                    state.running = false;
                    state.shutting_down = true;
                }
                return;
            }
            Verdict::Ignore => {}
            Verdict::Continue { streak, batch } => {
                {
                    let Some(mut state) = inner.lock_state() else { return };
                    match streak {
                        StreakEffect::Reset => state.error_streak = 0,
                        StreakEffect::Keep => {}
                        StreakEffect::Increment => state.error_streak += 1,
                    }
                    if let Some(ack) = batch.as_ref().and_then(|b| b.ack) {
                        state.last_ack = Some(ack);
                    }
                }
                if let Some(batch) = batch {
                    dispatch_batch(inner.sink.as_ref(), &batch.events);
                }
            }
        }
    }
}
