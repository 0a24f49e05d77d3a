// Connection manager: keeps at most one push subscription live or pending,
// and retries with a fixed delay after every failure until stopped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{PushStream, PushTransport, TransportError};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, never started.
    Idle,
    /// An open attempt is in flight.
    Connecting,
    /// A subscription is live.
    Open,
    /// The last attempt or subscription failed; waiting out the retry delay.
    Retrying,
    /// Stopped. Nothing happens until the next `start`.
    Closed,
}

/// What the manager reports back to the engine loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A subscription was established. `resumed` is true when it ends an
    /// outage: anything pushed while we were down is gone for good.
    Opened { resumed: bool },
    /// A raw message payload from the live subscription.
    Message(String),
    /// The attempt or subscription failed; a retry is scheduled.
    Lost(TransportError),
}

type OpenAttempt = BoxFuture<'static, Result<PushStream, TransportError>>;

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    retry_delay: Duration,
    credential: Option<String>,
    state: ConnectionState,
    /// Pending open. Mutually exclusive with `stream`.
    attempt: Option<OpenAttempt>,
    stream: Option<PushStream>,
    /// The single retry timer. `None` whenever no retry is scheduled.
    retry_at: Option<Instant>,
    /// Set on entering `Retrying`, consumed by the next successful open.
    in_outage: bool,
    consecutive_failures: u32,
    connected: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, retry_delay: Duration) -> Self {
        let (connected, _) = watch::channel(false);
        ConnectionManager {
            transport,
            retry_delay,
            credential: None,
            state: ConnectionState::Idle,
            attempt: None,
            stream: None,
            retry_at: None,
            in_outage: false,
            consecutive_failures: 0,
            connected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Subscribe to the connected/disconnected signal.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Begin connecting with `credential`. Whatever was live, pending or
    /// scheduled before is torn down first, so calling this repeatedly is safe.
    pub fn start(&mut self, credential: Option<String>) {
        self.credential = credential;
        self.restart();
    }

    /// `start` again with the credential from the last `start`.
    pub fn restart(&mut self) {
        let previous = self.state;
        self.teardown();
        info!(?previous, "Opening push subscription");
        self.begin_attempt();
    }

    /// `restart`, but the next open is never reported as a resumption. For
    /// callers that already refresh everything themselves.
    pub fn restart_fresh(&mut self) {
        self.in_outage = false;
        self.restart();
    }

    /// Tear everything down and cancel any scheduled retry.
    pub fn stop(&mut self) {
        self.teardown();
        self.in_outage = false;
        self.consecutive_failures = 0;
        self.state = ConnectionState::Closed;
        info!("Push subscription stopped");
    }

    /// Drive the state machine until there is something to report.
    ///
    /// Cancel-safe: every in-flight piece (the open attempt, the stream, the
    /// retry deadline) lives on `self`, so dropping this future inside a
    /// `tokio::select!` loses nothing. Pends forever while `Idle` or `Closed`.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            match self.state {
                ConnectionState::Idle | ConnectionState::Closed => {
                    return std::future::pending().await;
                }
                ConnectionState::Retrying => {
                    let Some(deadline) = self.retry_at else {
                        self.begin_attempt();
                        continue;
                    };
                    tokio::time::sleep_until(deadline).await;
                    debug!("Retry delay elapsed");
                    self.begin_attempt();
                }
                ConnectionState::Connecting => {
                    let Some(attempt) = self.attempt.as_mut() else {
                        self.begin_attempt();
                        continue;
                    };
                    let result = attempt.await;
                    self.attempt = None;

                    match result {
                        Ok(stream) => {
                            self.stream = Some(stream);
                            self.state = ConnectionState::Open;
                            self.consecutive_failures = 0;
                            let resumed = std::mem::take(&mut self.in_outage);
                            self.set_connected(true);
                            info!(resumed, "Push subscription open");
                            return ConnectionEvent::Opened { resumed };
                        }
                        Err(err) => {
                            self.fail(&err);
                            return ConnectionEvent::Lost(err);
                        }
                    }
                }
                ConnectionState::Open => {
                    let Some(stream) = self.stream.as_mut() else {
                        self.fail(&TransportError::Closed);
                        return ConnectionEvent::Lost(TransportError::Closed);
                    };
                    let item = stream.next().await;

                    match item {
                        Some(Ok(raw)) => return ConnectionEvent::Message(raw),
                        Some(Err(err)) => {
                            self.fail(&err);
                            return ConnectionEvent::Lost(err);
                        }
                        None => {
                            self.fail(&TransportError::Closed);
                            return ConnectionEvent::Lost(TransportError::Closed);
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn begin_attempt(&mut self) {
        self.retry_at = None;
        let transport = Arc::clone(&self.transport);
        let credential = self.credential.clone();
        self.attempt = Some(Box::pin(async move {
            transport.open(credential.as_deref()).await
        }));
        self.state = ConnectionState::Connecting;
    }

    fn teardown(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed live push subscription");
        }
        if self.attempt.take().is_some() {
            debug!("Abandoned pending connection attempt");
        }
        self.retry_at = None;
        self.set_connected(false);
    }

    fn fail(&mut self, err: &TransportError) {
        self.stream = None;
        self.attempt = None;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.in_outage = true;
        self.retry_at = Some(Instant::now() + self.retry_delay);
        self.state = ConnectionState::Retrying;
        self.set_connected(false);
        warn!(
            error = %err,
            failures = self.consecutive_failures,
            retry_in_ms = self.retry_delay.as_millis() as u64,
            "Push subscription lost, retrying"
        );
    }

    fn set_connected(&self, value: bool) {
        self.connected.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
