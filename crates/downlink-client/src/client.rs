//! Streaming client
//!
//! The orchestrator that ties the pieces together:
//! - Drives the connection state machine over a [`Transport`]
//! - Decodes each frame, updates sequence tracking and history
//! - Publishes a fresh [`TelemetryView`] after every change
//!
//! One tokio task owns all mutable state and is the only writer; consumers
//! read immutable views through a `watch` channel.

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::{ClientError, TransportError};
use crate::transport::{InboundFrame, Transport, TransportEvent, TransportStream};
use crate::view::TelemetryView;
use downlink_core::{codec, DecodeError, HistoryBuffer, SequenceObservation, SequenceTracker, Source};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use ulid::Ulid;

/// Unique client identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub Ulid);

impl ClientId {
    /// Generate new client ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client state and the single writer of its published view
#[derive(Debug)]
pub struct StreamingClient {
    id: ClientId,
    config: ClientConfig,
    connection: ConnectionManager,
    tracker: SequenceTracker,
    history: HistoryBuffer,
    source: Option<Source>,
    publisher: watch::Sender<Arc<TelemetryView>>,
}

impl StreamingClient {
    /// Create a client and the receiver its views are published on
    ///
    /// # Errors
    /// `ClientError::Config` if the configuration does not validate
    pub fn new(
        config: ClientConfig,
    ) -> Result<(Self, watch::Receiver<Arc<TelemetryView>>), ClientError> {
        config.validate()?;
        let history = HistoryBuffer::new(config.history_capacity)?;
        let (publisher, views) = watch::channel(Arc::new(TelemetryView::default()));

        let client = Self {
            id: ClientId::new(),
            connection: ConnectionManager::new(config.reconnect_delay()),
            tracker: SequenceTracker::with_policy(config.regression_policy),
            history,
            source: None,
            publisher,
            config,
        };
        Ok((client, views))
    }

    /// Create a client and run it on a new tokio task
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `ClientError::Config` if the configuration does not validate
    pub fn spawn<T: Transport>(config: ClientConfig, transport: T) -> Result<ClientHandle, ClientError> {
        let (client, views) = Self::new(config)?;
        let id = client.id;
        let (shutdown, shutdown_rx) = watch::channel(false);

        let span = tracing::info_span!("downlink", client = %id, endpoint = %client.config.endpoint);
        let task = tokio::spawn(client.run(transport, shutdown_rx).instrument(span));

        Ok(ClientHandle {
            id,
            views,
            shutdown,
            task: Some(task),
        })
    }

    /// Apply one inbound frame
    ///
    /// A frame that fails to decode is logged and dropped; tracker, history
    /// and the published view are left untouched.
    ///
    /// # Errors
    /// The `DecodeError` for a malformed frame
    pub fn handle_frame(&mut self, frame: &InboundFrame) -> Result<SequenceObservation, DecodeError> {
        let envelope = match codec::decode(&frame.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(error = %err, bytes = frame.payload.len(), "failed to parse telemetry");
                return Err(err);
            }
        };

        let observation = self.tracker.observe(&envelope, frame.received_at_ms);
        self.source = Some(envelope.source);
        let sequence = envelope.sequence_number;
        self.history.append(Arc::new(envelope.into_sample()));

        tracing::debug!(
            sequence,
            latency_ms = observation.latency_ms,
            history = self.history.len(),
            "telemetry applied"
        );
        self.publish();
        Ok(observation)
    }

    async fn run<T: Transport>(mut self, transport: T, mut shutdown: watch::Receiver<bool>) {
        let endpoint = self.config.endpoint.clone();

        if let Err(err) = self.connection.begin_connect() {
            tracing::error!(error = %err, "client could not start");
            return;
        }

        loop {
            self.publish();
            tracing::info!(attempt = self.connection.connect_attempts(), "connecting to telemetry stream");

            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                outcome = self.connect(&transport, &endpoint) => Some(outcome),
            };
            let Some(outcome) = outcome else { break };

            let scheduled = match outcome {
                Ok(mut stream) => {
                    if let Err(err) = self.connection.opened() {
                        tracing::error!(error = %err, "unexpected open");
                        stream.close().await;
                        break;
                    }
                    tracing::info!("connected to spacecraft telemetry stream");
                    self.publish();

                    match self.pump(stream.as_mut(), &mut shutdown).await {
                        Some(err) => {
                            tracing::warn!(error = %err, "connection lost");
                            self.connection.closed()
                        }
                        None => {
                            stream.close().await;
                            break;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "connection attempt failed");
                    self.connection.connect_failed()
                }
            };

            let timer = match scheduled {
                Ok(timer) => timer,
                Err(err) => {
                    tracing::error!(error = %err, "could not schedule reconnect");
                    break;
                }
            };
            tracing::info!(
                delay_ms = u64::try_from(timer.delay.as_millis()).unwrap_or(u64::MAX),
                "reconnect scheduled"
            );
            self.publish();

            let fired = tokio::select! {
                biased;
                _ = shutdown.changed() => false,
                () = tokio::time::sleep(timer.delay) => true,
            };
            if !fired {
                break;
            }
            match self.connection.timer_fired(timer.id) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!(timer = timer.id.0, "reconnect timer no longer outstanding");
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, "reconnect rejected");
                    break;
                }
            }
        }

        if let Some(timer) = self.connection.shutdown() {
            tracing::debug!(timer = timer.0, "cancelled pending reconnect");
        }
        self.publish();
        tracing::info!("client stopped");
    }

    async fn connect<T: Transport>(
        &self,
        transport: &T,
        endpoint: &str,
    ) -> Result<Box<dyn TransportStream>, TransportError> {
        match self.config.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, transport.connect(endpoint))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => transport.connect(endpoint).await,
        }
    }

    /// Receive until the stream closes (`Some`) or shutdown is requested (`None`)
    async fn pump(
        &mut self,
        stream: &mut dyn TransportStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<TransportError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                event = stream.next_event() => Some(event),
            };

            match event? {
                TransportEvent::Frame(frame) => {
                    // Decode failures are already logged; the session continues
                    let _ = self.handle_frame(&frame);
                }
                TransportEvent::Warning(err) => {
                    tracing::warn!(error = %err, "transport warning");
                }
                TransportEvent::Closed(err) => return Some(err),
            }
        }
    }

    fn publish(&self) {
        let view = TelemetryView {
            latest: self.history.latest().cloned(),
            history: self.history.snapshot().into(),
            is_connected: self.connection.is_connected(),
            phase: self.connection.phase(),
            latency_ms: self.tracker.latency_ms(),
            packets_lost: self.tracker.packets_lost(),
            last_sequence: self.tracker.last_sequence(),
            source: self.source,
            reconnects: self.connection.reconnects(),
        };
        self.publisher.send_replace(Arc::new(view));
    }

    /// Client identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection state machine
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Sequence tracker
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// History buffer
    #[inline]
    #[must_use]
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }
}

/// Handle to a running client
///
/// Dropping the handle without calling [`ClientHandle::shutdown`] aborts the
/// run loop task.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    views: watch::Receiver<Arc<TelemetryView>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ClientHandle {
    /// Client identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Latest published view
    #[inline]
    #[must_use]
    pub fn view(&self) -> Arc<TelemetryView> {
        Arc::clone(&self.views.borrow())
    }

    /// Independent receiver for the published views
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetryView>> {
        self.views.clone()
    }

    /// Wait for the next published view
    ///
    /// Returns `None` once the client has stopped publishing.
    pub async fn changed(&mut self) -> Option<Arc<TelemetryView>> {
        self.views.changed().await.ok()?;
        Some(Arc::clone(&self.views.borrow_and_update()))
    }

    /// Wait until a published view satisfies `predicate`
    ///
    /// Returns `None` if the client stops first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&TelemetryView) -> bool,
    ) -> Option<Arc<TelemetryView>> {
        self.views
            .wait_for(|view| predicate(view))
            .await
            .ok()
            .map(|view| Arc::clone(&view))
    }

    /// Whether the run loop is still active
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the client; idempotent
    ///
    /// Cancels any pending reconnect timer, closes the live connection and
    /// waits for the run loop to finish.
    ///
    /// # Errors
    /// `ClientError::TaskFailed` if the run loop panicked
    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        // Fails only if the loop already exited
        let _ = self.shutdown.send(true);
        task.await
            .map_err(|e| ClientError::TaskFailed(e.to_string()))
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
