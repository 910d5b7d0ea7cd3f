use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::SocketConfig;
use crate::conflation::{Outbox, PushOutcome};
use crate::error::ForgeError;
use crate::listener::{ListenerId, ListenerRegistry, EVENT_CLOSE, EVENT_ERROR, EVENT_MESSAGE, EVENT_OPEN};
use crate::model::frame::Frame;
use crate::model::message::{OutboundMessage, Priority};
use crate::model::stats::{SocketStats, TrafficCounters};
use crate::network::backoff::Backoff;
use crate::network::connection::{self, ConnectionHandler, WriterCommand};
use crate::network::state::ConnectionPhase;
use crate::network::transport::{Connector, WsConnector};

/// A WebSocket client that batches, coalesces and reconnects.
///
/// Clones share the same connection and queues. All methods return without
/// waiting on the network; I/O happens on tasks spawned onto the Tokio
/// runtime the manager was created in.
pub struct SocketManager<C: Connector = WsConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for SocketManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SocketManager<WsConnector> {
    /// Create a manager for `url` using the tungstenite transport.
    ///
    /// Must be called from within a Tokio runtime. Does not connect.
    pub fn new(url: &str, config: SocketConfig) -> Result<Self, ForgeError> {
        Self::with_connector(url, config, WsConnector)
    }
}

impl<C: Connector> SocketManager<C> {
    /// Create a manager with a custom transport.
    pub fn with_connector(url: &str, config: SocketConfig, connector: C) -> Result<Self, ForgeError> {
        let url = Url::parse(url)?;
        let runtime =
            Handle::try_current().map_err(|e| ForgeError::RuntimeUnavailable(e.to_string()))?;

        let session = Session {
            phase: ConnectionPhase::Disconnected,
            epoch: 0,
            generation: 0,
            outbox: Outbox::new(&config),
            backoff: Backoff::new(
                config.base_delay(),
                config.max_delay(),
                config.max_reconnect_attempts,
            ),
            writer: None,
            connection: None,
            flush_timer: None,
            reconnect_timer: None,
            counters: TrafficCounters::default(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                config,
                connector: Arc::new(connector),
                runtime,
                session: Mutex::new(session),
                listeners: ListenerRegistry::new(),
            }),
        })
    }

    /// Endpoint this manager dials.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Configuration fixed at construction.
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Open the connection. No-op while already connecting or connected.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the connection for good.
    ///
    /// Cancels pending timers and discards queued messages, buffers and all
    /// listeners. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Queue a message with normal priority.
    pub fn send<T: Serialize>(&self, kind: impl Into<String>, payload: T) -> Result<(), ForgeError> {
        self.send_with_priority(kind, payload, Priority::Normal)
    }

    /// Queue a message. `High` flushes immediately; buffered types are
    /// coalesced whatever their priority.
    pub fn send_with_priority<T: Serialize>(
        &self,
        kind: impl Into<String>,
        payload: T,
        priority: Priority,
    ) -> Result<(), ForgeError> {
        let payload = serde_json::to_value(payload)?;
        self.inner.send(OutboundMessage::new(kind, payload, priority));
        Ok(())
    }

    /// Subscribe to an inbound message type or a lifecycle event
    /// (`open`, `close`, `error`, `message`).
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.on(event, listener)
    }

    /// Remove one registration. Returns false if `id` was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.off(event, id)
    }

    /// Send everything queued now, without waiting for the batch timer.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Coalesce partially filled buffers into the queue.
    pub fn flush_buffers(&self) {
        self.inner.flush_buffers();
    }

    /// True only while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().phase == ConnectionPhase::Connected
    }

    /// Current connection lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.inner.session.lock().phase
    }

    /// Point-in-time snapshot of queues, listeners and traffic counters.
    pub fn stats(&self) -> SocketStats {
        self.inner.stats()
    }
}

struct Inner<C: Connector> {
    url: Url,
    config: SocketConfig,
    connector: Arc<C>,
    runtime: Handle,
    session: Mutex<Session>,
    listeners: ListenerRegistry,
}

/// Mutable connection state. Never held across an await or while
/// listeners run.
struct Session {
    phase: ConnectionPhase,
    /// Bumped by disconnect; timers from an older epoch do nothing
    epoch: u64,
    /// Bumped per dial; callbacks from an older connection do nothing
    generation: u64,
    outbox: Outbox,
    backoff: Backoff,
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
    connection: Option<JoinHandle<()>>,
    flush_timer: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    counters: TrafficCounters,
}

impl<C: Connector> Inner<C> {
    fn connect(self: &Arc<Self>) {
        let mut session = self.session.lock();
        if session.phase.is_active() {
            debug!("connect() ignored, already {}", session.phase);
            return;
        }

        if let Some(timer) = session.reconnect_timer.take() {
            timer.abort();
        }
        self.dial(&mut session);
    }

    fn dial(self: &Arc<Self>, session: &mut Session) {
        session.generation += 1;
        session.phase = ConnectionPhase::Connecting;

        let task = connection::run(
            Arc::clone(&self.connector),
            self.url.clone(),
            Arc::downgrade(self),
            session.generation,
        );
        session.connection = Some(self.runtime.spawn(task));
    }

    fn disconnect(&self) {
        {
            let mut session = self.session.lock();
            session.epoch += 1;
            session.generation += 1;

            if let Some(timer) = session.flush_timer.take() {
                timer.abort();
            }
            if let Some(timer) = session.reconnect_timer.take() {
                timer.abort();
            }

            match session.writer.take() {
                // Let the task send a close frame; it exits on its own
                Some(writer) => {
                    let _ = writer.send(WriterCommand::Close);
                    session.connection = None;
                }
                None => {
                    if let Some(task) = session.connection.take() {
                        task.abort();
                    }
                }
            }

            let discarded = session.outbox.queue_len();
            if discarded > 0 {
                warn!("Disconnect discarded {} queued message(s)", discarded);
            }
            session.outbox.clear();
            session.backoff.reset();
            session.phase = ConnectionPhase::Disconnected;
        }

        self.listeners.clear();
        info!("Disconnected from {}", self.url);
    }

    fn send(self: &Arc<Self>, message: OutboundMessage) {
        let mut session = self.session.lock();
        trace!("send {} ({})", message.kind, message.priority);
        let outcome = session.outbox.push(message);
        self.apply(&mut session, outcome);
    }

    fn flush(self: &Arc<Self>) {
        let mut session = self.session.lock();
        if let Some(timer) = session.flush_timer.take() {
            timer.abort();
        }
        self.flush_all(&mut session);
        self.after_flush(&mut session);
    }

    fn flush_buffers(self: &Arc<Self>) {
        let mut session = self.session.lock();
        if let Some(outcome) = session.outbox.drain_buffers() {
            self.apply(&mut session, outcome);
        }
    }

    fn apply(self: &Arc<Self>, session: &mut Session, outcome: PushOutcome) {
        match outcome {
            PushOutcome::FlushNow => {
                if let Some(timer) = session.flush_timer.take() {
                    timer.abort();
                }
                self.flush_once(session);
                self.after_flush(session);
            }
            PushOutcome::ScheduleFlush => self.schedule_flush(session),
            PushOutcome::Buffered => {}
        }
    }

    /// Hand one batch to the writer. Returns false when nothing was sent,
    /// either because the queue is empty or the socket is not open.
    fn flush_once(&self, session: &mut Session) -> bool {
        let Some(writer) = session.writer.as_ref() else {
            return false;
        };
        let Some(batch) = session.outbox.next_batch() else {
            return false;
        };

        let count = batch.len();
        let frame = match Frame::encode_batch(batch) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Dropping batch of {} message(s): {}", count, e);
                return true;
            }
        };

        if writer.send(WriterCommand::Frame(frame)).is_err() {
            warn!("{}: {} message(s) lost", ForgeError::ChannelClosed, count);
            return false;
        }

        session.counters.frames_sent += 1;
        session.counters.messages_sent += count as u64;
        debug!("Flushed {} message(s)", count);
        true
    }

    fn flush_all(&self, session: &mut Session) {
        while self.flush_once(session) {}
    }

    /// Urgent leftovers go out now; the rest wait for the batch timer.
    fn after_flush(self: &Arc<Self>, session: &mut Session) {
        if session.writer.is_none() {
            return;
        }
        while session.outbox.has_urgent() && self.flush_once(session) {}
        if session.outbox.queue_len() > 0 {
            self.schedule_flush(session);
        }
    }

    fn schedule_flush(self: &Arc<Self>, session: &mut Session) {
        let pending = session
            .flush_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished());
        if pending {
            return;
        }

        let inner = Arc::downgrade(self);
        let epoch = session.epoch;
        let wait = self.config.max_wait_time();
        session.flush_timer = Some(self.runtime.spawn(async move {
            sleep(wait).await;
            if let Some(inner) = inner.upgrade() {
                inner.on_flush_timer(epoch);
            }
        }));
    }

    fn on_flush_timer(self: &Arc<Self>, epoch: u64) {
        let mut session = self.session.lock();
        if session.epoch != epoch {
            return;
        }
        session.flush_timer = None;
        self.flush_once(&mut session);
        self.after_flush(&mut session);
    }

    fn schedule_reconnect(self: &Arc<Self>, session: &mut Session, delay: Duration) {
        let inner = Arc::downgrade(self);
        let epoch = session.epoch;
        session.reconnect_timer = Some(self.runtime.spawn(async move {
            sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.on_reconnect_timer(epoch);
            }
        }));
    }

    fn on_reconnect_timer(self: &Arc<Self>, epoch: u64) {
        let mut session = self.session.lock();
        if session.epoch != epoch || session.phase != ConnectionPhase::Reconnecting {
            return;
        }
        session.reconnect_timer = None;
        self.dial(&mut session);
    }

    fn stats(&self) -> SocketStats {
        let (queue_length, buffered_types, reconnect_attempts, phase, counters) = {
            let session = self.session.lock();
            let outbox = session.outbox.counters();
            let counters = TrafficCounters {
                messages_coalesced: outbox.coalesced,
                messages_dropped: outbox.dropped,
                ..session.counters.clone()
            };
            (
                session.outbox.queue_len(),
                session.outbox.buffered_types(),
                session.backoff.attempts(),
                session.phase,
                counters,
            )
        };

        SocketStats {
            queue_length,
            buffered_types,
            reconnect_attempts,
            is_connected: phase == ConnectionPhase::Connected,
            registered_events: self.listeners.event_names(),
            listener_count: self.listeners.listener_count(),
            phase,
            counters,
        }
    }
}

impl<C: Connector> ConnectionHandler for Inner<C> {
    fn on_open(
        self: &Arc<Self>,
        generation: u64,
        writer: mpsc::UnboundedSender<WriterCommand>,
    ) -> bool {
        {
            let mut session = self.session.lock();
            if session.generation != generation || session.phase != ConnectionPhase::Connecting {
                return false;
            }

            session.phase = ConnectionPhase::Connected;
            session.backoff.reset();
            session.writer = Some(writer);
            if let Some(timer) = session.flush_timer.take() {
                timer.abort();
            }
            self.flush_all(&mut session);
        }

        info!("Connected to {}", self.url);
        self.listeners.emit(EVENT_OPEN, &Value::Null);
        true
    }

    fn on_frame(self: &Arc<Self>, generation: u64, text: &str) {
        let decoded = Frame::decode(text);

        {
            let mut session = self.session.lock();
            if session.generation != generation {
                return;
            }
            match &decoded {
                Ok(frames) => session.counters.messages_received += frames.len() as u64,
                Err(_) => session.counters.parse_errors += 1,
            }
        }

        match decoded {
            Ok(frames) => {
                for frame in frames {
                    trace!("Dispatching {}", frame.kind);
                    self.listeners.emit(&frame.kind, &frame.data);
                    self.listeners.emit(
                        EVENT_MESSAGE,
                        &json!({ "type": frame.kind, "data": frame.data }),
                    );
                }
            }
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                let error = ForgeError::from(e);
                self.listeners.emit(
                    EVENT_ERROR,
                    &json!({ "message": error.to_string(), "raw": text }),
                );
            }
        }
    }

    fn on_malformed(self: &Arc<Self>, generation: u64, error: &ForgeError) {
        {
            let mut session = self.session.lock();
            if session.generation != generation {
                return;
            }
            session.counters.parse_errors += 1;
        }
        self.listeners
            .emit(EVENT_ERROR, &json!({ "message": error.to_string() }));
    }

    fn on_error(self: &Arc<Self>, generation: u64, error: &ForgeError) {
        if self.session.lock().generation != generation {
            return;
        }
        self.listeners
            .emit(EVENT_ERROR, &json!({ "message": error.to_string() }));
    }

    fn on_close(self: &Arc<Self>, generation: u64, reason: &str) {
        {
            let mut session = self.session.lock();
            if session.generation != generation {
                return;
            }
            session.writer = None;
            session.connection = None;

            if !self.config.reconnect {
                session.phase = ConnectionPhase::Disconnected;
            } else if let Some(delay) = session.backoff.next_delay() {
                session.phase = ConnectionPhase::Reconnecting;
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay,
                    session.backoff.attempts(),
                    self.config.max_reconnect_attempts
                );
                self.schedule_reconnect(&mut session, delay);
            } else {
                session.phase = ConnectionPhase::Disconnected;
                warn!(
                    "Giving up on {} after {} reconnect attempt(s)",
                    self.url,
                    session.backoff.attempts()
                );
            }
        }

        warn!("Connection closed: {}", reason);
        self.listeners.emit(EVENT_CLOSE, &json!({ "reason": reason }));
    }
}

/// Spawned tasks only hold weak references, so this runs once the last
/// `SocketManager` clone is gone. Dropping the session's writer makes the
/// connection task close the socket.
impl<C: Connector> Drop for Inner<C> {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        for timer in [session.flush_timer.take(), session.reconnect_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
        debug!("Socket manager for {} dropped", self.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "ws://localhost:8080/ws";

    fn manager(config: SocketConfig) -> (SocketManager<MockConnector>, MockConnector) {
        let connector = MockConnector::new();
        let manager = SocketManager::with_connector(URL, config, connector.clone()).unwrap();
        (manager, connector)
    }

    /// Let spawned tasks run without crossing any interesting deadline.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    async fn connected(config: SocketConfig) -> (SocketManager<MockConnector>, MockConnector) {
        let (manager, connector) = manager(config);
        manager.connect();
        settle().await;
        assert!(manager.is_connected());
        (manager, connector)
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = SocketManager::new(URL, SocketConfig::default());
        assert!(matches!(result, Err(ForgeError::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_bad_url() {
        let result = SocketManager::new("not a url", SocketConfig::default());
        assert!(matches!(result, Err(ForgeError::UrlParseError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_after_wait_time() {
        let config = SocketConfig::builder()
            .max_batch_size(5)
            .max_wait_time_ms(50)
            .build();
        let (manager, connector) = connected(config).await;

        for _ in 0..3 {
            manager.send("a", 1).unwrap();
        }
        assert_eq!(manager.stats().queue_length, 3);

        sleep(Duration::from_millis(45)).await;
        assert!(connector.sent().is_empty());

        sleep(Duration::from_millis(10)).await;
        let frames = connector.sent_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "batch");
        assert_eq!(frames[0]["data"].as_array().unwrap().len(), 3);
        assert_eq!(frames[0]["data"][0], json!({"type": "a", "data": 1}));
        assert_eq!(manager.stats().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_flushes_immediately() {
        let (manager, connector) = connected(SocketConfig::default()).await;

        manager.send("chat:message", "first").unwrap();
        manager
            .send_with_priority("chat:ack", "urgent", Priority::High)
            .unwrap();
        assert_eq!(manager.stats().queue_length, 0);

        settle().await;
        let frames = connector.sent_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"][0]["type"], "chat:ack");
        assert_eq!(frames[0]["data"][1]["type"], "chat:message");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_high_message_is_plain_frame() {
        let (manager, connector) = connected(SocketConfig::default()).await;

        manager
            .send_with_priority("ping", json!({"t": 1}), Priority::High)
            .unwrap();
        settle().await;

        assert_eq!(
            connector.sent_json(),
            vec![json!({"type": "ping", "data": {"t": 1}})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_without_timer() {
        let config = SocketConfig::builder()
            .max_batch_size(2)
            .max_wait_time_ms(1000)
            .build();
        let (manager, connector) = connected(config).await;

        manager.send("a", 1).unwrap();
        manager.send("a", 2).unwrap();
        settle().await;

        assert_eq!(connector.sent().len(), 1);
        assert_eq!(manager.stats().counters.messages_sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_indicators_are_coalesced() {
        let config = SocketConfig::builder()
            .max_buffer_size(3)
            .max_wait_time_ms(50)
            .build();
        let (manager, connector) = connected(config).await;

        manager.send("chat:typing", json!({"user": "a"})).unwrap();
        manager.send("chat:typing", json!({"user": "b"})).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.queue_length, 0);
        assert_eq!(stats.buffered_types, vec!["chat:typing"]);

        manager.send("chat:typing", json!({"user": "c"})).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.queue_length, 1);
        assert!(stats.buffered_types.is_empty());
        assert_eq!(stats.counters.messages_coalesced, 3);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(
            connector.sent_json(),
            vec![json!({
                "type": "chat:typing",
                "data": [{"user": "a"}, {"user": "b"}, {"user": "c"}]
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_buffers_emits_partial_buffer() {
        let (manager, connector) = connected(SocketConfig::default()).await;

        manager.send("chat:typing", true).unwrap();
        manager.flush_buffers();
        manager.flush();
        settle().await;

        assert_eq!(
            connector.sent_json(),
            vec![json!({"type": "chat:typing", "data": [true]})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_before_connect_flush_on_open() {
        let (manager, connector) = manager(SocketConfig::default());

        manager.send("a", 1).unwrap();
        manager.send_with_priority("b", 2, Priority::High).unwrap();
        assert_eq!(manager.stats().queue_length, 2);

        manager.connect();
        settle().await;

        let frames = connector.sent_json();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"][0], json!({"type": "b", "data": 2}));
        assert_eq!(frames[0]["data"][1], json!({"type": "a", "data": 1}));
        assert_eq!(manager.stats().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        manager.connect();
        manager.connect();
        settle().await;
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_events() {
        let (manager, connector) = manager(SocketConfig::builder().reconnect(false).build());
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&opens);
        manager.on(EVENT_OPEN, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&closes);
        manager.on(EVENT_CLOSE, move |v| seen.lock().push(v.clone()));

        manager.connect();
        settle().await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        connector.drop_connection();
        settle().await;
        assert_eq!(*closes.lock(), vec![json!({"reason": "closed by peer"})]);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_dispatch() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        let messages = Arc::new(Mutex::new(Vec::new()));
        let all = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&messages);
        manager.on("notification", move |v| seen.lock().push(v.clone()));
        let counter = Arc::clone(&all);
        manager.on(EVENT_MESSAGE, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        connector.push_inbound(r#"{"type":"notification","data":{"id":1}}"#);
        connector.push_inbound(
            r#"{"type":"batch","data":[{"type":"notification","data":{"id":2}},{"type":"presence","data":{}}]}"#,
        );
        settle().await;

        assert_eq!(*messages.lock(), vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(all.load(Ordering::SeqCst), 3);
        assert_eq!(manager.stats().counters.messages_received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_reports_error_and_keeps_reading() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        let errors = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&errors);
        manager.on(EVENT_ERROR, move |v| seen.lock().push(v.clone()));
        let counter = Arc::clone(&hits);
        manager.on("ok", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        connector.push_inbound("{oops");
        connector.push_inbound(r#"{"type":"ok"}"#);
        settle().await;

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["raw"], "{oops");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_connected());
        assert_eq!(manager.stats().counters.parse_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_frame_keeps_connection_open() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        let errors = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&errors);
        manager.on(EVENT_ERROR, move |v| seen.lock().push(v.clone()));
        let counter = Arc::clone(&closes);
        manager.on(EVENT_CLOSE, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&hits);
        manager.on("ok", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        connector.push_undecodable("invalid utf-8");
        connector.push_inbound(r#"{"type":"ok"}"#);
        settle().await;

        assert_eq!(errors.lock().len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        assert!(manager.is_connected());
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closed_by_client(), 0);
        assert_eq!(manager.stats().counters.parse_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_and_reset() {
        let config = SocketConfig::builder()
            .base_delay_ms(100)
            .max_delay_ms(1000)
            .max_reconnect_attempts(5)
            .build();
        let (manager, connector) = connected(config).await;

        connector.fail_next(1);
        connector.drop_connection();
        settle().await;
        assert_eq!(manager.phase(), ConnectionPhase::Reconnecting);
        assert_eq!(manager.stats().reconnect_attempts, 1);

        // attempt 1 waits 100ms and fails
        sleep(Duration::from_millis(98)).await;
        assert_eq!(connector.connects(), 1);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(connector.connects(), 2);
        assert_eq!(manager.stats().reconnect_attempts, 2);

        // attempt 2 waits 200ms and succeeds
        sleep(Duration::from_millis(198)).await;
        assert_eq!(connector.connects(), 2);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(connector.connects(), 3);
        assert!(manager.is_connected());
        assert_eq!(manager.stats().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let config = SocketConfig::builder()
            .base_delay_ms(100)
            .max_delay_ms(250)
            .max_reconnect_attempts(3)
            .build();
        let (manager, connector) = manager(config);

        connector.fail_next(usize::MAX);
        manager.connect();

        // dials at 0, 100, 300 (100 + 200) and 550 (300 + capped 250)
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(connector.connects(), 4);

        let stats = manager.stats();
        assert_eq!(stats.phase, ConnectionPhase::Disconnected);
        assert_eq!(stats.reconnect_attempts, 3);
        assert!(!stats.is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_reconnecting_dials_now() {
        let config = SocketConfig::builder().base_delay_ms(10_000).build();
        let (manager, connector) = connected(config).await;

        connector.drop_connection();
        settle().await;
        assert_eq!(manager.phase(), ConnectionPhase::Reconnecting);

        manager.connect();
        settle().await;
        assert!(manager.is_connected());
        assert_eq!(connector.connects(), 2);

        // the cancelled backoff timer must not dial again
        sleep(Duration::from_millis(20_000)).await;
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_everything() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        manager.on("x", |_| {});
        manager.on(EVENT_CLOSE, |_| {});
        manager.send("a", 1).unwrap();
        manager.send("chat:typing", 1).unwrap();

        manager.disconnect();
        manager.disconnect();

        let stats = manager.stats();
        assert_eq!(stats.queue_length, 0);
        assert!(stats.buffered_types.is_empty());
        assert_eq!(stats.listener_count, 0);
        assert!(stats.registered_events.is_empty());
        assert!(!stats.is_connected);
        assert_eq!(stats.phase, ConnectionPhase::Disconnected);

        // pending batch timer was cancelled with the queue
        sleep(Duration::from_millis(100)).await;
        assert!(connector.sent().is_empty());
        assert_eq!(connector.closed_by_client(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_reconnect() {
        let config = SocketConfig::builder().base_delay_ms(100).build();
        let (manager, connector) = connected(config).await;

        connector.drop_connection();
        settle().await;
        manager.disconnect();

        sleep(Duration::from_millis(500)).await;
        assert_eq!(connector.connects(), 1);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_may_send_from_callback() {
        let (manager, connector) = connected(SocketConfig::default()).await;

        let responder = manager.clone();
        manager.on("ping", move |_| {
            let _ = responder.send_with_priority("pong", Value::Null, Priority::High);
        });

        connector.push_inbound(r#"{"type":"ping"}"#);
        settle().await;

        assert_eq!(connector.sent_json(), vec![json!({"type": "pong", "data": null})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_closes_socket() {
        let (manager, connector) = connected(SocketConfig::default()).await;
        let inner = Arc::downgrade(&manager.inner);
        let second = manager.clone();

        drop(manager);
        settle().await;
        assert_eq!(connector.closed_by_client(), 0);

        drop(second);
        settle().await;
        assert!(inner.upgrade().is_none());
        assert_eq!(connector.closed_by_client(), 1);

        connector.drop_connection();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_pending_reconnect() {
        let config = SocketConfig::builder().base_delay_ms(100).build();
        let (manager, connector) = connected(config).await;

        connector.drop_connection();
        settle().await;
        assert_eq!(manager.phase(), ConnectionPhase::Reconnecting);

        drop(manager);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connects(), 1);
    }
}
