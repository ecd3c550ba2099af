// packages/engine/src/recording/recorder.rs
//! Bounded, correlated event log
//!
//! The recorder is the only shared mutable state in the engine. All
//! mutations go through one mutex; readers get independent copies.

use crate::interception::sink::{EventSink, Notification};
use crate::observability::metrics as m;
use crate::recording::event::{
    Connection, ConnectionState, Direction, EventId, EventPatch, InterceptedEvent, PartialEvent,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Maximum number of events retained (oldest evicted first)
    pub capacity: usize,

    /// Buffer size of the incremental notification channel
    pub notify_buffer: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            notify_buffer: 256,
        }
    }
}

/// Result of applying a terminal patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The pending event moved to its terminal state
    Applied(EventId),

    /// The event was already terminal; nothing changed
    AlreadyTerminal(EventId),

    /// No retained event carries this correlation id
    Unknown,
}

/// Incremental change notification for storage/UI collaborators
#[derive(Debug, Clone)]
pub enum RecorderUpdate {
    Appended(InterceptedEvent),
    Updated(InterceptedEvent),
    Evicted(EventId),
}

/// Recorder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub events_recorded: u64,
    pub events_evicted: u64,
    pub updates_applied: u64,
    pub updates_rejected: u64,
    pub updates_unknown: u64,
    pub connections_opened: u64,
}

struct Inner {
    events: VecDeque<InterceptedEvent>,

    /// Correlation id → id of the request event carrying it
    by_correlation: HashMap<String, EventId>,

    connections: VecDeque<Connection>,

    next_id: EventId,

    stats: RecorderStats,
}

impl Inner {
    /// Position of `id` in the buffer; ids are contiguous from the front
    fn position(&self, id: EventId) -> Option<usize> {
        let front = self.events.front()?.id;
        let offset = id.checked_sub(front)? as usize;
        (offset < self.events.len()).then_some(offset)
    }

    fn connection_mut(&mut self, connection_id: &str) -> Option<&mut Connection> {
        self.connections
            .iter_mut()
            .rev()
            .find(|c| c.connection_id == connection_id)
    }
}

/// Bounded event recorder
pub struct EventRecorder {
    capacity: usize,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<RecorderUpdate>,
}

impl EventRecorder {
    /// Create a new recorder; a capacity of 0 is treated as 1
    pub fn new(config: RecorderConfig) -> Self {
        let capacity = config.capacity.max(1);
        let (updates, _) = broadcast::channel(config.notify_buffer.max(1));

        debug!("Initializing event recorder with capacity {}", capacity);

        Self {
            capacity,
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity.min(4096)),
                by_correlation: HashMap::new(),
                connections: VecDeque::new(),
                next_id: 1,
                stats: RecorderStats::default(),
            }),
            updates,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(RecorderConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Append an event, evicting the oldest one if the buffer is full
    pub fn append(&self, partial: PartialEvent) -> EventId {
        let mut inner = self.inner.lock();
        self.append_locked(&mut inner, partial)
    }

    /// Append under an already held lock; notifications are sent before the
    /// lock is released so subscribers see them in mutation order
    fn append_locked(&self, inner: &mut Inner, partial: PartialEvent) -> EventId {
        if inner.events.len() >= self.capacity {
            if let Some(old) = inner.events.pop_front() {
                if inner.by_correlation.get(&old.correlation_id) == Some(&old.id) {
                    inner.by_correlation.remove(&old.correlation_id);
                }
                inner.stats.events_evicted += 1;
                metrics::counter!(m::EVENTS_EVICTED).increment(1);
                self.publish(RecorderUpdate::Evicted(old.id));
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let now = Utc::now();
        let completed_at = partial.status.is_terminal().then_some(now);
        let event = InterceptedEvent {
            id,
            correlation_id: partial.correlation_id,
            transport: partial.transport,
            url: partial.url,
            method: partial.method,
            request_headers: partial.request_headers,
            request_body: partial.request_body,
            status: partial.status,
            status_code: partial.status_code,
            response_headers: partial.response_headers,
            response_body: partial.response_body,
            direction: partial.direction,
            error: partial.error,
            sent_at: now,
            completed_at,
        };

        // Duplex messages share their connection's id and are never patched
        if event.direction.is_none() {
            inner.by_correlation.insert(event.correlation_id.clone(), id);
        }

        trace!("Recorded event {} ({})", id, event.url);
        metrics::counter!(m::EVENTS_RECORDED, "transport" => event.transport.as_str()).increment(1);

        if self.has_subscribers() {
            self.publish(RecorderUpdate::Appended(event.clone()));
        }
        inner.events.push_back(event);
        inner.stats.events_recorded += 1;
        metrics::gauge!(m::BUFFERED_EVENTS).set(inner.events.len() as f64);

        id
    }

    /// Move the pending event for `correlation_id` to its terminal state
    pub fn update(&self, correlation_id: &str, patch: EventPatch) -> UpdateOutcome {
        let mut inner = self.inner.lock();

        let position = inner
            .by_correlation
            .get(correlation_id)
            .copied()
            .and_then(|id| inner.position(id));

        let Some(position) = position else {
            inner.stats.updates_unknown += 1;
            drop(inner);
            debug!("Ignoring update for unknown correlation id {}", correlation_id);
            metrics::counter!(m::UPDATES_IGNORED, "reason" => "unknown").increment(1);
            return UpdateOutcome::Unknown;
        };

        let event = &mut inner.events[position];
        let id = event.id;
        if event.status.is_terminal() {
            inner.stats.updates_rejected += 1;
            drop(inner);
            debug!("Event {} is already terminal, ignoring update", id);
            metrics::counter!(m::UPDATES_IGNORED, "reason" => "terminal").increment(1);
            return UpdateOutcome::AlreadyTerminal(id);
        }

        event.status = patch.status;
        event.status_code = patch.status_code.or(event.status_code);
        event.response_headers = patch.response_headers.or(event.response_headers.take());
        event.response_body = patch.response_body.or(event.response_body.take());
        event.error = patch.error;
        event.completed_at = Some(Utc::now());

        if self.has_subscribers() {
            self.publish(RecorderUpdate::Updated(event.clone()));
        }
        inner.stats.updates_applied += 1;

        UpdateOutcome::Applied(id)
    }

    /// Independent copy of the buffer, oldest first
    pub fn snapshot(&self) -> Vec<InterceptedEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Copy of a single retained event
    pub fn get(&self, id: EventId) -> Option<InterceptedEvent> {
        let inner = self.inner.lock();
        inner.position(id).map(|pos| inner.events[pos].clone())
    }

    /// Copy of the retained connections, oldest first
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.lock().connections.iter().cloned().collect()
    }

    pub fn connection(&self, connection_id: &str) -> Option<Connection> {
        self.inner
            .lock()
            .connections
            .iter()
            .rev()
            .find(|c| c.connection_id == connection_id)
            .cloned()
    }

    pub fn open_connection(&self, connection_id: &str, url: &str) {
        let mut inner = self.inner.lock();

        if inner.connections.len() >= self.capacity {
            inner.connections.pop_front();
        }

        inner.connections.push_back(Connection {
            connection_id: connection_id.to_string(),
            url: url.to_string(),
            state: ConnectionState::Open,
            opened_at: Utc::now(),
            closed_at: None,
            error: None,
            messages_sent: 0,
            messages_received: 0,
        });
        inner.stats.connections_opened += 1;
        drop(inner);

        debug!("Connection {} opened to {}", connection_id, url);
        metrics::counter!(m::CONNECTIONS_OPENED).increment(1);
    }

    /// Close a connection; closing an already closed connection is a no-op
    pub fn close_connection(&self, connection_id: &str, error: Option<String>) -> bool {
        let mut inner = self.inner.lock();

        let Some(connection) = inner.connection_mut(connection_id) else {
            debug!("Close for unknown connection {}", connection_id);
            return false;
        };

        if connection.state != ConnectionState::Open {
            return false;
        }

        connection.state = match error {
            Some(_) => ConnectionState::Error,
            None => ConnectionState::Closed,
        };
        connection.error = error;
        connection.closed_at = Some(Utc::now());

        debug!("Connection {} closed ({:?})", connection_id, connection.state);
        true
    }

    fn record_message(
        &self,
        connection_id: String,
        url: String,
        direction: Direction,
        payload: crate::recording::event::CapturedBody,
    ) -> EventId {
        let mut inner = self.inner.lock();
        if let Some(connection) = inner.connection_mut(&connection_id) {
            match direction {
                Direction::Outbound => connection.messages_sent += 1,
                Direction::Inbound => connection.messages_received += 1,
            }
        }

        self.append_locked(&mut inner, PartialEvent::message(connection_id, url, direction, payload))
    }

    /// Subscribe to incremental append/update/evict notifications
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderUpdate> {
        self.updates.subscribe()
    }

    /// Drop every event and connection; ids keep increasing afterwards
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.by_correlation.clear();
        inner.connections.clear();
        metrics::gauge!(m::BUFFERED_EVENTS).set(0.0);
        debug!("Recorder cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get recorder statistics
    pub fn stats(&self) -> RecorderStats {
        self.inner.lock().stats.clone()
    }

    fn has_subscribers(&self) -> bool {
        self.updates.receiver_count() > 0
    }

    /// Non-blocking; safe to call while holding `inner`
    fn publish(&self, update: RecorderUpdate) {
        // Lagging or absent receivers are not our concern
        let _ = self.updates.send(update);
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl EventSink for EventRecorder {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::RequestStarted(partial) => {
                self.append(partial);
            }
            Notification::RequestFinished {
                correlation_id,
                patch,
            } => {
                self.update(&correlation_id, patch);
            }
            Notification::ConnectionOpened { connection_id, url } => {
                self.open_connection(&connection_id, &url);
            }
            Notification::ConnectionMessage {
                connection_id,
                url,
                direction,
                payload,
            } => {
                self.record_message(connection_id, url, direction, payload);
            }
            Notification::ConnectionClosed {
                connection_id,
                error,
            } => {
                self.close_connection(&connection_id, error);
            }
        }
    }
}
