// packages/engine/src/interception/sink.rs
//! The single notification channel between the interception wrappers and
//! whatever records their observations.

use crate::recording::event::{CapturedBody, Direction, EventPatch, PartialEvent};

/// One lifecycle moment observed by an interception wrapper
#[derive(Debug, Clone)]
pub enum Notification {
    /// A request was dispatched (event is `pending`)
    RequestStarted(PartialEvent),

    /// A pending request reached its terminal state
    RequestFinished {
        correlation_id: String,
        patch: EventPatch,
    },

    /// A duplex connection was established
    ConnectionOpened { connection_id: String, url: String },

    /// A duplex message was sent or received
    ConnectionMessage {
        connection_id: String,
        url: String,
        direction: Direction,
        payload: CapturedBody,
    },

    /// A duplex connection closed, cleanly or with an error
    ConnectionClosed {
        connection_id: String,
        error: Option<String>,
    },
}

/// Receiver of interception notifications
///
/// Implementations must not block: `notify` runs on the caller's task,
/// inside the wrapped transport call.
pub trait EventSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}
