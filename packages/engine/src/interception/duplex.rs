// packages/engine/src/interception/duplex.rs
//! Duplex (WebSocket-shaped) interception
//!
//! A connection tap is shared by both halves of a channel. The tap records
//! each message as a completed event and closes the connection exactly once,
//! whichever half sees the end first.

use crate::interception::interceptor::Interceptor;
use crate::interception::sink::Notification;
use crate::interception::transport::{
    DuplexChannel, DuplexTransport, Frame, FrameSink, FrameStream, TransportError,
};
use crate::recording::event::Direction;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// Duplex transport that records connections and their messages
pub struct InterceptedDuplex<T> {
    inner: T,
    interceptor: Arc<Interceptor>,
}

impl<T: DuplexTransport> InterceptedDuplex<T> {
    pub fn new(inner: T, interceptor: Arc<Interceptor>) -> Self {
        Self { inner, interceptor }
    }
}

#[async_trait]
impl<T: DuplexTransport> DuplexTransport for InterceptedDuplex<T> {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError> {
        if !self.interceptor.is_installed() {
            return self.inner.connect(url).await;
        }

        let tap = Arc::new(ConnectionTap {
            interceptor: Arc::clone(&self.interceptor),
            connection_id: Interceptor::next_id(),
            url: url.to_string(),
            closed: AtomicBool::new(false),
        });

        let result = self.inner.connect(url).await;
        tap.interceptor.notify(Notification::ConnectionOpened {
            connection_id: tap.connection_id.clone(),
            url: tap.url.clone(),
        });

        match result {
            Ok(DuplexChannel { sink, stream }) => {
                debug!("Duplex connection {} to {}", tap.connection_id, url);
                Ok(DuplexChannel {
                    sink: Box::new(TappedSink {
                        inner: sink,
                        tap: Arc::clone(&tap),
                    }),
                    stream: Box::pin(TappedStream { inner: stream, tap }),
                })
            }
            Err(e) => {
                tap.close(Some(e.to_string()));
                Err(e)
            }
        }
    }
}

struct ConnectionTap {
    interceptor: Arc<Interceptor>,
    connection_id: String,
    url: String,
    closed: AtomicBool,
}

impl ConnectionTap {
    fn message(&self, direction: Direction, frame: &Frame) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let payload = self.interceptor.capture_frame(frame);
        self.interceptor.notify(Notification::ConnectionMessage {
            connection_id: self.connection_id.clone(),
            url: self.url.clone(),
            direction,
            payload,
        });
    }

    fn close(&self, error: Option<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.interceptor.notify(Notification::ConnectionClosed {
            connection_id: self.connection_id.clone(),
            error,
        });
    }
}

impl Drop for ConnectionTap {
    fn drop(&mut self) {
        self.close(None);
    }
}

struct TappedSink {
    inner: Box<dyn FrameSink>,
    tap: Arc<ConnectionTap>,
}

#[async_trait]
impl FrameSink for TappedSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let observed = frame.clone();
        match self.inner.send(frame).await {
            Ok(()) => {
                self.tap.message(Direction::Outbound, &observed);
                Ok(())
            }
            Err(e) => {
                self.tap.close(Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let result = self.inner.close().await;
        self.tap
            .close(result.as_ref().err().map(ToString::to_string));
        result
    }
}

struct TappedStream {
    inner: FrameStream,
    tap: Arc<ConnectionTap>,
}

impl Stream for TappedStream {
    type Item = Result<Frame, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => this.tap.message(Direction::Inbound, frame),
            Poll::Ready(Some(Err(e))) => this.tap.close(Some(e.to_string())),
            Poll::Ready(None) => this.tap.close(None),
            Poll::Pending => {}
        }

        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::interceptor::InterceptionConfig;
    use crate::recording::event::{ConnectionState, EventStatus, TransportKind};
    use crate::recording::recorder::EventRecorder;
    use futures::stream;

    struct NoopSink;

    #[async_trait]
    impl FrameSink for NoopSink {
        async fn send(&mut self, _frame: Frame) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct Scripted {
        inbound: Vec<Result<Frame, TransportError>>,
        refuse: bool,
    }

    #[async_trait]
    impl DuplexTransport for Scripted {
        async fn connect(&self, _url: &str) -> Result<DuplexChannel, TransportError> {
            if self.refuse {
                return Err(TransportError::Connect("refused".to_string()));
            }
            Ok(DuplexChannel {
                sink: Box::new(NoopSink),
                stream: Box::pin(stream::iter(self.inbound.clone())),
            })
        }
    }

    fn setup() -> (Arc<EventRecorder>, Arc<Interceptor>) {
        let recorder = Arc::new(EventRecorder::default());
        let interceptor = Arc::new(Interceptor::new(
            recorder.clone(),
            InterceptionConfig::default(),
        ));
        interceptor.install();
        (recorder, interceptor)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (recorder, interceptor) = setup();
        let transport = interceptor.duplex(Scripted {
            inbound: vec![Ok(Frame::Text(r#"{"pong":1}"#.to_string()))],
            refuse: false,
        });

        let mut channel = transport.connect("ws://chat.test/socket").await.unwrap();
        channel.sink.send(Frame::Text("ping".to_string())).await.unwrap();
        assert!(channel.stream.next().await.unwrap().is_ok());
        assert!(channel.stream.next().await.is_none());

        let connection = recorder.connections().pop().unwrap();
        assert_eq!(connection.state, ConnectionState::Closed);
        assert_eq!(connection.messages_sent, 1);
        assert_eq!(connection.messages_received, 1);

        let events = recorder.snapshot();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.transport == TransportKind::Duplex));
        assert!(events.iter().all(|e| e.status == EventStatus::Completed));
        assert!(events.iter().all(|e| e.correlation_id == connection.connection_id));
        assert_eq!(events[0].direction, Some(Direction::Outbound));
        assert_eq!(events[1].direction, Some(Direction::Inbound));
        assert_eq!(
            events[1].response_body.as_ref().unwrap().parsed.as_ref().unwrap()["pong"],
            1
        );

        // Closing after the stream ended is not recorded twice
        channel.sink.close().await.unwrap();
        assert_eq!(recorder.connections().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_marks_connection() {
        let (recorder, interceptor) = setup();
        let transport = interceptor.duplex(Scripted {
            inbound: vec![Err(TransportError::WebSocket("reset".to_string()))],
            refuse: false,
        });

        let mut channel = transport.connect("ws://chat.test/socket").await.unwrap();
        assert!(channel.stream.next().await.unwrap().is_err());

        let connection = recorder.connections().pop().unwrap();
        assert_eq!(connection.state, ConnectionState::Error);
        assert_eq!(connection.error.as_deref(), Some("WebSocket error: reset"));
    }

    #[tokio::test]
    async fn test_failed_connect_is_recorded() {
        let (recorder, interceptor) = setup();
        let transport = interceptor.duplex(Scripted {
            inbound: Vec::new(),
            refuse: true,
        });

        let err = transport.connect("ws://down.test").await.unwrap_err();
        assert_eq!(err, TransportError::Connect("refused".to_string()));

        let connection = recorder.connections().pop().unwrap();
        assert_eq!(connection.state, ConnectionState::Error);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_channel_closes_connection() {
        let (recorder, interceptor) = setup();
        let transport = interceptor.duplex(Scripted {
            inbound: Vec::new(),
            refuse: false,
        });

        let channel = transport.connect("ws://chat.test").await.unwrap();
        assert_eq!(recorder.connections()[0].state, ConnectionState::Open);
        drop(channel);
        assert_eq!(recorder.connections()[0].state, ConnectionState::Closed);
    }
}
