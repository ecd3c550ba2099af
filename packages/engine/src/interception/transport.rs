// packages/engine/src/interception/transport.rs
//! Transport capability traits
//!
//! The three transport shapes the engine can observe. Interception wrappers
//! implement the same trait as the transport they wrap, so callers receive
//! a wrapped transport through dependency injection and cannot tell the
//! difference.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;

/// Buffered HTTP request
pub type HttpRequest = http::Request<Bytes>;

/// Buffered HTTP response
pub type HttpResponse = http::Response<Bytes>;

/// Streamed response body
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Inbound duplex frames
pub type FrameStream = BoxStream<'static, Result<Frame, TransportError>>;

/// Errors produced by transports
///
/// Interception wrappers hand these back to the caller untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(String),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connect(String),

    /// WebSocket protocol or I/O failure
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Operation on a connection that is already closed
    #[error("Connection closed")]
    Closed,

    /// Request was malformed before it reached the wire
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Response whose body arrives as a stream of chunks
pub struct StreamingResponse {
    pub head: http::response::Parts,
    pub body: BodyStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// A duplex message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn payload(&self) -> Bytes {
        match self {
            Frame::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Frame::Binary(bytes) => bytes.clone(),
        }
    }
}

/// Outbound half of a duplex connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An established duplex connection
pub struct DuplexChannel {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel").finish_non_exhaustive()
    }
}

/// Request/response transport (fetch/XHR shape)
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport with a streamed response body
#[async_trait]
pub trait StreamingTransport: Send + Sync + 'static {
    async fn open(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError>;
}

/// Full-duplex socket transport (WebSocket shape)
#[async_trait]
pub trait DuplexTransport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: StreamingTransport + ?Sized> StreamingTransport for Arc<T> {
    async fn open(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        (**self).open(request).await
    }
}

#[async_trait]
impl<T: DuplexTransport + ?Sized> DuplexTransport for Arc<T> {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError> {
        (**self).connect(url).await
    }
}
