// packages/engine/src/interception/mod.rs
//! Traffic interception layer
//!
//! Transparent observation of outbound calls made through injected
//! transports:
//!
//! - **Transport traits**: request/response, streaming and duplex shapes
//! - **Interceptor**: installed flag, body capture, the notification funnel
//! - **Wrappers**: decorators implementing the same trait as the transport
//!   they wrap
//! - **Concrete transports**: hyper (HTTP) and tokio-tungstenite (WebSocket)
//! - **Capture proxy**: HTTP forward proxy recording everything it relays
//!
//! # Architecture
//!
//! ```text
//! Caller code (unchanged)
//!     │
//!     ├─ send()    → InterceptedHttp      ─┐
//!     ├─ open()    → InterceptedStreaming ─┼→ Interceptor::notify → EventSink
//!     └─ connect() → InterceptedDuplex    ─┘          (EventRecorder)
//!                          │
//!                          └→ inner transport → network
//! ```

pub mod body;
pub mod duplex;
pub mod http_interceptor;
pub mod hyper_transport;
pub mod interceptor;
pub mod proxy;
pub mod sink;
pub mod transport;
pub mod ws_transport;

// Re-export commonly used types
pub use duplex::InterceptedDuplex;
pub use http_interceptor::{InterceptedHttp, InterceptedStreaming};
pub use hyper_transport::HyperTransport;
pub use interceptor::{InterceptionConfig, Interceptor};
pub use proxy::CaptureProxy;
pub use sink::{EventSink, Notification};
pub use transport::{
    BodyStream, DuplexChannel, DuplexTransport, Frame, FrameSink, FrameStream, HttpRequest,
    HttpResponse, HttpTransport, StreamingResponse, StreamingTransport, TransportError,
};
pub use ws_transport::WsTransport;
