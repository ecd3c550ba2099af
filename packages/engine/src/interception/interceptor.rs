// packages/engine/src/interception/interceptor.rs
//! Interception context
//!
//! The `Interceptor` owns the installed flag, the notification sink and the
//! body capture settings. Transports are wrapped through it and handed to
//! callers in place of the originals.
//!
//! Nothing in here may surface an error to the wrapped call: sink panics are
//! caught, capture degrades to raw bytes, and response parsing happens on a
//! detached task.

use crate::interception::body;
use crate::interception::duplex::InterceptedDuplex;
use crate::interception::http_interceptor::{InterceptedHttp, InterceptedStreaming};
use crate::interception::sink::{EventSink, Notification};
use crate::interception::transport::{
    DuplexTransport, Frame, HttpRequest, HttpTransport, StreamingTransport, TransportError,
};
use crate::observability::metrics as m;
use crate::recording::event::{CapturedBody, EventPatch, PartialEvent, TransportKind};
use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Body capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionConfig {
    /// Record request/response/message bodies
    pub capture_bodies: bool,

    /// Maximum bytes retained per body
    pub max_body_size: usize,

    /// Attempt JSON / form parsing of captured bodies
    pub parse_bodies: bool,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            capture_bodies: true,
            max_body_size: 1024 * 1024,
            parse_bodies: true,
        }
    }
}

/// Interception context shared by every wrapper it creates
pub struct Interceptor {
    config: InterceptionConfig,
    sink: Arc<dyn EventSink>,
    installed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Interceptor {
    pub fn new(sink: Arc<dyn EventSink>, config: InterceptionConfig) -> Self {
        Self {
            config,
            sink,
            installed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Start observing calls made through wrapped transports
    ///
    /// Returns `true` on the first call; later calls are no-ops.
    pub fn install(&self) -> bool {
        let first = !self.installed.swap(true, Ordering::SeqCst);
        if first {
            info!("Traffic interception installed");
        } else {
            debug!("Traffic interception already installed, ignoring");
        }
        first
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &InterceptionConfig {
        &self.config
    }

    /// Wrap a request/response transport
    pub fn http<T: HttpTransport>(self: &Arc<Self>, inner: T) -> InterceptedHttp<T> {
        InterceptedHttp::new(inner, Arc::clone(self))
    }

    /// Wrap a streaming transport
    pub fn streaming<T: StreamingTransport>(self: &Arc<Self>, inner: T) -> InterceptedStreaming<T> {
        InterceptedStreaming::new(inner, Arc::clone(self))
    }

    /// Wrap a duplex transport
    pub fn duplex<T: DuplexTransport>(self: &Arc<Self>, inner: T) -> InterceptedDuplex<T> {
        InterceptedDuplex::new(inner, Arc::clone(self))
    }

    /// Wait until every detached completion has reached the sink
    pub async fn settle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// The single funnel every lifecycle notification goes through
    pub(crate) fn notify(&self, notification: Notification) {
        let delivered = catch_unwind(AssertUnwindSafe(|| self.sink.notify(notification)));
        if delivered.is_err() {
            warn!("Event sink panicked, notification dropped");
            metrics::counter!(m::INTERCEPTION_FAULTS).increment(1);
        }
    }

    pub(crate) fn next_id() -> String {
        Ulid::new().to_string()
    }

    /// Capture a complete body; empty or disabled bodies yield `None`
    pub(crate) fn capture(&self, payload: &Bytes, content_type: Option<&str>) -> Option<CapturedBody> {
        if !self.config.capture_bodies || payload.is_empty() {
            return None;
        }
        Some(body::capture(
            payload,
            content_type,
            self.config.max_body_size,
            self.config.parse_bodies,
        ))
    }

    /// Capture a duplex frame; the size is kept even when bodies are off
    pub(crate) fn capture_frame(&self, frame: &Frame) -> CapturedBody {
        let payload = frame.payload();
        if !self.config.capture_bodies {
            return body::capture_prefix(Bytes::new(), payload.len(), None, false);
        }
        body::capture(
            &payload,
            None,
            self.config.max_body_size,
            self.config.parse_bodies,
        )
    }

    /// Record a dispatched request and return its completion handle
    pub(crate) fn begin_request(
        self: &Arc<Self>,
        transport: TransportKind,
        request: &HttpRequest,
    ) -> PendingRequest {
        let correlation_id = Self::next_id();
        let headers = request.headers();

        let partial = PartialEvent::pending(&correlation_id, transport, request.uri().to_string())
            .with_method(request.method().as_str())
            .with_request_headers(body::header_map(headers))
            .with_request_body(self.capture(request.body(), body::content_type(headers)));

        debug!(
            "Intercepted {} {} ({})",
            request.method(),
            request.uri(),
            correlation_id
        );
        self.notify(Notification::RequestStarted(partial));

        PendingRequest {
            interceptor: Arc::clone(self),
            correlation_id,
            armed: true,
        }
    }

    /// Run `finish` off the caller's task when a runtime is available
    fn complete_detached<F>(self: &Arc<Self>, finish: F)
    where
        F: FnOnce(&Interceptor) + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = CompletionGuard(Arc::clone(self));

        let task = move || {
            finish(&*guard.0);
            drop(guard);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { task() });
            }
            Err(_) => task(),
        }
    }
}

/// Decrements the in-flight counter even if the completion task unwinds
struct CompletionGuard(Arc<Interceptor>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Completion handle for a recorded request
///
/// Dropping it before `complete`/`fail` records the request as aborted.
pub(crate) struct PendingRequest {
    interceptor: Arc<Interceptor>,
    correlation_id: String,
    armed: bool,
}

impl PendingRequest {
    /// Record a response from a duplicate of its head and body
    pub(crate) fn complete(mut self, status: u16, headers: HeaderMap, payload: Bytes) {
        self.armed = false;
        let correlation_id = std::mem::take(&mut self.correlation_id);

        self.interceptor.complete_detached(move |interceptor| {
            let response_body = interceptor.capture(&payload, body::content_type(&headers));
            let patch = EventPatch::completed(Some(status), body::header_map(&headers), response_body);
            interceptor.notify(Notification::RequestFinished {
                correlation_id,
                patch,
            });
        });
    }

    /// Record a streamed response from the retained prefix of its body
    pub(crate) fn complete_stream(
        mut self,
        status: u16,
        headers: HeaderMap,
        retained: Bytes,
        size: usize,
        error: Option<String>,
    ) {
        self.armed = false;
        let correlation_id = std::mem::take(&mut self.correlation_id);

        self.interceptor.complete_detached(move |interceptor| {
            let config = interceptor.config();
            let response_body = (config.capture_bodies && size > 0).then(|| {
                body::capture_prefix(
                    retained,
                    size,
                    body::content_type(&headers),
                    config.parse_bodies,
                )
            });
            let response_headers = body::header_map(&headers);
            let patch = match error {
                None => EventPatch::completed(Some(status), response_headers, response_body),
                Some(error) => {
                    EventPatch::failed_after_head(error, Some(status), response_headers, response_body)
                }
            };
            interceptor.notify(Notification::RequestFinished {
                correlation_id,
                patch,
            });
        });
    }

    /// Record a transport error; the caller receives the error unchanged
    pub(crate) fn fail(mut self, error: &TransportError) {
        self.armed = false;
        self.finish_failed(error.to_string());
    }

    fn finish_failed(&mut self, error: String) {
        let correlation_id = std::mem::take(&mut self.correlation_id);
        self.interceptor.notify(Notification::RequestFinished {
            correlation_id,
            patch: EventPatch::failed(error),
        });
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            debug!("Request {} aborted by caller", self.correlation_id);
            self.finish_failed(ABORTED.to_string());
        }
    }
}

/// Error recorded for requests the caller abandoned
pub const ABORTED: &str = "aborted by caller";
