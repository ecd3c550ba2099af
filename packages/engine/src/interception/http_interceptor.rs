// packages/engine/src/interception/http_interceptor.rs
//! Request/response and streaming interception wrappers
//!
//! - `InterceptedHttp` records one event per buffered request
//! - `InterceptedStreaming` tees the response body so the caller reads every
//!   chunk unchanged while a bounded prefix is retained for the event
//!
//! Both wrappers forward straight to the inner transport until the owning
//! interceptor is installed.

use crate::interception::interceptor::{Interceptor, PendingRequest, ABORTED};
use crate::interception::transport::{
    BodyStream, HttpRequest, HttpResponse, HttpTransport, StreamingResponse, StreamingTransport,
    TransportError,
};
use crate::recording::event::TransportKind;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::HeaderMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Request/response transport that reports every call to an interceptor
pub struct InterceptedHttp<T> {
    inner: T,
    interceptor: Arc<Interceptor>,
}

impl<T: HttpTransport> InterceptedHttp<T> {
    pub fn new(inner: T, interceptor: Arc<Interceptor>) -> Self {
        Self { inner, interceptor }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for InterceptedHttp<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if !self.interceptor.is_installed() {
            return self.inner.send(request).await;
        }

        let pending = self
            .interceptor
            .begin_request(TransportKind::RequestResponse, &request);

        match self.inner.send(request).await {
            Ok(response) => {
                // Bytes clones share the buffer; the caller's response is untouched
                pending.complete(
                    response.status().as_u16(),
                    response.headers().clone(),
                    response.body().clone(),
                );
                Ok(response)
            }
            Err(e) => {
                pending.fail(&e);
                Err(e)
            }
        }
    }
}

/// Streaming transport whose response bodies are teed into the event log
pub struct InterceptedStreaming<T> {
    inner: T,
    interceptor: Arc<Interceptor>,
}

impl<T: StreamingTransport> InterceptedStreaming<T> {
    pub fn new(inner: T, interceptor: Arc<Interceptor>) -> Self {
        Self { inner, interceptor }
    }
}

#[async_trait]
impl<T: StreamingTransport> StreamingTransport for InterceptedStreaming<T> {
    async fn open(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        if !self.interceptor.is_installed() {
            return self.inner.open(request).await;
        }

        let pending = self
            .interceptor
            .begin_request(TransportKind::Streaming, &request);

        match self.inner.open(request).await {
            Ok(StreamingResponse { head, body }) => {
                let config = self.interceptor.config();
                let limit = if config.capture_bodies {
                    config.max_body_size
                } else {
                    0
                };
                let tee = TeeBody {
                    inner: body,
                    pending: Some(pending),
                    status: head.status.as_u16(),
                    headers: head.headers.clone(),
                    retained: BytesMut::new(),
                    limit,
                    size: 0,
                };
                Ok(StreamingResponse {
                    head,
                    body: Box::pin(tee),
                })
            }
            Err(e) => {
                pending.fail(&e);
                Err(e)
            }
        }
    }
}

/// Body stream that forwards every chunk and retains up to `limit` bytes
struct TeeBody {
    inner: BodyStream,
    pending: Option<PendingRequest>,
    status: u16,
    headers: HeaderMap,
    retained: BytesMut,
    limit: usize,
    size: usize,
}

impl TeeBody {
    fn finish(&mut self, error: Option<String>) {
        if let Some(pending) = self.pending.take() {
            let retained = std::mem::take(&mut self.retained).freeze();
            pending.complete_stream(
                self.status,
                std::mem::take(&mut self.headers),
                retained,
                self.size,
                error,
            );
        }
    }

    fn observe(&mut self, chunk: &Bytes) {
        self.size += chunk.len();
        let room = self.limit.saturating_sub(self.retained.len());
        if room > 0 {
            self.retained
                .extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }
}

impl Stream for TeeBody {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);

        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.observe(chunk),
            Poll::Ready(Some(Err(e))) => this.finish(Some(e.to_string())),
            Poll::Ready(None) => this.finish(None),
            Poll::Pending => {}
        }

        polled
    }
}

impl Drop for TeeBody {
    fn drop(&mut self) {
        if self.pending.is_some() {
            self.finish(Some(ABORTED.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::interceptor::InterceptionConfig;
    use crate::recording::event::EventStatus;
    use crate::recording::recorder::EventRecorder;
    use futures::stream;

    struct Echo;

    #[async_trait]
    impl HttpTransport for Echo {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(http::Response::builder()
                .status(201)
                .header("content-type", "application/json")
                .body(request.into_body())
                .unwrap())
        }
    }

    struct Chunks(Vec<Result<Bytes, TransportError>>);

    #[async_trait]
    impl StreamingTransport for Chunks {
        async fn open(&self, _request: HttpRequest) -> Result<StreamingResponse, TransportError> {
            let (head, _) = http::Response::builder()
                .status(200)
                .header("content-type", "text/event-stream")
                .body(())
                .unwrap()
                .into_parts();
            Ok(StreamingResponse {
                head,
                body: Box::pin(stream::iter(self.0.clone())),
            })
        }
    }

    fn setup(config: InterceptionConfig) -> (Arc<EventRecorder>, Arc<Interceptor>) {
        let recorder = Arc::new(EventRecorder::default());
        let interceptor = Arc::new(Interceptor::new(recorder.clone(), config));
        (recorder, interceptor)
    }

    fn get(url: &str) -> HttpRequest {
        http::Request::get(url).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_passthrough_before_install() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        let transport = interceptor.http(Echo);

        let response = transport.send(get("http://a.test/")).await.unwrap();
        assert_eq!(response.status(), 201);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_response_delivered_unchanged() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        interceptor.install();
        let transport = interceptor.http(Echo);

        let request = http::Request::post("http://a.test/echo")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"k":"v"}"#))
            .unwrap();
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.body().as_ref(), br#"{"k":"v"}"#);

        interceptor.settle().await;
        let event = recorder.snapshot().pop().unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.status_code, Some(201));
        assert_eq!(event.response_body.unwrap().parsed.unwrap()["k"], "v");
    }

    #[tokio::test]
    async fn test_malformed_json_kept_raw() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        interceptor.install();
        let transport = interceptor.http(Echo);

        let request = http::Request::post("http://a.test/echo")
            .header("content-type", "application/json")
            .body(Bytes::from_static(b"{not json"))
            .unwrap();
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.body().as_ref(), b"{not json");

        interceptor.settle().await;
        let event = recorder.snapshot().pop().unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert!(event.error.is_none());
        for body in [event.request_body.unwrap(), event.response_body.unwrap()] {
            assert!(body.parsed.is_none());
            assert_eq!(body.raw.as_ref(), b"{not json");
            assert_eq!(body.text.as_deref(), Some("{not json"));
        }
    }

    #[tokio::test]
    async fn test_stream_is_teed() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        interceptor.install();
        let transport = interceptor.streaming(Chunks(vec![
            Ok(Bytes::from_static(b"data: 1\n")),
            Ok(Bytes::from_static(b"data: 2\n")),
        ]));

        let response = transport.open(get("http://a.test/events")).await.unwrap();
        assert_eq!(recorder.snapshot()[0].status, EventStatus::Pending);

        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 2);

        interceptor.settle().await;
        let event = recorder.snapshot().pop().unwrap();
        assert_eq!(event.transport, TransportKind::Streaming);
        assert_eq!(event.status, EventStatus::Completed);
        let body = event.response_body.unwrap();
        assert_eq!(body.text.as_deref(), Some("data: 1\ndata: 2\n"));
        assert_eq!(body.size, 16);
    }

    #[tokio::test]
    async fn test_stream_retention_is_bounded() {
        let config = InterceptionConfig {
            max_body_size: 4,
            ..Default::default()
        };
        let (recorder, interceptor) = setup(config);
        interceptor.install();
        let transport = interceptor.streaming(Chunks(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
        ]));

        let response = transport.open(get("http://a.test/big")).await.unwrap();
        let _: Vec<_> = response.body.collect().await;

        interceptor.settle().await;
        let body = recorder.snapshot()[0].response_body.clone().unwrap();
        assert_eq!(body.raw.as_ref(), b"abcd");
        assert_eq!(body.size, 7);
        assert!(body.truncated);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_head() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        interceptor.install();
        let transport = interceptor.streaming(Chunks(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::Http("reset".to_string())),
        ]));

        let response = transport.open(get("http://a.test/flaky")).await.unwrap();
        let results: Vec<_> = response.body.collect().await;
        assert!(results[1].is_err());

        interceptor.settle().await;
        let event = recorder.snapshot().pop().unwrap();
        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(event.status_code, Some(200));
        assert_eq!(event.error.as_deref(), Some("HTTP error: reset"));
        assert_eq!(event.response_body.unwrap().text.as_deref(), Some("partial"));
    }

    #[tokio::test]
    async fn test_dropped_stream_is_aborted() {
        let (recorder, interceptor) = setup(InterceptionConfig::default());
        interceptor.install();
        let transport = interceptor.streaming(Chunks(vec![Ok(Bytes::from_static(b"x"))]));

        let response = transport.open(get("http://a.test/drop")).await.unwrap();
        drop(response);

        interceptor.settle().await;
        let event = recorder.snapshot().pop().unwrap();
        assert_eq!(event.status, EventStatus::Error);
        assert_eq!(event.error.as_deref(), Some(ABORTED));
    }
}
