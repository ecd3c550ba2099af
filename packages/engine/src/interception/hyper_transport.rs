// packages/engine/src/interception/hyper_transport.rs
//! hyper-backed HTTP transport
//!
//! Plain HTTP/1.1 client over the hyper-util legacy pool. Implements both the
//! buffered and the streaming transport shapes.

use crate::interception::transport::{
    HttpRequest, HttpResponse, HttpTransport, StreamingResponse, StreamingTransport,
    TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, TryStreamExt};
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

/// HTTP client transport
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client }
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<http::Response<Incoming>, TransportError> {
        self.client
            .request(request.map(Full::new))
            .await
            .map_err(|e| TransportError::Http(format!("Request failed: {}", e)))
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (parts, body) = self.dispatch(request).await?.into_parts();

        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Http(format!("Response body error: {}", e)))?
            .to_bytes();

        Ok(http::Response::from_parts(parts, body))
    }
}

#[async_trait]
impl StreamingTransport for HyperTransport {
    async fn open(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        let (head, body) = self.dispatch(request).await?.into_parts();

        let body = TryStreamExt::map_err(BodyStream::new(body), |e| {
            TransportError::Http(format!("Response body error: {}", e))
        })
        .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())));

        Ok(StreamingResponse {
            head,
            body: Box::pin(body),
        })
    }
}
