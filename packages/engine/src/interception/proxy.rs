// packages/engine/src/interception/proxy.rs
//! Capture proxy
//!
//! Plain HTTP/1.1 forward proxy. Every request is forwarded through an
//! intercepted transport so it lands in the event log like any other call.
//!
//! - Upstream is taken from an absolute-form URI, or from the `Host` header
//! - Hop-by-hop headers are stripped in both directions
//! - Upstream failures are answered with `502 Bad Gateway`

use crate::interception::transport::{HttpTransport, TransportError};
use crate::observability::metrics as m;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HOST};
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP forward proxy feeding an intercepted transport
pub struct CaptureProxy<T> {
    listener: TcpListener,
    transport: Arc<T>,
}

impl<T: HttpTransport> CaptureProxy<T> {
    /// Bind the listen socket
    pub async fn bind(addr: SocketAddr, transport: T) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            EngineError::InterceptionFailed(format!("Failed to bind proxy on {}: {}", addr, e))
        })?;

        Ok(Self {
            listener,
            transport: Arc::new(transport),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!("Capture proxy listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Capture proxy shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let transport = Arc::clone(&self.transport);
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            debug!("Accepted connection from {}", addr);

                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| {
                                let transport = Arc::clone(&transport);
                                async move { Ok::<_, Infallible>(forward(transport.as_ref(), req).await) }
                            });

                            let connection = http1::Builder::new().serve_connection(io, service);
                            tokio::select! {
                                result = connection => {
                                    if let Err(e) = result {
                                        error!("Connection error: {}", e);
                                    }
                                }
                                _ = shutdown.cancelled() => {}
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}

async fn forward<T: HttpTransport>(transport: &T, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (mut parts, body) = req.into_parts();

    let Some(target) = upstream_uri(&parts.uri, &parts.headers) else {
        warn!("Request {} has no upstream host", parts.uri);
        return error_response(StatusCode::BAD_REQUEST, "Missing upstream host");
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Body read error: {}", e);
            return error_response(StatusCode::BAD_REQUEST, "Unreadable request body");
        }
    };

    debug!("Proxying {} {}", parts.method, target);
    parts.uri = target;
    strip_hop_by_hop(&mut parts.headers);

    match transport.send(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::counter!(m::PROXIED_REQUESTS, "outcome" => "forwarded").increment(1);
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Full::new(body))
        }
        Err(e) => {
            metrics::counter!(m::PROXIED_REQUESTS, "outcome" => "failed").increment(1);
            error!("Failed to forward request: {}", e);
            error_response(StatusCode::BAD_GATEWAY, &bad_gateway_message(&e))
        }
    }
}

/// Resolve where a proxied request should go
pub fn upstream_uri(uri: &Uri, headers: &HeaderMap) -> Option<Uri> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Some(uri.clone());
    }

    let host = headers.get(HOST)?.to_str().ok()?.trim();
    if host.is_empty() {
        return None;
    }
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("http://{}{}", host, path).parse().ok()
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are hop-by-hop too
    let named: Vec<HeaderName> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn bad_gateway_message(error: &TransportError) -> String {
    format!("Upstream request failed: {}", error)
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::hyper_transport::HyperTransport;
    use crate::interception::transport::{HttpRequest, HttpResponse};
    use async_trait::async_trait;

    struct Upstream {
        fail: bool,
    }

    #[async_trait]
    impl HttpTransport for Upstream {
        async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            if self.fail {
                return Err(TransportError::Connect("refused".to_string()));
            }
            let seen_auth = request.headers().contains_key("proxy-authorization");
            Ok(Response::builder()
                .status(200)
                .header("keep-alive", "timeout=5")
                .header("x-proxy-auth-seen", seen_auth.to_string())
                .body(Bytes::from(request.uri().to_string()))
                .unwrap())
        }
    }

    async fn spawn_proxy(fail: bool) -> (SocketAddr, CancellationToken) {
        let proxy = CaptureProxy::bind("127.0.0.1:0".parse().unwrap(), Upstream { fail })
            .await
            .unwrap();
        let addr = proxy.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(proxy.run(shutdown.clone()));
        (addr, shutdown)
    }

    #[test]
    fn test_upstream_from_absolute_uri() {
        let uri: Uri = "http://api.test:8080/v1/items?x=1".parse().unwrap();
        let target = upstream_uri(&uri, &HeaderMap::new()).unwrap();
        assert_eq!(target, uri);
    }

    #[test]
    fn test_upstream_from_host_header() {
        let uri: Uri = "/v1/items?x=1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HOST, "api.test".parse().unwrap());

        let target = upstream_uri(&uri, &headers).unwrap();
        assert_eq!(target.to_string(), "http://api.test/v1/items?x=1");

        assert!(upstream_uri(&uri, &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_hop_by_hop_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "close, x-session".parse().unwrap());
        headers.insert("x-session", "abc".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("content-type", "text/plain".parse().unwrap());

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn test_proxy_forwards_by_host() {
        let (addr, shutdown) = spawn_proxy(false).await;
        let client = HyperTransport::new();

        let request = http::Request::get(format!("http://{}/orders/7", addr))
            .header("host", "shop.test")
            .header("proxy-authorization", "Basic Zm9vOmJhcg==")
            .body(Bytes::new())
            .unwrap();
        let response = client.send(request).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"http://shop.test/orders/7");
        assert_eq!(response.headers()["x-proxy-auth-seen"], "false");
        assert!(!response.headers().contains_key("keep-alive"));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_proxy_answers_bad_gateway() {
        let (addr, shutdown) = spawn_proxy(true).await;
        let client = HyperTransport::new();

        let request = http::Request::get(format!("http://{}/", addr))
            .header("host", "down.test")
            .body(Bytes::new())
            .unwrap();
        let response = client.send(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        shutdown.cancel();
    }
}
