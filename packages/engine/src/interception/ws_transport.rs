// packages/engine/src/interception/ws_transport.rs
//! WebSocket transport over tokio-tungstenite

use crate::interception::transport::{
    DuplexChannel, DuplexTransport, Frame, FrameSink, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{future, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl DuplexTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<DuplexChannel, TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("WebSocket connect to {} failed: {}", url, e)))?;

        let (write, read) = socket.split();

        // Control frames are handled by tungstenite; only data frames surface
        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(Bytes::from(data)))),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            })
        });

        Ok(DuplexChannel {
            sink: Box::new(WsSink { write }),
            stream: Box::pin(stream),
        })
    }
}

struct WsSink {
    write: SplitSink<Socket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.to_vec().into()),
        };
        self.write
            .send(message)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .close()
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}
