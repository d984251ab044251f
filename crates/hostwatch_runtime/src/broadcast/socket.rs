use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use super::hub::{BroadcastHub, SinkError, ViewerSink};

/// Write half of an upgraded WebSocket.
pub struct WebSocketSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ViewerSink for WebSocketSink {
    async fn send_text(&mut self, frame: &str) -> Result<(), SinkError> {
        self.sink.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

impl BroadcastHub {
    /// Drive one viewer connection until the client goes away.
    ///
    /// Inbound frames carry no meaning; the read loop only exists to notice
    /// a close frame, a read error or the end of the stream.
    pub async fn serve_socket(self: Arc<Self>, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let id = self.register(WebSocketSink { sink });

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("Viewer {} read error: {}", id, err);
                    break;
                }
            }
        }

        self.unregister(id).await;
    }
}
