//! WebSocket signaling transport
//!
//! Text frames map 1:1 onto signaling messages. A reader task feeds the
//! event channel; the writer half is shared behind a lock so `send` can
//! be called from any handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{SignalingTransport, TransportEvent};
use crate::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// [`SignalingTransport`] over tokio-tungstenite
#[derive(Default)]
pub struct WebSocketTransport {
    sink: Arc<Mutex<Option<WsSink>>>,
}

impl WebSocketTransport {
    /// Create an unconnected transport
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalingTransport for WebSocketTransport {
    async fn open(&self, endpoint: &str) -> Result<mpsc::Receiver<TransportEvent>> {
        {
            let sink = self.sink.lock().await;
            if sink.is_some() {
                return Err(Error::Transport("transport already open".to_string()));
            }
        }

        info!("connecting signaling websocket: {}", endpoint);

        let (ws, _response) = connect_async(endpoint)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {}", e)))?;

        let (ws_tx, mut ws_rx) = ws.split();
        *self.sink.lock().await = Some(ws_tx);

        let (tx, rx) = mpsc::channel(128);

        // The channel is usable as soon as the handshake completed
        let _ = tx.send(TransportEvent::Opened).await;

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if tx.send(TransportEvent::Message(text)).await.is_err() {
                            debug!("signaling receiver dropped, stopping reader");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("signaling websocket closed by remote");
                        let _ = tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    Ok(_) => {
                        // Binary/ping/pong frames carry no signaling
                    }
                    Err(e) => {
                        warn!("signaling websocket error: {}", e);
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            // Reader gone: the writer half is useless now
            sink.lock().await.take();
        });

        Ok(rx)
    }

    async fn send(&self, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| Error::Transport("transport not open".to_string()))?;

        sink.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| Error::Transport(format!("websocket send failed: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("close frame send failed: {}", e);
            }
            let _ = sink.close().await;
        }
        Ok(())
    }
}
