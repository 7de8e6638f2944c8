//! Mock BitMEX realtime server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and send the welcome banner
//! - Acknowledge subscriptions, then push a scripted list of data frames
//! - Answer text keepalives
//! - Drop every open connection on demand
//! - Record received messages

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

const BANNER: &str = r#"{"info":"Welcome to the BitMEX Realtime API.","version":"2.0.0","timestamp":"2019-04-05T12:01:02.345Z","docs":"https://www.bitmex.com/app/wsAPI","limit":{"remaining":39}}"#;

#[derive(Clone)]
struct Shared {
    frames: Arc<Vec<String>>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    kick_tx: broadcast::Sender<()>,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    shared: Shared,
}

impl MockWsServer {
    /// Start a server that only acks subscriptions.
    pub async fn start() -> Self {
        Self::start_with_frames(Vec::new()).await
    }

    /// Start a server that pushes `frames` after every subscribe ack.
    pub async fn start_with_frames(frames: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (kick_tx, _) = broadcast::channel(4);

        let shared = Shared {
            frames: Arc::new(frames),
            messages: Arc::new(Mutex::new(VecDeque::new())),
            connections: Arc::new(Mutex::new(0)),
            kick_tx,
        };

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(stream, accept_shared.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            shared,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.shared.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.shared.messages.lock().await.iter().cloned().collect()
    }

    /// Abruptly drop every open connection, without a close frame.
    pub fn drop_connections(&self) {
        let _ = self.shared.kick_tx.send(());
    }

    /// Stop accepting and drop every open connection.
    pub async fn shutdown(self) {
        self.drop_connections();
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    {
        let mut count = shared.connections.lock().await;
        *count += 1;
    }
    let mut kick_rx = shared.kick_tx.subscribe();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    if write.send(Message::Text(BANNER.to_string())).await.is_err() {
        return;
    }

    loop {
        let msg = tokio::select! {
            msg = read.next() => msg,
            _ = kick_rx.recv() => break,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                {
                    let mut msgs = shared.messages.lock().await;
                    msgs.push_back(text.clone());
                }

                if text == "ping" {
                    let _ = write.send(Message::Text("pong".to_string())).await;
                    continue;
                }

                let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                let Some(op) = parsed.get("op").and_then(|op| op.as_str()).map(String::from) else {
                    continue;
                };
                let topic = parsed["args"][0].as_str().unwrap_or_default().to_string();

                // {"success": true, "<op>": "<topic>", "request": {...}}
                let mut ack = serde_json::Map::new();
                ack.insert("success".to_string(), true.into());
                ack.insert(op.clone(), topic.into());
                ack.insert("request".to_string(), parsed);
                let ack = serde_json::Value::Object(ack);
                let _ = write.send(Message::Text(ack.to_string())).await;

                if op == "subscribe" {
                    for frame in shared.frames.iter() {
                        let _ = write.send(Message::Text(frame.clone())).await;
                    }
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
