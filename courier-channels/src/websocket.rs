//! WebSocket transport
//!
//! Payloads travel as JSON text frames. A background task owns the socket:
//! it reads frames and hands them to the subscribed handlers, and it writes
//! the frames queued by [`Transport::send`]. A dropped connection is retried
//! after `reconnect_delay_ms`; frames queued meanwhile go out on the next
//! connection.

use async_trait::async_trait;
use courier_core::utils::preview;
use courier_core::{MessageHandler, Transport, Unsubscribe};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::base::{Channel, ChannelError, Result};

/// WebSocket transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Peer URL, e.g. `ws://127.0.0.1:3001`
    pub url: String,
    /// Delay before reconnecting after the connection drops
    #[serde(default = "default_reconnect_delay_ms", alias = "reconnectDelayMs")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl WebSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Inbound handlers subscribed to the transport
#[derive(Default)]
struct Handlers {
    entries: Mutex<Vec<(u64, MessageHandler)>>,
    next_id: AtomicU64,
}

impl Handlers {
    fn add(&self, handler: MessageHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, handler));
        id
    }

    fn remove(&self, id: u64) {
        self.entries.lock().retain(|(existing, _)| *existing != id);
    }

    fn dispatch(&self, text: &str) {
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping non-JSON frame: {}", e);
                return;
            }
        };
        let handlers: Vec<MessageHandler> =
            self.entries.lock().iter().map(|(_, h)| h.clone()).collect();
        debug!(handlers = handlers.len(), payload = %preview(&payload), "Inbound frame");
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

/// Transport over a WebSocket connection
pub struct WebSocketTransport {
    config: WebSocketConfig,
    handlers: Arc<Handlers>,
    connected: Arc<AtomicBool>,
    running: AtomicBool,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a new, stopped transport
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(Handlers::default()),
            connected: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            outbound_tx: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            task_handle: Mutex::new(None),
        }
    }

    /// Whether the socket is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// WebSocket connection loop with reconnection
    async fn connection_loop(
        config: WebSocketConfig,
        handlers: Arc<Handlers>,
        connected: Arc<AtomicBool>,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);
        let mut running = true;

        while running {
            info!("Connecting to WebSocket peer at {}...", config.url);

            match connect_async(config.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("Connected to WebSocket peer");
                    let (mut write, mut read) = ws_stream.split();
                    connected.store(true, Ordering::Release);

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(WsMessage::Text(text))) => handlers.dispatch(&text),
                                    Some(Ok(WsMessage::Close(_))) | None => {
                                        info!("WebSocket closed by peer");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        error!("WebSocket error: {}", e);
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                            outbound = outbound_rx.recv() => {
                                let Some(text) = outbound else {
                                    let _ = write.close().await;
                                    running = false;
                                    break;
                                };
                                if let Err(e) = write.send(WsMessage::Text(text)).await {
                                    error!("Failed to send frame: {}", e);
                                    break;
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                info!("Shutdown signal received");
                                let _ = write.close().await;
                                running = false;
                                break;
                            }
                        }
                    }

                    connected.store(false, Ordering::Release);
                }
                Err(e) => {
                    error!("Failed to connect to WebSocket peer: {}", e);
                }
            }

            if running {
                info!("Reconnecting in {}ms...", config.reconnect_delay_ms);
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown_rx.recv() => running = false,
                }
            }
        }

        info!("WebSocket connection loop ended");
    }
}

impl Transport for WebSocketTransport {
    fn subscribe(&self, handler: MessageHandler) -> courier_core::Result<Unsubscribe> {
        let id = self.handlers.add(handler);
        let handlers = self.handlers.clone();
        Ok(Unsubscribe::new(move || handlers.remove(id)))
    }

    /// Queue one JSON text frame; `args` are ignored
    fn send(&self, payload: &Value, _args: &[Value]) -> courier_core::Result<()> {
        let text = serde_json::to_string(payload)?;
        let outbound = self.outbound_tx.lock().clone();
        let Some(outbound) = outbound else {
            return Err(ChannelError::NotRunning("WebSocket transport not started".to_string()).into());
        };
        outbound
            .send(text)
            .map_err(|_| ChannelError::SendError("connection loop ended".to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Channel for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn start(&self) -> Result<()> {
        if self.config.url.trim().is_empty() {
            return Err(ChannelError::InvalidConfig("WebSocket url is empty".to_string()));
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Starting WebSocket transport...");
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *self.outbound_tx.lock() = Some(outbound_tx);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let handle = tokio::spawn(Self::connection_loop(
            self.config.clone(),
            self.handlers.clone(),
            self.connected.clone(),
            outbound_rx,
            shutdown_rx,
        ));
        *self.task_handle.lock() = Some(handle);

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Stopping WebSocket transport...");
        self.outbound_tx.lock().take();

        let shutdown_tx = self.shutdown_tx.lock().take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }

        let handle = self.task_handle.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle).await.is_err() {
                warn!("WebSocket connection loop did not stop in time, aborting");
                handle.abort();
            }
        }

        self.connected.store(false, Ordering::Release);
        info!("WebSocket transport stopped");
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.get_mut().take() {
            handle.abort();
        }
    }
}
