use courier_channels::{Channel, WebSocketConfig, WebSocketTransport};
use courier_core::config::MessengerConfig;
use courier_core::{Listener, ListenerOptions, Messenger, RequestOptions};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};

struct PeerSession {
    /// Frames pushed as soon as the connection opens
    greeting: Vec<Value>,
    close_after_greeting: bool,
}

/// Peer that answers every request frame carrying a `requestId`
struct MockPeer {
    url: String,
    connection_count: Arc<AtomicUsize>,
    received_rx: mpsc::UnboundedReceiver<Value>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockPeer {
    async fn spawn(sessions: Vec<PeerSession>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock peer listener");
        let addr = listener.local_addr().expect("get mock peer address");
        let url = format!("ws://{}", addr);

        let connection_count = Arc::new(AtomicUsize::new(0));
        let conn_count_ref = Arc::clone(&connection_count);

        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            for session in sessions {
                let (stream, _) = tokio::select! {
                    _ = &mut shutdown_rx => return,
                    accepted = listener.accept() => match accepted {
                        Ok(v) => v,
                        Err(_) => return,
                    }
                };

                conn_count_ref.fetch_add(1, Ordering::SeqCst);

                let ws = match accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let (mut write, mut read) = ws.split();

                for frame in session.greeting {
                    if write.send(WsMessage::Text(frame.to_string())).await.is_err() {
                        return;
                    }
                }

                if session.close_after_greeting {
                    let _ = write.send(WsMessage::Close(None)).await;
                    continue;
                }

                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return;
                        }
                        ws_msg = read.next() => {
                            match ws_msg {
                                Some(Ok(WsMessage::Text(text))) => {
                                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                                        continue;
                                    };
                                    let _ = received_tx.send(request.clone());
                                    if request.get("requestId").is_none() {
                                        continue;
                                    }
                                    let reply = json!({
                                        "method": request["method"].clone(),
                                        "responseId": request["requestId"].clone(),
                                        "data": {"echo": request["data"].clone()},
                                    });
                                    if write.send(WsMessage::Text(reply.to_string())).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Ok(WsMessage::Close(_))) | None => break,
                                Some(Err(_)) => break,
                                _ => {}
                            }
                        }
                    }
                }
            }
        });

        Self {
            url,
            connection_count,
            received_rx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn recv_request(&mut self) -> Value {
        timeout(Duration::from_secs(3), self.received_rx.recv())
            .await
            .expect("wait request frame")
            .expect("receive request frame")
    }

    fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = timeout(Duration::from_secs(2), task).await;
        }
    }
}

fn transport_for(peer: &MockPeer) -> Arc<WebSocketTransport> {
    Arc::new(WebSocketTransport::new(WebSocketConfig {
        url: peer.url.clone(),
        reconnect_delay_ms: 50,
    }))
}

fn messenger_over(transport: Arc<WebSocketTransport>) -> Messenger {
    Messenger::builder()
        .config(MessengerConfig {
            auto_active: true,
            auto_generate_request_id: true,
            timeout_ms: 3000,
            ..MessengerConfig::default()
        })
        .transport(transport)
        .build()
        .expect("build messenger")
}

#[tokio::test]
async fn websocket_invoke_resolves_with_peer_reply() {
    let mut peer = MockPeer::spawn(vec![PeerSession {
        greeting: vec![],
        close_after_greeting: false,
    }])
    .await;

    let transport = transport_for(&peer);
    let messenger = messenger_over(transport.clone());
    transport.start().await.expect("start websocket transport");

    let reply = messenger
        .invoke(
            json!({"method": "sum", "data": [1, 2]}),
            RequestOptions::default().with_use_res_data_only(true),
        )
        .await
        .expect("invoke over websocket");
    assert_eq!(reply, Some(json!({"echo": [1, 2]})));

    messenger
        .invoke_only(
            json!({"method": "log", "data": "fire and forget"}),
            RequestOptions::default(),
        )
        .expect("send-only over websocket");
    let first = peer.recv_request().await;
    assert_eq!(first["method"], "sum");
    assert!(first["requestId"].is_string());
    let second = peer.recv_request().await;
    assert_eq!(second, json!({"method": "log", "data": "fire and forget"}));

    let stats = messenger.statistics();
    assert_eq!((stats.total, stats.success, stats.timeout), (2, 1, 0));

    transport.stop().await.expect("stop websocket transport");
    assert!(!transport.is_running());
    peer.shutdown().await;
}

#[tokio::test]
async fn websocket_reconnects_and_keeps_listeners() {
    let peer = MockPeer::spawn(vec![
        PeerSession {
            greeting: vec![json!({"type": "status", "data": "first"})],
            close_after_greeting: true,
        },
        PeerSession {
            greeting: vec![json!({"type": "status", "data": "second"})],
            close_after_greeting: false,
        },
    ])
    .await;

    let transport = transport_for(&peer);
    let messenger = messenger_over(transport.clone());
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    messenger.add_listener(
        "status",
        Listener::from_fn(move |payload| {
            let _ = status_tx.send(payload["data"].clone());
        }),
        ListenerOptions::default(),
    );

    transport.start().await.expect("start websocket transport");

    let first = timeout(Duration::from_secs(3), status_rx.recv())
        .await
        .expect("wait first status")
        .expect("first status");
    assert_eq!(first, json!("first"));

    let second = timeout(Duration::from_secs(3), status_rx.recv())
        .await
        .expect("wait status after reconnect")
        .expect("status after reconnect");
    assert_eq!(second, json!("second"));
    assert_eq!(peer.connection_count(), 2);

    let reply = messenger
        .invoke(json!({"method": "ping", "data": 1}), RequestOptions::default())
        .await
        .expect("invoke after reconnect");
    assert_eq!(reply.expect("reply")["data"], json!({"echo": 1}));

    transport.stop().await.expect("stop websocket transport");
    peer.shutdown().await;
}

#[tokio::test]
async fn websocket_send_after_stop_is_a_transport_error() {
    let peer = MockPeer::spawn(vec![PeerSession {
        greeting: vec![],
        close_after_greeting: false,
    }])
    .await;

    let transport = transport_for(&peer);
    let messenger = messenger_over(transport.clone());
    transport.start().await.expect("start websocket transport");
    transport.stop().await.expect("stop websocket transport");

    let err = messenger
        .invoke_only(json!({"method": "ping"}), RequestOptions::default())
        .expect_err("send on a stopped transport");
    assert!(matches!(err, courier_core::Error::Transport(_)));

    peer.shutdown().await;
}
