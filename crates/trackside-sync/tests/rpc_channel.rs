//! RpcChannel against an in-process websocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use trackside_core::command::{ConsoleCommand, RouteAction};
use trackside_core::rpc::Call;
use trackside_sync::{ChannelState, RpcChannel, RpcConfig, SyncError, SyncEvent, event_channel};

type ServerSocket = WebSocketStream<TcpStream>;

// ─── Helpers ─────────────────────────────────────────────────────────

async fn listen() -> (String, JoinHandle<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    });
    (format!("ws://{addr}/ws"), accept)
}

async fn recv_json(ws: &mut ServerSocket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client hung up")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn reply(ws: &mut ServerSocket, id: &Value, data: Value) {
    let frame = json!({"msgType": "response", "id": id, "data": data});
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(rx: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for sync event")
        .expect("event channel closed")
}

/// Connect, answer the login, and wait for readiness.
async fn ready_session() -> (RpcChannel, ServerSocket, mpsc::Receiver<SyncEvent>) {
    let (url, accept) = listen().await;
    let (events, mut rx) = event_channel(32);
    let channel = RpcChannel::connect(RpcConfig::new(url, "client-secret"), events)
        .await
        .unwrap();
    let mut server = accept.await.unwrap();

    let login = recv_json(&mut server).await;
    assert_eq!(login["object"], "server");
    assert_eq!(login["action"], "register");
    assert_eq!(login["params"], json!({"type": "client", "token": "client-secret"}));
    reply(&mut server, &login["id"], json!({"status": "OK", "message": "welcome"})).await;

    assert_eq!(next_event(&mut rx).await, SyncEvent::RpcReady);
    (channel, server, rx)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_handshake_reaches_ready() {
    let (channel, _server, _rx) = ready_session().await;
    assert_eq!(channel.state(), ChannelState::Ready);
}

#[tokio::test]
async fn rejected_login_closes_with_reason() {
    let (url, accept) = listen().await;
    let (events, mut rx) = event_channel(8);
    let channel = RpcChannel::connect(RpcConfig::new(url, "wrong"), events)
        .await
        .unwrap();
    let mut server = accept.await.unwrap();
    let login = recv_json(&mut server).await;
    reply(&mut server, &login["id"], json!({"status": "KO", "message": "bad token"})).await;

    match next_event(&mut rx).await {
        SyncEvent::RpcClosed { reason } => {
            assert_eq!(reason.as_deref(), Some("login rejected: bad token"));
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (events, _rx) = event_channel(8);
    let result = RpcChannel::connect(RpcConfig::new(format!("ws://{addr}/ws"), "t"), events).await;
    assert!(matches!(result, Err(SyncError::WebSocket(_))));
}

#[tokio::test]
async fn responses_correlate_out_of_order() {
    let (channel, mut server, _rx) = ready_session().await;

    let activate = ConsoleCommand::Route {
        id: "R3".into(),
        action: RouteAction::Activate,
    };
    let first = channel.call(activate.to_call()).unwrap();
    let second = channel
        .call(Call::new("train", "proceed", Some(json!({"id": "T1"}))))
        .unwrap();

    let a = recv_json(&mut server).await;
    let b = recv_json(&mut server).await;
    assert_ne!(a["id"], b["id"]);
    assert_eq!(a["object"], "route");
    assert_eq!(b["object"], "train");

    reply(&mut server, &b["id"], json!({"status": "OK", "which": "train"})).await;
    reply(&mut server, &a["id"], json!({"status": "OK", "which": "route"})).await;

    assert_eq!(second.await.unwrap()["which"], "train");
    assert_eq!(first.await.unwrap()["which"], "route");
}

#[tokio::test]
async fn duplicate_response_invokes_callback_once() {
    let (channel, mut server, _rx) = ready_session().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    channel
        .send(
            "route",
            "deactivate",
            Some(json!({"id": "R1"})),
            Some(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    let frame = recv_json(&mut server).await;
    reply(&mut server, &frame["id"], json!({"status": "OK"})).await;
    reply(&mut server, &frame["id"], json!({"status": "OK"})).await;

    // Round-trip a second request so both replies above have been read.
    let probe = channel.call(Call::renotify()).unwrap();
    let probe_frame = recv_json(&mut server).await;
    reply(&mut server, &probe_frame["id"], json!({"status": "OK"})).await;
    probe.await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notifications_reach_registered_handler() {
    let (channel, mut server, _rx) = ready_session().await;
    let (tx, mut seen) = mpsc::unbounded_channel();
    channel
        .register_handler("signalAspectChanged", move |object| {
            let _ = tx.send(object);
        })
        .unwrap();

    let subscribe = recv_json(&mut server).await;
    assert_eq!(subscribe["action"], "addListener");
    assert_eq!(subscribe["params"], json!({"event": "signalAspectChanged"}));

    for (name, id) in [("trainChanged", "T1"), ("signalAspectChanged", "S9")] {
        let frame = json!({"msgType": "notification", "data": {"name": name, "object": {"id": id}}});
        server.send(Message::Text(frame.to_string())).await.unwrap();
    }

    let object = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(object, json!({"id": "S9"}));
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn forwarded_notifications_arrive_as_events() {
    let (url, accept) = listen().await;
    let (events, mut rx) = event_channel(32);
    let channel = RpcChannel::connect(RpcConfig::new(url, "client-secret"), events.clone())
        .await
        .unwrap();
    let mut server = accept.await.unwrap();
    let login = recv_json(&mut server).await;
    reply(&mut server, &login["id"], json!({"status": "OK"})).await;
    assert_eq!(next_event(&mut rx).await, SyncEvent::RpcReady);

    channel
        .forward_notifications("clockChanged", events)
        .unwrap();
    recv_json(&mut server).await;
    let frame = json!({"msgType": "notification", "data": {"name": "clockChanged", "object": "06:00:00"}});
    server.send(Message::Text(frame.to_string())).await.unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        SyncEvent::Notification {
            name: "clockChanged".into(),
            payload: json!("06:00:00")
        }
    );
}

#[tokio::test]
async fn remove_handlers_sends_unsubscribe_per_event() {
    let (channel, mut server, _rx) = ready_session().await;
    for name in ["SIGNAL_STATUS_CHANGED", "signalAspectChanged"] {
        channel.register_handler(name, |_| {}).unwrap();
        recv_json(&mut server).await;
    }

    channel.remove_handlers();
    let mut removed = Vec::new();
    for _ in 0..2 {
        let frame = recv_json(&mut server).await;
        assert_eq!(frame["object"], "server");
        assert_eq!(frame["action"], "removeListener");
        removed.push(frame["params"]["event"].as_str().unwrap().to_string());
    }
    removed.sort();
    assert_eq!(removed, vec!["SIGNAL_STATUS_CHANGED", "signalAspectChanged"]);
}

#[tokio::test]
async fn server_close_abandons_pending_callbacks_and_signals_once() {
    let (channel, mut server, mut rx) = ready_session().await;
    let hits = Arc::new(AtomicUsize::new(0));
    for action in ["activate", "deactivate"] {
        let counter = Arc::clone(&hits);
        channel
            .send(
                "route",
                action,
                Some(json!({"id": "R2"})),
                Some(Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .unwrap();
    }
    recv_json(&mut server).await;
    recv_json(&mut server).await;
    server.close(None).await.unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        SyncEvent::RpcClosed { .. }
    ));
    assert_eq!(channel.state(), ChannelState::Closed);

    channel.close();
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "closed must be signalled once, got {extra:?}");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(matches!(
        channel.send("route", "activate", None, None),
        Err(SyncError::ChannelClosed)
    ));
}

#[tokio::test]
async fn client_close_reports_local_reason() {
    let (channel, mut server, mut rx) = ready_session().await;
    channel.close();

    match next_event(&mut rx).await {
        SyncEvent::RpcClosed { reason } => {
            assert_eq!(reason.as_deref(), Some("closed by client"));
        }
        other => panic!("expected close, got {other:?}"),
    }
    // Server side sees the close handshake or the socket ending.
    let end = tokio::time::timeout(Duration::from_secs(5), server.next())
        .await
        .unwrap();
    assert!(matches!(end, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}
