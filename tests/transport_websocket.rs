// tests/transport_websocket.rs

#![cfg(feature = "transport_websocket")]

mod common;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};

use smp_rpc::{
    // ---
    ConnectionState,
    RpcError,
    Session,
    SessionBuilder,
    SessionEvent,
};

use common::{init_logging, next_event, WAIT};

async fn bind() -> (TcpListener, String) {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    // ---
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(stream).await.unwrap()
}

fn session(url: &str) -> Session {
    // ---
    init_logging();
    SessionBuilder::new()
        .address(url)
        .transport_type("websocket")
        .build()
        .unwrap()
}

/// Answer every request with its own method name until the client leaves.
async fn echo_server(mut ws: WebSocketStream<TcpStream>) {
    // ---
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            let reply = json!({
                "jsonrpc": "2.0",
                "result": { "method": request["method"] },
                "id": request["id"],
            });
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_request_round_trip() {
    // ---
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move { echo_server(accept(&listener).await).await });

    let session = session(&url);
    session.connect().await.unwrap();
    log::info!("connected to {url}");
    assert_eq!(session.state(), ConnectionState::Open);

    let (a, b) = tokio::join!(
        session.request("minecraft:players", None),
        session.request("minecraft:server/status", Some(json!([])))
    );
    assert_eq!(a.unwrap(), json!({"method": "minecraft:players"}));
    assert_eq!(b.unwrap(), json!({"method": "minecraft:server/status"}));

    session.disconnect();
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn websocket_notification_delivered() {
    // ---
    let (listener, url) = bind().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        go_rx.await.unwrap();
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notification:players/joined",
            "params": [{"name": "Alex"}],
        });
        ws.send(Message::Text(notification.to_string().into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let session = session(&url);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session.on_notification("notification:players/joined", move |args| {
        tx.send(args.to_vec()).unwrap();
    });

    session.connect().await.unwrap();
    go_tx.send(()).unwrap();

    let args = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(args, vec![json!({"name": "Alex"})]);

    session.disconnect();
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn websocket_disconnect_sends_close_frame() {
    // ---
    let (listener, url) = bind().await;
    let (frame_tx, frame_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let mut frame_tx = Some(frame_tx);
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(Some(frame)) = message {
                if let Some(tx) = frame_tx.take() {
                    let _ = tx.send((u16::from(frame.code), frame.reason.as_str().to_owned()));
                }
            }
        }
    });

    let session = session(&url);
    let mut events = session.events();
    session.connect().await.unwrap();
    session.disconnect();

    let (code, reason) = timeout(WAIT, frame_rx).await.unwrap().unwrap();
    assert_eq!(code, 1000);
    assert_eq!(reason, "Client disconnecting");

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert!(matches!(event, SessionEvent::Disconnected { code: 1000, .. }));
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn websocket_server_close_is_reported() {
    // ---
    let (listener, url) = bind().await;
    let (go_tx, go_rx) = oneshot::channel::<()>();
    let (reply_tx, reply_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        go_rx.await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();

        // The client completes the close handshake.
        let mut reply = None;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(frame) = message {
                reply = Some(frame.map(|f| u16::from(f.code)));
                break;
            }
        }
        let _ = reply_tx.send(reply);
    });

    let session = session(&url);
    let mut events = session.events();
    session.connect().await.unwrap();
    go_tx.send(()).unwrap();

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::Disconnected { code: 4000, ref reason } if reason == "maintenance"
    ));
    assert!(!session.is_connected());

    let err = session.request("ping", None).await.unwrap_err();
    assert!(matches!(err, RpcError::NotConnected));

    let reply = timeout(WAIT, reply_rx).await.unwrap().unwrap();
    assert_eq!(reply, Some(Some(4000)));
}

#[tokio::test]
async fn websocket_connect_refused() {
    // ---
    let (listener, url) = bind().await;
    drop(listener);

    let session = session(&url);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)), "unexpected error {err:?}");
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn websocket_invalid_address() {
    // ---
    let session = session("not a url");
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)));

    // The failed attempt does not leave the session stuck in connecting.
    assert!(session.connect().await.is_err());
}

#[tokio::test]
async fn websocket_offers_protocols() {
    // ---
    init_logging();
    let (listener, url) = bind().await;
    let (offered_tx, offered_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, mut response: Response| {
            let offered = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let _ = offered_tx.send(offered);
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("minecraft-v1"));
            Ok::<Response, ErrorResponse>(response)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        echo_server(ws).await;
    });

    let session = SessionBuilder::new()
        .address(&url)
        .protocols(["minecraft-v1", "json"])
        .transport_type("websocket")
        .build()
        .unwrap();
    session.connect().await.unwrap();

    let offered = timeout(WAIT, offered_rx).await.unwrap().unwrap();
    assert_eq!(offered.as_deref(), Some("minecraft-v1, json"));

    session.disconnect();
}
