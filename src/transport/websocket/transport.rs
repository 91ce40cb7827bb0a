// src/transport/websocket/transport.rs

//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! ## Concurrency model
//!
//! - Every call to `open()` spawns one **actor task** that owns the socket.
//! - The actor performs the opening handshake, then multiplexes outbound
//!   commands from the link handle with inbound frames from the server.
//! - All interaction with the socket is serialized through this actor; the
//!   link handle never touches it directly.
//!
//! ## Event semantics
//!
//! - A failed handshake fires `Errored` then `Closed` with code 1006.
//! - A close frame from the server fires `Closed` with its code and reason
//!   (1005 when the frame carried no status).
//! - A locally requested close sends a close frame and waits up to
//!   [`CLOSE_TIMEOUT`] for the server's reply before firing `Closed`.
//! - A stream that ends or fails without a close frame fires `Closed` with
//!   code 1006.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Address,
    Connection,
    Link,
    ReadyState,
    ReadyStateCell,
    Result,
    RpcError,
    Transport,
    TransportEvent,
    TransportPtr,
    ABNORMAL_CLOSURE,
};

/// How long a local close waits for the server's close reply.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code reported for a close frame without a status code.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Commands sent from the link handle to the actor.
#[derive(Debug)]
enum Cmd {
    Send(String),
    Close { code: u16, reason: String },
}

/// WebSocket transport factory.
struct WebSocketTransport;

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    // ---
    fn transport_id(&self) -> &str {
        "websocket"
    }

    /// Start a WebSocket connection.
    ///
    /// Returns as soon as the actor is spawned; the handshake outcome is
    /// reported through the event stream.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the address is not a valid
    /// WebSocket URL or a sub-protocol is not a valid header value.
    async fn open(&self, address: &Address, protocols: &[String]) -> Result<Connection> {
        // ---
        let request = build_request(address, protocols)?;

        let state = Arc::new(ReadyStateCell::new(ReadyState::Connecting));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = WebSocketActor {
            address: address.clone(),
            state: state.clone(),
            cmd_rx,
            events: events_tx,
        };
        tokio::spawn(actor.run(request));

        Ok(Connection {
            link: Arc::new(WebSocketLink { state, cmd_tx }),
            events: events_rx,
        })
    }
}

fn build_request(address: &Address, protocols: &[String]) -> Result<Request> {
    // ---
    let mut request = address
        .as_str()
        .into_client_request()
        .map_err(|err| RpcError::Transport(format!("invalid address {address}: {err}")))?;

    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|err| RpcError::Transport(format!("invalid sub-protocol: {err}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

/// Link handle; forwards everything to the actor.
struct WebSocketLink {
    // ---
    state: Arc<ReadyStateCell>,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
}

impl Link for WebSocketLink {
    // ---
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, text: String) -> Result<()> {
        // ---
        if self.state.get() != ReadyState::Open {
            return Err(RpcError::Transport("websocket is not open".into()));
        }
        self.cmd_tx
            .send(Cmd::Send(text))
            .map_err(|_| RpcError::Transport("websocket actor stopped".into()))
    }

    fn close(&self, code: u16, reason: &str) {
        // ---
        if matches!(self.state.get(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.state.set(ReadyState::Closing);

        let _ = self.cmd_tx.send(Cmd::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

struct WebSocketActor {
    // ---
    address: Address, // for logging only
    state: Arc<ReadyStateCell>,
    cmd_rx: mpsc::UnboundedReceiver<Cmd>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl WebSocketActor {
    // ---
    fn fire(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    async fn run(mut self, request: Request) {
        // ---
        let stream = match connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(err) => {
                log_error!("{}: websocket handshake failed: {err}", self.address);
                self.state.set(ReadyState::Closed);
                self.fire(TransportEvent::Errored(err.to_string()));
                self.fire(TransportEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                });
                return;
            }
        };

        // A close requested during the handshake is already queued.
        if self.state.transition(ReadyState::Connecting, ReadyState::Open) {
            log_info!("{}: websocket open", self.address);
            self.fire(TransportEvent::Opened);
        }

        let (mut writer, mut reader) = stream.split();
        let (code, reason) = self.pump(&mut writer, &mut reader).await;

        self.state.set(ReadyState::Closed);
        log_debug!("{}: websocket closed ({code})", self.address);
        self.fire(TransportEvent::Closed { code, reason });
    }

    /// Run until the connection ends, returning its close code and reason.
    async fn pump<W, R>(&mut self, writer: &mut W, reader: &mut R) -> (u16, String)
    where
        W: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        // ---
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Cmd::Send(text)) => {
                            if let Err(err) = writer.send(Message::Text(text.into())).await {
                                log_error!("{}: websocket send failed: {err}", self.address);
                                self.fire(TransportEvent::Errored(err.to_string()));
                                return (ABNORMAL_CLOSURE, String::new());
                            }
                        }
                        Some(Cmd::Close { code, reason }) => {
                            self.state.set(ReadyState::Closing);
                            return close_handshake(writer, reader, code, reason).await;
                        }
                        // Link handle dropped.
                        None => {
                            self.state.set(ReadyState::Closing);
                            return close_handshake(writer, reader, crate::NORMAL_CLOSURE, String::new()).await;
                        }
                    }
                }

                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.fire(TransportEvent::Message(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => self.fire(TransportEvent::Message(text)),
                            Err(_) => {
                                log_debug!("{}: dropping non UTF-8 binary frame", self.address);
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = writer.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            self.state.set(ReadyState::Closing);
                            // Send the queued close reply.
                            if let Err(err) = writer.close().await {
                                log_debug!("{}: close reply not sent: {err}", self.address);
                            }
                            return close_parts(frame);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            log_warn!("{}: websocket error: {err}", self.address);
                            self.fire(TransportEvent::Errored(err.to_string()));
                            return (ABNORMAL_CLOSURE, String::new());
                        }
                        None => return (ABNORMAL_CLOSURE, String::new()),
                    }
                }
            }
        }
    }
}

/// Send our close frame and wait for the server's reply.
///
/// Falls back to the locally requested code and reason when the server
/// does not answer within [`CLOSE_TIMEOUT`].
async fn close_handshake<W, R>(writer: &mut W, reader: &mut R, code: u16, reason: String) -> (u16, String)
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    // ---
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.clone().into(),
    };

    if writer.send(Message::Close(Some(frame))).await.is_err() {
        return (code, reason);
    }

    let reply = async {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Close(frame)) => return Some(close_parts(frame)),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        None
    };

    match tokio::time::timeout(CLOSE_TIMEOUT, reply).await {
        Ok(Some(parts)) => parts,
        _ => (code, reason),
    }
}

fn close_parts(frame: Option<CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
        None => (NO_STATUS_RECEIVED, String::new()),
    }
}

/// Create a WebSocket transport.
///
/// Addresses are `ws://` or `wss://` URLs; `wss://` requires the `tls`
/// feature.
pub fn create_transport() -> TransportPtr {
    // ---
    Arc::new(WebSocketTransport)
}
