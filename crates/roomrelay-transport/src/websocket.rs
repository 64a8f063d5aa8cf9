//! WebSocket byte-stream transport using `tokio-tungstenite`.
//!
//! Every accepted socket gets two tasks: a reader that turns frames into
//! [`TransportEvent`]s and a writer that drains a per-connection outbound
//! queue. The [`WebSocketHandle`] only ever touches those queues, so
//! [`StreamTransport::send_one`] never blocks on the network.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    ConnectionId, Delivery, StreamTransport, TransportError, TransportEvent,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

enum Outbound {
    Frame(Bytes),
    Close,
}

type OutboundMap = HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>;

/// Cloneable send side of a [`WebSocketServer`].
#[derive(Clone, Default)]
pub struct WebSocketHandle {
    outbound: Arc<Mutex<OutboundMap>>,
}

impl WebSocketHandle {
    fn queues(&self) -> MutexGuard<'_, OutboundMap> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.queues().len()
    }

    fn register(&self, conn: ConnectionId) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues().insert(conn, tx);
        rx
    }

    fn unregister(&self, conn: ConnectionId) {
        self.queues().remove(&conn);
    }
}

impl StreamTransport for WebSocketHandle {
    fn send_one(
        &self,
        conn: ConnectionId,
        data: Bytes,
    ) -> Result<(), TransportError> {
        let queues = self.queues();
        let tx = queues
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        tx.send(Outbound::Frame(data))
            .map_err(|_| TransportError::ConnectionClosed(conn))
    }

    fn kick(&self, conn: ConnectionId) {
        if let Some(tx) = self.queues().get(&conn) {
            let _ = tx.send(Outbound::Close);
        }
    }
}

/// A WebSocket listener feeding events into a channel.
pub struct WebSocketServer {
    listener: TcpListener,
    handle: WebSocketHandle,
}

impl WebSocketServer {
    /// Binds a new WebSocket server to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            handle: WebSocketHandle::default(),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }

    /// Returns a handle for sending to and kicking connections.
    pub fn handle(&self) -> WebSocketHandle {
        self.handle.clone()
    }

    /// Accepts connections until `events` is closed.
    ///
    /// Accept errors are logged and skipped; a single bad socket never
    /// stops the listener.
    pub async fn run(self, events: mpsc::UnboundedSender<TransportEvent>) {
        loop {
            let (stream, addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
                _ = events.closed() => break,
            };

            let handle = self.handle.clone();
            let events = events.clone();
            tokio::spawn(async move {
                serve_connection(stream, addr, handle, events).await;
            });
        }
        tracing::info!("WebSocket transport stopped");
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: WebSocketHandle,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    let conn =
        ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(%conn, %addr, "accepted WebSocket connection");

    let mut outbound = handle.register(conn);
    if events
        .send(TransportEvent::Connected {
            conn,
            request: None,
        })
        .is_err()
    {
        handle.unregister(conn);
        return;
    }

    let (mut sink, mut source) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(cmd) = outbound.recv().await {
            match cmd {
                Outbound::Frame(data) => {
                    if sink.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    while let Some(msg) = source.next().await {
        let data = match msg {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_bytes()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // ping/pong/frame
            Err(e) => {
                tracing::debug!(%conn, error = %e, "WebSocket read failed");
                break;
            }
        };
        let event = TransportEvent::Data {
            conn,
            data,
            delivery: Delivery::ReliableOrdered,
        };
        if events.send(event).is_err() {
            break;
        }
    }

    handle.unregister(conn);
    writer.abort();
    let _ = events.send(TransportEvent::Disconnected { conn });
    tracing::debug!(%conn, "WebSocket connection closed");
}
