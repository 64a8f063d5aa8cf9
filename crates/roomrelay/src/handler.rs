//! Per-connection handlers.
//!
//! Each connection gets its own Tokio task fed by a channel, so one
//! connection's messages are handled in order while different connections
//! proceed in parallel. The flow is:
//!   1. Handshake: from the connect request (datagram peers) or a
//!      `VerifyClient` message (byte streams)
//!   2. Loop: hand every message to the registry
//!   3. On disconnect: tear the session down

use std::sync::Arc;

use bytes::Bytes;
use roomrelay_protocol::{
    Handshake, Instruction, LobbyRequest, PacketReader, ServerEvent,
};
use roomrelay_session::{AdmissionError, Authenticator, PeerSender, StreamSender};
use roomrelay_transport::{
    ConnectionKey, PeerTransport, StreamTransport, TransportEvent,
};
use tokio::sync::mpsc;

use crate::SessionRegistry;

/// Serves one datagram peer.
///
/// The handshake rides on the connect request. A refused peer is rejected
/// through the transport with the one-byte reason and never gets a
/// session.
pub(crate) async fn serve_peer<A, P>(
    registry: Arc<SessionRegistry<A>>,
    transport: Arc<P>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) where
    A: Authenticator,
    P: PeerTransport,
{
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected { conn, request } => {
                let key = ConnectionKey::peer(conn);
                let admitted = match parse_peer_handshake(request) {
                    Ok(handshake) => {
                        let sender = Arc::new(PeerSender::new(Arc::clone(&transport), conn));
                        registry.admit(key, &handshake, sender).await.map(|_| ())
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = admitted {
                    tracing::debug!(%key, error = %e, "rejecting peer");
                    transport.reject(conn, ServerEvent::Rejected(e.reject_code()).encode());
                    return;
                }
            }
            TransportEvent::Data {
                conn,
                data,
                delivery,
            } => {
                registry
                    .handle_message(ConnectionKey::peer(conn), data, delivery)
                    .await;
            }
            TransportEvent::Disconnected { conn } => {
                registry.disconnect(ConnectionKey::peer(conn)).await;
                return;
            }
        }
    }
}

fn parse_peer_handshake(request: Option<Bytes>) -> Result<Handshake, AdmissionError> {
    let request = request
        .ok_or_else(|| AdmissionError::ServerException("missing connect request".into()))?;
    Ok(Handshake::read_from(&mut PacketReader::new(request))?)
}

/// Serves one byte-stream connection.
///
/// The first `VerifyClient` message admits the connection and is answered
/// with `Verified`; a refused one gets the one-byte reason and is closed.
/// Anything sent before a successful handshake is ignored.
pub(crate) async fn serve_stream<A, S>(
    registry: Arc<SessionRegistry<A>>,
    transport: Arc<S>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) where
    A: Authenticator,
    S: StreamTransport,
{
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected { conn, .. } => {
                tracing::debug!(conn = %ConnectionKey::stream(conn), "awaiting handshake");
            }
            TransportEvent::Data { conn, data, delivery } => {
                let key = ConnectionKey::stream(conn);
                if data.first() != Some(&Instruction::VerifyClient.code()) {
                    registry.handle_message(key, data, delivery).await;
                    continue;
                }

                let admitted = match LobbyRequest::parse(data) {
                    Ok(LobbyRequest::VerifyClient(handshake)) => {
                        let sender = Arc::new(StreamSender::new(Arc::clone(&transport), conn));
                        registry.admit(key, &handshake, sender).await
                    }
                    Ok(_) => Err(AdmissionError::ServerException("expected handshake".into())),
                    Err(e) => Err(e.into()),
                };
                match admitted {
                    Ok(session) => session.send(&ServerEvent::Verified),
                    Err(e) => {
                        tracing::debug!(%key, error = %e, "refusing stream client");
                        let _ = transport
                            .send_one(conn, ServerEvent::Rejected(e.reject_code()).encode());
                        transport.kick(conn);
                    }
                }
            }
            TransportEvent::Disconnected { conn } => {
                registry.disconnect(ConnectionKey::stream(conn)).await;
                return;
            }
        }
    }
}
