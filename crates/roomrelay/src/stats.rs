//! Read-only stats endpoint.
//!
//! Answers every HTTP request on its port with a JSON snapshot of the
//! registry. It is not part of the relay protocol and never touches a
//! client connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use roomrelay_protocol::{Codec, JsonCodec};
use roomrelay_session::Authenticator;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::{RelayError, SessionRegistry};

/// Counts for one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub room_count: usize,
    pub client_count: usize,
}

/// A point-in-time snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub total_clients: usize,
    pub total_games: usize,
    pub total_rooms: usize,
    pub per_game: BTreeMap<String, GameStats>,
}

/// Serves stats on `listener` until `shutdown` flips.
pub async fn serve_stats<A: Authenticator>(
    listener: TcpListener,
    registry: Arc<SessionRegistry<A>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "stats endpoint listening");
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(RelayError::Stats)?;
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = respond(stream, &registry).await {
                        tracing::debug!(%peer, error = %e, "stats request failed");
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

async fn respond<A: Authenticator>(
    mut stream: TcpStream,
    registry: &SessionRegistry<A>,
) -> std::io::Result<()> {
    // The request itself is irrelevant; read it so the client isn't reset.
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let stats = registry.stats().await;
    let body = JsonCodec
        .encode(&stats)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
