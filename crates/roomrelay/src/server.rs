//! `RelayServer` builder and server loop.
//!
//! This is the entry point for running a relay. It ties the layers
//! together: transports feed per-connection handler tasks, handlers feed
//! the registry, and the registry drives rooms.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use roomrelay_session::{Authenticator, SharedKeyAuth};
use roomrelay_tick::{TickConfig, TickScheduler};
use roomrelay_transport::{
    ConnectionKey, LoopbackTransport, PeerTransport, TransportEvent, WebSocketServer,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::handler::{serve_peer, serve_stream};
use crate::reaper::spawn_reaper;
use crate::stats::serve_stats;
use crate::{RelayConfig, RelayError, SessionRegistry};

type Workers = HashMap<ConnectionKey, mpsc::UnboundedSender<TransportEvent>>;

/// Builder for configuring and starting a relay.
///
/// # Example
///
/// ```rust,ignore
/// use roomrelay::prelude::*;
///
/// let server = RelayServer::builder()
///     .bind("0.0.0.0:10002")
///     .idle_life(Duration::from_secs(60))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct RelayServerBuilder<P: PeerTransport = LoopbackTransport> {
    config: RelayConfig,
    peer: Option<Arc<P>>,
}

impl RelayServerBuilder<LoopbackTransport> {
    /// A builder with default settings and no datagram transport.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            peer: None,
        }
    }
}

impl Default for RelayServerBuilder<LoopbackTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PeerTransport> RelayServerBuilder<P> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the WebSocket listen address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_owned();
        self
    }

    /// Sets the stats listen address; `None` disables stats.
    pub fn stats_bind(mut self, addr: Option<&str>) -> Self {
        self.config.stats_bind = addr.map(str::to_owned);
        self
    }

    pub fn server_key(mut self, key: &str) -> Self {
        self.config.server_key = key.to_owned();
        self
    }

    pub fn idle_life(mut self, idle_life: Duration) -> Self {
        self.config.idle_life = idle_life;
        self
    }

    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.config.reap_interval = interval;
        self
    }

    /// Sets how often the datagram transport is drained.
    pub fn tick_rate(mut self, hz: u32) -> Self {
        self.config.tick_rate = hz;
        self
    }

    /// Attaches a datagram peer transport, polled every tick.
    pub fn peer_transport<Q: PeerTransport>(self, transport: Arc<Q>) -> RelayServerBuilder<Q> {
        RelayServerBuilder {
            config: self.config,
            peer: Some(transport),
        }
    }

    /// Binds the listeners, authenticating with the configured shared key.
    pub async fn build(self) -> Result<RelayServer<SharedKeyAuth, P>, RelayError> {
        let mut auth = SharedKeyAuth::new(self.config.server_key.clone());
        if let Some(ns) = &self.config.game_namespace {
            auth = auth.with_namespace(ns.clone());
        }
        self.build_with_auth(auth).await
    }

    /// Binds the listeners with a custom authenticator.
    pub async fn build_with_auth<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<RelayServer<A, P>, RelayError> {
        let websocket = WebSocketServer::bind(&self.config.bind).await?;
        let stats = match &self.config.stats_bind {
            Some(addr) => Some(TcpListener::bind(addr).await.map_err(RelayError::Stats)?),
            None => None,
        };
        let registry = Arc::new(SessionRegistry::new(auth, self.config.idle_life));
        let (shutdown, _) = watch::channel(false);

        Ok(RelayServer {
            websocket,
            stats,
            peer: self.peer,
            registry,
            config: self.config,
            shutdown: Arc::new(shutdown),
        })
    }
}

/// Stops a running relay from anywhere.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// A bound relay, ready to [`run`](Self::run).
pub struct RelayServer<A: Authenticator, P: PeerTransport = LoopbackTransport> {
    websocket: WebSocketServer,
    stats: Option<TcpListener>,
    peer: Option<Arc<P>>,
    registry: Arc<SessionRegistry<A>>,
    config: RelayConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RelayServer<SharedKeyAuth, LoopbackTransport> {
    pub fn builder() -> RelayServerBuilder<LoopbackTransport> {
        RelayServerBuilder::new()
    }
}

impl<A: Authenticator, P: PeerTransport> RelayServer<A, P> {
    /// The WebSocket address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.websocket.local_addr()?)
    }

    /// The stats address actually bound, if stats are enabled.
    pub fn stats_addr(&self) -> Option<SocketAddr> {
        self.stats.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn registry(&self) -> Arc<SessionRegistry<A>> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Runs until shut down through a [`ShutdownHandle`].
    ///
    /// Every connection event is routed to that connection's handler task,
    /// spawned on first sight. On shutdown every session is closed and
    /// every room dropped.
    pub async fn run(self) -> Result<(), RelayError> {
        let Self {
            websocket,
            stats,
            peer,
            registry,
            config,
            shutdown,
        } = self;

        let stream_transport = Arc::new(websocket.handle());
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let websocket_task = tokio::spawn(websocket.run(stream_tx));

        let stats_task = stats.map(|listener| {
            tokio::spawn(serve_stats(listener, Arc::clone(&registry), shutdown.subscribe()))
        });
        let reaper_task = spawn_reaper(
            Arc::downgrade(&registry),
            config.reap_interval,
            shutdown.subscribe(),
        );

        let mut poll = match &peer {
            Some(_) => TickScheduler::with_rate(config.tick_rate),
            None => TickScheduler::new(TickConfig::default()),
        };
        let mut workers = Workers::new();
        let mut shutdown_rx = shutdown.subscribe();

        tracing::info!(
            idle_life_secs = config.idle_life.as_secs(),
            peer_transport = peer.is_some(),
            "relay running"
        );

        loop {
            tokio::select! {
                Some(event) = stream_rx.recv() => {
                    let key = ConnectionKey::stream(event.conn());
                    route(&mut workers, key, event, |rx| {
                        tokio::spawn(serve_stream(
                            Arc::clone(&registry),
                            Arc::clone(&stream_transport),
                            rx,
                        ));
                    });
                }
                _ = poll.wait_for_tick() => {
                    if let Some(peer) = &peer {
                        for event in peer.poll_events() {
                            let key = ConnectionKey::peer(event.conn());
                            route(&mut workers, key, event, |rx| {
                                tokio::spawn(serve_peer(Arc::clone(&registry), Arc::clone(peer), rx));
                            });
                        }
                    }
                    // Handlers of rejected peers end without a disconnect.
                    workers.retain(|_, tx| !tx.is_closed());
                    poll.record_tick_end();
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("relay shutting down");
        drop(stream_rx);
        drop(workers);
        registry.shutdown().await;

        let _ = reaper_task.await;
        if let Some(task) = stats_task {
            match task.await {
                Ok(Err(e)) => tracing::warn!(error = %e, "stats endpoint failed"),
                Ok(Ok(())) | Err(_) => {}
            }
        }
        let _ = websocket_task.await;
        Ok(())
    }
}

/// Hands `event` to its connection's handler, spawning one if needed.
/// A disconnect is the last event a handler sees.
fn route(
    workers: &mut Workers,
    key: ConnectionKey,
    event: TransportEvent,
    spawn: impl FnOnce(mpsc::UnboundedReceiver<TransportEvent>),
) {
    let last = matches!(event, TransportEvent::Disconnected { .. });
    let tx = match workers.entry(key) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let (tx, rx) = mpsc::unbounded_channel();
            spawn(rx);
            entry.insert(tx)
        }
    };
    let delivered = tx.send(event).is_ok();
    if last || !delivered {
        if !delivered {
            tracing::debug!(%key, "handler gone, dropping event");
        }
        workers.remove(&key);
    }
}
