//! TCP Game Server
//!
//! Accepts line-protocol connections. After the handshake each connection
//! takes one of two roles:
//! - producer: reads request records and feeds the shared worker queue,
//!   receiving only rejection notices in return
//! - subscriber: receives every response published on its declared identifier

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::rng::{DeterministicRng, Dice};
use crate::network::protocol::{
    read_frame, write_frame, Handshake, ProtocolError, Rejection, Request,
};
use crate::network::topic::{Subscription, TopicRegistry};
use crate::network::worker::{Submission, WorldWorker};
use crate::world::state::World;

/// How long a closing producer waits for its last notices to flush.
const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Outbound notice queue per producer.
const PRODUCER_OUTBOUND: usize = 16;

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Role chosen in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Submits requests.
    Producer,
    /// Receives responses.
    Subscriber,
}

/// Connected client state.
struct ConnectedClient {
    /// Declared identifier, once the handshake is done.
    id: Option<Uuid>,
    /// Role, once the handshake is done.
    role: Option<Role>,
    /// Connection time.
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Bound listener.
    listener: TcpListener,
    /// Fan-out by identifier.
    topics: TopicRegistry,
    /// Worker queue.
    inbound: mpsc::Sender<Submission>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Bind the listener. Requests are forwarded to `inbound`.
    pub async fn bind(
        config: ServerConfig,
        inbound: mpsc::Sender<Submission>,
        topics: TopicRegistry,
    ) -> Result<Self, GameServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| GameServerError::BindFailed { addr: config.bind_addr, source })?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            listener,
            topics,
            inbound,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, GameServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until [`shutdown`](Self::shutdown).
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        info!("Game server listening on {}", self.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Spawn the task serving one connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let topics = self.topics.clone();
        let inbound = self.inbound.clone();
        let idle = self.config.idle_timeout;
        let shutdown_rx = self.shutdown_tx.subscribe();

        clients.write().await.insert(addr, ConnectedClient {
            id: None,
            role: None,
            connected_at: Instant::now(),
        });

        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            let reader = BufReader::new(read_half);

            let session = Session { addr, clients: clients.clone(), topics, inbound, idle };
            match session.serve(reader, write_half, shutdown_rx).await {
                Ok(()) | Err(ProtocolError::Closed) => debug!("Client {} disconnected", addr),
                Err(ProtocolError::Timeout(t)) => info!("Client {} idle for {:?}, dropping", addr, t),
                Err(e) => warn!("Client {} dropped: {}", addr, e),
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                debug!(
                    id = ?client.id,
                    role = ?client.role,
                    secs = client.connected_at.elapsed().as_secs(),
                    "Client {} cleaned up", addr
                );
            }
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Topic registry shared with the worker.
    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }
}

/// Spawn the worker over `world` and bind a server feeding it.
pub async fn launch(
    config: ServerConfig,
    world: World,
) -> Result<(GameServer, JoinHandle<World>), GameServerError> {
    let dice: Box<dyn Dice + Send> = Box::new(match config.seed {
        Some(seed) => DeterministicRng::new(seed),
        None => DeterministicRng::from_entropy(),
    });
    let topics = TopicRegistry::new(config.delivery);

    let worker = WorldWorker::new(world, dice, topics.clone())
        .with_action_cooldown(config.action_cooldown_secs);
    let (inbound, handle) = worker.spawn(config.queue_capacity);

    let server = GameServer::bind(config, inbound, topics).await?;
    Ok((server, handle))
}

/// Everything a connection task shares with the server.
struct Session {
    addr: SocketAddr,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    topics: TopicRegistry,
    inbound: mpsc::Sender<Submission>,
    idle: Duration,
}

impl Session {
    /// Handshake, then serve the chosen role.
    ///
    /// A subscriber is registered before its acknowledgement goes out, so
    /// nothing published after the ack can miss it.
    async fn serve(
        self,
        mut reader: BufReader<OwnedReadHalf>,
        mut writer: OwnedWriteHalf,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ProtocolError> {
        let line = read_frame(&mut reader, self.idle).await?;
        let hs = Handshake::from_json(&line)?;
        let role = if hs.subscribe { Role::Subscriber } else { Role::Producer };

        if let Some(client) = self.clients.write().await.get_mut(&self.addr) {
            client.id = Some(hs.id);
            client.role = Some(role);
        }
        info!(addr = %self.addr, id = %hs.id, ?role, "Handshake complete");

        match role {
            Role::Producer => {
                write_frame(&mut writer, &hs.ack()?, self.idle).await?;
                serve_producer(reader, writer, self.inbound, self.idle, shutdown_rx).await
            }
            Role::Subscriber => {
                let mut subscription = self.topics.subscribe(hs.id).await;
                let result = match write_frame(&mut writer, &hs.ack()?, self.idle).await {
                    Ok(()) => {
                        serve_subscriber(reader, writer, &mut subscription, self.idle, shutdown_rx)
                            .await
                    }
                    Err(e) => Err(e),
                };
                self.topics.unsubscribe(&subscription).await;
                result
            }
        }
    }
}

/// Decode requests until the peer leaves or sends something undecodable.
async fn serve_producer(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    inbound: mpsc::Sender<Submission>,
    idle: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ProtocolError> {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(PRODUCER_OUTBOUND);

    let mut sender_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &line, idle).await {
                debug!("Notice write failed: {}", e);
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            frame = read_frame(&mut reader, idle) => {
                let line = match frame {
                    Ok(line) => line,
                    Err(e) => break Err(e),
                };

                match Request::from_json(&line) {
                    Ok(request) => {
                        debug!(request = request.type_name(), actor = %request.actor_id(), "Request received");
                        let submission = Submission { request, reply: out_tx.clone() };
                        if inbound.send(submission).await.is_err() {
                            error!("World worker stopped, closing producer");
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        if let Ok(json) = Rejection::for_decode_error(&e).to_json() {
                            let _ = out_tx.send(json).await;
                        }
                        break Err(e);
                    }
                }
            }
            _ = shutdown_rx.recv() => break Ok(()),
        }
    };

    drop(out_tx);
    if tokio::time::timeout(FLUSH_GRACE, &mut sender_task).await.is_err() {
        sender_task.abort();
    }

    result
}

/// Forward published messages until the peer leaves or goes quiet.
async fn serve_subscriber(
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    subscription: &mut Subscription,
    idle: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ProtocolError> {
    loop {
        tokio::select! {
            next = tokio::time::timeout(idle, subscription.recv()) => {
                match next {
                    Ok(Some(payload)) => {
                        if let Err(e) = write_frame(&mut writer, &payload, idle).await {
                            break Err(e);
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(_) => break Err(ProtocolError::Timeout(idle)),
                }
            }
            filled = reader.fill_buf() => {
                // subscribers have nothing to say; input only signals liveness
                let n = match filled {
                    Ok(buf) => buf.len(),
                    Err(e) => break Err(ProtocolError::Io(e)),
                };
                if n == 0 {
                    break Err(ProtocolError::Closed);
                }
                reader.consume(n);
            }
            _ = shutdown_rx.recv() => break Ok(()),
        }
    }
}
