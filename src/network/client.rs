//! Line-Protocol Client
//!
//! Opens the two connections an identity needs: a producer for requests
//! and a subscriber for responses. The subscriber keeps a local world copy
//! up to date by replaying every response it receives.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DEFAULT_IDLE_TIMEOUT;
use crate::network::protocol::{read_frame, write_frame, Handshake, ProtocolError, Rejection, Request, Response};
use crate::world::state::World;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting failed.
    #[error("connect to {addr}: {source}")]
    Connect {
        /// Server address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Wire failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server acknowledged a different identity.
    #[error("handshake acknowledged {got}, expected {expected}")]
    HandshakeMismatch {
        /// Identifier sent.
        expected: Uuid,
        /// Identifier echoed.
        got: String,
    },
}

async fn open(
    addr: SocketAddr,
    id: Uuid,
    subscribe: bool,
    idle: Duration,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect { addr, source })?;
    let (r, mut writer) = stream.into_split();
    let mut reader = BufReader::new(r);

    let hs = Handshake { id, subscribe };
    write_frame(&mut writer, &hs.to_json().map_err(ProtocolError::from)?, idle).await?;

    let ack = read_frame(&mut reader, idle).await?;
    let echoed: Option<Uuid> = serde_json::from_str(&ack).ok();
    if echoed != Some(id) {
        return Err(ClientError::HandshakeMismatch { expected: id, got: ack });
    }

    debug!(%addr, %id, subscribe, "Connected");
    Ok((reader, writer))
}

type LineResult = Result<String, ProtocolError>;

/// Move reads onto their own task so waiting for a line can be cancelled
/// without losing a partially read record.
fn spawn_line_reader(
    mut reader: BufReader<OwnedReadHalf>,
    idle: Duration,
) -> (mpsc::Receiver<LineResult>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let task = tokio::spawn(async move {
        loop {
            let line = read_frame(&mut reader, idle).await;
            let stop = line.is_err();
            if tx.send(line).await.is_err() || stop {
                break;
            }
        }
    });
    (rx, task)
}

async fn next_line(lines: &mut mpsc::Receiver<LineResult>) -> Result<String, ProtocolError> {
    lines.recv().await.unwrap_or(Err(ProtocolError::Closed))
}

/// Request-sending half.
pub struct Producer {
    writer: OwnedWriteHalf,
    lines: mpsc::Receiver<LineResult>,
    reader_task: JoinHandle<()>,
    idle: Duration,
}

impl Producer {
    /// Open a producer connection for `id`.
    pub async fn connect(addr: SocketAddr, id: Uuid, idle: Duration) -> Result<Self, ClientError> {
        let (reader, writer) = open(addr, id, false, idle).await?;
        let (lines, reader_task) = spawn_line_reader(reader, idle);
        Ok(Self { writer, lines, reader_task, idle })
    }

    /// Submit one request.
    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        write_frame(&mut self.writer, &request.to_json()?, self.idle).await?;
        Ok(())
    }

    /// Wait for the next rejection notice. Cancel-safe.
    pub async fn next_rejection(&mut self) -> Result<Rejection, ClientError> {
        let line = next_line(&mut self.lines).await?;
        Ok(Rejection::from_json(&line)?)
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Response-receiving half with a replayed world.
pub struct Subscriber {
    // held so the server does not see a half-closed socket
    _writer: OwnedWriteHalf,
    lines: mpsc::Receiver<LineResult>,
    reader_task: JoinHandle<()>,
    world: World,
}

impl Subscriber {
    /// Open a subscriber connection for `id`.
    pub async fn connect(addr: SocketAddr, id: Uuid, idle: Duration) -> Result<Self, ClientError> {
        let (reader, writer) = open(addr, id, true, idle).await?;
        let (lines, reader_task) = spawn_line_reader(reader, idle);
        Ok(Self { _writer: writer, lines, reader_task, world: World::new() })
    }

    /// Wait for the next response and replay it locally. Cancel-safe.
    ///
    /// A response that does not fit the local copy is still returned;
    /// the mismatch is logged and a fresh View will repair it.
    pub async fn next_response(&mut self) -> Result<Response, ClientError> {
        let line = next_line(&mut self.lines).await?;
        let response = Response::from_json(&line)?;
        if let Err(e) = response.apply(&mut self.world) {
            warn!(response = response.type_name(), "Local replay failed: {}", e);
        }
        Ok(response)
    }

    /// The replayed world.
    pub fn world(&self) -> &World {
        &self.world
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Both halves for one identity.
pub struct GameClient {
    /// Identity declared to the server.
    pub id: Uuid,
    /// Request half.
    pub producer: Producer,
    /// Response half.
    pub subscriber: Subscriber,
}

impl GameClient {
    /// Connect both halves with the default idle timeout.
    ///
    /// The subscriber is opened first so no response to this client's own
    /// requests can be missed.
    pub async fn connect(addr: SocketAddr, id: Uuid) -> Result<Self, ClientError> {
        Self::connect_with_timeout(addr, id, DEFAULT_IDLE_TIMEOUT).await
    }

    /// Connect both halves with an explicit idle timeout.
    pub async fn connect_with_timeout(
        addr: SocketAddr,
        id: Uuid,
        idle: Duration,
    ) -> Result<Self, ClientError> {
        let subscriber = Subscriber::connect(addr, id, idle).await?;
        let producer = Producer::connect(addr, id, idle).await?;
        Ok(Self { id, producer, subscriber })
    }

    /// Submit one request.
    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        self.producer.send(request).await
    }

    /// Next response on this identity's topic, already replayed.
    pub async fn next_response(&mut self) -> Result<Response, ClientError> {
        self.subscriber.next_response().await
    }

    /// The replayed world.
    pub fn world(&self) -> &World {
        self.subscriber.world()
    }
}
