//! Network Layer
//!
//! Newline-delimited JSON over TCP. Many connections, one world worker.
//! All world mutation happens in `worker`; connection tasks only decode,
//! enqueue and forward.
//!
//! ## Module Structure
//!
//! - `protocol`: Wire envelopes, handshake, rejection notices, framing
//! - `topic`: Identifier-keyed fan-out with a delivery policy
//! - `worker`: The single world-mutation task
//! - `server`: Accept loop and producer/subscriber connection roles
//! - `client`: Client side of the line protocol with local replay

pub mod protocol;
pub mod topic;
pub mod worker;
pub mod server;
pub mod client;

pub use protocol::{
    Handshake, ProtocolError, RejectReason, Rejection, Request, Response,
    AttackResponse, MoveResponse, ToggleResponse, ViewResponse,
};
pub use topic::{DeliveryPolicy, Subscription, TopicRegistry};
pub use worker::{Submission, WorldWorker};
pub use server::{launch, GameServer, GameServerError, Role};
pub use client::{ClientError, GameClient, Producer, Subscriber};
