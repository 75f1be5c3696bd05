//! # Gridhold World Server
//!
//! Tick-less authoritative grid world. Clients submit intent, one worker
//! applies it to the shared world, and each result is delivered only to the
//! connections whose identity the result names.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GRIDHOLD SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Xorshift128+ PRNG and dice                │
//! │  └── hash.rs     - World state hashing                       │
//! │                                                              │
//! │  world/          - World model                               │
//! │  ├── entity.rs   - Entities and the ordered entity set       │
//! │  ├── item.rs     - Weapons and armor                         │
//! │  ├── state.rs    - World container, JSON load/save           │
//! │  └── generation.rs - Room stamping helpers                   │
//! │                                                              │
//! │  game/           - Execution and replay                      │
//! │  ├── execute.rs  - Request dispatch and errors               │
//! │  ├── movement.rs - Steps and their redirects                 │
//! │  ├── combat.rs   - Melee and range attacks                   │
//! │  ├── toggle.rs   - Open and close                            │
//! │  ├── perception.rs - View box                                │
//! │  └── replay.rs   - Applying responses to a local copy        │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - Envelopes, handshake, framing             │
//! │  ├── topic.rs    - Identity topics                           │
//! │  ├── worker.rs   - Single world-mutation task                │
//! │  ├── server.rs   - TCP accept loop, connection roles         │
//! │  └── client.rs   - Client with local replay                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! connection → `Request` → worker queue → `execute` mutates `World` →
//! `Response` published on `affected_ids()` → subscribers replay it.
//!
//! ## Ordering Guarantee
//!
//! Requests are applied in the order the worker dequeues them, one at a
//! time. Connection tasks never touch the world.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod world;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::ServerConfig;
pub use core::rng::{Dice, DeterministicRng};
pub use world::{Entity, Item, Position, World};
pub use game::{execute, ExecContext, ExecuteError};
pub use network::{GameClient, GameServer, Request, Response};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
