//! World Worker
//!
//! The single owner of the authoritative [`World`]. Producer connections
//! submit requests over one shared queue; the worker applies them strictly
//! in dequeue order and publishes each response to the topics it names.
//! Rejections go back to the submitting connection only.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::rng::Dice;
use crate::game::execute::{execute, ExecContext, DEFAULT_ACTION_COOLDOWN_SECS};
use crate::network::protocol::{Rejection, Request, Response};
use crate::network::topic::{Payload, TopicRegistry};
use crate::world::state::World;

/// Default inbound queue length.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Channel carrying rejection notices back to one producer connection.
pub type ReplySender = mpsc::Sender<String>;

/// A request together with the connection it came from.
#[derive(Debug)]
pub struct Submission {
    /// Decoded request.
    pub request: Request,
    /// Outbound channel of the submitting connection.
    pub reply: ReplySender,
}

/// Source of the current unix time in seconds.
pub type Clock = Box<dyn Fn() -> i64 + Send>;

/// Wall clock via `chrono`.
pub fn system_clock() -> Clock {
    Box::new(|| chrono::Utc::now().timestamp())
}

/// Serialized world mutator.
pub struct WorldWorker {
    world: World,
    dice: Box<dyn Dice + Send>,
    topics: TopicRegistry,
    clock: Clock,
    action_cooldown_secs: u64,
    processed: u64,
}

impl WorldWorker {
    /// Worker over `world`, publishing on `topics`.
    pub fn new(world: World, dice: Box<dyn Dice + Send>, topics: TopicRegistry) -> Self {
        Self {
            world,
            dice,
            topics,
            clock: system_clock(),
            action_cooldown_secs: DEFAULT_ACTION_COOLDOWN_SECS,
            processed: 0,
        }
    }

    /// Override the Open/Close cooldown.
    pub fn with_action_cooldown(mut self, seconds: u64) -> Self {
        self.action_cooldown_secs = seconds;
        self
    }

    /// Override the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Requests processed so far, rejected ones included.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Execute one request and publish or reject it.
    ///
    /// Returns the response when the request succeeded.
    pub async fn process(&mut self, submission: Submission) -> Option<Response> {
        let Submission { request, reply } = submission;
        self.processed += 1;

        let outcome = {
            let mut ctx = ExecContext {
                dice: self.dice.as_mut(),
                now: (self.clock)(),
                action_cooldown_secs: self.action_cooldown_secs,
            };
            execute(&mut self.world, &request, &mut ctx)
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!(request = request.type_name(), actor = %request.actor_id(), "Rejected: {}", e);
                let rejection = Rejection::for_request(&request, e.reason(), e.to_string());
                notify(&reply, &rejection);
                return None;
            }
        };

        debug!(
            seq = self.processed,
            request = request.type_name(),
            response = response.type_name(),
            "Processed request"
        );

        #[cfg(feature = "debug-tracing")]
        debug!(
            state_hash = %hex::encode(self.world.state_hash()),
            entities_hash = %hex::encode(self.world.entities_hash()),
            "World state"
        );

        match response.to_json() {
            Ok(json) => {
                let payload: Payload = Arc::from(json);
                self.topics.publish_all(&response.affected_ids(), payload).await;
            }
            Err(e) => warn!("Failed to encode response: {}", e),
        }

        Some(response)
    }

    /// Drain `inbound` until every producer has hung up, then return the world.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Submission>) -> World {
        info!(
            entities = self.world.entities.len(),
            items = self.world.items.len(),
            state_hash = %hex::encode(self.world.state_hash()),
            "World worker started"
        );

        while let Some(submission) = inbound.recv().await {
            self.process(submission).await;
        }

        info!(processed = self.processed, "World worker stopped");
        self.world
    }

    /// Spawn the worker on the runtime with a fresh inbound queue.
    pub fn spawn(self, queue_capacity: usize) -> (mpsc::Sender<Submission>, JoinHandle<World>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }
}

/// Hand a rejection to the producer without waiting on it.
fn notify(reply: &ReplySender, rejection: &Rejection) {
    let json = match rejection.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode rejection: {}", e);
            return;
        }
    };
    if let Err(e) = reply.try_send(json) {
        debug!("Rejection not delivered: {}", e);
    }
}
