//! Protocol Messages
//!
//! Wire format for client-server communication over TCP.
//! Every message is one JSON record terminated by `\n`. Requests and
//! responses travel in an envelope `{"type": <variant name>, <payload key>: {...}}`
//! where the payload key is `request` or `response`.

use std::time::Duration;

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::world::entity::{Direction, Entity};

/// Record delimiter.
pub const DELIMITER: u8 = b'\n';

/// Protocol errors. All of them are fatal to the connection that hit them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Record is not valid JSON, or a payload does not fit its variant.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope names a variant this server does not know.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream.
    #[error("connection closed")]
    Closed,

    /// No traffic within the inactivity window.
    #[error("connection idle for {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// First record on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Identity declared by the client; also its subscription topic.
    pub id: Uuid,
    /// True for a subscriber connection, false for a producer.
    #[serde(default)]
    pub subscribe: bool,
}

impl Handshake {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// The acknowledgement the server echoes back: the identifier as a JSON string.
    pub fn ack(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.id)
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Attack with the primary melee weapon, or bare hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeleeAttackRequest {
    /// Acting entity.
    pub attacker_id: Uuid,
    /// Entity being attacked.
    pub target_id: Uuid,
}

/// Attack with the primary range weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeAttackRequest {
    /// Acting entity.
    pub attacker_id: Uuid,
    /// Entity being attacked.
    pub target_id: Uuid,
}

/// Open a toggleable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Acting entity.
    pub actor_id: Uuid,
    /// Door to open.
    pub target_id: Uuid,
}

/// Close a toggleable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    /// Acting entity.
    pub actor_id: Uuid,
    /// Door to close.
    pub target_id: Uuid,
}

/// Step one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Moving entity.
    pub actor_id: Uuid,
    /// Direction of the step.
    pub direction: Direction,
}

/// Ask for everything around the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    /// Looking entity.
    pub actor_id: Uuid,
}

/// Every intent a client can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Melee attack.
    MeleeAttack(MeleeAttackRequest),
    /// Range attack.
    RangeAttack(RangeAttackRequest),
    /// Open a door.
    Open(OpenRequest),
    /// Close a door.
    Close(CloseRequest),
    /// Step one cell.
    Move(MoveRequest),
    /// Look around.
    View(ViewRequest),
}

#[derive(Serialize, Deserialize)]
struct RequestEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    request: Value,
}

impl Request {
    /// Envelope discriminants, in registry order.
    pub const TYPES: [&'static str; 6] = [
        "MeleeAttackRequest",
        "RangeAttackRequest",
        "OpenRequest",
        "CloseRequest",
        "MoveRequest",
        "ViewRequest",
    ];

    /// Envelope discriminant of this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::MeleeAttack(_) => "MeleeAttackRequest",
            Request::RangeAttack(_) => "RangeAttackRequest",
            Request::Open(_) => "OpenRequest",
            Request::Close(_) => "CloseRequest",
            Request::Move(_) => "MoveRequest",
            Request::View(_) => "ViewRequest",
        }
    }

    /// The entity initiating the request.
    pub fn actor_id(&self) -> Uuid {
        match self {
            Request::MeleeAttack(r) => r.attacker_id,
            Request::RangeAttack(r) => r.attacker_id,
            Request::Open(r) => r.actor_id,
            Request::Close(r) => r.actor_id,
            Request::Move(r) => r.actor_id,
            Request::View(r) => r.actor_id,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Request::MeleeAttack(r) => serde_json::to_value(r),
            Request::RangeAttack(r) => serde_json::to_value(r),
            Request::Open(r) => serde_json::to_value(r),
            Request::Close(r) => serde_json::to_value(r),
            Request::Move(r) => serde_json::to_value(r),
            Request::View(r) => serde_json::to_value(r),
        }
    }

    /// Serialize to an envelope JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = RequestEnvelope {
            kind: self.type_name().to_string(),
            request: self.payload()?,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Deserialize from an envelope JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let envelope: RequestEnvelope = serde_json::from_str(s)?;
        let payload = envelope.request;

        let request = match envelope.kind.as_str() {
            "MeleeAttackRequest" => Request::MeleeAttack(serde_json::from_value(payload)?),
            "RangeAttackRequest" => Request::RangeAttack(serde_json::from_value(payload)?),
            "OpenRequest" => Request::Open(serde_json::from_value(payload)?),
            "CloseRequest" => Request::Close(serde_json::from_value(payload)?),
            "MoveRequest" => Request::Move(serde_json::from_value(payload)?),
            "ViewRequest" => Request::View(serde_json::from_value(payload)?),
            _ => return Err(ProtocolError::UnknownType(envelope.kind)),
        };

        Ok(request)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Outcome of a melee or range attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResponse {
    /// Acting entity.
    pub attacker_id: Uuid,
    /// Entity attacked.
    pub target_id: Uuid,
    /// Whether the attack connected.
    pub did_hit: bool,
    /// Health removed from the target.
    pub damage: i32,
    /// Target health after the attack; 0 means it was removed.
    pub health_remaining: i32,
}

/// New open state of a toggleable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleResponse {
    /// Acting entity.
    pub actor_id: Uuid,
    /// Toggled entity.
    pub target_id: Uuid,
    /// Open after the toggle.
    pub is_open: bool,
}

/// New position of a moved entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResponse {
    /// Moved entity.
    pub actor_id: Uuid,
    /// New column.
    pub x: i32,
    /// New row.
    pub y: i32,
}

/// Full picture of the actor's surroundings.
///
/// Replaces the receiver's whole entity set when replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewResponse {
    /// Looking entity.
    pub actor_id: Uuid,
    /// Every entity inside the view box.
    pub objects: Vec<Entity>,
}

/// Every result the server publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Result of a melee attack.
    MeleeAttack(AttackResponse),
    /// Result of a range attack.
    RangeAttack(AttackResponse),
    /// Result of an open or close.
    Toggle(ToggleResponse),
    /// Result of a step.
    Move(MoveResponse),
    /// Result of a look.
    View(ViewResponse),
    /// Several responses applied in order.
    Wrapper(Vec<Response>),
}

#[derive(Serialize, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    response: Value,
}

#[derive(Serialize, Deserialize)]
struct WrapperPayload {
    responses: Vec<ResponseEnvelope>,
}

impl Response {
    /// Envelope discriminant of this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Response::MeleeAttack(_) => "MeleeAttackResponse",
            Response::RangeAttack(_) => "RangeAttackResponse",
            Response::Toggle(_) => "ToggleResponse",
            Response::Move(_) => "MoveResponse",
            Response::View(_) => "ViewResponse",
            Response::Wrapper(_) => "Wrapper",
        }
    }

    /// Entity identifiers whose subscribers receive this response.
    ///
    /// A wrapper yields its children's identifiers in order, duplicates included.
    pub fn affected_ids(&self) -> Vec<Uuid> {
        match self {
            Response::MeleeAttack(r) | Response::RangeAttack(r) => vec![r.attacker_id, r.target_id],
            Response::Toggle(r) => vec![r.actor_id, r.target_id],
            Response::Move(r) => vec![r.actor_id],
            Response::View(r) => vec![r.actor_id],
            Response::Wrapper(children) => {
                children.iter().flat_map(Response::affected_ids).collect()
            }
        }
    }

    fn to_envelope(&self) -> Result<ResponseEnvelope, serde_json::Error> {
        let response = match self {
            Response::MeleeAttack(r) | Response::RangeAttack(r) => serde_json::to_value(r)?,
            Response::Toggle(r) => serde_json::to_value(r)?,
            Response::Move(r) => serde_json::to_value(r)?,
            Response::View(r) => serde_json::to_value(r)?,
            Response::Wrapper(children) => {
                let responses = children
                    .iter()
                    .map(Response::to_envelope)
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_value(WrapperPayload { responses })?
            }
        };

        Ok(ResponseEnvelope {
            kind: self.type_name().to_string(),
            response,
        })
    }

    fn from_envelope(envelope: ResponseEnvelope) -> Result<Self, ProtocolError> {
        let payload = envelope.response;

        let response = match envelope.kind.as_str() {
            "MeleeAttackResponse" => Response::MeleeAttack(serde_json::from_value(payload)?),
            "RangeAttackResponse" => Response::RangeAttack(serde_json::from_value(payload)?),
            "ToggleResponse" => Response::Toggle(serde_json::from_value(payload)?),
            "MoveResponse" => Response::Move(serde_json::from_value(payload)?),
            "ViewResponse" => Response::View(serde_json::from_value(payload)?),
            "Wrapper" => {
                let wrapper: WrapperPayload = serde_json::from_value(payload)?;
                let children = wrapper
                    .responses
                    .into_iter()
                    .map(Response::from_envelope)
                    .collect::<Result<Vec<_>, _>>()?;
                Response::Wrapper(children)
            }
            _ => return Err(ProtocolError::UnknownType(envelope.kind)),
        };

        Ok(response)
    }

    /// Serialize to an envelope JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.to_envelope()?)?)
    }

    /// Deserialize from an envelope JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let envelope: ResponseEnvelope = serde_json::from_str(s)?;
        Self::from_envelope(envelope)
    }
}

// =============================================================================
// REJECTIONS
// =============================================================================

/// Why a submitted request was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Actor or target missing from the world.
    NotFound,
    /// Actor's timer has not elapsed.
    NotReady,
    /// Target cannot be acted on this way.
    InvalidTarget,
    /// Envelope named an unknown request type.
    UnknownType,
    /// Record could not be decoded.
    Malformed,
}

/// Notice written back to the producer connection that submitted a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Discriminant of the rejected request, when it could be decoded.
    pub request_type: Option<String>,
    /// Actor of the rejected request, when it could be decoded.
    pub actor_id: Option<Uuid>,
    /// Machine-readable reason.
    pub reason: RejectReason,
    /// Human-readable detail.
    pub message: String,
}

impl Rejection {
    /// Envelope discriminant.
    pub const TYPE: &'static str = "Rejected";

    /// Rejection for a request that decoded but failed to execute.
    pub fn for_request(request: &Request, reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            request_type: Some(request.type_name().to_string()),
            actor_id: Some(request.actor_id()),
            reason,
            message: message.into(),
        }
    }

    /// Rejection for a record that never decoded into a request.
    pub fn for_decode_error(err: &ProtocolError) -> Self {
        let reason = match err {
            ProtocolError::UnknownType(_) => RejectReason::UnknownType,
            _ => RejectReason::Malformed,
        };
        Self {
            request_type: None,
            actor_id: None,
            reason,
            message: err.to_string(),
        }
    }

    /// Serialize to an envelope JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let envelope = ResponseEnvelope {
            kind: Self::TYPE.to_string(),
            response: serde_json::to_value(self)?,
        };
        serde_json::to_string(&envelope)
    }

    /// Deserialize from an envelope JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        let envelope: ResponseEnvelope = serde_json::from_str(s)?;
        if envelope.kind != Self::TYPE {
            return Err(ProtocolError::UnknownType(envelope.kind));
        }
        Ok(serde_json::from_value(envelope.response)?)
    }
}

// =============================================================================
// FRAMING
// =============================================================================

/// Read one newline-terminated record, without its delimiter.
///
/// The inactivity window restarts on every call.
pub async fn read_frame<R>(reader: &mut R, idle: Duration) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = tokio::time::timeout(idle, reader.read_until(DELIMITER, &mut buf))
        .await
        .map_err(|_| ProtocolError::Timeout(idle))??;

    if read == 0 {
        return Err(ProtocolError::Closed);
    }
    if buf.last() == Some(&DELIMITER) {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf).map_err(|e| {
        ProtocolError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

/// Write one record followed by the delimiter.
pub async fn write_frame<W>(writer: &mut W, record: &str, idle: Duration) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(record.len() + 1);
    line.extend_from_slice(record.as_bytes());
    line.push(DELIMITER);

    tokio::time::timeout(idle, async {
        writer.write_all(&line).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout(idle))??;

    Ok(())
}
