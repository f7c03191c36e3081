//! Wire protocol.
//!
//! Every frame is `[length: u32 LE][message tag: u8][payload]`, where the
//! length counts the tag and payload. Snapshot, delta and state payloads are
//! bincode; control payloads are JSON. Entity ids on the wire are always the
//! server's ids.

use crate::components::{
    CookingTimer, ItemStock, ItemType, NetworkId, Order, OrderQueue, Relation, Tag, TagSet,
};
use crate::ecs::{EntityId, World, WorldChange};
use crate::error::ProtocolError;
use crate::movement::InputFlags;
use crate::{Vec2, MAX_INPUT_DT_MS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_LEN: usize = 1 << 20;
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Snapshot = 0x01,
    Delta = 0x02,
    State = 0x03,
    Control = 0x04,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x01 => Ok(MessageType::Snapshot),
            0x02 => Ok(MessageType::Delta),
            0x03 => Ok(MessageType::State),
            0x04 => Ok(MessageType::Control),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Every component value of one networked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub network_id: Option<NetworkId>,
    pub tags: TagSet,
    pub position: Option<Vec2>,
    pub velocity: Option<Vec2>,
    pub facing: Option<Vec2>,
    pub size: Option<Vec2>,
    pub held_by: Option<EntityId>,
    pub sitting_on: Option<EntityId>,
    pub stock: Option<ItemStock>,
    pub spawn_type: Option<ItemType>,
    pub order_queue: Option<OrderQueue>,
    pub order: Option<Order>,
    pub cooking: Option<CookingTimer>,
}

impl EntityRecord {
    pub fn capture(world: &World, entity: EntityId) -> Self {
        Self {
            id: entity,
            network_id: world.network_ids.get(entity).copied(),
            tags: world.tag_set(entity),
            position: world.positions.get(entity).copied(),
            velocity: world.velocities.get(entity).copied(),
            facing: world.facings.get(entity).copied(),
            size: world.sizes.get(entity).copied(),
            held_by: world.held_by(entity),
            sitting_on: world.sitting_on(entity),
            stock: world.stocks.get(entity).copied(),
            spawn_type: world.spawn_types.get(entity).copied(),
            order_queue: world.order_queues.get(entity).cloned(),
            order: world.orders.get(entity).copied(),
            cooking: world.cooking_timers.get(entity).copied(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u32,
    pub entities: Vec<EntityRecord>,
}

/// Full state of every networked entity.
pub fn capture_snapshot(world: &World, tick: u32) -> Snapshot {
    Snapshot {
        tick,
        entities: world
            .tagged(Tag::Networked)
            .map(|entity| EntityRecord::capture(world, entity))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeltaOp {
    Added(EntityRecord),
    Removed(EntityId),
    Attached {
        relation: Relation,
        subject: EntityId,
        target: EntityId,
    },
    Detached {
        relation: Relation,
        subject: EntityId,
    },
    Changed(EntityRecord),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Builds the delta since `cursor` and advances it. Records are captured at
/// call time, so repeated changes to one entity collapse into one record.
pub fn collect_delta(world: &World, cursor: &mut u64) -> Delta {
    let Some(journal) = world.journal() else {
        return Delta::default();
    };
    let (changes, next) = journal.since(*cursor);
    *cursor = next;

    let mut ops = Vec::new();
    let mut current: HashSet<EntityId> = HashSet::new();
    let live = |entity: EntityId| world.is_alive(entity) && world.has_tag(entity, Tag::Networked);

    for change in changes {
        match change {
            WorldChange::Spawned(entity) => {
                if live(entity) && current.insert(entity) {
                    ops.push(DeltaOp::Added(EntityRecord::capture(world, entity)));
                }
            }
            WorldChange::Despawned(entity) => {
                current.remove(&entity);
                ops.push(DeltaOp::Removed(entity));
            }
            WorldChange::Attached {
                relation,
                subject,
                target,
            } => ops.push(DeltaOp::Attached {
                relation,
                subject,
                target,
            }),
            WorldChange::Detached { relation, subject } => {
                ops.push(DeltaOp::Detached { relation, subject })
            }
            WorldChange::Changed(entity) => {
                if live(entity) && current.insert(entity) {
                    ops.push(DeltaOp::Changed(EntityRecord::capture(world, entity)));
                }
            }
        }
    }

    Delta { ops }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Vec2,
}

/// Per-tick positional broadcast, personalised with the receiver's acks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBroadcast {
    pub tick: u32,
    pub player: Option<EntityId>,
    pub last_acked_seq: u32,
    pub last_interact_seq: u32,
    pub entities: Vec<EntityState>,
}

/// Positional state of every networked entity that has a position.
pub fn capture_states(world: &World) -> Vec<EntityState> {
    world
        .tagged(Tag::Networked)
        .filter_map(|entity| {
            Some(EntityState {
                id: entity,
                position: *world.positions.get(entity)?,
                velocity: world.velocities.get(entity).copied().unwrap_or_default(),
                facing: world.facings.get(entity).copied().unwrap_or_default(),
            })
        })
        .collect()
}

/// JSON control messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientControl {
    #[serde(rename_all = "camelCase")]
    Input {
        seq: u32,
        dt_ms: f32,
        flags: InputFlags,
    },
    /// Client-computed absolute position; only honoured by servers that
    /// trust client positions.
    #[serde(rename_all = "camelCase")]
    Move {
        seq: u32,
        x: f32,
        y: f32,
        facing_x: f32,
        facing_y: f32,
    },
    Interact {
        #[serde(default)]
        seq: u32,
    },
    Signal {
        to: EntityId,
        signal: serde_json::Value,
    },
}

impl ClientControl {
    /// Rejects commands the simulation must never see.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientControl::Input { dt_ms, flags, .. } => {
                if !dt_ms.is_finite() || *dt_ms < 0.0 {
                    return Err(ProtocolError::MalformedCommand("dtMs must be finite and >= 0"));
                }
                if !flags.is_valid() {
                    return Err(ProtocolError::MalformedCommand("unknown input flag bits"));
                }
                Ok(())
            }
            ClientControl::Move {
                x,
                y,
                facing_x,
                facing_y,
                ..
            } => {
                if Vec2::new(*x, *y).is_finite() && Vec2::new(*facing_x, *facing_y).is_finite() {
                    Ok(())
                } else {
                    Err(ProtocolError::MalformedCommand("non-finite move coordinates"))
                }
            }
            ClientControl::Interact { .. } | ClientControl::Signal { .. } => Ok(()),
        }
    }
}

/// Clamped per-command simulation step in seconds.
pub fn command_dt_secs(dt_ms: f32) -> f32 {
    dt_ms.clamp(0.0, MAX_INPUT_DT_MS) / 1000.0
}

/// JSON control messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerControl {
    #[serde(rename_all = "camelCase")]
    Welcome {
        network_id: NetworkId,
        session_id: String,
        entity_id: EntityId,
        protocol_version: u32,
    },
    Rejected {
        reason: String,
    },
    Signal {
        from: EntityId,
        signal: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Snapshot(Snapshot),
    Delta(Delta),
    State(StateBroadcast),
    Control(ServerControl),
}

impl ServerFrame {
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerFrame::Snapshot(_) => MessageType::Snapshot,
            ServerFrame::Delta(_) => MessageType::Delta,
            ServerFrame::State(_) => MessageType::State,
            ServerFrame::Control(_) => MessageType::Control,
        }
    }
}

fn frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + 1 + payload.len());
    out.extend_from_slice(&((1 + payload.len()) as u32).to_le_bytes());
    out.push(message_type as u8);
    out.extend_from_slice(payload);
    out
}

pub fn encode_server_frame(message: &ServerFrame) -> Result<Vec<u8>, ProtocolError> {
    let payload = match message {
        ServerFrame::Snapshot(snapshot) => bincode::serialize(snapshot)?,
        ServerFrame::Delta(delta) => bincode::serialize(delta)?,
        ServerFrame::State(state) => bincode::serialize(state)?,
        ServerFrame::Control(control) => serde_json::to_vec(control)?,
    };
    Ok(frame(message.message_type(), &payload))
}

/// Decodes a frame body (tag plus payload, without the length prefix).
pub fn decode_server_frame(body: &[u8]) -> Result<ServerFrame, ProtocolError> {
    let (&tag, payload) = body
        .split_first()
        .ok_or(ProtocolError::FrameTooShort(body.len()))?;

    let message = match MessageType::try_from(tag)? {
        MessageType::Snapshot => ServerFrame::Snapshot(bincode::deserialize(payload)?),
        MessageType::Delta => ServerFrame::Delta(bincode::deserialize(payload)?),
        MessageType::State => ServerFrame::State(bincode::deserialize(payload)?),
        MessageType::Control => ServerFrame::Control(serde_json::from_slice(payload)?),
    };
    Ok(message)
}

pub fn encode_client_control(message: &ClientControl) -> Result<Vec<u8>, ProtocolError> {
    Ok(frame(MessageType::Control, &serde_json::to_vec(message)?))
}

/// Decodes and validates a client frame body. Clients only send control frames.
pub fn decode_client_control(body: &[u8]) -> Result<ClientControl, ProtocolError> {
    let (&tag, payload) = body
        .split_first()
        .ok_or(ProtocolError::FrameTooShort(body.len()))?;

    match MessageType::try_from(tag)? {
        MessageType::Control => {
            let message: ClientControl = serde_json::from_slice(payload)?;
            message.validate()?;
            Ok(message)
        }
        _ => Err(ProtocolError::UnexpectedTag(tag)),
    }
}

/// Validates a length prefix read from the stream.
pub fn check_frame_len(len: usize) -> Result<(), ProtocolError> {
    if len == 0 {
        Err(ProtocolError::FrameTooShort(len))
    } else if len > MAX_FRAME_LEN {
        Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        })
    } else {
        Ok(())
    }
}

/// Splits one complete frame off the front of `buf`. Returns the body and the
/// number of bytes consumed, or `None` when more bytes are needed.
pub fn split_frame(buf: &[u8]) -> Result<Option<(&[u8], usize)>, ProtocolError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    check_frame_len(len)?;
    if buf.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }
    Ok(Some((
        &buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len],
        FRAME_HEADER_LEN + len,
    )))
}
