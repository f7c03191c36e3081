//! Per-connection state for the kitchen server.
//!
//! Receive tasks only ever enqueue into a [`Connection`]; the tick loop is the
//! single consumer that drains queues, spawns and removes players, and
//! advances each connection's delta cursor.

use log::{info, warn};
use shared::components::NetworkId;
use shared::ecs::EntityId;
use shared::movement::InputFlags;
use shared::Vec2;
use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub type ConnectionId = u32;

/// Upper bound on queued movement commands per connection.
pub const MAX_QUEUED_COMMANDS: usize = 256;
/// Upper bound on queued interact presses per connection.
pub const MAX_QUEUED_INTERACTS: usize = 8;

/// A movement command waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveCommand {
    Input {
        seq: u32,
        dt_ms: f32,
        flags: InputFlags,
    },
    Teleport {
        seq: u32,
        position: Vec2,
        facing: Vec2,
    },
}

impl MoveCommand {
    pub fn seq(&self) -> u32 {
        match self {
            MoveCommand::Input { seq, .. } | MoveCommand::Teleport { seq, .. } => *seq,
        }
    }
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub network_id: NetworkId,
    pub session_id: String,
    /// Assigned by the tick that admits the connection.
    pub player: Option<EntityId>,
    pub last_seen: Instant,
    /// Highest movement sequence applied by the simulation.
    pub last_acked_seq: u32,
    /// Highest interact sequence the simulation has ruled on.
    pub last_interact_seq: u32,
    pub commands: VecDeque<MoveCommand>,
    pub interacts: VecDeque<u32>,
    pub delta_cursor: u64,
    pub closing: bool,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        network_id: NetworkId,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            addr,
            network_id,
            session_id: format!("{:016x}", rand::random::<u64>()),
            player: None,
            last_seen: Instant::now(),
            last_acked_seq: 0,
            last_interact_seq: 0,
            commands: VecDeque::new(),
            interacts: VecDeque::new(),
            delta_cursor: 0,
            closing: false,
            outbox,
        }
    }

    /// Queues a movement command. Stale or duplicate sequences are dropped.
    pub fn push_command(&mut self, command: MoveCommand) -> bool {
        self.last_seen = Instant::now();
        let newest = self
            .commands
            .back()
            .map_or(self.last_acked_seq, MoveCommand::seq);
        if command.seq() <= newest {
            warn!(
                "Connection {} sent out-of-order command {} (newest {})",
                self.id,
                command.seq(),
                newest
            );
            return false;
        }
        if self.commands.len() >= MAX_QUEUED_COMMANDS {
            warn!("Connection {} command queue full, dropping oldest", self.id);
            self.commands.pop_front();
        }
        self.commands.push_back(command);
        true
    }

    pub fn push_interact(&mut self, seq: u32) -> bool {
        self.last_seen = Instant::now();
        if self.interacts.len() >= MAX_QUEUED_INTERACTS {
            warn!("Connection {} is flooding interact presses", self.id);
            return false;
        }
        self.interacts.push_back(seq);
        true
    }

    /// Removes every queued movement command, oldest first.
    pub fn drain_commands(&mut self) -> Vec<MoveCommand> {
        self.commands.drain(..).collect()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Queues an encoded frame for the connection's writer task.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.outbox.send(frame).is_ok()
    }
}

/// Every live connection, iterated in ascending id order.
pub struct ClientManager {
    clients: BTreeMap<ConnectionId, Connection>,
    next_client_id: ConnectionId,
    next_network_id: u64,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            next_network_id: 1,
            max_clients,
        }
    }

    /// Registers a connection. Returns None when the server is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Option<ConnectionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        let network_id = NetworkId(self.next_network_id);
        self.next_network_id += 1;

        info!("Client {} connected from {}", id, addr);
        self.clients
            .insert(id, Connection::new(id, addr, network_id, outbox));
        Some(id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.clients.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.clients.values()
    }

    pub fn touch(&mut self, id: ConnectionId) {
        if let Some(connection) = self.clients.get_mut(&id) {
            connection.last_seen = Instant::now();
        }
    }

    /// Flags a connection for removal by the next tick.
    pub fn mark_closing(&mut self, id: ConnectionId) {
        if let Some(connection) = self.clients.get_mut(&id) {
            connection.closing = true;
        }
    }

    /// Connections that have not been given a player yet.
    pub fn joining(&self) -> Vec<ConnectionId> {
        self.clients
            .values()
            .filter(|c| c.player.is_none() && !c.closing)
            .map(|c| c.id)
            .collect()
    }

    /// Removes and returns every connection flagged for removal.
    pub fn take_departed(&mut self) -> Vec<Connection> {
        let ids: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|c| c.closing)
            .map(|c| c.id)
            .collect();

        ids.into_iter()
            .filter_map(|id| self.clients.remove(&id))
            .inspect(|c| info!("Client {} disconnected", c.id))
            .collect()
    }

    /// Flags connections idle for longer than `timeout`; returns their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|c| !c.closing && c.is_timed_out(timeout))
            .map(|c| c.id)
            .collect();

        for id in &timed_out {
            warn!("Client {} timed out", id);
            self.mark_closing(*id);
        }
        timed_out
    }

    pub fn find_by_player(&self, player: EntityId) -> Option<&Connection> {
        self.clients
            .values()
            .find(|c| c.player == Some(player) && !c.closing)
    }

    /// Oldest delta cursor still in use, if any connection has one.
    pub fn min_cursor(&self) -> Option<u64> {
        self.clients
            .values()
            .filter(|c| c.player.is_some())
            .map(|c| c.delta_cursor)
            .min()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
