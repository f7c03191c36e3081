//! Server network layer: TCP framing, per-connection tasks and the fixed-rate
//! tick loop that owns the simulation.

use crate::client_manager::{ClientManager, ConnectionId, MoveCommand};
use crate::config::ServerConfig;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::ecs::EntityId;
use shared::error::ProtocolError;
use shared::protocol::{
    capture_snapshot, capture_states, check_frame_len, collect_delta, decode_client_control,
    encode_server_frame, ClientControl, ServerControl, ServerFrame, StateBroadcast,
    FRAME_HEADER_LEN, PROTOCOL_VERSION,
};
use shared::Vec2;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub type NetResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Longest simulated step for one tick, whatever the wall clock says.
const MAX_TICK_DT_SECS: f32 = 0.1;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Accepted {
        stream: TcpStream,
        addr: SocketAddr,
    },
    Control {
        id: ConnectionId,
        message: ClientControl,
    },
    /// A frame arrived but could not be decoded.
    Malformed {
        id: ConnectionId,
        error: String,
    },
    Disconnected {
        id: ConnectionId,
    },
    Shutdown,
}

/// Reads one length-prefixed frame body. `Ok(None)` is a clean end of
/// stream at a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> NetResult<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if let Err(e) = check_frame_len(len) {
        if e.is_recoverable() {
            return Ok(Some(Vec::new()));
        }
        return Err(e.into());
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Authoritative kitchen server.
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: ServerConfig,
    clients: ClientManager,
    game: GameState,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> NetResult<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);
        if config.trust_client_positions {
            warn!("Client-computed positions are trusted");
        }

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(config.max_clients),
            game: GameState::new(&config),
            config,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Sender that can stop [`Server::run`] with [`ServerMessage::Shutdown`].
    pub fn control_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        if server_tx.send(ServerMessage::Accepted { stream, addr }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_reader(&self, id: ConnectionId, mut reader: OwnedReadHalf) {
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                let body = match read_frame(&mut reader).await {
                    Ok(Some(body)) => body,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Closing connection {}: {}", id, e);
                        break;
                    }
                };

                let message = match decode_client_control(&body) {
                    Ok(message) => ServerMessage::Control { id, message },
                    Err(e) => ServerMessage::Malformed {
                        id,
                        error: e.to_string(),
                    },
                };
                if server_tx.send(message).is_err() {
                    return;
                }
            }
            let _ = server_tx.send(ServerMessage::Disconnected { id });
        });
    }

    fn spawn_writer(mut writer: OwnedWriteHalf, mut outbox: mpsc::UnboundedReceiver<Vec<u8>>) {
        tokio::spawn(async move {
            while let Some(frame) = outbox.recv().await {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!("Write failed: {}", e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });
    }

    fn send_frame(&mut self, id: ConnectionId, frame: &ServerFrame) {
        let bytes = match encode_server_frame(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode frame for connection {}: {}", id, e);
                return;
            }
        };
        let delivered = self.clients.get(id).map_or(false, |c| c.send(bytes));
        if !delivered {
            self.clients.mark_closing(id);
        }
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (reader, writer) = stream.into_split();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self::spawn_writer(writer, outbox_rx);

        match self.clients.add_client(addr, outbox_tx.clone()) {
            Some(id) => self.spawn_reader(id, reader),
            None => {
                info!("Rejecting {}: server full", addr);
                let rejected = ServerFrame::Control(ServerControl::Rejected {
                    reason: "Server full".to_string(),
                });
                if let Ok(bytes) = encode_server_frame(&rejected) {
                    let _ = outbox_tx.send(bytes);
                }
                // Dropping the last sender lets the writer flush and close.
            }
        }
    }

    /// Queues a decoded control message. Nothing here touches the world.
    fn handle_control(&mut self, id: ConnectionId, message: ClientControl) {
        let Some(connection) = self.clients.get_mut(id) else {
            return;
        };

        match message {
            ClientControl::Input { seq, dt_ms, flags } => {
                connection.push_command(MoveCommand::Input { seq, dt_ms, flags });
            }
            ClientControl::Move {
                seq,
                x,
                y,
                facing_x,
                facing_y,
            } => {
                connection.push_command(MoveCommand::Teleport {
                    seq,
                    position: Vec2::new(x, y),
                    facing: Vec2::new(facing_x, facing_y),
                });
            }
            ClientControl::Interact { seq } => {
                connection.push_interact(seq);
            }
            ClientControl::Signal { to, signal } => {
                self.clients.touch(id);
                self.relay_signal(id, to, signal);
            }
        }
    }

    /// Forwards an opaque signaling payload to whoever controls `to`.
    fn relay_signal(&mut self, from_connection: ConnectionId, to: EntityId, signal: serde_json::Value) {
        let Some(from) = self.clients.get(from_connection).and_then(|c| c.player) else {
            debug!("Dropping signal from unadmitted connection {}", from_connection);
            return;
        };
        let Some(target) = self.clients.find_by_player(to).map(|c| c.id) else {
            debug!("Dropping signal from {} to unknown entity {}", from, to);
            return;
        };
        self.send_frame(target, &ServerFrame::Control(ServerControl::Signal { from, signal }));
    }

    fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Accepted { stream, addr } => self.handle_accept(stream, addr),
            ServerMessage::Control { id, message } => self.handle_control(id, message),
            ServerMessage::Malformed { id, error } => {
                warn!("Dropped malformed frame from connection {}: {}", id, error);
                self.clients.touch(id);
                self.game.stats.commands_rejected += 1;
            }
            ServerMessage::Disconnected { id } => self.clients.mark_closing(id),
            ServerMessage::Shutdown => return false,
        }
        true
    }

    fn process_departures(&mut self) {
        for connection in self.clients.take_departed() {
            if let Some(player) = connection.player {
                self.game.remove_player(player);
            }
        }
    }

    fn process_joins(&mut self) {
        for id in self.clients.joining() {
            let Some(network_id) = self.clients.get(id).map(|c| c.network_id) else {
                continue;
            };
            let player = self.game.add_player(network_id);

            let snapshot = capture_snapshot(&self.game.world, self.game.tick);
            let head = self.game.world.journal().map_or(0, |j| j.head());
            let Some(connection) = self.clients.get_mut(id) else {
                continue;
            };
            connection.player = Some(player);
            connection.delta_cursor = head;
            let welcome = ServerControl::Welcome {
                network_id,
                session_id: connection.session_id.clone(),
                entity_id: player,
                protocol_version: PROTOCOL_VERSION,
            };

            self.send_frame(id, &ServerFrame::Control(welcome));
            self.send_frame(id, &ServerFrame::Snapshot(snapshot));
        }
    }

    /// Applies every queued movement command, then at most one interact
    /// press per player.
    fn process_commands(&mut self) {
        let ids = self.clients.ids();

        for id in &ids {
            let Some(connection) = self.clients.get_mut(*id) else {
                continue;
            };
            let Some(player) = connection.player else {
                continue;
            };
            let commands = connection.drain_commands();
            let mut last_seq = connection.last_acked_seq;

            for command in &commands {
                self.game.apply_command(player, command);
                last_seq = last_seq.max(command.seq());
            }
            if let Some(connection) = self.clients.get_mut(*id) {
                connection.last_acked_seq = last_seq;
            }
        }

        for id in &ids {
            let Some(connection) = self.clients.get_mut(*id) else {
                continue;
            };
            let Some(player) = connection.player else {
                continue;
            };
            let Some(seq) = connection.interacts.pop_front() else {
                continue;
            };
            connection.last_interact_seq = connection.last_interact_seq.max(seq);
            self.game.interact(player);
        }
    }

    fn broadcast(&mut self) {
        let entities = capture_states(&self.game.world);

        for id in self.clients.ids() {
            let Some(connection) = self.clients.get_mut(id) else {
                continue;
            };
            let Some(player) = connection.player else {
                continue;
            };
            let delta = collect_delta(&self.game.world, &mut connection.delta_cursor);
            let state = StateBroadcast {
                tick: self.game.tick,
                player: Some(player),
                last_acked_seq: connection.last_acked_seq,
                last_interact_seq: connection.last_interact_seq,
                entities: entities.clone(),
            };

            self.send_frame(id, &ServerFrame::Delta(delta));
            self.send_frame(id, &ServerFrame::State(state));
        }

        let min_cursor = match self.clients.min_cursor() {
            Some(cursor) => cursor,
            None => self.game.world.journal().map_or(0, |j| j.head()),
        };
        if let Some(journal) = self.game.world.journal_mut() {
            journal.trim(min_cursor);
        }
    }

    /// One full tick: lifecycle, commands, simulation, broadcast.
    pub fn tick(&mut self, dt: f32) {
        self.process_departures();
        self.process_joins();
        self.process_commands();
        self.game.update(dt);
        self.broadcast();
        self.clients.check_timeouts(self.config.client_timeout);
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> NetResult<()> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message),
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;
                    if dt > MAX_TICK_DT_SECS {
                        warn!("Large tick delta ({:.3}s), capping to {:.3}s", dt, MAX_TICK_DT_SECS);
                        dt = MAX_TICK_DT_SECS;
                    }

                    self.tick(dt);

                    if self.game.tick % 60 == 0 && !self.clients.is_empty() {
                        debug!(
                            "Tick {}: {} clients, {} entities, journal {} entries, {:?}",
                            self.game.tick,
                            self.clients.len(),
                            self.game.world.entity_count(),
                            self.game.world.journal().map_or(0, |j| j.len()),
                            self.game.stats
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// Whether an error from [`read_frame`] was an oversized frame.
pub fn is_oversized_frame(error: &(dyn Error + Send + Sync + 'static)) -> bool {
    matches!(
        error.downcast_ref::<ProtocolError>(),
        Some(ProtocolError::FrameTooLarge { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{LevelLayout, Tile};
    use shared::movement::InputFlags;
    use shared::prefab::EntityKind;
    use shared::protocol::{decode_server_frame, encode_client_control, MAX_FRAME_LEN};

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            seed: Some(1),
            level: LevelLayout {
                tiles: Vec::new(),
                spawn_points: vec![Vec2::new(100.0, 100.0)],
            },
            ..ServerConfig::default()
        }
    }

    async fn read_server_frame(stream: &mut TcpStream) -> ServerFrame {
        let body = read_frame(stream).await.unwrap().unwrap();
        decode_server_frame(&body).unwrap()
    }

    #[tokio::test]
    async fn test_read_frame_splits_stream() {
        let first = encode_client_control(&ClientControl::Interact { seq: 1 }).unwrap();
        let second = encode_client_control(&ClientControl::Interact { seq: 2 }).unwrap();
        let bytes = [first.clone(), second].concat();
        let mut reader = &bytes[..];

        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(body, first[FRAME_HEADER_LEN..].to_vec());
        assert!(read_frame(&mut reader).await.unwrap().is_some());
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_reassembles_partial_reads() {
        let frame = encode_client_control(&ClientControl::Interact { seq: 9 }).unwrap();
        let (head, tail) = frame.split_at(6);
        let mut reader = tokio_test::io::Builder::new()
            .read(&head[..2])
            .read(&head[2..])
            .read(tail)
            .build();

        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_client_control(&body).unwrap(), ClientControl::Interact { seq: 9 });
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let bytes = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut reader = &bytes[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(is_oversized_frame(err.as_ref()));
    }

    #[tokio::test]
    async fn test_read_frame_passes_empty_frame_through() {
        let bytes = 0u32.to_le_bytes();
        let mut reader = &bytes[..];
        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert!(decode_client_control(&body).is_err());
    }

    #[tokio::test]
    async fn test_join_receives_welcome_then_snapshot() {
        let mut server = Server::new(test_config()).await.unwrap();
        let addr = server.local_addr();
        let control = server.control_sender();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let welcome = tokio::time::timeout(Duration::from_secs(2), read_server_frame(&mut stream))
            .await
            .unwrap();
        let ServerFrame::Control(ServerControl::Welcome { entity_id, protocol_version, .. }) = welcome else {
            panic!("expected welcome, got {:?}", welcome);
        };
        assert_eq!(protocol_version, PROTOCOL_VERSION);

        let snapshot = tokio::time::timeout(Duration::from_secs(2), read_server_frame(&mut stream))
            .await
            .unwrap();
        let ServerFrame::Snapshot(snapshot) = snapshot else {
            panic!("expected snapshot, got {:?}", snapshot);
        };
        assert!(snapshot.entities.iter().any(|e| e.id == entity_id));

        control.send(ServerMessage::Shutdown).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_drains_inputs_and_one_interact() {
        let mut server = Server::new(ServerConfig {
            level: LevelLayout {
                tiles: vec![Tile {
                    kind: EntityKind::PattyBox,
                    col: 3,
                    row: 4,
                }],
                spawn_points: vec![Vec2::new(112.0, 112.0)],
            },
            ..test_config()
        })
        .await
        .unwrap();
        let (outbox, _frames) = mpsc::unbounded_channel();
        let id = server
            .clients
            .add_client("127.0.0.1:9000".parse().unwrap(), outbox)
            .unwrap();
        server.tick(1.0 / 30.0);
        assert!(server.clients.get(id).unwrap().player.is_some());

        for seq in 1..=3 {
            server.handle_control(
                id,
                ClientControl::Input {
                    seq,
                    dt_ms: 16.0,
                    flags: InputFlags(0),
                },
            );
        }
        server.handle_control(id, ClientControl::Interact { seq: 1 });
        server.handle_control(id, ClientControl::Interact { seq: 2 });
        server.tick(1.0 / 30.0);

        let connection = server.clients.get(id).unwrap();
        assert_eq!(connection.last_acked_seq, 3);
        assert_eq!(connection.last_interact_seq, 1);
        assert!(connection.commands.is_empty());
        assert_eq!(connection.interacts.len(), 1);
        assert_eq!(server.game().stats.commands_applied, 3);
        assert_eq!(server.game().stats.items_spawned, 1);

        server.tick(1.0 / 30.0);
        let connection = server.clients.get(id).unwrap();
        assert_eq!(connection.last_interact_seq, 2);
        assert!(connection.interacts.is_empty());
        // Facing the patty box with a patty in hand does nothing.
        assert_eq!(server.game().stats.items_spawned, 1);
    }

    #[tokio::test]
    async fn test_full_server_rejects_connection() {
        let mut server = Server::new(ServerConfig {
            max_clients: 0,
            ..test_config()
        })
        .await
        .unwrap();
        let addr = server.local_addr();
        let control = server.control_sender();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), read_server_frame(&mut stream))
            .await
            .unwrap();
        assert!(matches!(frame, ServerFrame::Control(ServerControl::Rejected { .. })));

        control.send(ServerMessage::Shutdown).unwrap();
        handle.await.unwrap();
    }
}
