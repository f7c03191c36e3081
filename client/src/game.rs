use crate::interpolation::{InterpolationConfig, Interpolator};
use crate::mirror::RemoteWorld;
use crate::prediction::{Predictor, PredictorConfig, Reconciliation};
use log::{debug, info, warn};
use shared::components::NetworkId;
use shared::ecs::{EntityId, World};
use shared::interaction::{self, InteractionAction};
use shared::movement::{InputFlags, KitchenCollider};
use shared::prefab::EntityKind;
use shared::protocol::{ClientControl, Delta, ServerControl, ServerFrame, Snapshot, StateBroadcast};
use shared::{Vec2, HOLD_OFFSET};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientConfig {
    pub prediction: PredictorConfig,
    pub interpolation: InterpolationConfig,
}

/// One entity as it should be drawn this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntity {
    pub id: EntityId,
    pub kind: Option<EntityKind>,
    pub position: Vec2,
    pub size: Vec2,
    pub is_local_player: bool,
    /// Cooking progress in `0.0..=1.0` for items on a heated surface.
    pub cooking: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderView {
    pub required: u32,
    pub fulfilled: u32,
    pub remaining_secs: f32,
}

/// Client-side view of the game: the confirmed mirror of the server world
/// plus a predicted world with the local player's unacknowledged actions
/// applied on top.
pub struct ClientGameState {
    pub confirmed: RemoteWorld,
    predicted: World,
    predictor: Predictor,
    interpolator: Interpolator,
    collider: KitchenCollider,

    /// Server id of our player, from the welcome message.
    remote_player: Option<EntityId>,
    network_id: Option<NetworkId>,
    rejected: Option<String>,

    pending_interacts: VecDeque<u32>,
    next_interact_seq: u32,
    last_interact_seq: u32,

    pub prediction_enabled: bool,
    pub interpolation_enabled: bool,
}

impl ClientGameState {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            confirmed: RemoteWorld::new(),
            predicted: World::new(),
            predictor: Predictor::new(config.prediction),
            interpolator: Interpolator::new(config.interpolation),
            collider: KitchenCollider::default(),
            remote_player: None,
            network_id: None,
            rejected: None,
            pending_interacts: VecDeque::new(),
            next_interact_seq: 1,
            last_interact_seq: 0,
            prediction_enabled: true,
            interpolation_enabled: true,
        }
    }

    pub fn handle_frame(&mut self, frame: ServerFrame, now_ms: f64) {
        match frame {
            ServerFrame::Control(control) => self.handle_control(control),
            ServerFrame::Snapshot(snapshot) => self.handle_snapshot(&snapshot),
            ServerFrame::Delta(delta) => self.handle_delta(&delta),
            ServerFrame::State(state) => self.handle_state(&state, now_ms),
        }
    }

    fn handle_control(&mut self, control: ServerControl) {
        match control {
            ServerControl::Welcome {
                network_id,
                session_id,
                entity_id,
                protocol_version,
            } => {
                info!(
                    "Welcome: network id {}, session {}, player entity {} (protocol v{})",
                    network_id.0, session_id, entity_id, protocol_version
                );
                self.remote_player = Some(entity_id);
                self.network_id = Some(network_id);
            }
            ServerControl::Rejected { reason } => {
                warn!("Server rejected connection: {}", reason);
                self.rejected = Some(reason);
            }
            ServerControl::Signal { from, signal } => {
                debug!("Signal from {}: {}", from, signal);
            }
        }
    }

    fn handle_snapshot(&mut self, snapshot: &Snapshot) {
        self.confirmed.apply_snapshot(snapshot);
        self.collider = KitchenCollider::from_world(&self.confirmed.world);
        self.interpolator.clear();
        self.pending_interacts.clear();

        if let Some(player) = self.local_player() {
            let world = &self.confirmed.world;
            let position = world.positions.get(player).copied().unwrap_or_default();
            let facing = world.facings.get(player).copied().unwrap_or(Vec2::new(0.0, 1.0));
            self.predictor.reset(position, facing);
        }
        self.rebuild_predicted();
    }

    fn handle_delta(&mut self, delta: &Delta) {
        if delta.is_empty() {
            return;
        }
        for removed in self.confirmed.apply_delta(delta) {
            self.interpolator.remove(removed);
        }
        self.collider = KitchenCollider::from_world(&self.confirmed.world);
        self.rebuild_predicted();
    }

    fn handle_state(&mut self, state: &StateBroadcast, now_ms: f64) {
        if self.remote_player.is_none() {
            self.remote_player = state.player;
        }
        self.confirmed.apply_state(state);

        self.last_interact_seq = self.last_interact_seq.max(state.last_interact_seq);
        let ruled = self.last_interact_seq;
        self.pending_interacts.retain(|seq| *seq > ruled);

        let local_player = self.local_player();
        for entity in &state.entities {
            let Some(local) = self.confirmed.local(entity.id) else {
                continue;
            };
            if Some(local) == local_player {
                let outcome =
                    self.predictor
                        .reconcile(&self.collider, entity.position, entity.facing, state.last_acked_seq);
                if let Reconciliation::Snapped { error } = outcome {
                    debug!("Snapped local player after {:.1}px divergence", error);
                }
            } else {
                self.interpolator
                    .record(local, now_ms, entity.position, entity.velocity);
            }
        }
        self.rebuild_predicted();
    }

    /// Local id of our own player, once both welcome and snapshot arrived.
    pub fn local_player(&self) -> Option<EntityId> {
        self.confirmed.local(self.remote_player?)
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejected.as_deref()
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn predicted_world(&self) -> &World {
        &self.predicted
    }

    pub fn pending_interacts(&self) -> usize {
        self.pending_interacts.len()
    }

    /// Predicts one movement sample and returns the command to send.
    pub fn apply_local_input(&mut self, flags: InputFlags, dt_ms: f32) -> Option<ClientControl> {
        let player = self.local_player()?;
        let input = self.predictor.apply_local_input(&self.collider, flags, dt_ms);
        self.sync_predicted_player(player);
        interaction::carry_held_items(&mut self.predicted);

        Some(ClientControl::Input {
            seq: input.seq,
            dt_ms: input.dt_ms,
            flags: input.flags,
        })
    }

    /// Applies an interact press to the predicted world straight away and
    /// returns the command to send. The server's ruling replaces the
    /// optimistic result once it is acknowledged.
    pub fn request_interact(&mut self) -> Option<ClientControl> {
        let player = self.local_player()?;
        let seq = self.next_interact_seq;
        self.next_interact_seq = self.next_interact_seq.wrapping_add(1);
        self.pending_interacts.push_back(seq);

        self.sync_predicted_player(player);
        let action = interaction::interact(&mut self.predicted, player);
        if action != InteractionAction::None {
            debug!("Predicted interaction {:?}", action);
        }
        interaction::carry_held_items(&mut self.predicted);

        Some(ClientControl::Interact { seq })
    }

    /// Advances frame-local effects: correction smoothing, plus cooking and
    /// order clocks, which the server only sends when they start.
    pub fn update(&mut self, dt: f32) {
        self.predictor.decay(dt);
        for world in [&mut self.confirmed.world, &mut self.predicted] {
            for (_, timer) in world.cooking_timers.iter_mut() {
                timer.elapsed = (timer.elapsed + dt).min(timer.duration);
            }
            for (_, order) in world.orders.iter_mut() {
                order.elapsed = (order.elapsed + dt).min(order.time_limit);
            }
        }
    }

    /// Starts the predicted world over from the confirmed one and replays
    /// interactions the server has not ruled on yet.
    fn rebuild_predicted(&mut self) {
        self.predicted = self.confirmed.world.clone();
        let Some(player) = self.local_player() else {
            return;
        };
        self.sync_predicted_player(player);
        for _ in 0..self.pending_interacts.len() {
            interaction::interact(&mut self.predicted, player);
        }
        interaction::carry_held_items(&mut self.predicted);
    }

    fn sync_predicted_player(&mut self, player: EntityId) {
        if !self.predicted.is_alive(player) {
            return;
        }
        self.predicted.positions.insert(player, self.predictor.position());
        self.predicted.velocities.insert(player, self.predictor.velocity());
        self.predicted.facings.insert(player, self.predictor.facing());
    }

    /// Where `entity` should be drawn, before held-item placement.
    fn display_position(&self, entity: EntityId, now_ms: f64) -> Option<Vec2> {
        let world = &self.predicted;
        if Some(entity) == self.local_player() {
            return if self.prediction_enabled {
                Some(self.predictor.render_position())
            } else {
                self.confirmed.world.positions.get(entity).copied()
            };
        }
        // Entities moved by a pending optimistic interaction show the
        // predicted placement instead of their server history.
        let predicted = world.positions.get(entity).copied();
        if self.interpolation_enabled && predicted == self.confirmed.world.positions.get(entity).copied() {
            if let Some(position) = self.interpolator.position_at(entity, now_ms) {
                return Some(position);
            }
        }
        predicted
    }

    pub fn render_entities(&self, now_ms: f64) -> Vec<RenderEntity> {
        let world = &self.predicted;
        let local_player = self.local_player();
        let mut entities = Vec::new();

        for entity in world.entities() {
            let Some(size) = world.sizes.get(entity).copied() else {
                continue;
            };
            let position = match world.held_by(entity) {
                Some(holder) => self.display_position(holder, now_ms).map(|holder_pos| {
                    let facing = world.facings.get(holder).copied().unwrap_or_default();
                    holder_pos + facing.normalize_or_zero() * HOLD_OFFSET
                }),
                None => self.display_position(entity, now_ms),
            };
            let Some(position) = position else {
                continue;
            };

            let cooking = world
                .cooking_timers
                .get(entity)
                .map(|timer| (timer.elapsed / timer.duration).clamp(0.0, 1.0));

            entities.push(RenderEntity {
                id: entity,
                kind: EntityKind::classify(world, entity),
                position,
                size,
                is_local_player: Some(entity) == local_player,
                cooking,
            });
        }

        // Surfaces first, then items, players on top.
        entities.sort_by_key(|e| match e.kind {
            Some(EntityKind::Player) => 2,
            Some(EntityKind::UncookedPatty) | Some(EntityKind::CookedPatty) => 1,
            _ => 0,
        });
        entities
    }

    pub fn orders(&self) -> Vec<OrderView> {
        self.predicted
            .orders
            .iter()
            .map(|(_, order)| OrderView {
                required: order.required_count,
                fulfilled: order.fulfilled_count,
                remaining_secs: (order.time_limit - order.elapsed).max(0.0),
            })
            .collect()
    }

    /// Drops everything tied to the current connection.
    pub fn reset(&mut self) {
        self.confirmed = RemoteWorld::new();
        self.predicted = World::new();
        self.interpolator.clear();
        self.collider = KitchenCollider::default();
        self.remote_player = None;
        self.network_id = None;
        self.pending_interacts.clear();
        self.predictor.reset(Vec2::ZERO, Vec2::new(0.0, 1.0));
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
