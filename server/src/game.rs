//! Authoritative game state and the per-tick simulation pipeline.

use crate::client_manager::MoveCommand;
use crate::config::{OrderConfig, ServerConfig};
use crate::level::LevelLayout;
use crate::orders::{self, OrderEvents};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::components::{NetworkId, Tag};
use shared::cooking::cooking_system;
use shared::ecs::{EntityId, World};
use shared::interaction::{self, InteractionAction};
use shared::movement::{step_player, KitchenCollider};
use shared::prefab::{self, EntityKind};
use shared::protocol::command_dt_secs;
use shared::Vec2;

/// Running totals, logged periodically.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GameStats {
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub interactions: u64,
    pub items_spawned: u64,
    pub items_destroyed: u64,
    pub items_cooked: u64,
    pub orders_completed: u64,
    pub orders_expired: u64,
    pub repairs: u64,
}

/// Result of the end-of-tick systems.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub cooked: Vec<EntityId>,
    pub orders: OrderEvents,
    pub repairs: usize,
}

pub struct GameState {
    pub world: World,
    pub tick: u32,
    pub stats: GameStats,
    collider: KitchenCollider,
    rng: StdRng,
    orders: OrderConfig,
    level: LevelLayout,
    trust_client_positions: bool,
    players_joined: usize,
}

impl GameState {
    /// Seeds the level and prepares order windows.
    pub fn new(config: &ServerConfig) -> Self {
        let mut world = World::with_change_tracking();
        let surfaces = config.level.seed(&mut world);
        orders::configure_windows(&mut world, &config.orders);
        let collider = KitchenCollider::from_world(&world);
        info!(
            "Kitchen seeded with {} surfaces ({} obstacles)",
            surfaces.len(),
            collider.len()
        );

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            world,
            tick: 0,
            stats: GameStats::default(),
            collider,
            rng,
            orders: config.orders,
            level: config.level.clone(),
            trust_client_positions: config.trust_client_positions,
            players_joined: 0,
        }
    }

    pub fn add_player(&mut self, network_id: NetworkId) -> EntityId {
        let position = self.level.spawn_point(self.players_joined);
        self.players_joined += 1;

        let player = prefab::spawn(&mut self.world, EntityKind::Player, position);
        self.world.network_ids.insert(player, network_id);
        self.world.mark_changed(player);
        info!("Player {} spawned at ({:.0}, {:.0})", player, position.x, position.y);
        player
    }

    /// Releases everything the player holds, then destroys the player.
    pub fn remove_player(&mut self, player: EntityId) -> bool {
        if !self.world.is_alive(player) {
            return false;
        }
        for (item, surface) in interaction::release_held_items(&mut self.world, player) {
            match surface {
                Some(surface) => info!("Released {} onto {}", item, surface),
                None => info!("Released {} onto the floor", item),
            }
        }
        self.world.despawn(player)
    }

    /// Applies one queued movement command. Returns false when the command
    /// was consumed without effect.
    pub fn apply_command(&mut self, player: EntityId, command: &MoveCommand) -> bool {
        let Some(position) = self.world.positions.get(player).copied() else {
            return false;
        };
        let facing = self.world.facings.get(player).copied().unwrap_or_default();

        match *command {
            MoveCommand::Input { dt_ms, flags, .. } => {
                let outcome = step_player(&self.collider, position, facing, flags, command_dt_secs(dt_ms));
                self.world.positions.insert(player, outcome.position);
                self.world.velocities.insert(player, outcome.velocity);
                self.world.facings.insert(player, outcome.facing);
            }
            MoveCommand::Teleport {
                seq,
                position,
                facing,
            } => {
                if !self.trust_client_positions {
                    warn!("Ignoring client-computed move {} for {}", seq, player);
                    self.stats.commands_rejected += 1;
                    return false;
                }
                self.world.positions.insert(player, position);
                if facing != Vec2::ZERO {
                    self.world.facings.insert(player, facing);
                }
            }
        }

        self.stats.commands_applied += 1;
        true
    }

    /// Runs one interact press for `player`.
    pub fn interact(&mut self, player: EntityId) -> InteractionAction {
        let action = interaction::interact(&mut self.world, player);

        match action {
            InteractionAction::None => return action,
            InteractionAction::Spawn { .. } => self.stats.items_spawned += 1,
            InteractionAction::Destroy { .. } => self.stats.items_destroyed += 1,
            InteractionAction::SubmitOrder { order, .. } => {
                if !self.world.is_alive(order) {
                    info!("Order {} completed", order);
                    self.stats.orders_completed += 1;
                }
            }
            _ => {}
        }
        self.stats.interactions += 1;
        debug!("Player {} interaction: {:?}", player, action);
        action
    }

    /// End-of-tick systems: cooking, orders, held item carry and the
    /// placement repair pass.
    pub fn update(&mut self, dt: f32) -> TickReport {
        let cooked = cooking_system(&mut self.world, dt);
        let orders = orders::order_system(&mut self.world, dt, &mut self.rng, &self.orders);
        interaction::carry_held_items(&mut self.world);
        let repairs = interaction::repair_placement_invariants(&mut self.world);

        self.stats.items_cooked += cooked.len() as u64;
        self.stats.orders_expired += orders.expired.len() as u64;
        self.stats.repairs += repairs as u64;
        self.tick = self.tick.wrapping_add(1);

        TickReport {
            cooked,
            orders,
            repairs,
        }
    }

    pub fn player_count(&self) -> usize {
        self.world.tagged(Tag::Player).count()
    }

    pub fn trusts_client_positions(&self) -> bool {
        self.trust_client_positions
    }
}
