//! Player movement step shared by server simulation and client replay.

use crate::components::Tag;
use crate::ecs::World;
use crate::{Vec2, PLAYER_SIZE, PLAYER_SPEED, WORLD_HEIGHT, WORLD_WIDTH};
use serde::{Deserialize, Serialize};

/// Collision resolution collaborator. Must be deterministic: replaying the
/// same inputs from the same position has to land on the same result.
pub trait MovementResolver {
    fn move_and_slide(&self, position: Vec2, velocity: Vec2, dt: f32) -> Vec2;
}

/// Directional keys held during one input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputFlags(pub u8);

impl InputFlags {
    pub const UP: u8 = 1 << 0;
    pub const DOWN: u8 = 1 << 1;
    pub const LEFT: u8 = 1 << 2;
    pub const RIGHT: u8 = 1 << 3;

    pub fn from_keys(up: bool, down: bool, left: bool, right: bool) -> Self {
        let mut bits = 0;
        if up {
            bits |= Self::UP;
        }
        if down {
            bits |= Self::DOWN;
        }
        if left {
            bits |= Self::LEFT;
        }
        if right {
            bits |= Self::RIGHT;
        }
        Self(bits)
    }

    pub fn is_valid(&self) -> bool {
        self.0 & !(Self::UP | Self::DOWN | Self::LEFT | Self::RIGHT) == 0
    }

    /// Raw direction, y pointing down the screen. Opposite keys cancel.
    pub fn direction(&self) -> Vec2 {
        let mut dir = Vec2::ZERO;
        if self.0 & Self::UP != 0 {
            dir.y -= 1.0;
        }
        if self.0 & Self::DOWN != 0 {
            dir.y += 1.0;
        }
        if self.0 & Self::LEFT != 0 {
            dir.x -= 1.0;
        }
        if self.0 & Self::RIGHT != 0 {
            dir.x += 1.0;
        }
        dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Vec2,
}

/// Applies one input sample. Facing keeps the last pressed direction.
pub fn step_player<R: MovementResolver + ?Sized>(
    resolver: &R,
    position: Vec2,
    facing: Vec2,
    flags: InputFlags,
    dt: f32,
) -> MoveOutcome {
    let direction = flags.direction();
    let velocity = direction.normalize_or_zero() * PLAYER_SPEED;
    let position = resolver.move_and_slide(position, velocity, dt);
    let facing = if direction == Vec2::ZERO {
        facing
    } else {
        direction
    };

    MoveOutcome {
        position,
        velocity,
        facing,
    }
}

/// Integrates velocity and clamps to the world bounds; no obstacles.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFloor;

impl MovementResolver for OpenFloor {
    fn move_and_slide(&self, position: Vec2, velocity: Vec2, dt: f32) -> Vec2 {
        clamp_to_world(position + velocity * dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Obstacle {
    center: Vec2,
    size: Vec2,
}

/// Slides a player-sized box around static kitchen surfaces.
#[derive(Debug, Clone, Default)]
pub struct KitchenCollider {
    obstacles: Vec<Obstacle>,
}

impl KitchenCollider {
    /// Builds the obstacle list from every surface in the world.
    pub fn from_world(world: &World) -> Self {
        let obstacles = world
            .tagged(Tag::Surface)
            .filter_map(|surface| {
                let center = *world.positions.get(surface)?;
                let size = *world.sizes.get(surface)?;
                Some(Obstacle { center, size })
            })
            .collect();
        Self { obstacles }
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    fn resolve_x(&self, mut position: Vec2, velocity_x: f32) -> Vec2 {
        let half = PLAYER_SIZE / 2.0;
        for obstacle in &self.obstacles {
            if !overlaps(position, obstacle) {
                continue;
            }
            if velocity_x > 0.0 {
                position.x = obstacle.center.x - obstacle.size.x / 2.0 - half;
            } else if velocity_x < 0.0 {
                position.x = obstacle.center.x + obstacle.size.x / 2.0 + half;
            }
        }
        position
    }

    fn resolve_y(&self, mut position: Vec2, velocity_y: f32) -> Vec2 {
        let half = PLAYER_SIZE / 2.0;
        for obstacle in &self.obstacles {
            if !overlaps(position, obstacle) {
                continue;
            }
            if velocity_y > 0.0 {
                position.y = obstacle.center.y - obstacle.size.y / 2.0 - half;
            } else if velocity_y < 0.0 {
                position.y = obstacle.center.y + obstacle.size.y / 2.0 + half;
            }
        }
        position
    }
}

impl MovementResolver for KitchenCollider {
    fn move_and_slide(&self, position: Vec2, velocity: Vec2, dt: f32) -> Vec2 {
        // One axis at a time, so blocked motion on one axis still slides on the other.
        let mut next = position;
        next.x += velocity.x * dt;
        next = self.resolve_x(next, velocity.x);
        next.y += velocity.y * dt;
        next = self.resolve_y(next, velocity.y);
        clamp_to_world(next)
    }
}

fn overlaps(player: Vec2, obstacle: &Obstacle) -> bool {
    let half = PLAYER_SIZE / 2.0;
    !(player.x + half <= obstacle.center.x - obstacle.size.x / 2.0
        || player.x - half >= obstacle.center.x + obstacle.size.x / 2.0
        || player.y + half <= obstacle.center.y - obstacle.size.y / 2.0
        || player.y - half >= obstacle.center.y + obstacle.size.y / 2.0)
}

fn clamp_to_world(position: Vec2) -> Vec2 {
    let half = PLAYER_SIZE / 2.0;
    Vec2::new(
        position.x.clamp(half, WORLD_WIDTH - half),
        position.y.clamp(half, WORLD_HEIGHT - half),
    )
}
