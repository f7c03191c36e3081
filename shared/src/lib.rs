//! Simulation core shared by the authoritative server and the predicting client.
//!
//! Both sides run the exact same movement step and interaction rules from this
//! crate, which is what makes client-side prediction and input replay valid.

pub mod components;
pub mod cooking;
pub mod ecs;
pub mod error;
pub mod interaction;
pub mod movement;
pub mod prefab;
pub mod protocol;

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

pub const TILE_SIZE: f32 = 32.0;
pub const WORLD_WIDTH: f32 = 640.0;
pub const WORLD_HEIGHT: f32 = 480.0;
pub const PLAYER_SIZE: f32 = 24.0;
pub const ITEM_SIZE: f32 = 16.0;
pub const PLAYER_SPEED: f32 = 160.0;

/// Distance from a player's centre to the point it interacts with.
pub const PLAYER_INTERACTION_REACH: f32 = 32.0;
/// Side length of the square probe centred on the interaction point.
pub const INTERACTION_PROBE_SIZE: f32 = 24.0;
pub const MIN_OVERLAP_AREA: f32 = 16.0;
/// An unoccupied surface wins over an occupied one when it reaches this share
/// of the occupied surface's overlap.
pub const UNOCCUPIED_SURFACE_BIAS: f32 = 0.6;
/// Held items are drawn this far in front of their holder.
pub const HOLD_OFFSET: f32 = 12.0;
pub const DISCONNECT_DROP_RADIUS: f32 = 64.0;

pub const COOK_DURATION_SECS: f32 = 5.0;
pub const DEFAULT_SPAWNER_STOCK: u32 = 10;

pub const MAX_INPUT_DT_MS: f32 = 100.0;

/// 2D vector used for positions, velocities and facing directions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length input.
    pub fn normalize_or_zero(&self) -> Vec2 {
        let len = self.length();
        if len == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    pub fn lerp(&self, other: Vec2, alpha: f32) -> Vec2 {
        *self + (other - *self) * alpha
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned overlap area of two boxes given by centre and size.
pub fn overlap_area(center_a: Vec2, size_a: Vec2, center_b: Vec2, size_b: Vec2) -> f32 {
    let overlap_x = (center_a.x + size_a.x / 2.0).min(center_b.x + size_b.x / 2.0)
        - (center_a.x - size_a.x / 2.0).max(center_b.x - size_b.x / 2.0);
    let overlap_y = (center_a.y + size_a.y / 2.0).min(center_b.y + size_b.y / 2.0)
        - (center_a.y - size_a.y / 2.0).max(center_b.y - size_b.y / 2.0);

    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        0.0
    } else {
        overlap_x * overlap_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vec2_arithmetic() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, -1.0);
        assert_eq!(a + b, Vec2::new(4.0, 1.0));
        assert_eq!(b - a, Vec2::new(2.0, -3.0));
        assert_eq!(a * 2.0, Vec2::new(2.0, 4.0));
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2::ZERO.normalize_or_zero(), Vec2::ZERO);
        let n = Vec2::new(3.0, 4.0).normalize_or_zero();
        assert_approx_eq!(n.x, 0.6, 1e-6);
        assert_approx_eq!(n.y, 0.8, 1e-6);
    }

    #[test]
    fn test_lerp_midpoint() {
        let mid = Vec2::new(0.0, 0.0).lerp(Vec2::new(10.0, -4.0), 0.5);
        assert_approx_eq!(mid.x, 5.0, 1e-6);
        assert_approx_eq!(mid.y, -2.0, 1e-6);
    }

    #[test]
    fn test_overlap_area_full_and_partial() {
        let size = Vec2::new(16.0, 16.0);
        assert_approx_eq!(overlap_area(Vec2::ZERO, size, Vec2::ZERO, size), 256.0, 1e-4);
        assert_approx_eq!(
            overlap_area(Vec2::ZERO, size, Vec2::new(8.0, 0.0), size),
            128.0,
            1e-4
        );
    }

    #[test]
    fn test_overlap_area_touching_edges_is_zero() {
        let size = Vec2::new(16.0, 16.0);
        assert_eq!(overlap_area(Vec2::ZERO, size, Vec2::new(16.0, 0.0), size), 0.0);
    }
}
