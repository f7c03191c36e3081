//! Static kitchen layout, read once at startup to seed surfaces.

use log::info;
use serde::{Deserialize, Serialize};
use shared::ecs::{EntityId, World};
use shared::prefab::{self, EntityKind};
use shared::{Vec2, TILE_SIZE, WORLD_HEIGHT, WORLD_WIDTH};
use std::error::Error;
use std::fs;
use std::path::Path;

/// One surface placed on the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: EntityKind,
    pub col: u32,
    pub row: u32,
}

impl Tile {
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            self.col as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            self.row as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelLayout {
    pub tiles: Vec<Tile>,
    #[serde(default)]
    pub spawn_points: Vec<Vec2>,
}

impl LevelLayout {
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let text = fs::read_to_string(path)?;
        let layout = Self::from_json(&text)?;
        info!(
            "Loaded level {} ({} tiles, {} spawn points)",
            path.display(),
            layout.tiles.len(),
            layout.spawn_points.len()
        );
        Ok(layout)
    }

    pub fn from_json(text: &str) -> Result<Self, Box<dyn Error>> {
        let layout: LevelLayout = serde_json::from_str(text)?;
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        let cols = (WORLD_WIDTH / TILE_SIZE) as u32;
        let rows = (WORLD_HEIGHT / TILE_SIZE) as u32;

        for tile in &self.tiles {
            if !is_surface_kind(tile.kind) {
                return Err(format!("{:?} cannot be placed as a level tile", tile.kind).into());
            }
            if tile.col >= cols || tile.row >= rows {
                return Err(format!("tile ({}, {}) lies outside the kitchen", tile.col, tile.row).into());
            }
        }
        for point in &self.spawn_points {
            if !point.is_finite() || point.x < 0.0 || point.y < 0.0 || point.x > WORLD_WIDTH || point.y > WORLD_HEIGHT {
                return Err(format!("spawn point ({}, {}) lies outside the kitchen", point.x, point.y).into());
            }
        }
        Ok(())
    }

    /// Counters along the top and bottom walls, a cooking line, a patty box,
    /// a trash bin and one order window.
    pub fn default_kitchen() -> Self {
        let mut tiles = Vec::new();
        for col in 3..17 {
            let kind = match col {
                3 => EntityKind::PattyBox,
                8 | 9 => EntityKind::Stove,
                16 => EntityKind::TrashBin,
                _ => EntityKind::Counter,
            };
            tiles.push(Tile { kind, col, row: 3 });
        }
        for col in 3..17 {
            let kind = if col == 10 {
                EntityKind::OrderWindow
            } else {
                EntityKind::Counter
            };
            tiles.push(Tile { kind, col, row: 11 });
        }

        let spawn_points = (0..4)
            .map(|i| Vec2::new(208.0 + i as f32 * 64.0, 240.0))
            .collect();

        Self {
            tiles,
            spawn_points,
        }
    }

    /// Where the `index`th joining player appears.
    pub fn spawn_point(&self, index: usize) -> Vec2 {
        if self.spawn_points.is_empty() {
            Vec2::new(WORLD_WIDTH / 2.0, WORLD_HEIGHT / 2.0)
        } else {
            self.spawn_points[index % self.spawn_points.len()]
        }
    }

    /// Creates every surface of the layout. Returns the new entities in
    /// layout order.
    pub fn seed(&self, world: &mut World) -> Vec<EntityId> {
        self.tiles
            .iter()
            .map(|tile| prefab::spawn(world, tile.kind, tile.center()))
            .collect()
    }
}

fn is_surface_kind(kind: EntityKind) -> bool {
    !matches!(
        kind,
        EntityKind::Player | EntityKind::UncookedPatty | EntityKind::CookedPatty
    )
}
