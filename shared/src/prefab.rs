//! Entity factory table. Each [`EntityKind`] resolves once, at creation time,
//! to the tags and data components it starts with.

use crate::components::{ItemStock, ItemType, OrderQueue, Tag};
use crate::ecs::{EntityId, World};
use crate::{Vec2, DEFAULT_SPAWNER_STOCK, ITEM_SIZE, PLAYER_SIZE, TILE_SIZE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Counter,
    Stove,
    TrashBin,
    PattyBox,
    OrderWindow,
    UncookedPatty,
    CookedPatty,
}

/// Starting tags and footprint for a kind.
#[derive(Debug, Clone, Copy)]
pub struct Prefab {
    pub tags: &'static [Tag],
    pub size: Vec2,
}

const TILE: Vec2 = Vec2::new(TILE_SIZE, TILE_SIZE);
const ITEM: Vec2 = Vec2::new(ITEM_SIZE, ITEM_SIZE);

impl EntityKind {
    pub fn prefab(self) -> Prefab {
        match self {
            EntityKind::Player => Prefab {
                tags: &[Tag::Player, Tag::Networked],
                size: Vec2::new(PLAYER_SIZE, PLAYER_SIZE),
            },
            EntityKind::Counter => Prefab {
                tags: &[Tag::Surface, Tag::AcceptsItems, Tag::Networked],
                size: TILE,
            },
            EntityKind::Stove => Prefab {
                tags: &[
                    Tag::Surface,
                    Tag::AcceptsItems,
                    Tag::HeatSource,
                    Tag::Networked,
                ],
                size: TILE,
            },
            EntityKind::TrashBin => Prefab {
                tags: &[Tag::Surface, Tag::DestroysItems, Tag::Networked],
                size: TILE,
            },
            EntityKind::PattyBox => Prefab {
                tags: &[Tag::Surface, Tag::SpawnsItems, Tag::Networked],
                size: TILE,
            },
            EntityKind::OrderWindow => Prefab {
                tags: &[Tag::Surface, Tag::AcceptsOrders, Tag::Networked],
                size: TILE,
            },
            EntityKind::UncookedPatty => Prefab {
                tags: &[Tag::Holdable, Tag::UncookedPatty, Tag::Networked],
                size: ITEM,
            },
            EntityKind::CookedPatty => Prefab {
                tags: &[Tag::Holdable, Tag::CookedPatty, Tag::Networked],
                size: ITEM,
            },
        }
    }

    pub fn for_item(item_type: ItemType) -> Self {
        match item_type {
            ItemType::UncookedPatty => EntityKind::UncookedPatty,
            ItemType::CookedPatty => EntityKind::CookedPatty,
        }
    }

    /// Recovers the kind of an existing entity from its tags.
    pub fn classify(world: &World, entity: EntityId) -> Option<EntityKind> {
        let has = |tag| world.has_tag(entity, tag);
        let kind = if has(Tag::Player) {
            EntityKind::Player
        } else if has(Tag::UncookedPatty) {
            EntityKind::UncookedPatty
        } else if has(Tag::CookedPatty) {
            EntityKind::CookedPatty
        } else if has(Tag::HeatSource) {
            EntityKind::Stove
        } else if has(Tag::DestroysItems) {
            EntityKind::TrashBin
        } else if has(Tag::SpawnsItems) {
            EntityKind::PattyBox
        } else if has(Tag::AcceptsOrders) {
            EntityKind::OrderWindow
        } else if has(Tag::AcceptsItems) {
            EntityKind::Counter
        } else {
            return None;
        };
        Some(kind)
    }
}

/// Creates an entity of `kind` centred at `position`.
pub fn spawn(world: &mut World, kind: EntityKind, position: Vec2) -> EntityId {
    let prefab = kind.prefab();
    let entity = world.spawn();

    world.positions.insert(entity, position);
    world.sizes.insert(entity, prefab.size);

    match kind {
        EntityKind::Player => {
            world.velocities.insert(entity, Vec2::ZERO);
            world.facings.insert(entity, Vec2::new(0.0, 1.0));
        }
        EntityKind::PattyBox => {
            world.stocks.insert(
                entity,
                ItemStock {
                    count: DEFAULT_SPAWNER_STOCK,
                    max_count: DEFAULT_SPAWNER_STOCK,
                },
            );
            world.spawn_types.insert(entity, ItemType::UncookedPatty);
        }
        EntityKind::OrderWindow => {
            world.order_queues.insert(entity, OrderQueue::new(3, 15.0));
        }
        _ => {}
    }

    // Networked goes last so the first journal entry sees complete data.
    for tag in prefab.tags {
        if *tag != Tag::Networked {
            world.add_tag(entity, *tag);
        }
    }
    if prefab.tags.contains(&Tag::Networked) {
        world.add_tag(entity, Tag::Networked);
    }

    entity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_counter_has_surface_tags() {
        let mut world = World::new();
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(64.0, 64.0));
        assert!(world.has_tag(counter, Tag::Surface));
        assert!(world.has_tag(counter, Tag::AcceptsItems));
        assert!(!world.has_tag(counter, Tag::Holdable));
        assert_eq!(world.sizes.get(counter), Some(&TILE));
    }

    #[test]
    fn test_patty_box_gets_stock() {
        let mut world = World::new();
        let spawner = spawn(&mut world, EntityKind::PattyBox, Vec2::ZERO);
        let stock = world.stocks.get(spawner).unwrap();
        assert_eq!(stock.count, DEFAULT_SPAWNER_STOCK);
        assert_eq!(world.spawn_types.get(spawner), Some(&ItemType::UncookedPatty));
    }

    #[test]
    fn test_classify_matches_prefab() {
        let mut world = World::new();
        for kind in [
            EntityKind::Player,
            EntityKind::Counter,
            EntityKind::Stove,
            EntityKind::TrashBin,
            EntityKind::PattyBox,
            EntityKind::OrderWindow,
            EntityKind::UncookedPatty,
            EntityKind::CookedPatty,
        ] {
            let entity = spawn(&mut world, kind, Vec2::ZERO);
            assert_eq!(EntityKind::classify(&world, entity), Some(kind));
        }
    }

    #[test]
    fn test_spawn_journals_single_spawn_entry() {
        use crate::ecs::WorldChange;

        let mut world = World::with_change_tracking();
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        let (changes, _) = world.journal().unwrap().since(0);
        assert_eq!(changes, vec![WorldChange::Spawned(patty)]);
    }
}
