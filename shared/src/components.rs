//! Component and tag definitions stored by the entity store.

use crate::ecs::EntityId;
use serde::{Deserialize, Serialize};

/// Marker components. Tags are not mutually exclusive, so each one is stored
/// as its own entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tag {
    Player = 0,
    Holdable,
    Surface,
    AcceptsItems,
    DestroysItems,
    SpawnsItems,
    AcceptsOrders,
    HeatSource,
    UncookedPatty,
    CookedPatty,
    Networked,
}

impl Tag {
    pub const COUNT: usize = 11;

    pub const ALL: [Tag; Tag::COUNT] = [
        Tag::Player,
        Tag::Holdable,
        Tag::Surface,
        Tag::AcceptsItems,
        Tag::DestroysItems,
        Tag::SpawnsItems,
        Tag::AcceptsOrders,
        Tag::HeatSource,
        Tag::UncookedPatty,
        Tag::CookedPatty,
        Tag::Networked,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Compact bitmask of tags used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagSet(pub u16);

impl TagSet {
    pub fn with(mut self, tag: Tag) -> Self {
        self.insert(tag);
        self
    }

    pub fn insert(&mut self, tag: Tag) {
        self.0 |= 1 << tag.index();
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0 & (1 << tag.index()) != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Tag> + '_ {
        Tag::ALL.into_iter().filter(|tag| self.contains(*tag))
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        iter.into_iter().fold(TagSet::default(), TagSet::with)
    }
}

/// Exclusive item relations. An item has at most one target per relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    HeldBy,
    SittingOn,
}

/// Kinds of item a spawner can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    UncookedPatty,
    CookedPatty,
}

impl ItemType {
    pub fn tag(self) -> Tag {
        match self {
            ItemType::UncookedPatty => Tag::UncookedPatty,
            ItemType::CookedPatty => Tag::CookedPatty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStock {
    pub count: u32,
    pub max_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CookingTimer {
    pub elapsed: f32,
    pub duration: f32,
}

impl CookingTimer {
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration,
        }
    }

    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// A customer order waiting at an order window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub window: EntityId,
    pub required_count: u32,
    pub fulfilled_count: u32,
    pub time_limit: f32,
    pub elapsed: f32,
}

impl Order {
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled_count >= self.required_count
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.time_limit
    }
}

/// Orders active at a window, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderQueue {
    pub orders: Vec<EntityId>,
    pub max_concurrent: u32,
    pub spawn_interval: f32,
    pub since_last_spawn: f32,
}

impl OrderQueue {
    pub fn new(max_concurrent: u32, spawn_interval: f32) -> Self {
        Self {
            orders: Vec::new(),
            max_concurrent,
            spawn_interval,
            since_last_spawn: 0.0,
        }
    }

    pub fn active(&self) -> Option<EntityId> {
        self.orders.first().copied()
    }

    pub fn is_full(&self) -> bool {
        self.orders.len() as u32 >= self.max_concurrent
    }
}

/// Stable identity that survives the server-to-client id remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u64);
