//! Sparse entity store.
//!
//! Entities are plain indices. Every data component lives in its own
//! [`SparseStorage`] indexed by entity, tags live in one ordered set per tag,
//! and the two placement relations are exclusive per subject. Destroying an
//! entity clears every slot it owned so a reused id never sees stale data.

use crate::components::{
    CookingTimer, ItemStock, ItemType, NetworkId, Order, OrderQueue, Relation, Tag, TagSet,
};
use crate::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-component array indexed by entity id.
#[derive(Debug, Clone)]
pub struct SparseStorage<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for SparseStorage<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> SparseStorage<T> {
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        let index = entity.index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].replace(value)
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        self.slots.get_mut(entity.index()).and_then(Option::take)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.slots.get(entity.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.slots.get_mut(entity.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.get(entity).is_some()
    }

    /// Iterates occupied slots in ascending entity order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (EntityId(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (EntityId(i as u32), v)))
    }
}

/// A change to a networked entity, recorded for the delta stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldChange {
    Spawned(EntityId),
    Despawned(EntityId),
    Attached {
        relation: Relation,
        subject: EntityId,
        target: EntityId,
    },
    Detached {
        relation: Relation,
        subject: EntityId,
    },
    Changed(EntityId),
}

/// Append-only log of [`WorldChange`]s read through per-connection cursors.
#[derive(Debug, Clone, Default)]
pub struct ChangeJournal {
    entries: VecDeque<WorldChange>,
    /// Sequence number of `entries[0]`.
    base: u64,
}

impl ChangeJournal {
    fn push(&mut self, change: WorldChange) {
        self.entries.push_back(change);
    }

    /// Sequence number the next entry will receive.
    pub fn head(&self) -> u64 {
        self.base + self.entries.len() as u64
    }

    /// Entries recorded at or after `cursor`, plus the cursor to resume from.
    pub fn since(&self, cursor: u64) -> (Vec<WorldChange>, u64) {
        let start = cursor.saturating_sub(self.base) as usize;
        let changes = self.entries.iter().skip(start).copied().collect();
        (changes, self.head())
    }

    /// Drops entries every reader has already consumed.
    pub fn trim(&mut self, min_cursor: u64) {
        while self.base < min_cursor && !self.entries.is_empty() {
            self.entries.pop_front();
            self.base += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct World {
    alive: Vec<bool>,
    free: Vec<u32>,
    tags: Vec<BTreeSet<EntityId>>,
    held_by: SparseStorage<EntityId>,
    sitting_on: SparseStorage<EntityId>,

    pub positions: SparseStorage<Vec2>,
    pub velocities: SparseStorage<Vec2>,
    pub facings: SparseStorage<Vec2>,
    /// Footprint width and height, centred on the position.
    pub sizes: SparseStorage<Vec2>,
    pub stocks: SparseStorage<ItemStock>,
    pub spawn_types: SparseStorage<ItemType>,
    pub order_queues: SparseStorage<OrderQueue>,
    pub orders: SparseStorage<Order>,
    pub cooking_timers: SparseStorage<CookingTimer>,
    pub network_ids: SparseStorage<NetworkId>,

    journal: Option<ChangeJournal>,
}

impl World {
    pub fn new() -> Self {
        Self {
            alive: Vec::new(),
            free: Vec::new(),
            tags: vec![BTreeSet::new(); Tag::COUNT],
            held_by: SparseStorage::default(),
            sitting_on: SparseStorage::default(),
            positions: SparseStorage::default(),
            velocities: SparseStorage::default(),
            facings: SparseStorage::default(),
            sizes: SparseStorage::default(),
            stocks: SparseStorage::default(),
            spawn_types: SparseStorage::default(),
            order_queues: SparseStorage::default(),
            orders: SparseStorage::default(),
            cooking_timers: SparseStorage::default(),
            network_ids: SparseStorage::default(),
            journal: None,
        }
    }

    /// A world that records networked changes for the delta stream.
    pub fn with_change_tracking() -> Self {
        Self {
            journal: Some(ChangeJournal::default()),
            ..Self::new()
        }
    }

    pub fn spawn(&mut self) -> EntityId {
        match self.free.pop() {
            Some(index) => {
                self.alive[index as usize] = true;
                EntityId(index)
            }
            None => {
                self.alive.push(true);
                EntityId(self.alive.len() as u32 - 1)
            }
        }
    }

    /// Destroys an entity, detaching anything related to it. Returns false if
    /// the entity was already gone.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if !self.is_alive(entity) {
            return false;
        }

        for relation in [Relation::HeldBy, Relation::SittingOn] {
            for subject in self.sources(relation, entity) {
                self.clear_relation(relation, subject);
            }
            self.clear_relation(relation, entity);
        }

        if self.has_tag(entity, Tag::Networked) {
            self.record(WorldChange::Despawned(entity));
        }
        for set in &mut self.tags {
            set.remove(&entity);
        }

        self.positions.remove(entity);
        self.velocities.remove(entity);
        self.facings.remove(entity);
        self.sizes.remove(entity);
        self.stocks.remove(entity);
        self.spawn_types.remove(entity);
        self.order_queues.remove(entity);
        self.orders.remove(entity);
        self.cooking_timers.remove(entity);
        self.network_ids.remove(entity);

        self.alive[entity.index()] = false;
        self.free.push(entity.0);
        true
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.alive.get(entity.index()).copied().unwrap_or(false)
    }

    /// Live entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| EntityId(i as u32))
    }

    pub fn entity_count(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }

    pub fn add_tag(&mut self, entity: EntityId, tag: Tag) {
        if !self.is_alive(entity) || !self.tags[tag.index()].insert(entity) {
            return;
        }
        if tag == Tag::Networked {
            self.record(WorldChange::Spawned(entity));
        } else if self.has_tag(entity, Tag::Networked) {
            self.record(WorldChange::Changed(entity));
        }
    }

    pub fn remove_tag(&mut self, entity: EntityId, tag: Tag) {
        if self.tags[tag.index()].remove(&entity) && self.has_tag(entity, Tag::Networked) {
            self.record(WorldChange::Changed(entity));
        }
    }

    pub fn has_tag(&self, entity: EntityId, tag: Tag) -> bool {
        self.tags[tag.index()].contains(&entity)
    }

    /// Entities carrying `tag`, ascending by id.
    pub fn tagged(&self, tag: Tag) -> impl Iterator<Item = EntityId> + '_ {
        self.tags[tag.index()].iter().copied()
    }

    pub fn tag_set(&self, entity: EntityId) -> TagSet {
        Tag::ALL
            .into_iter()
            .filter(|tag| self.has_tag(entity, *tag))
            .collect()
    }

    pub fn relation(&self, relation: Relation, subject: EntityId) -> Option<EntityId> {
        self.relation_storage(relation).get(subject).copied()
    }

    /// Points `subject` at `target`, replacing any previous target.
    pub fn set_relation(&mut self, relation: Relation, subject: EntityId, target: EntityId) {
        if !self.is_alive(subject) || !self.is_alive(target) {
            return;
        }
        if self.relation(relation, subject) == Some(target) {
            return;
        }
        self.clear_relation(relation, subject);
        self.relation_storage_mut(relation).insert(subject, target);
        if self.has_tag(subject, Tag::Networked) {
            self.record(WorldChange::Attached {
                relation,
                subject,
                target,
            });
        }
    }

    pub fn clear_relation(&mut self, relation: Relation, subject: EntityId) -> Option<EntityId> {
        let previous = self.relation_storage_mut(relation).remove(subject);
        if previous.is_some() && self.has_tag(subject, Tag::Networked) {
            self.record(WorldChange::Detached { relation, subject });
        }
        previous
    }

    /// Reverse lookup: every subject whose `relation` points at `target`.
    pub fn sources(&self, relation: Relation, target: EntityId) -> Vec<EntityId> {
        self.relation_storage(relation)
            .iter()
            .filter(|(_, t)| **t == target)
            .map(|(subject, _)| subject)
            .collect()
    }

    pub fn held_by(&self, item: EntityId) -> Option<EntityId> {
        self.relation(Relation::HeldBy, item)
    }

    pub fn sitting_on(&self, item: EntityId) -> Option<EntityId> {
        self.relation(Relation::SittingOn, item)
    }

    /// Items currently held by `holder`.
    pub fn held_items(&self, holder: EntityId) -> Vec<EntityId> {
        self.sources(Relation::HeldBy, holder)
    }

    /// The holdable item sitting on `surface`, ignoring `exclude`.
    pub fn occupant(&self, surface: EntityId, exclude: Option<EntityId>) -> Option<EntityId> {
        self.sources(Relation::SittingOn, surface)
            .into_iter()
            .find(|item| Some(*item) != exclude && self.has_tag(*item, Tag::Holdable))
    }

    /// Flags a non-positional component change on a networked entity.
    pub fn mark_changed(&mut self, entity: EntityId) {
        if self.has_tag(entity, Tag::Networked) {
            self.record(WorldChange::Changed(entity));
        }
    }

    pub fn journal(&self) -> Option<&ChangeJournal> {
        self.journal.as_ref()
    }

    pub fn journal_mut(&mut self) -> Option<&mut ChangeJournal> {
        self.journal.as_mut()
    }

    fn record(&mut self, change: WorldChange) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(change);
        }
    }

    fn relation_storage(&self, relation: Relation) -> &SparseStorage<EntityId> {
        match relation {
            Relation::HeldBy => &self.held_by,
            Relation::SittingOn => &self.sitting_on,
        }
    }

    fn relation_storage_mut(&mut self, relation: Relation) -> &mut SparseStorage<EntityId> {
        match relation {
            Relation::HeldBy => &mut self.held_by,
            Relation::SittingOn => &mut self.sitting_on,
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
