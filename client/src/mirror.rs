//! Client copy of the networked world.
//!
//! Entities arrive with server ids. Each one gets a local id on first sight
//! (snapshot or add-delta) and loses it on a remove-delta; every entity id
//! carried inside components is translated through the same map.

use log::{debug, warn};
use shared::components::{Order, OrderQueue, Relation, Tag};
use shared::ecs::{EntityId, World};
use shared::protocol::{Delta, DeltaOp, EntityRecord, Snapshot, StateBroadcast};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RemoteWorld {
    pub world: World,
    pub tick: u32,
    to_local: HashMap<EntityId, EntityId>,
    to_remote: HashMap<EntityId, EntityId>,
}

impl RemoteWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self, remote: EntityId) -> Option<EntityId> {
        self.to_local.get(&remote).copied()
    }

    pub fn remote(&self, local: EntityId) -> Option<EntityId> {
        self.to_remote.get(&local).copied()
    }

    pub fn len(&self) -> usize {
        self.to_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_local.is_empty()
    }

    /// Replaces everything with the snapshot's contents.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.world = World::new();
        self.to_local.clear();
        self.to_remote.clear();
        self.tick = snapshot.tick;

        for record in &snapshot.entities {
            self.map_new(record.id);
        }
        for record in &snapshot.entities {
            self.apply_components(record);
        }
        for record in &snapshot.entities {
            self.apply_links(record);
        }
        debug!("Applied snapshot with {} entities", snapshot.entities.len());
    }

    /// Applies delta ops in order. Links inside records are resolved last,
    /// once every entity the delta introduces has a local id.
    pub fn apply_delta(&mut self, delta: &Delta) -> Vec<EntityId> {
        let mut removed = Vec::new();
        let mut deferred: Vec<&EntityRecord> = Vec::new();

        for op in &delta.ops {
            match op {
                DeltaOp::Added(record) | DeltaOp::Changed(record) => {
                    if self.local(record.id).is_none() {
                        if matches!(op, DeltaOp::Changed(_)) {
                            warn!("Change for unknown entity {}, adding it", record.id);
                        }
                        self.map_new(record.id);
                    }
                    self.apply_components(record);
                    deferred.push(record);
                }
                DeltaOp::Removed(remote) => {
                    if let Some(local) = self.to_local.remove(remote) {
                        self.to_remote.remove(&local);
                        self.world.despawn(local);
                        removed.push(local);
                    }
                }
                DeltaOp::Attached {
                    relation,
                    subject,
                    target,
                } => {
                    if let (Some(subject), Some(target)) = (self.local(*subject), self.local(*target)) {
                        self.world.set_relation(*relation, subject, target);
                    }
                }
                DeltaOp::Detached { relation, subject } => {
                    if let Some(subject) = self.local(*subject) {
                        self.world.clear_relation(*relation, subject);
                    }
                }
            }
        }

        for record in deferred {
            self.apply_links(record);
        }
        removed
    }

    /// Overwrites position, velocity and facing of known entities.
    pub fn apply_state(&mut self, state: &StateBroadcast) {
        self.tick = state.tick;
        for entity in &state.entities {
            let Some(local) = self.local(entity.id) else {
                continue;
            };
            self.world.positions.insert(local, entity.position);
            self.world.velocities.insert(local, entity.velocity);
            self.world.facings.insert(local, entity.facing);
        }
    }

    fn map_new(&mut self, remote: EntityId) -> EntityId {
        let local = self.world.spawn();
        self.to_local.insert(remote, local);
        self.to_remote.insert(local, remote);
        local
    }

    fn apply_components(&mut self, record: &EntityRecord) {
        let Some(local) = self.local(record.id) else {
            return;
        };
        let world = &mut self.world;

        for tag in Tag::ALL {
            if record.tags.contains(tag) {
                world.add_tag(local, tag);
            } else {
                world.remove_tag(local, tag);
            }
        }

        set_or_clear(&mut world.positions, local, record.position);
        set_or_clear(&mut world.velocities, local, record.velocity);
        set_or_clear(&mut world.facings, local, record.facing);
        set_or_clear(&mut world.sizes, local, record.size);
        set_or_clear(&mut world.stocks, local, record.stock);
        set_or_clear(&mut world.spawn_types, local, record.spawn_type);
        set_or_clear(&mut world.cooking_timers, local, record.cooking);
        set_or_clear(&mut world.network_ids, local, record.network_id);
    }

    /// Relations and id-bearing components.
    fn apply_links(&mut self, record: &EntityRecord) {
        let Some(local) = self.local(record.id) else {
            return;
        };
        if !self.world.is_alive(local) {
            return;
        }

        for (relation, target) in [
            (Relation::HeldBy, record.held_by),
            (Relation::SittingOn, record.sitting_on),
        ] {
            match target.and_then(|t| self.local(t)) {
                Some(target) => self.world.set_relation(relation, local, target),
                None => {
                    self.world.clear_relation(relation, local);
                }
            }
        }

        let order = record.order.and_then(|order| {
            Some(Order {
                window: self.local(order.window)?,
                ..order
            })
        });
        set_or_clear(&mut self.world.orders, local, order);

        let queue = record.order_queue.as_ref().map(|queue| OrderQueue {
            orders: queue.orders.iter().filter_map(|o| self.local(*o)).collect(),
            ..queue.clone()
        });
        set_or_clear(&mut self.world.order_queues, local, queue);
    }
}

fn set_or_clear<T>(storage: &mut shared::ecs::SparseStorage<T>, entity: EntityId, value: Option<T>) {
    match value {
        Some(value) => {
            storage.insert(entity, value);
        }
        None => {
            storage.remove(entity);
        }
    }
}
