//! Pickup / drop / swap / spawn / destroy / order-submit resolution.
//!
//! Resolution is split in two: [`resolve`] is a pure decision over a world
//! snapshot, and [`apply`] re-validates and performs the chosen action as one
//! mutation. The server runs both once per interact press; the client runs
//! them against its predicted world for optimistic feedback.
//!
//! Candidate search scans entities in ascending id order and only replaces the
//! current best on a strictly larger overlap, so exact ties go to the lowest
//! entity id.

use crate::components::{Relation, Tag};
use crate::ecs::{EntityId, World};
use crate::prefab::{self, EntityKind};
use crate::{
    overlap_area, Vec2, DISCONNECT_DROP_RADIUS, HOLD_OFFSET, INTERACTION_PROBE_SIZE,
    MIN_OVERLAP_AREA, PLAYER_INTERACTION_REACH, UNOCCUPIED_SURFACE_BIAS,
};
use log::warn;

/// Inputs to a single interaction decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionQuery {
    pub player: EntityId,
    pub position: Vec2,
    pub facing: Vec2,
    pub held: Option<EntityId>,
}

impl InteractionQuery {
    /// Builds the query from the player's current components.
    pub fn for_player(world: &World, player: EntityId) -> Option<Self> {
        if !world.is_alive(player) {
            return None;
        }
        Some(Self {
            player,
            position: *world.positions.get(player)?,
            facing: world.facings.get(player).copied().unwrap_or_default(),
            held: world.held_items(player).first().copied(),
        })
    }

    pub fn interaction_point(&self) -> Vec2 {
        interaction_point(self.position, self.facing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionAction {
    None,
    PickUp {
        item: EntityId,
        from: Option<EntityId>,
    },
    Drop {
        item: EntityId,
        surface: EntityId,
    },
    Swap {
        held: EntityId,
        picked: EntityId,
        surface: EntityId,
    },
    Destroy {
        item: EntityId,
        surface: EntityId,
    },
    SubmitOrder {
        item: EntityId,
        order: EntityId,
        window: EntityId,
    },
    Spawn {
        spawner: EntityId,
        at: Vec2,
    },
}

/// Surface chosen by the candidate search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCandidate {
    pub surface: EntityId,
    pub occupant: Option<EntityId>,
    pub overlap: f32,
}

pub fn interaction_point(position: Vec2, facing: Vec2) -> Vec2 {
    position + facing * PLAYER_INTERACTION_REACH
}

fn probe_overlap(world: &World, entity: EntityId, point: Vec2) -> Option<f32> {
    let center = *world.positions.get(entity)?;
    let size = *world.sizes.get(entity)?;
    let probe = Vec2::new(INTERACTION_PROBE_SIZE, INTERACTION_PROBE_SIZE);
    let area = overlap_area(point, probe, center, size);
    (area >= MIN_OVERLAP_AREA).then_some(area)
}

/// Best free-standing holdable under the probe.
pub fn find_holdable(world: &World, point: Vec2) -> Option<EntityId> {
    let mut best: Option<(EntityId, f32)> = None;
    for item in world.tagged(Tag::Holdable) {
        if world.held_by(item).is_some() {
            continue;
        }
        let Some(area) = probe_overlap(world, item, point) else {
            continue;
        };
        if best.map_or(true, |(_, best_area)| area > best_area) {
            best = Some((item, area));
        }
    }
    best.map(|(item, _)| item)
}

/// Best surface under the probe, biased toward unoccupied surfaces. With an
/// item in hand only surfaces that accept items count as unoccupied
/// alternatives, so a free bin or window never wins over a swap.
pub fn find_surface(world: &World, point: Vec2, held: Option<EntityId>) -> Option<SurfaceCandidate> {
    let mut best_any: Option<SurfaceCandidate> = None;
    let mut best_free: Option<SurfaceCandidate> = None;

    for surface in world.tagged(Tag::Surface) {
        let Some(overlap) = probe_overlap(world, surface, point) else {
            continue;
        };
        let candidate = SurfaceCandidate {
            surface,
            occupant: world.occupant(surface, held),
            overlap,
        };
        if best_any.map_or(true, |best| overlap > best.overlap) {
            best_any = Some(candidate);
        }
        let takes_held = held.is_none() || world.has_tag(surface, Tag::AcceptsItems);
        if candidate.occupant.is_none()
            && takes_held
            && best_free.map_or(true, |best| overlap > best.overlap)
        {
            best_free = Some(candidate);
        }
    }

    match (best_any, best_free) {
        (Some(any), Some(free))
            if any.occupant.is_some() && free.overlap >= any.overlap * UNOCCUPIED_SURFACE_BIAS =>
        {
            Some(free)
        }
        (any, _) => any,
    }
}

/// Decides what an interact press would do, without touching the world.
pub fn resolve(world: &World, query: &InteractionQuery) -> InteractionAction {
    let point = query.interaction_point();

    match query.held {
        Some(held) => {
            let Some(candidate) = find_surface(world, point, Some(held)) else {
                return InteractionAction::None;
            };
            resolve_holding(world, held, candidate)
        }
        None => {
            if let Some(item) = find_holdable(world, point) {
                return InteractionAction::PickUp {
                    item,
                    from: world.sitting_on(item),
                };
            }
            match find_surface(world, point, None) {
                Some(candidate) if has_stock(world, candidate.surface) => InteractionAction::Spawn {
                    spawner: candidate.surface,
                    at: point,
                },
                _ => InteractionAction::None,
            }
        }
    }
}

fn resolve_holding(world: &World, held: EntityId, candidate: SurfaceCandidate) -> InteractionAction {
    let surface = candidate.surface;

    if world.has_tag(surface, Tag::AcceptsOrders) && world.has_tag(held, Tag::CookedPatty) {
        if let Some(order) = active_order(world, surface) {
            return InteractionAction::SubmitOrder {
                item: held,
                order,
                window: surface,
            };
        }
    }
    if world.has_tag(surface, Tag::DestroysItems) {
        return InteractionAction::Destroy {
            item: held,
            surface,
        };
    }
    if world.has_tag(surface, Tag::AcceptsItems) {
        return match candidate.occupant {
            Some(picked) => InteractionAction::Swap {
                held,
                picked,
                surface,
            },
            None => InteractionAction::Drop {
                item: held,
                surface,
            },
        };
    }
    InteractionAction::None
}

fn active_order(world: &World, window: EntityId) -> Option<EntityId> {
    world
        .order_queues
        .get(window)
        .and_then(|queue| queue.active())
        .filter(|order| world.is_alive(*order))
}

fn has_stock(world: &World, surface: EntityId) -> bool {
    world.has_tag(surface, Tag::SpawnsItems)
        && world.stocks.get(surface).map_or(false, |stock| stock.count > 0)
        && world.spawn_types.contains(surface)
}

/// Where a holder carries its item.
pub fn hold_position(world: &World, holder: EntityId) -> Option<Vec2> {
    let position = *world.positions.get(holder)?;
    let facing = world.facings.get(holder).copied().unwrap_or_default();
    Some(position + facing.normalize_or_zero() * HOLD_OFFSET)
}

fn is_held_by(world: &World, item: EntityId, player: EntityId) -> bool {
    world.is_alive(item) && world.held_by(item) == Some(player)
}

fn hands_free(world: &World, player: EntityId) -> bool {
    world.held_items(player).is_empty()
}

/// Re-validates `action` against the current world and performs it. Returns
/// false, leaving the world untouched, when any precondition no longer holds.
pub fn apply(world: &mut World, player: EntityId, action: &InteractionAction) -> bool {
    if !world.is_alive(player) {
        return false;
    }

    match *action {
        InteractionAction::None => false,

        InteractionAction::PickUp { item, .. } => {
            if !world.is_alive(item)
                || !world.has_tag(item, Tag::Holdable)
                || world.held_by(item).is_some()
                || !hands_free(world, player)
            {
                return false;
            }
            pick_up(world, player, item);
            true
        }

        InteractionAction::Drop { item, surface } => {
            if !is_held_by(world, item, player)
                || !world.has_tag(surface, Tag::AcceptsItems)
                || world.occupant(surface, Some(item)).is_some()
            {
                return false;
            }
            place_on(world, item, surface);
            true
        }

        InteractionAction::Swap {
            held,
            picked,
            surface,
        } => {
            if !is_held_by(world, held, player)
                || !world.has_tag(surface, Tag::AcceptsItems)
                || !world.is_alive(picked)
                || picked == held
                || world.held_by(picked).is_some()
                || world.sitting_on(picked) != Some(surface)
            {
                return false;
            }
            // Pick up first so no item is ever without an owner or a surface.
            pick_up(world, player, picked);
            place_on(world, held, surface);
            true
        }

        InteractionAction::Destroy { item, surface } => {
            if !is_held_by(world, item, player) || !world.has_tag(surface, Tag::DestroysItems) {
                return false;
            }
            world.despawn(item);
            true
        }

        InteractionAction::SubmitOrder {
            item,
            order,
            window,
        } => {
            if !is_held_by(world, item, player)
                || !world.has_tag(item, Tag::CookedPatty)
                || !world.has_tag(window, Tag::AcceptsOrders)
                || active_order(world, window) != Some(order)
            {
                return false;
            }
            let Some(entry) = world.orders.get_mut(order) else {
                return false;
            };
            entry.fulfilled_count += 1;
            let completed = entry.is_fulfilled();

            world.mark_changed(order);
            world.despawn(item);
            if completed {
                if let Some(queue) = world.order_queues.get_mut(window) {
                    queue.orders.retain(|o| *o != order);
                }
                world.mark_changed(window);
                world.despawn(order);
            }
            true
        }

        InteractionAction::Spawn { spawner, at } => {
            if !has_stock(world, spawner) || !hands_free(world, player) {
                return false;
            }
            let Some(item_type) = world.spawn_types.get(spawner).copied() else {
                return false;
            };
            if let Some(stock) = world.stocks.get_mut(spawner) {
                stock.count -= 1;
            }
            world.mark_changed(spawner);

            let item = prefab::spawn(world, EntityKind::for_item(item_type), at);
            pick_up(world, player, item);
            true
        }
    }
}

/// Resolves and applies one interact press for `player`. Returns the action
/// performed, or [`InteractionAction::None`].
pub fn interact(world: &mut World, player: EntityId) -> InteractionAction {
    let Some(query) = InteractionQuery::for_player(world, player) else {
        return InteractionAction::None;
    };
    let action = resolve(world, &query);
    if apply(world, player, &action) {
        action
    } else {
        InteractionAction::None
    }
}

fn pick_up(world: &mut World, player: EntityId, item: EntityId) {
    world.clear_relation(Relation::SittingOn, item);
    world.set_relation(Relation::HeldBy, item, player);
    if let Some(position) = hold_position(world, player) {
        world.positions.insert(item, position);
    }
}

fn place_on(world: &mut World, item: EntityId, surface: EntityId) {
    world.clear_relation(Relation::HeldBy, item);
    world.set_relation(Relation::SittingOn, item, surface);
    if let Some(position) = world.positions.get(surface).copied() {
        world.positions.insert(item, position);
    }
}

fn drop_on_floor(world: &mut World, item: EntityId, at: Vec2) {
    world.clear_relation(Relation::HeldBy, item);
    world.clear_relation(Relation::SittingOn, item);
    world.positions.insert(item, at);
}

/// Moves every held item to its holder's carry position.
pub fn carry_held_items(world: &mut World) {
    let held: Vec<(EntityId, EntityId)> = world
        .tagged(Tag::Holdable)
        .filter_map(|item| world.held_by(item).map(|holder| (item, holder)))
        .collect();

    for (item, holder) in held {
        if let Some(position) = hold_position(world, holder) {
            world.positions.insert(item, position);
        }
    }
}

/// Releases everything `player` holds before the player goes away: onto the
/// nearest free accepting surface within reach, otherwise onto the floor.
pub fn release_held_items(world: &mut World, player: EntityId) -> Vec<(EntityId, Option<EntityId>)> {
    let origin = world.positions.get(player).copied().unwrap_or_default();
    let mut released = Vec::new();

    for item in world.held_items(player) {
        match nearest_free_surface(world, origin, item) {
            Some(surface) => {
                place_on(world, item, surface);
                released.push((item, Some(surface)));
            }
            None => {
                drop_on_floor(world, item, origin);
                released.push((item, None));
            }
        }
    }
    released
}

fn nearest_free_surface(world: &World, origin: Vec2, item: EntityId) -> Option<EntityId> {
    let mut best: Option<(EntityId, f32)> = None;
    for surface in world.tagged(Tag::AcceptsItems) {
        if world.occupant(surface, Some(item)).is_some() {
            continue;
        }
        let Some(position) = world.positions.get(surface) else {
            continue;
        };
        let distance = position.distance(origin);
        if distance > DISCONNECT_DROP_RADIUS {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((surface, distance));
        }
    }
    best.map(|(surface, _)| surface)
}

/// Repairs placement states the interaction rules should never produce.
/// Returns how many entities were touched.
pub fn repair_placement_invariants(world: &mut World) -> usize {
    let mut repaired = 0;

    let both: Vec<EntityId> = world
        .tagged(Tag::Holdable)
        .filter(|item| world.held_by(*item).is_some() && world.sitting_on(*item).is_some())
        .collect();
    for item in both {
        warn!("Item {} was both held and sitting; clearing SittingOn", item);
        world.clear_relation(Relation::SittingOn, item);
        repaired += 1;
    }

    let players: Vec<EntityId> = world.tagged(Tag::Player).collect();
    for player in players {
        let held = world.held_items(player);
        if held.len() <= 1 {
            continue;
        }
        let origin = world.positions.get(player).copied().unwrap_or_default();
        for item in held.into_iter().skip(1) {
            warn!("Player {} held more than one item; force-dropping {}", player, item);
            drop_on_floor(world, item, origin);
            repaired += 1;
        }
    }

    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Order, ItemStock};
    use crate::prefab::spawn;

    fn player_at(world: &mut World, position: Vec2, facing: Vec2) -> EntityId {
        let player = spawn(world, EntityKind::Player, position);
        world.facings.insert(player, facing);
        player
    }

    fn item_count(world: &World) -> usize {
        world.tagged(Tag::Holdable).count()
    }

    #[test]
    fn test_pickup_from_counter() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 100.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::new(132.0, 100.0));
        world.set_relation(Relation::SittingOn, patty, counter);

        let action = interact(&mut world, player);
        assert_eq!(
            action,
            InteractionAction::PickUp {
                item: patty,
                from: Some(counter)
            }
        );
        assert_eq!(world.held_by(patty), Some(player));
        assert_eq!(world.sitting_on(patty), None);
    }

    #[test]
    fn test_drop_onto_empty_counter() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(0.0, 1.0));
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(100.0, 132.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        let action = interact(&mut world, player);
        assert_eq!(action, InteractionAction::Drop { item: patty, surface: counter });
        assert_eq!(world.held_by(patty), None);
        assert_eq!(world.sitting_on(patty), Some(counter));
        assert_eq!(world.positions.get(patty), Some(&Vec2::new(100.0, 132.0)));
    }

    #[test]
    fn test_holding_without_surface_is_noop() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(300.0, 300.0), Vec2::new(1.0, 0.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        assert_eq!(interact(&mut world, player), InteractionAction::None);
        assert_eq!(world.held_by(patty), Some(player));
    }

    #[test]
    fn test_swap_with_occupied_counter() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 100.0));
        let on_counter = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(132.0, 100.0));
        world.set_relation(Relation::SittingOn, on_counter, counter);
        let in_hand = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, in_hand, player);

        let before = item_count(&world);
        let action = interact(&mut world, player);
        assert_eq!(
            action,
            InteractionAction::Swap {
                held: in_hand,
                picked: on_counter,
                surface: counter
            }
        );
        assert_eq!(world.held_by(on_counter), Some(player));
        assert_eq!(world.sitting_on(on_counter), None);
        assert_eq!(world.sitting_on(in_hand), Some(counter));
        assert_eq!(world.held_by(in_hand), None);
        assert_eq!(item_count(&world), before);
    }

    #[test]
    fn test_unoccupied_surface_bias() {
        let mut world = World::new();
        // Probe at (132, 100): the occupied counter overlaps 576, the free one
        // 480, which clears the 60% bar.
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let occupied = spawn(&mut world, EntityKind::Counter, Vec2::new(134.0, 96.0));
        let free = spawn(&mut world, EntityKind::Counter, Vec2::new(134.0, 108.0));
        let blocker = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(200.0, 200.0));
        world.set_relation(Relation::SittingOn, blocker, occupied);

        let held = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, held, player);

        let query = InteractionQuery::for_player(&world, player).unwrap();
        let candidate = find_surface(&world, query.interaction_point(), Some(held)).unwrap();
        assert_eq!(candidate.surface, free);
        assert_eq!(resolve(&world, &query), InteractionAction::Drop { item: held, surface: free });
    }

    #[test]
    fn test_free_bin_does_not_steal_a_swap() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let occupied = spawn(&mut world, EntityKind::Counter, Vec2::new(134.0, 96.0));
        spawn(&mut world, EntityKind::TrashBin, Vec2::new(134.0, 108.0));
        let on_counter = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(134.0, 96.0));
        world.set_relation(Relation::SittingOn, on_counter, occupied);
        let held = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, held, player);

        let before = item_count(&world);
        assert_eq!(
            interact(&mut world, player),
            InteractionAction::Swap {
                held,
                picked: on_counter,
                surface: occupied
            }
        );
        assert!(world.is_alive(held));
        assert_eq!(world.sitting_on(held), Some(occupied));
        assert_eq!(item_count(&world), before);
    }

    #[test]
    fn test_occupied_surface_kept_when_free_one_is_marginal() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let occupied = spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 100.0));
        // Overlaps the probe by a sliver only.
        spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 126.0));
        let blocker = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(300.0, 300.0));
        world.set_relation(Relation::SittingOn, blocker, occupied);

        let candidate = find_surface(&world, Vec2::new(132.0, 100.0), None).unwrap();
        assert_eq!(candidate.surface, occupied);
        assert_eq!(candidate.occupant, Some(blocker));
    }

    #[test]
    fn test_exact_tie_goes_to_lowest_id() {
        let mut world = World::new();
        let first = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(50.0, 50.0));
        let _second = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(50.0, 50.0));
        assert_eq!(find_holdable(&world, Vec2::new(50.0, 50.0)), Some(first));
    }

    #[test]
    fn test_min_overlap_rejects_grazing_items() {
        let mut world = World::new();
        // Probe half-width 12 + item half-width 8 = 20; at 19.5 the overlap is 0.5 * 16.
        spawn(&mut world, EntityKind::CookedPatty, Vec2::new(19.5, 0.0));
        assert_eq!(find_holdable(&world, Vec2::ZERO), None);
    }

    #[test]
    fn test_trash_destroys_held_item() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(-1.0, 0.0));
        let bin = spawn(&mut world, EntityKind::TrashBin, Vec2::new(68.0, 100.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        assert_eq!(interact(&mut world, player), InteractionAction::Destroy { item: patty, surface: bin });
        assert!(!world.is_alive(patty));
    }

    #[test]
    fn test_spawn_from_patty_box() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(0.0, -1.0));
        let spawner = spawn(&mut world, EntityKind::PattyBox, Vec2::new(100.0, 68.0));

        let action = interact(&mut world, player);
        assert!(matches!(action, InteractionAction::Spawn { spawner: s, .. } if s == spawner));
        let held = world.held_items(player);
        assert_eq!(held.len(), 1);
        assert!(world.has_tag(held[0], Tag::UncookedPatty));
        assert_eq!(world.stocks.get(spawner).unwrap().count, crate::DEFAULT_SPAWNER_STOCK - 1);
    }

    #[test]
    fn test_empty_spawner_is_noop() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(0.0, -1.0));
        let spawner = spawn(&mut world, EntityKind::PattyBox, Vec2::new(100.0, 68.0));
        world.stocks.insert(spawner, ItemStock { count: 0, max_count: 10 });

        assert_eq!(interact(&mut world, player), InteractionAction::None);
        assert!(world.held_items(player).is_empty());
    }

    #[test]
    fn test_uncooked_item_not_accepted_at_window() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let window = spawn(&mut world, EntityKind::OrderWindow, Vec2::new(132.0, 100.0));
        let order = world.spawn();
        world.orders.insert(
            order,
            Order { window, required_count: 1, fulfilled_count: 0, time_limit: 30.0, elapsed: 0.0 },
        );
        world.order_queues.get_mut(window).unwrap().orders.push(order);
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        assert_eq!(interact(&mut world, player), InteractionAction::None);
        assert_eq!(world.held_by(patty), Some(player));
    }

    #[test]
    fn test_apply_is_noop_for_destroyed_entities() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::new(132.0, 100.0));
        let action = InteractionAction::PickUp { item: patty, from: None };
        world.despawn(patty);
        assert!(!apply(&mut world, player, &action));

        world.despawn(player);
        assert_eq!(interact(&mut world, player), InteractionAction::None);
    }

    #[test]
    fn test_stale_drop_leaves_world_untouched() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 100.0));
        let held = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, held, player);
        let action = resolve(&world, &InteractionQuery::for_player(&world, player).unwrap());

        // Someone else fills the counter before the action lands.
        let other = spawn(&mut world, EntityKind::CookedPatty, Vec2::new(132.0, 100.0));
        world.set_relation(Relation::SittingOn, other, counter);

        assert!(!apply(&mut world, player, &action));
        assert_eq!(world.held_by(held), Some(player));
        assert_eq!(world.sitting_on(held), None);
    }

    #[test]
    fn test_release_prefers_nearby_free_counter() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let far = spawn(&mut world, EntityKind::Counter, Vec2::new(400.0, 100.0));
        let near = spawn(&mut world, EntityKind::Counter, Vec2::new(132.0, 100.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        let released = release_held_items(&mut world, player);
        assert_eq!(released, vec![(patty, Some(near))]);
        assert_ne!(world.sitting_on(patty), Some(far));
        assert_eq!(world.held_by(patty), None);
    }

    #[test]
    fn test_release_falls_back_to_floor() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(300.0, 300.0), Vec2::new(1.0, 0.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        assert_eq!(release_held_items(&mut world, player), vec![(patty, None)]);
        assert_eq!(world.held_by(patty), None);
        assert_eq!(world.positions.get(patty), Some(&Vec2::new(300.0, 300.0)));
    }

    #[test]
    fn test_repair_force_drops_extra_items() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(1.0, 0.0));
        let counter = spawn(&mut world, EntityKind::Counter, Vec2::new(300.0, 300.0));
        let a = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        let b = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, a, player);
        world.set_relation(Relation::HeldBy, b, player);
        world.set_relation(Relation::SittingOn, a, counter);

        assert_eq!(repair_placement_invariants(&mut world), 2);
        assert_eq!(world.held_items(player), vec![a]);
        assert_eq!(world.sitting_on(a), None);
        assert_eq!(world.held_by(b), None);
    }

    #[test]
    fn test_carry_moves_item_with_holder() {
        let mut world = World::new();
        let player = player_at(&mut world, Vec2::new(100.0, 100.0), Vec2::new(0.0, 1.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::ZERO);
        world.set_relation(Relation::HeldBy, patty, player);

        world.positions.insert(player, Vec2::new(150.0, 80.0));
        carry_held_items(&mut world);
        assert_eq!(world.positions.get(patty), Some(&Vec2::new(150.0, 80.0 + HOLD_OFFSET)));
    }
}
