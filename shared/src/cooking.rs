//! Cooking timers gated on surface occupancy and heat.

use crate::components::{CookingTimer, Tag};
use crate::ecs::{EntityId, World};
use crate::COOK_DURATION_SECS;
use log::debug;

/// True when `surface` is a heat source, sits on one, or has one sitting on it.
pub fn is_heated(world: &World, surface: EntityId) -> bool {
    if world.has_tag(surface, Tag::HeatSource) {
        return true;
    }
    if world
        .sitting_on(surface)
        .map_or(false, |below| world.has_tag(below, Tag::HeatSource))
    {
        return true;
    }
    world
        .sources(crate::components::Relation::SittingOn, surface)
        .into_iter()
        .any(|above| world.has_tag(above, Tag::HeatSource))
}

fn should_cook(world: &World, item: EntityId) -> bool {
    world.has_tag(item, Tag::UncookedPatty)
        && world.held_by(item).is_none()
        && world
            .sitting_on(item)
            .map_or(false, |surface| world.has_tag(surface, Tag::Surface) && is_heated(world, surface))
}

/// Advances cooking by `dt` seconds. Timers appear when an uncooked patty
/// lands on a heated surface, vanish the moment any precondition fails, and
/// flip the patty to cooked on completion. Returns the items that finished.
pub fn cooking_system(world: &mut World, dt: f32) -> Vec<EntityId> {
    let stale: Vec<EntityId> = world
        .cooking_timers
        .iter()
        .map(|(item, _)| item)
        .filter(|item| !should_cook(world, *item))
        .collect();
    for item in stale {
        world.cooking_timers.remove(item);
        world.mark_changed(item);
    }

    let starting: Vec<EntityId> = world
        .tagged(Tag::UncookedPatty)
        .filter(|item| !world.cooking_timers.contains(*item) && should_cook(world, *item))
        .collect();
    for item in starting {
        world
            .cooking_timers
            .insert(item, CookingTimer::new(COOK_DURATION_SECS));
        world.mark_changed(item);
    }

    let mut finished = Vec::new();
    for (item, timer) in world.cooking_timers.iter_mut() {
        timer.elapsed += dt;
        if timer.is_done() {
            finished.push(item);
        }
    }

    for item in &finished {
        world.cooking_timers.remove(*item);
        world.remove_tag(*item, Tag::UncookedPatty);
        world.add_tag(*item, Tag::CookedPatty);
        debug!("Item {} finished cooking", item);
    }

    finished
}
