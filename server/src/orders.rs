//! Order spawn and timeout policy for order windows.

use crate::config::OrderConfig;
use log::info;
use rand::Rng;
use shared::components::{Order, OrderQueue, Tag};
use shared::ecs::{EntityId, World};

/// What one pass of [`order_system`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrderEvents {
    pub spawned: Vec<EntityId>,
    pub expired: Vec<EntityId>,
}

/// Gives every order window a queue built from `config`. The first order of
/// each window is due on the next pass.
pub fn configure_windows(world: &mut World, config: &OrderConfig) {
    let windows: Vec<EntityId> = world.tagged(Tag::AcceptsOrders).collect();
    for window in windows {
        let mut queue = OrderQueue::new(config.max_concurrent, config.spawn_interval);
        queue.since_last_spawn = config.spawn_interval;
        world.order_queues.insert(window, queue);
        world.mark_changed(window);
    }
}

/// Ages orders, expires the ones past their limit and spawns new orders
/// where a window has room and its interval has elapsed.
pub fn order_system<R: Rng>(
    world: &mut World,
    dt: f32,
    rng: &mut R,
    config: &OrderConfig,
) -> OrderEvents {
    let mut events = OrderEvents::default();
    let windows: Vec<EntityId> = world.tagged(Tag::AcceptsOrders).collect();

    for window in windows {
        let Some(queue) = world.order_queues.get(window).cloned() else {
            continue;
        };

        let mut expired = Vec::new();
        for order in &queue.orders {
            if let Some(entry) = world.orders.get_mut(*order) {
                entry.elapsed += dt;
                if entry.is_expired() {
                    expired.push(*order);
                }
            }
        }

        // Orders despawned elsewhere (fulfilment) may still be listed.
        let mut orders: Vec<EntityId> = queue
            .orders
            .iter()
            .copied()
            .filter(|o| world.is_alive(*o) && !expired.contains(o))
            .collect();

        for order in &expired {
            info!("Order {} at window {} expired", order, window);
            world.despawn(*order);
        }

        let mut since_last_spawn = (queue.since_last_spawn + dt).min(queue.spawn_interval);
        let mut changed = !expired.is_empty() || orders.len() != queue.orders.len();

        if since_last_spawn >= queue.spawn_interval && (orders.len() as u32) < queue.max_concurrent {
            let required_count = rng.gen_range(1..=config.max_required.max(1));
            let order = spawn_order(world, window, required_count, config.time_limit);
            info!(
                "Order {} spawned at window {} ({} required)",
                order, window, required_count
            );
            orders.push(order);
            events.spawned.push(order);
            since_last_spawn = 0.0;
            changed = true;
        }

        if let Some(stored) = world.order_queues.get_mut(window) {
            stored.orders = orders;
            stored.since_last_spawn = since_last_spawn;
        }
        if changed {
            world.mark_changed(window);
        }
        events.expired.extend(expired);
    }

    events
}

fn spawn_order(world: &mut World, window: EntityId, required_count: u32, time_limit: f32) -> EntityId {
    let order = world.spawn();
    if let Some(position) = world.positions.get(window).copied() {
        world.positions.insert(order, position);
    }
    world.orders.insert(
        order,
        Order {
            window,
            required_count,
            fulfilled_count: 0,
            time_limit,
            elapsed: 0.0,
        },
    );
    world.add_tag(order, Tag::Networked);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::prefab::{spawn, EntityKind};
    use shared::Vec2;

    fn window_world(config: &OrderConfig) -> (World, EntityId) {
        let mut world = World::new();
        let window = spawn(&mut world, EntityKind::OrderWindow, Vec2::new(320.0, 368.0));
        configure_windows(&mut world, config);
        (world, window)
    }

    #[test]
    fn test_first_order_spawns_immediately() {
        let config = OrderConfig::default();
        let (mut world, window) = window_world(&config);
        let mut rng = StdRng::seed_from_u64(1);

        let events = order_system(&mut world, 0.05, &mut rng, &config);
        assert_eq!(events.spawned.len(), 1);

        let order = world.orders.get(events.spawned[0]).unwrap();
        assert_eq!(order.window, window);
        assert!((1..=config.max_required).contains(&order.required_count));
        assert_eq!(world.order_queues.get(window).unwrap().orders, events.spawned);
    }

    #[test]
    fn test_window_never_exceeds_max_concurrent() {
        let config = OrderConfig {
            spawn_interval: 1.0,
            time_limit: 1000.0,
            max_concurrent: 2,
            max_required: 3,
        };
        let (mut world, window) = window_world(&config);
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..100 {
            order_system(&mut world, 0.5, &mut rng, &config);
            assert!(world.order_queues.get(window).unwrap().orders.len() <= 2);
        }
        assert_eq!(world.order_queues.get(window).unwrap().orders.len(), 2);
    }

    #[test]
    fn test_orders_expire_after_time_limit() {
        let config = OrderConfig {
            spawn_interval: 100.0,
            time_limit: 2.0,
            max_concurrent: 1,
            max_required: 1,
        };
        let (mut world, window) = window_world(&config);
        let mut rng = StdRng::seed_from_u64(3);

        let order = order_system(&mut world, 0.0, &mut rng, &config).spawned[0];
        order_system(&mut world, 1.0, &mut rng, &config);
        assert!(world.is_alive(order));

        let events = order_system(&mut world, 1.0, &mut rng, &config);
        assert_eq!(events.expired, vec![order]);
        assert!(!world.is_alive(order));
        assert!(world.order_queues.get(window).unwrap().orders.is_empty());
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let config = OrderConfig {
            spawn_interval: 0.1,
            time_limit: 0.15,
            ..OrderConfig::default()
        };
        let run = || {
            let (mut world, _) = window_world(&config);
            let mut rng = StdRng::seed_from_u64(42);
            let mut counts = Vec::new();
            for _ in 0..20 {
                for order in order_system(&mut world, 0.1, &mut rng, &config).spawned {
                    counts.push(world.orders.get(order).unwrap().required_count);
                }
            }
            counts
        };
        assert_eq!(run(), run());
    }
}
