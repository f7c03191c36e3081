//! Performance benchmarks for critical game systems

use client::prediction::Predictor;
use server::config::ServerConfig;
use server::game::GameState;
use shared::components::{NetworkId, Relation};
use shared::cooking::cooking_system;
use shared::ecs::World;
use shared::interaction;
use shared::movement::{InputFlags, KitchenCollider};
use shared::prefab::{spawn, EntityKind};
use shared::protocol::{
    capture_snapshot, capture_states, collect_delta, decode_server_frame, encode_server_frame, ServerFrame,
    StateBroadcast, FRAME_HEADER_LEN,
};
use shared::Vec2;
use std::time::Instant;

/// A full default kitchen with a few players in it
fn busy_kitchen(players: u64) -> GameState {
    let mut game = GameState::new(&ServerConfig {
        seed: Some(3),
        ..ServerConfig::default()
    });
    for i in 0..players {
        game.add_player(NetworkId(i + 1));
    }
    game
}

/// Benchmarks interaction resolution against a populated kitchen
#[test]
fn benchmark_interaction_resolution() {
    let mut world = World::new();
    for col in 0..20 {
        for row in 0..15 {
            if row % 4 == 0 {
                spawn(&mut world, EntityKind::Counter, Vec2::new(col as f32 * 32.0 + 16.0, row as f32 * 32.0 + 16.0));
            }
        }
    }
    let player = spawn(&mut world, EntityKind::Player, Vec2::new(48.0, 48.0));
    world.facings.insert(player, Vec2::new(0.0, -1.0));

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let query = interaction::InteractionQuery::for_player(&world, player).unwrap();
        let _ = interaction::resolve(&world, &query);
    }

    let duration = start.elapsed();
    println!(
        "Interaction resolution: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds even unoptimised
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the cooking system with many patties on stoves
#[test]
fn benchmark_cooking_system() {
    let mut world = World::new();
    for i in 0..200 {
        let stove = spawn(&mut world, EntityKind::Stove, Vec2::new(i as f32, 0.0));
        let patty = spawn(&mut world, EntityKind::UncookedPatty, Vec2::new(i as f32, 0.0));
        world.set_relation(Relation::SittingOn, patty, stove);
    }

    let iterations = 1000;
    let start = Instant::now();

    for _ in 0..iterations {
        cooking_system(&mut world, 0.001);
    }

    let duration = start.elapsed();
    println!(
        "Cooking system: {} ticks over 200 patties in {:?}",
        iterations, duration
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks full server ticks with several players
#[test]
fn benchmark_server_tick() {
    let mut game = busy_kitchen(4);

    let iterations = 1000;
    let start = Instant::now();

    for _ in 0..iterations {
        game.update(1.0 / 30.0);
    }

    let duration = start.elapsed();
    println!(
        "Server ticks: {} ticks in {:?} ({:.2} μs/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshot and state frame encoding and decoding
#[test]
fn benchmark_frame_serialization() {
    let game = busy_kitchen(4);
    let snapshot = ServerFrame::Snapshot(capture_snapshot(&game.world, game.tick));
    let state = ServerFrame::State(StateBroadcast {
        tick: game.tick,
        player: None,
        last_acked_seq: 0,
        last_interact_seq: 0,
        entities: capture_states(&game.world),
    });

    let iterations = 1000;
    let start = Instant::now();

    for _ in 0..iterations {
        for frame in [&snapshot, &state] {
            let bytes = encode_server_frame(frame).unwrap();
            let _ = decode_server_frame(&bytes[FRAME_HEADER_LEN..]).unwrap();
        }
    }

    let duration = start.elapsed();
    println!(
        "Frame serialization: {} snapshot+state roundtrips in {:?}",
        iterations, duration
    );

    assert!(duration.as_millis() < 3000);
}

/// Benchmarks delta collection with a busy journal
#[test]
fn benchmark_delta_collection() {
    let mut world = World::with_change_tracking();
    let player = spawn(&mut world, EntityKind::Player, Vec2::new(100.0, 100.0));
    let mut cursor = world.journal().unwrap().head();

    let iterations = 1000;
    let start = Instant::now();

    for i in 0..iterations {
        let item = spawn(&mut world, EntityKind::UncookedPatty, Vec2::new(100.0, 100.0));
        world.set_relation(Relation::HeldBy, item, player);
        if i % 2 == 0 {
            world.despawn(item);
        } else {
            world.clear_relation(Relation::HeldBy, item);
        }
        let _ = collect_delta(&world, &mut cursor);
        world.journal_mut().unwrap().trim(cursor);
    }

    let duration = start.elapsed();
    println!("Delta collection: {} deltas in {:?}", iterations, duration);

    assert!(duration.as_millis() < 2000);
    assert!(world.journal().unwrap().is_empty());
}

/// Benchmarks reconciliation with a full pending-input buffer
#[test]
fn benchmark_reconciliation_performance() {
    let game = busy_kitchen(0);
    let collider = KitchenCollider::from_world(&game.world);
    let mut predictor = Predictor::default();
    predictor.reset(Vec2::new(320.0, 240.0), Vec2::new(0.0, 1.0));

    let iterations = 100;
    let start = Instant::now();

    for i in 0..iterations {
        for step in 0..10u32 {
            let flags = InputFlags(1 << (step % 4));
            predictor.apply_local_input(&collider, flags, 16.0);
        }
        let acked = predictor.last_acked_seq() + 5;
        predictor.reconcile(&collider, Vec2::new(320.0, 240.0 + i as f32 % 3.0), Vec2::new(0.0, 1.0), acked);
    }

    let duration = start.elapsed();
    println!(
        "Reconciliation: {} reconciliations in {:?} ({:.2} ms/reconciliation)",
        iterations,
        duration,
        duration.as_millis() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}
