//! Integration tests for the wiring engine.
//!
//! Exercises: definitions → spawn → deferred linking → grid resolution
//! → signal routing → save/load.

use std::collections::BTreeSet;

use hecs::Entity;
use wirenet_core::net::{AttachRequest, ClientInfo, ServerEvent};
use wirenet_core::prelude::*;

const DEMO_JSON: &str = include_str!("../../../data/demo_network.json");

// ── Helpers ────────────────────────────────────────────────────────────

/// Counts deliveries into the `received` property
struct Counter;

impl ItemBehavior for Counter {
    fn name(&self) -> &'static str {
        "counter"
    }

    fn receive_signal(&mut self, ctx: &mut SignalContext<'_>, _signal: &Signal, _connection: Entity) {
        let received = ctx.property("received");
        ctx.set_property("received", received + 1.0);
    }
}

/// Resends whatever arrives on `signal_in` out of `signal_out`
struct Relay;

impl ItemBehavior for Relay {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn receive_signal(&mut self, ctx: &mut SignalContext<'_>, signal: &Signal, _connection: Entity) {
        ctx.send("signal_out", signal);
    }
}

struct Idle;

impl ItemBehavior for Idle {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn receive_signal(&mut self, _ctx: &mut SignalContext<'_>, _signal: &Signal, _connection: Entity) {}
}

fn engine() -> WiringEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = WiringEngine::new();
    engine.register_behavior("counter", || Box::new(Counter));
    engine.register_behavior("relay", || Box::new(Relay));
    engine.register_behavior("lamp", || Box::new(Idle));
    engine.register_behavior("oscillator", || Box::new(Idle));
    engine
}

fn power_device(engine: &mut WiringEngine, id: u16) -> Entity {
    engine
        .spawn_device(&DeviceDef::new(id, "junction").with_connection(ConnectionDef::input("power")))
        .unwrap();
    engine.connection(ItemId(id), "power").unwrap()
}

fn signal_device(engine: &mut WiringEngine, id: u16) -> Entity {
    engine
        .spawn_device(
            &DeviceDef::new(id, "node")
                .with_connection(ConnectionDef::output("signal"))
                .with_behavior("counter"),
        )
        .unwrap();
    engine.connection(ItemId(id), "signal").unwrap()
}

/// Wire two connections with a fresh wire
fn link(engine: &mut WiringEngine, a: Entity, b: Entity) -> Entity {
    let id = engine.next_item_id().unwrap();
    let wire = engine.spawn_wire(id).unwrap();
    assert!(engine.connect(a, wire));
    assert!(engine.connect(b, wire));
    wire
}

fn received(engine: &WiringEngine, id: u16) -> f32 {
    let item = engine.item(ItemId(id)).unwrap();
    engine.world.get::<&Properties>(item).unwrap().get("received")
}

/// Wire-to-connection adjacency as (device id, connection name) pairs,
/// independent of wire identity
fn adjacency(engine: &WiringEngine) -> BTreeSet<((u16, String), (u16, String))> {
    let key = |c: Entity| {
        let conn = engine.world.get::<&Connection>(c).unwrap();
        let item = engine.world.get::<&Item>(conn.item).unwrap();
        (item.id.0, conn.name.clone())
    };
    engine
        .world
        .query::<&Wire>()
        .iter()
        .filter_map(|(_, wire)| match wire.connections() {
            [Some(a), Some(b)] => {
                let (a, b) = (key(a), key(b));
                Some(if a <= b { (a, b) } else { (b, a) })
            }
            _ => None,
        })
        .collect()
}

fn assert_valid(engine: &WiringEngine) {
    let errors = engine.validate();
    assert!(
        errors.is_empty(),
        "invariants broken: {:?}",
        errors.iter().map(|e| &e.message).collect::<Vec<_>>()
    );
}

// ── Capacity ───────────────────────────────────────────────────────────

#[test]
fn capacity_holds_under_repeated_connects() {
    let mut engine = engine();
    engine
        .spawn_device(
            &DeviceDef::new(1, "hub").with_connection(ConnectionDef::output("signal_out").with_max_wires(4)),
        )
        .unwrap();
    let hub = engine.connection(ItemId(1), "signal_out").unwrap();

    for round in 0..3 {
        let mut wires = Vec::new();
        for _ in 0..10 {
            let id = engine.next_item_id().unwrap();
            let wire = engine.spawn_wire(id).unwrap();
            engine.connect(hub, wire);
            wires.push(wire);
            let conn = engine.world.get::<&Connection>(hub).unwrap();
            assert!(conn.wires.len() <= conn.max_wires);
        }
        // Free a slot on every other round
        if round % 2 == 0 {
            engine.disconnect(hub, wires[0]);
        }
    }
    assert_valid(&engine);
}

// ── Grids ──────────────────────────────────────────────────────────────

#[test]
fn merge_keeps_lowest_grid_id() {
    let mut engine = engine();
    let a = power_device(&mut engine, 1);
    let b = power_device(&mut engine, 2);
    let c = power_device(&mut engine, 3);
    let d = power_device(&mut engine, 4);
    link(&mut engine, a, b);
    engine.resolve_grids();
    link(&mut engine, c, d);
    engine.resolve_grids();

    let first = engine.grid_of(a).unwrap();
    let second = engine.grid_of(c).unwrap();
    assert_ne!(first, second);

    link(&mut engine, b, c);
    engine.resolve_grids();
    assert_eq!(engine.grids.len(), 1);
    for conn in [a, b, c, d] {
        assert_eq!(engine.grid_of(conn), Some(first.min(second)));
    }
    assert_valid(&engine);
}

#[test]
fn removing_end_wire_splits_grid() {
    let mut engine = engine();
    let a = power_device(&mut engine, 1);
    let b = power_device(&mut engine, 2);
    let c = power_device(&mut engine, 3);
    link(&mut engine, a, b);
    let bc = link(&mut engine, b, c);
    engine.resolve_grids();
    assert_eq!(engine.grid_of(a), engine.grid_of(c));

    engine.disconnect(c, bc);
    engine.resolve_grids();
    let grid = engine.grid_of(a).unwrap();
    assert_eq!(engine.grid_of(b), Some(grid));
    assert_eq!(engine.grid_of(c), None);
    assert_eq!(engine.grids.grid(grid).unwrap().len(), 2);
    assert_valid(&engine);
}

#[test]
fn partition_holds_after_churn() {
    let mut engine = engine();
    let conns: Vec<Entity> = (1..=8).map(|id| power_device(&mut engine, id)).collect();
    let mut wires = Vec::new();

    // Ring, then chords, then cut every third wire
    for i in 0..conns.len() {
        wires.push(link(&mut engine, conns[i], conns[(i + 1) % conns.len()]));
    }
    engine.update(0.1);
    assert_valid(&engine);
    assert_eq!(engine.grids.len(), 1);

    for i in 0..4 {
        wires.push(link(&mut engine, conns[i], conns[i + 4]));
    }
    engine.update(0.1);
    assert_valid(&engine);

    for (i, &wire) in wires.iter().enumerate() {
        if i % 3 == 0 {
            engine.queue(WireCommand::RemoveWire(wire));
        }
    }
    engine.update(0.1);
    assert_valid(&engine);

    engine.queue(WireCommand::RemoveItem(engine.item(ItemId(1)).unwrap()));
    engine.update(0.1);
    assert_valid(&engine);
}

// ── Signals ────────────────────────────────────────────────────────────

#[test]
fn three_cycle_delivers_once_per_peer() {
    let mut engine = engine();
    let a = signal_device(&mut engine, 1);
    let b = signal_device(&mut engine, 2);
    let c = signal_device(&mut engine, 3);
    link(&mut engine, a, b);
    link(&mut engine, b, c);
    link(&mut engine, c, a);

    let source = engine.item(ItemId(1)).unwrap();
    engine.send_signal(a, &Signal::new("1").with_source(source));
    assert_eq!(received(&engine, 1), 0.0);
    assert_eq!(received(&engine, 2), 1.0);
    assert_eq!(received(&engine, 3), 1.0);
}

#[test]
fn relay_chain_reaches_the_end() {
    let mut engine = engine();
    engine
        .spawn_device(&DeviceDef::new(1, "switch").with_connection(ConnectionDef::output("signal_out")))
        .unwrap();
    engine
        .spawn_device(
            &DeviceDef::new(2, "relay")
                .with_connection(ConnectionDef::input("signal_in"))
                .with_connection(ConnectionDef::output("signal_out"))
                .with_behavior("relay"),
        )
        .unwrap();
    engine
        .spawn_device(
            &DeviceDef::new(3, "alarm")
                .with_connection(
                    ConnectionDef::input("signal_in").with_effect(StatusEffect::set("armed", 1.0)),
                )
                .with_behavior("counter"),
        )
        .unwrap();
    let out = engine.connection(ItemId(1), "signal_out").unwrap();
    let relay_in = engine.connection(ItemId(2), "signal_in").unwrap();
    let relay_out = engine.connection(ItemId(2), "signal_out").unwrap();
    let alarm_in = engine.connection(ItemId(3), "signal_in").unwrap();
    link(&mut engine, out, relay_in);
    link(&mut engine, relay_out, alarm_in);

    let source = engine.item(ItemId(1)).unwrap();
    engine.send_signal(out, &Signal::new("1").with_source(source));
    assert_eq!(received(&engine, 3), 1.0);
    let alarm = engine.item(ItemId(3)).unwrap();
    assert_eq!(engine.world.get::<&Properties>(alarm).unwrap().get("armed"), 1.0);

    // The off value still reaches behaviors but fires no effects
    engine.world.get::<&mut Properties>(alarm).unwrap().set("armed", 0.0);
    engine.update(0.1);
    engine.send_signal(out, &Signal::new("0").with_source(source));
    assert_eq!(received(&engine, 3), 2.0);
    assert_eq!(engine.world.get::<&Properties>(alarm).unwrap().get("armed"), 0.0);
}

// ── Persistence ────────────────────────────────────────────────────────

#[test]
fn demo_network_loads_into_one_grid() {
    let mut engine = engine();
    let spawned = engine.load_json(DEMO_JSON).unwrap();
    assert_eq!(spawned.len(), 13);
    engine.update(0.1);

    assert_eq!(engine.grids.len(), 1);
    let grid = engine.grids.grids().next().unwrap();
    assert_eq!(grid.len(), 4);
    assert_valid(&engine);

    let toggle = engine.connection(ItemId(3), "toggle").unwrap();
    assert_eq!(engine.grid_of(toggle), None);
}

#[test]
fn save_and_reload_reproduces_adjacency() {
    let mut engine = engine();
    engine.load_json(DEMO_JSON).unwrap();
    // Cut one link and add another so the save differs from the definition
    let pump = engine.connection(ItemId(4), "power_in").unwrap();
    let wire = engine.item(ItemId(12)).unwrap();
    engine.disconnect(pump, wire);
    let alarm = engine.connection(ItemId(7), "signal_in").unwrap();
    let relay_in = engine.connection(ItemId(6), "signal_in").unwrap();
    link(&mut engine, alarm, relay_in);
    engine.update(0.1);

    let mut buffer = Vec::new();
    engine.save(&mut buffer).unwrap();

    let mut reloaded = self::engine();
    reloaded.load(buffer.as_slice()).unwrap();
    reloaded.update(0.1);

    assert_eq!(adjacency(&reloaded), adjacency(&engine));
    assert_eq!(reloaded.grids.len(), engine.grids.len());
    assert_valid(&reloaded);
}

#[test]
fn loading_twice_keeps_copies_apart() {
    let mut engine = engine();
    engine.load_json(DEMO_JSON).unwrap();
    let before = adjacency(&engine).len();
    engine.load_json(DEMO_JSON).unwrap();
    engine.update(0.1);

    assert_eq!(engine.device_count(), 14);
    assert_eq!(adjacency(&engine).len(), before * 2);
    assert_eq!(engine.grids.len(), 2);
    assert_valid(&engine);
}

#[test]
fn truncated_save_is_rejected() {
    let engine = engine();
    let mut buffer = Vec::new();
    engine.save(&mut buffer).unwrap();
    buffer.pop();
    let mut other = self::engine();
    assert!(other.load(buffer.as_slice()).is_err());
}

// ── Network ────────────────────────────────────────────────────────────

#[test]
fn junction_box_attach_round_trip() {
    let mut engine = engine();
    engine.load_json(DEMO_JSON).unwrap();
    let client = ClientInfo {
        id: 4,
        character_position: Some(Vec2::new(0.0, 0.0)),
        can_access: true,
    };

    let events = engine
        .handle_attach_request(ItemId(2), &client, &AttachRequest { sim_x: 0.5, sim_y: 0.5 })
        .unwrap();
    assert!(matches!(events[0], ServerEvent::ItemState(ref s) if s.has_attach_data()));
    assert!(matches!(events[1], ServerEvent::InventoryChanged { client: 4 }));

    // Lamp is not holdable
    assert!(engine
        .handle_attach_request(ItemId(3), &client, &AttachRequest { sim_x: 0.5, sim_y: 0.5 })
        .is_none());
}
