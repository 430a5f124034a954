//! Wirenet Headless Simulation Harness
//!
//! Loads the demo network, drives signals through it, churns random wire
//! edits and checks the wiring invariants after every tick.
//! Runs entirely in-process: no networking, no rendering.
//!
//! Usage:
//!   cargo run -p wirenet-simtest
//!   cargo run -p wirenet-simtest -- --verbose --seed 7 --ticks 500
//!   cargo run -p wirenet-simtest -- --json

use std::collections::HashSet;

use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use wirenet_core::net::{AttachRequest, ClientInfo, ServerEvent};
use wirenet_core::persistence::network_from_json;
use wirenet_core::prelude::*;

// ── Demo network (same JSON the integration tests load) ─────────────────
const DEMO_JSON: &str = include_str!("../../../data/demo_network.json");

// ── Demo behaviors ──────────────────────────────────────────────────────

/// Flips between "1" and "0" every `period` seconds
#[derive(Default)]
struct Oscillator {
    elapsed: f32,
    on: bool,
}

impl ItemBehavior for Oscillator {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    fn receive_signal(&mut self, _ctx: &mut SignalContext<'_>, _signal: &Signal, _connection: Entity) {}

    fn update(&mut self, ctx: &mut SignalContext<'_>, delta: f32) {
        let period = ctx.property("period");
        let period = if period > 0.0 { period } else { 1.0 };
        self.elapsed += delta;
        while self.elapsed >= period {
            self.elapsed -= period;
            self.on = !self.on;
            let signal = ctx.signal(if self.on { "1" } else { "0" });
            ctx.send("signal_out", &signal);
            let toggles = ctx.property("toggles");
            ctx.set_property("toggles", toggles + 1.0);
        }
    }
}

/// Lights on a toggle signal, and tracks whether it sits on a grid
struct Lamp;

impl ItemBehavior for Lamp {
    fn name(&self) -> &'static str {
        "lamp"
    }

    fn receive_signal(&mut self, ctx: &mut SignalContext<'_>, signal: &Signal, connection: Entity) {
        if ctx.connection_name(connection).as_deref() == Some("toggle") {
            ctx.set_property("lit", if signal.is_off() { 0.0 } else { 1.0 });
        }
    }

    fn update(&mut self, ctx: &mut SignalContext<'_>, _delta: f32) {
        let powered = ctx.grid_of("power_in").is_some();
        ctx.set_property("powered", if powered { 1.0 } else { 0.0 });
    }
}

/// Forwards `signal_in` to `signal_out`
struct Relay;

impl ItemBehavior for Relay {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn receive_signal(&mut self, ctx: &mut SignalContext<'_>, signal: &Signal, _connection: Entity) {
        ctx.send("signal_out", signal);
    }
}

fn demo_engine() -> WiringEngine {
    let mut engine = WiringEngine::new();
    engine.register_behavior("oscillator", || Box::new(Oscillator::default()));
    engine.register_behavior("lamp", || Box::new(Lamp));
    engine.register_behavior("relay", || Box::new(Relay));
    engine
}

fn property(engine: &WiringEngine, id: u16, name: &str) -> f32 {
    engine
        .item(ItemId(id))
        .and_then(|item| engine.world.get::<&Properties>(item).ok().map(|p| p.get(name)))
        .unwrap_or(0.0)
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[derive(Serialize)]
struct Summary {
    seed: u64,
    ticks: u32,
    passed: usize,
    failed: usize,
    failures: Vec<String>,
}

fn arg_value(args: &[String], flag: &str) -> Option<u64> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

/// `--ticks`, falling back to 200 when missing or out of range
fn ticks_arg(args: &[String]) -> u32 {
    arg_value(args, "--ticks")
        .and_then(|t| u32::try_from(t).ok())
        .unwrap_or(200)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let json = args.iter().any(|a| a == "--json");
    let seed = arg_value(&args, "--seed").unwrap_or(42);
    let ticks = ticks_arg(&args);

    if !json {
        println!("=== Wirenet Simulation Harness ===\n");
    }

    let mut results = Vec::new();

    // 1. Demo network definition
    results.extend(validate_definition(verbose));

    // 2. Grid formation
    results.extend(validate_demo_grids(verbose));

    // 3. Signal propagation
    results.extend(validate_signals(verbose));

    // 4. Random wire churn
    results.extend(validate_churn(seed, ticks, verbose));

    // 5. Save / load
    results.extend(validate_persistence(seed, verbose));

    // 6. Attach requests
    results.extend(validate_attach(verbose));

    // ── Summary ──
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();
    log::info!("Harness finished: {} passed, {} failed", passed, failed);

    if json {
        let summary = Summary {
            seed,
            ticks,
            passed,
            failed,
            failures: results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| format!("{}: {}", r.name, r.detail))
                .collect(),
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("summary serialization failed: {}", e),
        }
    } else {
        println!();
        for r in &results {
            let icon = if r.passed { "✓" } else { "✗" };
            if !r.passed || verbose {
                println!("  {} {}: {}", icon, r.name, r.detail);
            }
        }
        println!(
            "\n=== RESULT: {}/{} passed, {} failed ===",
            passed, total, failed
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Definition ───────────────────────────────────────────────────────

fn validate_definition(verbose: bool) -> Vec<TestResult> {
    println!("--- Demo Network Definition ---");
    let mut results = Vec::new();

    let data = match network_from_json(DEMO_JSON) {
        Ok(d) => d,
        Err(e) => {
            results.push(TestResult {
                name: "definition_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            return results;
        }
    };

    let device_count = data.devices().count();
    let wire_count = data.wires().count();
    results.push(TestResult {
        name: "definition_not_empty".into(),
        passed: device_count > 0 && wire_count > 0,
        detail: format!("{} devices, {} wires", device_count, wire_count),
    });

    // Ids unique and non-null
    let mut seen = HashSet::new();
    let duplicates: Vec<u16> = data
        .items
        .iter()
        .map(|i| i.id())
        .filter(|&id| id == 0 || !seen.insert(id))
        .collect();
    results.push(TestResult {
        name: "definition_unique_ids".into(),
        passed: duplicates.is_empty(),
        detail: if duplicates.is_empty() {
            "all item ids unique".into()
        } else {
            format!("bad ids: {:?}", duplicates)
        },
    });

    // Every link names a wire, and every wire is used at most twice
    let wire_ids: HashSet<i32> = data.wires().map(|w| i32::from(w.id)).collect();
    let mut uses: std::collections::HashMap<i32, usize> = std::collections::HashMap::new();
    let mut dangling = Vec::new();
    for device in data.devices() {
        for conn in &device.connections {
            for link in &conn.links {
                if wire_ids.contains(&link.w) {
                    *uses.entry(link.w).or_default() += 1;
                } else {
                    dangling.push(format!("{}:{}", device.name, link.w));
                }
            }
        }
    }
    results.push(TestResult {
        name: "definition_links_resolve".into(),
        passed: dangling.is_empty(),
        detail: if dangling.is_empty() {
            "every link names a wire".into()
        } else {
            format!("unresolved links: {}", dangling.join(", "))
        },
    });
    let overused: Vec<_> = uses.iter().filter(|(_, n)| **n > 2).collect();
    results.push(TestResult {
        name: "definition_two_ends_per_wire".into(),
        passed: overused.is_empty(),
        detail: format!("{} wires referenced more than twice", overused.len()),
    });

    if verbose {
        for device in data.devices() {
            let names: Vec<&str> = device
                .connections
                .iter()
                .filter_map(|c| c.name.as_deref())
                .collect();
            println!("    #{:<3} {:14} {}", device.id, device.name, names.join(", "));
        }
    }

    results
}

// ── 2. Grids ────────────────────────────────────────────────────────────

fn validate_demo_grids(verbose: bool) -> Vec<TestResult> {
    println!("--- Grid Formation ---");
    let mut results = Vec::new();

    let mut engine = demo_engine();
    if let Err(e) = engine.load_json(DEMO_JSON) {
        results.push(TestResult {
            name: "grid_load".into(),
            passed: false,
            detail: format!("load failed: {}", e),
        });
        return results;
    }
    engine.update(0.0);

    let sizes: Vec<usize> = engine.grids.grids().map(|g| g.len()).collect();
    results.push(TestResult {
        name: "grid_single_power_network".into(),
        passed: sizes == vec![4],
        detail: format!("grid sizes {:?}", sizes),
    });

    let errors = engine.validate();
    results.push(TestResult {
        name: "grid_invariants".into(),
        passed: errors.is_empty(),
        detail: format!("{} invariant violations", errors.len()),
    });

    // Pulling the battery wire leaves junction, lamp and pump together
    let battery = engine.connection(ItemId(1), "power_out");
    let wire = engine.item(ItemId(10));
    if let (Some(battery), Some(wire)) = (battery, wire) {
        engine.disconnect(battery, wire);
        engine.update(0.0);
    }
    let sizes: Vec<usize> = engine.grids.grids().map(|g| g.len()).collect();
    results.push(TestResult {
        name: "grid_leaf_removal".into(),
        passed: sizes == vec![3] && engine.validate().is_empty(),
        detail: format!("grid sizes after cut {:?}", sizes),
    });

    if verbose {
        for grid in engine.grids.grids() {
            println!("    {}: {} connections", grid.id(), grid.len());
        }
    }

    results
}

// ── 3. Signals ──────────────────────────────────────────────────────────

fn validate_signals(verbose: bool) -> Vec<TestResult> {
    println!("--- Signal Propagation ---");
    let mut results = Vec::new();

    let mut engine = demo_engine();
    if engine.load_json(DEMO_JSON).is_err() {
        results.push(TestResult {
            name: "signal_load".into(),
            passed: false,
            detail: "demo network failed to load".into(),
        });
        return results;
    }

    // Oscillator period is 1s: ten half-second ticks give five toggles,
    // three of them "on"
    for _ in 0..10 {
        engine.update(0.5);
    }

    let toggles = property(&engine, 5, "toggles");
    results.push(TestResult {
        name: "signal_oscillator_ran".into(),
        passed: toggles == 5.0,
        detail: format!("{} toggles", toggles),
    });

    let lit = property(&engine, 3, "lit");
    let powered = property(&engine, 3, "powered");
    results.push(TestResult {
        name: "signal_lamp_state".into(),
        passed: lit == 1.0 && powered == 1.0,
        detail: format!("lit={} powered={}", lit, powered),
    });

    let heat = property(&engine, 3, "heat");
    results.push(TestResult {
        name: "signal_effects_skip_off".into(),
        passed: heat == 1.5,
        detail: format!("lamp heat {} after three on-signals", heat),
    });

    let alarms = property(&engine, 7, "alarms");
    results.push(TestResult {
        name: "signal_relay_chain".into(),
        passed: alarms == 3.0,
        detail: format!("alarm fired {} times through the relay", alarms),
    });

    if verbose {
        println!(
            "    t={:.1}s toggles={} lit={} heat={} alarms={}",
            engine.sim_time, toggles, lit, heat, alarms
        );
    }

    results
}

// ── 4. Churn ────────────────────────────────────────────────────────────

const CHURN_NAMES: [&str; 4] = ["power_in", "power", "power_out", "signal_in"];

struct Churn {
    engine: WiringEngine,
    rng: StdRng,
    devices: Vec<(ItemId, &'static str)>,
    wires: Vec<Entity>,
}

impl Churn {
    fn new(seed: u64, device_count: u16) -> Self {
        let mut churn = Self {
            engine: WiringEngine::with_config(WiringConfig {
                default_max_wires: 3,
                ..WiringConfig::default()
            }),
            rng: StdRng::seed_from_u64(seed),
            devices: Vec::new(),
            wires: Vec::new(),
        };
        for _ in 0..device_count {
            churn.spawn_device();
        }
        churn
    }

    fn spawn_device(&mut self) {
        let Some(id) = self.engine.next_item_id() else {
            return;
        };
        let name = CHURN_NAMES[self.rng.gen_range(0..CHURN_NAMES.len())];
        let def = DeviceDef::new(id.0, "node").with_connection(ConnectionDef::input(name));
        if self.engine.spawn_device(&def).is_some() {
            self.devices.push((id, name));
        }
    }

    fn random_connection(&mut self) -> Option<Entity> {
        if self.devices.is_empty() {
            return None;
        }
        let (id, name) = self.devices[self.rng.gen_range(0..self.devices.len())];
        self.engine.connection(id, name)
    }

    fn step(&mut self) {
        let roll = self.rng.gen_range(0..100);
        match roll {
            // New wire between two connections, applied immediately
            0..=39 => {
                let (Some(a), Some(b)) = (self.random_connection(), self.random_connection()) else {
                    return;
                };
                let Some(id) = self.engine.next_item_id() else {
                    return;
                };
                if let Some(wire) = self.engine.spawn_wire(id) {
                    self.engine.connect(a, wire);
                    if a != b {
                        self.engine.connect(b, wire);
                    }
                    self.wires.push(wire);
                }
            }
            // Detach one end of a wire at the next tick
            40..=64 => {
                if self.wires.is_empty() {
                    return;
                }
                let wire = self.wires[self.rng.gen_range(0..self.wires.len())];
                let ends = match self.engine.world.get::<&Wire>(wire) {
                    Ok(w) => w.connections(),
                    Err(_) => return,
                };
                if let Some(connection) = ends[self.rng.gen_range(0..2)] {
                    self.engine.queue(WireCommand::Disconnect { connection, wire });
                }
            }
            // Plug a wire into another connection at the next tick
            65..=79 => {
                if self.wires.is_empty() {
                    return;
                }
                let wire = self.wires[self.rng.gen_range(0..self.wires.len())];
                if let Some(connection) = self.random_connection() {
                    self.engine.queue(WireCommand::Connect { connection, wire });
                }
            }
            // Destroy a wire
            80..=94 => {
                if self.wires.is_empty() {
                    return;
                }
                let wire = self.wires.swap_remove(self.rng.gen_range(0..self.wires.len()));
                self.engine.queue(WireCommand::RemoveWire(wire));
            }
            // Replace a device
            _ => {
                if self.devices.is_empty() {
                    return;
                }
                let (id, _) = self.devices.swap_remove(self.rng.gen_range(0..self.devices.len()));
                if let Some(item) = self.engine.item(id) {
                    self.engine.queue(WireCommand::RemoveItem(item));
                }
                self.spawn_device();
            }
        }
    }
}

fn validate_churn(seed: u64, ticks: u32, verbose: bool) -> Vec<TestResult> {
    println!("--- Wire Churn (seed {}, {} ticks) ---", seed, ticks);
    let mut results = Vec::new();

    let mut churn = Churn::new(seed, 32);
    let mut violations = 0usize;
    let mut first_violation = None;
    let mut max_grids = 0usize;

    for tick in 0..ticks {
        for _ in 0..8 {
            churn.step();
        }
        churn.engine.update(0.1);

        let errors = churn.engine.validate();
        if !errors.is_empty() && first_violation.is_none() {
            first_violation = Some(format!("tick {}: [{}] {}", tick, errors[0].category, errors[0].message));
        }
        violations += errors.len();
        max_grids = max_grids.max(churn.engine.grids.len());

        if verbose && tick % 50 == 0 {
            println!(
                "    tick {:4}: {} wires, {} grids",
                tick,
                churn.engine.wire_count(),
                churn.engine.grids.len()
            );
        }
    }

    results.push(TestResult {
        name: "churn_invariants".into(),
        passed: violations == 0,
        detail: first_violation.unwrap_or_else(|| format!("{} ticks clean", ticks)),
    });
    results.push(TestResult {
        name: "churn_formed_grids".into(),
        passed: max_grids > 0,
        detail: format!("up to {} grids live at once", max_grids),
    });

    results
}

// ── 5. Persistence ──────────────────────────────────────────────────────

/// (device id, connection name) pairs joined by a two-ended wire
fn adjacency(engine: &WiringEngine) -> Vec<((u16, String), (u16, String))> {
    let key = |c: Entity| -> Option<(u16, String)> {
        let conn = engine.world.get::<&Connection>(c).ok()?;
        let id = engine.world.get::<&Item>(conn.item).ok()?.id;
        Some((id.0, conn.name.clone()))
    };
    let mut pairs: Vec<_> = engine
        .world
        .query::<&Wire>()
        .iter()
        .filter_map(|(_, wire)| match wire.connections() {
            [Some(a), Some(b)] => {
                let (a, b) = (key(a)?, key(b)?);
                Some(if a <= b { (a, b) } else { (b, a) })
            }
            _ => None,
        })
        .collect();
    pairs.sort();
    pairs
}

fn validate_persistence(seed: u64, _verbose: bool) -> Vec<TestResult> {
    println!("--- Save / Load ---");
    let mut results = Vec::new();

    let mut churn = Churn::new(seed.wrapping_add(1), 16);
    for _ in 0..40 {
        churn.step();
        churn.engine.update(0.1);
    }

    let mut buffer = Vec::new();
    if let Err(e) = churn.engine.save(&mut buffer) {
        results.push(TestResult {
            name: "persist_save".into(),
            passed: false,
            detail: format!("save failed: {}", e),
        });
        return results;
    }

    let mut reloaded = WiringEngine::with_config(churn.engine.config.clone());
    let loaded = reloaded.load(buffer.as_slice());
    reloaded.update(0.1);

    results.push(TestResult {
        name: "persist_adjacency".into(),
        passed: loaded.is_ok() && adjacency(&reloaded) == adjacency(&churn.engine),
        detail: format!(
            "{} bytes, {} links",
            buffer.len(),
            adjacency(&churn.engine).len()
        ),
    });
    results.push(TestResult {
        name: "persist_grids".into(),
        passed: reloaded.grids.len() == churn.engine.grids.len() && reloaded.validate().is_empty(),
        detail: format!(
            "{} grids before, {} after",
            churn.engine.grids.len(),
            reloaded.grids.len()
        ),
    });

    results
}

// ── 6. Attach ───────────────────────────────────────────────────────────

fn validate_attach(_verbose: bool) -> Vec<TestResult> {
    println!("--- Attach Requests ---");
    let mut results = Vec::new();

    let mut engine = demo_engine();
    if engine.load_json(DEMO_JSON).is_err() {
        results.push(TestResult {
            name: "attach_load".into(),
            passed: false,
            detail: "demo network failed to load".into(),
        });
        return results;
    }

    let client = ClientInfo {
        id: 1,
        character_position: Some(Vec2::new(2.0, 0.0)),
        can_access: true,
    };
    let junction_box = ItemId(2);

    let nan = AttachRequest {
        sim_x: f32::NAN,
        sim_y: 0.0,
    };
    results.push(TestResult {
        name: "attach_rejects_nan".into(),
        passed: engine.handle_attach_request(junction_box, &client, &nan).is_none(),
        detail: "non-finite position ignored".into(),
    });

    let far = AttachRequest {
        sim_x: 50.0,
        sim_y: 0.0,
    };
    let events = engine.handle_attach_request(junction_box, &client, &far);
    let position = match events.as_deref() {
        Some([ServerEvent::ItemState(state), ServerEvent::InventoryChanged { .. }]) => {
            state.attach.map(|a| Vec2::new(a.sim_x, a.sim_y))
        }
        _ => None,
    };
    let reach = engine.config.max_attach_distance * 1.5;
    results.push(TestResult {
        name: "attach_clamped".into(),
        passed: position
            .map(|p| (p.distance(&Vec2::new(2.0, 0.0)) - reach).abs() < 1e-3)
            .unwrap_or(false),
        detail: format!("attached at {:?}", position),
    });

    results.push(TestResult {
        name: "attach_once".into(),
        passed: engine.handle_attach_request(junction_box, &client, &far).is_none(),
        detail: "second attach ignored".into(),
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ticks_arg_rejects_out_of_range() {
        assert_eq!(ticks_arg(&args(&["simtest"])), 200);
        assert_eq!(ticks_arg(&args(&["simtest", "--ticks", "500"])), 500);
        assert_eq!(ticks_arg(&args(&["simtest", "--ticks", "4294967296"])), 200);
        assert_eq!(ticks_arg(&args(&["simtest", "--ticks", "many"])), 200);
    }
}
