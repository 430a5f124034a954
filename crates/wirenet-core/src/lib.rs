//! Wirenet Core - Shipboard Wiring Engine
//!
//! Devices aboard a vessel expose named connections (ports) that are linked
//! by wires. Power connections that are transitively wired together form
//! grids, which are kept up to date incrementally as wires are added and
//! removed. Devices exchange string signals along wires.
//!
//! # Architecture
//!
//! The engine uses an Entity Component System (ECS) architecture via `hecs`:
//! - **Entities**: Devices, connections, wires
//! - **Components**: Pure data attached to entities (Item, Connection, Wire, etc.)
//! - **Systems**: Logic that queries and updates components (linking, grids, signals)
//!
//! Grid recomputation is deferred: wire edits mark connections changed and
//! [`GridCoordinator::resolve_changes`](systems::GridCoordinator::resolve_changes)
//! processes the worklist once per tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use wirenet_core::prelude::*;
//!
//! let mut engine = WiringEngine::new();
//! engine.load_json(include_str!("../../../data/demo_network.json")).unwrap();
//!
//! loop {
//!     engine.update(1.0 / 60.0); // 60 FPS
//! }
//! ```

pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod persistence;
pub mod systems;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::WiringConfig;
    pub use crate::engine::{WireCommand, WiringEngine};
    pub use crate::error::WiringError;
    pub use crate::persistence::{DeviceDef, SaveData, SavedItem, WireDef};
    pub use crate::systems::{BehaviorRegistry, ItemBehavior, SignalContext};
}
