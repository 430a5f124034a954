//! Component definitions for the ECS simulation.
//!
//! Components are pure data structs attached to entities.
//! They have no behavior - that lives in systems.

mod common;
mod connection;
mod item;
mod signal;
mod wire;

pub use common::*;
pub use connection::*;
pub use item::*;
pub use signal::*;
pub use wire::*;
