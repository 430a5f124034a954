//! Item components: devices, their connection panels and attach state.

use super::common::{ItemId, Vec2, NULL_ENTITY_ID};
use hecs::Entity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Item component - anything placed in a vessel that has a persistent id.
/// Devices and wires both carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

impl Item {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// The ports of a device, in definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPanel {
    /// Connection entities owned by this device
    pub connections: Vec<Entity>,
    /// Wires pulled out of this panel that still dangle from it
    pub disconnected_wires: Vec<Entity>,
}

impl ConnectionPanel {
    pub fn new(connections: Vec<Entity>) -> Self {
        Self {
            connections,
            disconnected_wires: Vec::new(),
        }
    }

    pub fn forget_wire(&mut self, wire: Entity) {
        self.disconnected_wires.retain(|&w| w != wire);
    }

    pub fn remember_wire(&mut self, wire: Entity) {
        if !self.disconnected_wires.contains(&wire) {
            self.disconnected_wires.push(wire);
        }
    }
}

/// Named numeric device state, written by status effects and behaviors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties(pub BTreeMap<String, f32>);

impl Properties {
    /// Value of a property, 0.0 when unset
    pub fn get(&self, name: &str) -> f32 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, name: &str, value: f32) {
        self.0.insert(name.to_string(), value);
    }

    pub fn add(&mut self, name: &str, amount: f32) {
        *self.0.entry(name.to_string()).or_insert(0.0) += amount;
    }
}

/// Attach state for a wire-bearing device that can be mounted on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Holdable {
    pub attachable: bool,
    pub attached: bool,
    /// Simulation-space position of the device body
    pub position: Vec2,
    /// Persistent id of the containing vessel, if any
    pub vessel: Option<u16>,
}

impl Holdable {
    pub fn attachable() -> Self {
        Self {
            attachable: true,
            attached: false,
            position: Vec2::ZERO,
            vessel: None,
        }
    }

    pub fn vessel_id(&self) -> u16 {
        self.vessel.unwrap_or(NULL_ENTITY_ID)
    }
}

/// Lookup from persistent ids to live entities.
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    by_id: HashMap<ItemId, Entity>,
    max_id: u16,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ItemId) -> Option<Entity> {
        self.by_id.get(&id).copied()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Register an entity. Returns false if the id is null or taken.
    pub fn insert(&mut self, id: ItemId, entity: Entity) -> bool {
        if id.is_null() || self.by_id.contains_key(&id) {
            return false;
        }
        self.by_id.insert(id, entity);
        self.max_id = self.max_id.max(id.0);
        true
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Entity> {
        self.by_id.remove(&id)
    }

    /// Highest id ever registered; loaded saves are offset past it
    pub fn max_id(&self) -> u16 {
        self.max_id
    }

    /// Next unused id above everything registered so far
    pub fn next_free_id(&self) -> Option<ItemId> {
        self.max_id.checked_add(1).map(ItemId)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.max_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecs::World;

    #[test]
    fn test_registry_rejects_null_and_duplicates() {
        let mut world = World::new();
        let a = world.spawn(());
        let b = world.spawn(());
        let mut registry = ItemRegistry::new();

        assert!(!registry.insert(ItemId::NULL, a));
        assert!(registry.insert(ItemId(4), a));
        assert!(!registry.insert(ItemId(4), b));
        assert_eq!(registry.get(ItemId(4)), Some(a));
        assert_eq!(registry.next_free_id(), Some(ItemId(5)));

        registry.remove(ItemId(4));
        assert!(registry.get(ItemId(4)).is_none());
        // Removed ids are never handed out again
        assert_eq!(registry.next_free_id(), Some(ItemId(5)));
    }

    #[test]
    fn test_panel_wire_bookkeeping() {
        let mut world = World::new();
        let wire = world.spawn(());
        let mut panel = ConnectionPanel::default();
        panel.remember_wire(wire);
        panel.remember_wire(wire);
        assert_eq!(panel.disconnected_wires.len(), 1);
        panel.forget_wire(wire);
        assert!(panel.disconnected_wires.is_empty());
    }
}
