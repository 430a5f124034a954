//! Connection component - a named input or output port on a device.

use super::common::{GridId, IdRemap, ItemId};
use super::signal::StatusEffect;
use hecs::Entity;
use serde::{Deserialize, Serialize};

/// How many wires can be linked to a connection when the definition does
/// not say otherwise.
pub const DEFAULT_MAX_WIRES: usize = 5;

/// Connection names that take part in power grids.
pub const POWER_CONNECTION_NAMES: [&str; 3] = ["power_in", "power", "power_out"];

pub fn is_power_connection_name(name: &str) -> bool {
    POWER_CONNECTION_NAMES.contains(&name)
}

/// Whether a connection is declared as an input or an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionElement {
    Input,
    Output,
}

impl ConnectionElement {
    pub fn default_name(self) -> &'static str {
        match self {
            ConnectionElement::Input => "input",
            ConnectionElement::Output => "output",
        }
    }
}

/// Persisted reference to a wire item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLink {
    pub w: i32,
}

/// Definition of a connection as it appears in device definitions and
/// save files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDef {
    pub element: ConnectionElement,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub max_wires: Option<usize>,
    #[serde(default)]
    pub max_player_connectable_wires: Option<usize>,
    #[serde(default)]
    pub links: Vec<WireLink>,
    #[serde(default)]
    pub effects: Vec<StatusEffect>,
}

impl ConnectionDef {
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(ConnectionElement::Input, name)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::new(ConnectionElement::Output, name)
    }

    fn new(element: ConnectionElement, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            element,
            display_name: Some(name.clone()),
            name: Some(name),
            max_wires: None,
            max_player_connectable_wires: None,
            links: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn with_max_wires(mut self, max_wires: usize) -> Self {
        self.max_wires = Some(max_wires);
        self
    }

    pub fn with_player_limit(mut self, max_player_connectable_wires: usize) -> Self {
        self.max_player_connectable_wires = Some(max_player_connectable_wires);
        self
    }

    pub fn with_effect(mut self, effect: StatusEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_link(mut self, wire_id: i32) -> Self {
        self.links.push(WireLink { w: wire_id });
        self
    }
}

/// Connection component.
///
/// Lives on its own entity; `item` points back at the owning device.
#[derive(Debug, Clone)]
pub struct Connection {
    pub name: String,
    pub display_name: String,
    pub is_output: bool,
    /// Derived from the name, see [`POWER_CONNECTION_NAMES`]
    pub is_power: bool,
    pub item: Entity,
    /// Hard bound on simultaneous wires
    pub max_wires: usize,
    /// Bound enforced only for player attach requests
    pub max_player_connectable_wires: usize,
    /// Attached wires in insertion order
    pub wires: Vec<Entity>,
    pub grid: Option<GridId>,
    pub effects: Vec<StatusEffect>,
    /// Persisted wire ids waiting for deferred resolution
    pub loaded_wire_ids: Vec<ItemId>,
    pub(crate) recipients: Vec<Entity>,
    pub(crate) recipients_dirty: bool,
}

impl Connection {
    /// Build a connection for `item` from its definition.
    ///
    /// `max_wires` is raised to the number of persisted links so that a save
    /// never loses wires, and at most `max_wires` link ids are kept.
    pub fn from_def(
        def: &ConnectionDef,
        item: Entity,
        item_name: &str,
        default_max_wires: usize,
        remap: &IdRemap,
    ) -> Self {
        let is_output = def.element == ConnectionElement::Output;
        let name = def
            .name
            .clone()
            .unwrap_or_else(|| def.element.default_name().to_string());

        let max_wires = def
            .max_wires
            .unwrap_or(default_max_wires)
            .max(def.links.len());
        let max_player_connectable_wires = def
            .max_player_connectable_wires
            .unwrap_or(max_wires)
            .min(max_wires);

        let display_name = match def.display_name.as_deref() {
            Some(display) if !display.is_empty() => display.to_string(),
            _ => {
                if cfg!(debug_assertions) {
                    log::warn!("Missing display name in connection {}: {}", item_name, name);
                }
                name.clone()
            }
        };

        let loaded_wire_ids = def
            .links
            .iter()
            .take(max_wires)
            .map(|link| remap.offset_id(link.w))
            .collect();

        Self {
            is_power: is_power_connection_name(&name),
            name,
            display_name,
            is_output,
            item,
            max_wires,
            max_player_connectable_wires,
            wires: Vec::new(),
            grid: None,
            effects: def.effects.clone(),
            loaded_wire_ids,
            recipients: Vec::new(),
            recipients_dirty: true,
        }
    }

    pub fn element(&self) -> ConnectionElement {
        if self.is_output {
            ConnectionElement::Output
        } else {
            ConnectionElement::Input
        }
    }

    pub fn wire_slots_available(&self) -> bool {
        self.wires.len() < self.max_wires
    }

    pub fn player_slots_available(&self) -> bool {
        self.wires.len() < self.max_player_connectable_wires
    }

    pub fn has_wire(&self, wire: Entity) -> bool {
        self.wires.contains(&wire)
    }

    /// Add a wire if there is room for it and it is not attached yet.
    ///
    /// This is the only place wires enter `wires`.
    pub fn try_add_link(&mut self, wire: Entity) -> bool {
        if self.has_wire(wire) || !self.wire_slots_available() {
            return false;
        }
        self.wires.push(wire);
        self.recipients_dirty = true;
        true
    }

    /// Remove a wire, returning whether it was attached
    pub fn unlink(&mut self, wire: Entity) -> bool {
        let before = self.wires.len();
        self.wires.retain(|&w| w != wire);
        self.recipients_dirty = true;
        self.wires.len() != before
    }

    pub fn is_recipients_dirty(&self) -> bool {
        self.recipients_dirty
    }

    pub fn mark_recipients_dirty(&mut self) {
        self.recipients_dirty = true;
    }
}
