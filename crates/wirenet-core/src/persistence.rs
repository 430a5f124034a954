//! Save/Load functionality for wiring networks
//!
//! A network is saved as a flat list of item definitions: devices with their
//! connections (each carrying the ids of its attached wires) and the wires
//! themselves. Binary saves use bincode; hand-written definitions use JSON.
//! Spawning a loaded network back into a world is done by
//! [`WiringEngine::load_data`](crate::engine::WiringEngine::load_data).

use hecs::World;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::components::*;
use crate::error::{Result, WiringError};
use crate::systems::Behaviors;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

/// Serializable snapshot of a wiring network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Devices and wires in ascending id order
    pub items: Vec<SavedItem>,
}

impl Default for SaveData {
    fn default() -> Self {
        Self {
            version: SAVE_VERSION,
            items: Vec::new(),
        }
    }
}

impl SaveData {
    pub fn devices(&self) -> impl Iterator<Item = &DeviceDef> {
        self.items.iter().filter_map(|item| match item {
            SavedItem::Device(def) => Some(def),
            SavedItem::Wire(_) => None,
        })
    }

    pub fn wires(&self) -> impl Iterator<Item = &WireDef> {
        self.items.iter().filter_map(|item| match item {
            SavedItem::Wire(def) => Some(def),
            SavedItem::Device(_) => None,
        })
    }

    /// Highest id used by any item
    pub fn max_id(&self) -> u16 {
        self.items.iter().map(SavedItem::id).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedItem {
    Device(DeviceDef),
    Wire(WireDef),
}

impl SavedItem {
    pub fn id(&self) -> u16 {
        match self {
            SavedItem::Device(def) => def.id,
            SavedItem::Wire(def) => def.id,
        }
    }
}

/// A device and its connection panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDef {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    /// Registered behavior names
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub holdable: Option<Holdable>,
}

impl DeviceDef {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            connections: Vec::new(),
            behaviors: Vec::new(),
            properties: Properties::default(),
            holdable: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionDef) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn with_behavior(mut self, name: impl Into<String>) -> Self {
        self.behaviors.push(name.into());
        self
    }

    pub fn with_holdable(mut self, holdable: Holdable) -> Self {
        self.holdable = Some(holdable);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDef {
    pub id: u16,
    #[serde(default = "default_wire_name")]
    pub name: String,
}

fn default_wire_name() -> String {
    "wire".to_string()
}

impl WireDef {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            name: default_wire_name(),
        }
    }
}

/// Persisted form of one connection: its definition plus the ids of its
/// attached wires in ascending order. Wires without an item id are not
/// persisted.
fn connection_def(world: &World, conn: &Connection) -> ConnectionDef {
    let mut wire_ids: Vec<ItemId> = conn
        .wires
        .iter()
        .filter_map(|&w| world.get::<&Item>(w).ok().map(|item| item.id))
        .collect();
    wire_ids.sort();

    ConnectionDef {
        element: conn.element(),
        name: Some(conn.name.clone()),
        display_name: Some(conn.display_name.clone()),
        max_wires: Some(conn.max_wires),
        max_player_connectable_wires: Some(conn.max_player_connectable_wires),
        links: wire_ids
            .into_iter()
            .map(|id| WireLink { w: i32::from(id.0) })
            .collect(),
        effects: conn.effects.clone(),
    }
}

/// Extract every device and wire from a world into serializable form
pub fn snapshot(world: &World) -> SaveData {
    let mut items = Vec::new();

    for (_, (item, panel, behaviors, properties, holdable)) in world
        .query::<(
            &Item,
            &ConnectionPanel,
            Option<&Behaviors>,
            Option<&Properties>,
            Option<&Holdable>,
        )>()
        .iter()
    {
        let connections = panel
            .connections
            .iter()
            .filter_map(|&c| world.get::<&Connection>(c).ok().map(|conn| connection_def(world, &conn)))
            .collect();

        items.push(SavedItem::Device(DeviceDef {
            id: item.id.0,
            name: item.name.clone(),
            connections,
            behaviors: behaviors
                .map(|b| b.names().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            properties: properties.cloned().unwrap_or_default(),
            holdable: holdable.copied(),
        }));
    }

    for (_, (item, _wire)) in world.query::<(&Item, &Wire)>().iter() {
        items.push(SavedItem::Wire(WireDef {
            id: item.id.0,
            name: item.name.clone(),
        }));
    }

    items.sort_by_key(SavedItem::id);
    SaveData {
        version: SAVE_VERSION,
        items,
    }
}

/// Save a network to a writer
pub fn save_network<W: Write>(writer: W, data: &SaveData) -> Result<()> {
    bincode::serialize_into(writer, data)?;
    Ok(())
}

/// Load a network from a reader
pub fn load_network<R: Read>(reader: R) -> Result<SaveData> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    check_version(data)
}

/// Parse a hand-written network definition
pub fn network_from_json(json: &str) -> Result<SaveData> {
    let data: SaveData = serde_json::from_str(json)?;
    check_version(data)
}

fn check_version(data: SaveData) -> Result<SaveData> {
    if data.version != SAVE_VERSION {
        return Err(WiringError::VersionMismatch {
            expected: SAVE_VERSION,
            found: data.version,
        });
    }
    Ok(data)
}
