//! Wiring engine - main entry point for running a wiring network

use hecs::{Entity, World};
use std::io::{Read, Write};

use crate::components::*;
use crate::config::WiringConfig;
use crate::error::{Result, WiringError};
use crate::net::{self, AttachRequest, AttachState, ClientInfo, ServerEvent};
use crate::persistence::{self, DeviceDef, SaveData, SavedItem, WireDef};
use crate::systems::*;

/// A wire edit deferred to the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireCommand {
    Connect { connection: Entity, wire: Entity },
    Disconnect { connection: Entity, wire: Entity },
    /// Destroy a wire, detaching it from both ends
    RemoveWire(Entity),
    /// Destroy a device and all of its connections
    RemoveItem(Entity),
}

/// Main wiring engine
pub struct WiringEngine {
    /// ECS world containing devices, connections and wires
    pub world: World,
    /// Live power grids and the pending recomputation worklist
    pub grids: GridCoordinator,
    /// Persistent id to entity lookup
    pub items: ItemRegistry,
    /// Behavior constructors by name
    pub behaviors: BehaviorRegistry,
    pub config: WiringConfig,
    /// Simulation time in seconds since start
    pub sim_time: f64,

    pending: Vec<WireCommand>,
    tick: u64,
}

impl Default for WiringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WiringEngine {
    /// Create a new empty engine
    pub fn new() -> Self {
        Self::with_config(WiringConfig::default())
    }

    pub fn with_config(config: WiringConfig) -> Self {
        Self {
            world: World::new(),
            grids: GridCoordinator::new(),
            items: ItemRegistry::new(),
            behaviors: BehaviorRegistry::new(),
            config,
            sim_time: 0.0,
            pending: Vec::new(),
            tick: 0,
        }
    }

    /// Number of completed ticks
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // ----- Spawning -----

    /// Spawn a device from its definition. Links listed in the definition
    /// stay pending until [`resolve_loaded_links`](Self::resolve_loaded_links).
    ///
    /// Returns `None` if the id is null or already taken.
    pub fn spawn_device(&mut self, def: &DeviceDef) -> Option<Entity> {
        self.spawn_device_remapped(def, &IdRemap::IDENTITY)
    }

    fn spawn_device_remapped(&mut self, def: &DeviceDef, remap: &IdRemap) -> Option<Entity> {
        let id = remap.offset_id(i32::from(def.id));
        if id.is_null() || self.items.contains(id) {
            log::warn!("Cannot spawn {} as {}: id unavailable", def.name, id);
            return None;
        }

        let mut behaviors = Behaviors::default();
        for name in &def.behaviors {
            match self.behaviors.create(name) {
                Some(behavior) => behaviors.push(behavior),
                None => log::warn!("Unknown behavior '{}' on {} {}", name, def.name, id),
            }
        }

        let item = self.world.spawn((
            Item::new(id, def.name.clone()),
            def.properties.clone(),
            SignalHistory::new(),
            behaviors,
        ));
        if let Some(holdable) = def.holdable {
            let _ = self.world.insert_one(item, holdable);
        }

        let connections: Vec<Entity> = def
            .connections
            .iter()
            .map(|c| {
                let conn = Connection::from_def(
                    c,
                    item,
                    &def.name,
                    self.config.default_max_wires,
                    remap,
                );
                self.world.spawn((conn,))
            })
            .collect();
        let _ = self.world.insert_one(item, ConnectionPanel::new(connections));

        self.items.insert(id, item);
        log::trace!("Spawned {} {} as {:?}", def.name, id, item);
        Some(item)
    }

    /// Spawn a free wire. Returns `None` if the id is null or already taken.
    pub fn spawn_wire(&mut self, id: ItemId) -> Option<Entity> {
        self.spawn_wire_remapped(&WireDef::new(id.0), &IdRemap::IDENTITY)
    }

    fn spawn_wire_remapped(&mut self, def: &WireDef, remap: &IdRemap) -> Option<Entity> {
        let id = remap.offset_id(i32::from(def.id));
        if id.is_null() || self.items.contains(id) {
            log::warn!("Cannot spawn wire as {}: id unavailable", id);
            return None;
        }
        let wire = self.world.spawn((Item::new(id, def.name.clone()), Wire::new()));
        self.items.insert(id, wire);
        Some(wire)
    }

    /// Next unused item id
    pub fn next_item_id(&self) -> Option<ItemId> {
        self.items.next_free_id()
    }

    /// Resolve the persisted wire ids of every connection still holding some.
    pub fn resolve_loaded_links(&mut self) {
        let mut pending: Vec<(ItemId, Entity)> = self
            .world
            .query::<&Connection>()
            .iter()
            .filter(|(_, c)| !c.loaded_wire_ids.is_empty())
            .filter_map(|(e, c)| {
                let id = self.world.get::<&Item>(c.item).ok()?.id;
                Some((id, e))
            })
            .collect();
        pending.sort();

        for (_, connection) in pending {
            initialize_from_loaded(&mut self.world, &mut self.grids, &self.items, connection);
        }
    }

    // ----- Lookup -----

    pub fn item(&self, id: ItemId) -> Option<Entity> {
        self.items.get(id)
    }

    /// A device's connection by name
    pub fn connection(&self, item: ItemId, name: &str) -> Option<Entity> {
        find_connection(&self.world, self.items.get(item)?, name)
    }

    pub fn grid_of(&self, connection: Entity) -> Option<GridId> {
        self.grids.grid_of(&self.world, connection).map(|g| g.id())
    }

    pub fn recipients(&self, connection: Entity) -> Vec<Entity> {
        recipients(&self.world, connection)
    }

    pub fn device_count(&self) -> usize {
        self.world.query::<(&Item, &ConnectionPanel)>().iter().count()
    }

    pub fn wire_count(&self) -> usize {
        self.world.query::<&Wire>().iter().count()
    }

    pub fn connection_count(&self) -> usize {
        self.world.query::<&Connection>().iter().count()
    }

    // ----- Wire edits -----

    pub fn connect(&mut self, connection: Entity, wire: Entity) -> bool {
        connect_wire(&mut self.world, &mut self.grids, connection, wire)
    }

    /// Connect with the player-facing wire limit applied
    pub fn player_connect(&mut self, connection: Entity, wire: Entity) -> bool {
        player_connect_wire(&mut self.world, &mut self.grids, connection, wire)
    }

    pub fn disconnect(&mut self, connection: Entity, wire: Entity) {
        disconnect_wire(&mut self.world, &mut self.grids, connection, wire);
    }

    /// Defer a wire edit to the start of the next tick
    pub fn queue(&mut self, command: WireCommand) {
        self.pending.push(command);
    }

    pub fn pending_commands(&self) -> &[WireCommand] {
        &self.pending
    }

    fn apply(&mut self, command: WireCommand) {
        match command {
            WireCommand::Connect { connection, wire } => {
                if !self.connect(connection, wire) {
                    log::debug!("Queued connect of {:?} to {:?} failed", wire, connection);
                }
            }
            WireCommand::Disconnect { connection, wire } => self.disconnect(connection, wire),
            WireCommand::RemoveWire(wire) => self.remove_wire(wire),
            WireCommand::RemoveItem(item) => self.remove_item(item),
        }
    }

    /// Destroy a wire, detaching it from both ends first
    pub fn remove_wire(&mut self, wire: Entity) {
        let ends = match self.world.get::<&Wire>(wire) {
            Ok(w) => w.connections(),
            Err(_) => return,
        };
        for end in ends.into_iter().flatten() {
            self.disconnect(end, wire);
        }
        self.despawn(wire);
    }

    /// Destroy a device. Each connection is unlinked from its wires and
    /// evicted from its grid before being despawned; the wires survive.
    /// Removing a wire item delegates to [`remove_wire`](Self::remove_wire).
    pub fn remove_item(&mut self, item: Entity) {
        if self.world.get::<&Wire>(item).is_ok() {
            self.remove_wire(item);
            return;
        }
        let connections = match self.world.get::<&ConnectionPanel>(item) {
            Ok(panel) => panel.connections.clone(),
            Err(_) => Vec::new(),
        };
        for connection in connections {
            clear_connections(&mut self.world, &mut self.grids, connection);
            self.grids.remove_connection(&mut self.world, connection);
            let _ = self.world.despawn(connection);
        }
        self.despawn(item);
    }

    fn despawn(&mut self, entity: Entity) {
        let id = self.world.get::<&Item>(entity).ok().map(|i| i.id);
        if let Some(id) = id {
            self.items.remove(id);
        }
        let _ = self.world.despawn(entity);
    }

    // ----- Signals -----

    /// Send a signal out of `connection`
    pub fn send_signal(&mut self, connection: Entity, signal: &Signal) {
        send_signal(&mut self.world, &self.grids, connection, signal);
    }

    /// Register a behavior constructor under `name`
    pub fn register_behavior(&mut self, name: impl Into<String>, factory: BehaviorFactory) {
        self.behaviors.register(name, factory);
    }

    // ----- Tick -----

    pub fn resolve_grids(&mut self) {
        self.grids.resolve_changes(&mut self.world);
    }

    /// Advance the network by `delta_seconds`
    pub fn update(&mut self, delta_seconds: f32) {
        let scaled_delta = delta_seconds * self.config.time_scale;
        self.sim_time += f64::from(scaled_delta);

        // Wire edits requested since the last tick
        for command in std::mem::take(&mut self.pending) {
            self.apply(command);
        }

        self.grids.resolve_changes(&mut self.world);

        clear_signal_histories(&mut self.world);

        // Behaviors, in item id order
        let mut order: Vec<(ItemId, Entity)> = self
            .world
            .query::<(&Item, &Behaviors)>()
            .iter()
            .filter(|(_, (_, b))| !b.is_empty())
            .map(|(e, (item, _))| (item.id, e))
            .collect();
        order.sort();
        let order: Vec<Entity> = order.into_iter().map(|(_, e)| e).collect();
        update_behaviors(&mut self.world, &self.grids, &order, scaled_delta);

        self.tick += 1;
    }

    /// Check every wiring invariant
    pub fn validate(&self) -> Vec<ValidationError> {
        validate_all(&self.world, &self.grids)
    }

    /// Tear down the network
    pub fn clear(&mut self) {
        self.grids.clear(&mut self.world);
        self.world.clear();
        self.items.clear();
        self.pending.clear();
    }

    // ----- Persistence -----

    pub fn snapshot(&self) -> SaveData {
        persistence::snapshot(&self.world)
    }

    /// Save the network to a writer
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        persistence::save_network(writer, &self.snapshot())
    }

    /// Load a saved network on top of whatever the engine already holds.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<Vec<Entity>> {
        let data = persistence::load_network(reader)?;
        Ok(self.load_data(&data))
    }

    /// Load a JSON network definition
    pub fn load_json(&mut self, json: &str) -> Result<Vec<Entity>> {
        let data = persistence::network_from_json(json)?;
        Ok(self.load_data(&data))
    }

    /// Spawn every item of `data`, then relink wires.
    ///
    /// When the engine already holds items, loaded ids are shifted past the
    /// highest existing id so nothing collides. Returns the spawned items.
    pub fn load_data(&mut self, data: &SaveData) -> Vec<Entity> {
        let remap = IdRemap::new(self.items.max_id());
        let mut spawned = Vec::with_capacity(data.items.len());
        for item in &data.items {
            let entity = match item {
                SavedItem::Device(def) => self.spawn_device_remapped(def, &remap),
                SavedItem::Wire(def) => self.spawn_wire_remapped(def, &remap),
            };
            spawned.extend(entity);
        }
        self.resolve_loaded_links();
        log::info!(
            "Loaded {} items (id offset {}), {} connections pending grid resolution",
            spawned.len(),
            remap.offset(),
            self.grids.pending_changes().len()
        );
        spawned
    }

    // ----- Network -----

    /// Apply a client's attach request to device `item`
    pub fn handle_attach_request(
        &mut self,
        item: ItemId,
        client: &ClientInfo,
        request: &AttachRequest,
    ) -> Option<Vec<ServerEvent>> {
        let entity = self.items.get(item)?;
        net::handle_attach_request(&mut self.world, entity, client, request, &self.config)
    }

    /// Attach state of device `item`, for syncing a client
    pub fn attach_state(&self, item: ItemId) -> Result<AttachState> {
        self.items
            .get(item)
            .and_then(|entity| net::attach_state(&self.world, entity))
            .ok_or(WiringError::UnknownItem(item))
    }
}
