//! Power grids - connected components of power connections.
//!
//! `GridCoordinator` owns every live [`Grid`] and a worklist of connections
//! whose membership may be stale. Wire edits either patch membership
//! directly (cheap paths in `links`) or mark connections changed; the
//! worklist is resolved once per tick by [`GridCoordinator::resolve_changes`].

use crate::components::{Connection, GridId};
use crate::systems::links::recipients;
use hecs::{Entity, World};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// A maximal set of power connections linked by wires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    id: GridId,
    connections: BTreeSet<Entity>,
}

impl Grid {
    fn new(id: GridId, connections: BTreeSet<Entity>) -> Self {
        Self { id, connections }
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn connections(&self) -> &BTreeSet<Entity> {
        &self.connections
    }

    pub fn contains(&self, connection: Entity) -> bool {
        self.connections.contains(&connection)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Registry of live grids plus the deferred recomputation worklist.
///
/// Create one per simulation and pass it to every wiring operation.
#[derive(Debug, Default)]
pub struct GridCoordinator {
    grids: BTreeMap<GridId, Grid>,
    changed: Vec<Entity>,
    changed_set: HashSet<Entity>,
    last_id: u32,
}

impl GridCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a connection for recomputation on the next resolve.
    /// Marking the same connection twice has no extra effect.
    pub fn mark_changed(&mut self, connection: Entity) {
        if self.changed_set.insert(connection) {
            self.changed.push(connection);
        }
    }

    /// Connections waiting for the next resolve, in marking order
    pub fn pending_changes(&self) -> &[Entity] {
        &self.changed
    }

    pub fn grid(&self, id: GridId) -> Option<&Grid> {
        self.grids.get(&id)
    }

    /// All grids in ascending id order
    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// The grid a connection currently belongs to
    pub fn grid_of(&self, world: &World, connection: Entity) -> Option<&Grid> {
        let id = world.get::<&Connection>(connection).ok()?.grid?;
        self.grids.get(&id)
    }

    /// Drop every grid and pending change (simulation teardown).
    pub fn clear(&mut self, world: &mut World) {
        for (_, conn) in world.query_mut::<&mut Connection>() {
            conn.grid = None;
        }
        self.grids.clear();
        self.changed.clear();
        self.changed_set.clear();
    }

    fn allocate_id(&mut self) -> GridId {
        self.last_id += 1;
        GridId(self.last_id)
    }

    /// Add a connection to an existing grid. Returns false if the grid is gone.
    pub fn add_connection(&mut self, world: &mut World, id: GridId, connection: Entity) -> bool {
        let Some(grid) = self.grids.get_mut(&id) else {
            return false;
        };
        grid.connections.insert(connection);
        set_grid(world, connection, Some(id));
        true
    }

    /// Evict a connection from its grid, deleting the grid if it drops below
    /// two members.
    pub fn remove_connection(&mut self, world: &mut World, connection: Entity) {
        let Some(id) = world.get::<&Connection>(connection).ok().and_then(|c| c.grid) else {
            return;
        };
        set_grid(world, connection, None);

        let remaining = match self.grids.get_mut(&id) {
            Some(grid) => {
                grid.connections.remove(&connection);
                grid.len()
            }
            None => return,
        };
        if remaining < 2 {
            self.remove_grid(world, id);
        }
    }

    /// Delete a grid and clear the grid reference of its members.
    pub fn remove_grid(&mut self, world: &mut World, id: GridId) {
        if let Some(grid) = self.grids.remove(&id) {
            log::trace!("{} removed ({} members)", id, grid.len());
            for &member in &grid.connections {
                clear_grid_if(world, member, id);
            }
        }
    }

    /// Recompute grid membership for every connection marked since the last
    /// call.
    ///
    /// The worklist is snapshotted and cleared on entry, so anything marked
    /// while this runs is handled on the next call.
    pub fn resolve_changes(&mut self, world: &mut World) {
        if self.changed.is_empty() {
            return;
        }
        let snapshot = std::mem::take(&mut self.changed);
        self.changed_set.clear();

        let mut pending: VecDeque<Entity> = group_by_item(world, snapshot).into();
        let mut visited: HashSet<Entity> = HashSet::new();
        let (mut created, mut merged, mut split) = (0usize, 0usize, 0usize);

        while let Some(seed) = pending.pop_front() {
            if visited.contains(&seed) || !is_power(world, seed) {
                continue;
            }

            let component = discover(world, seed);
            visited.extend(component.iter().copied());

            let existing: BTreeSet<GridId> = component
                .iter()
                .filter_map(|&c| world.get::<&Connection>(c).ok().and_then(|c| c.grid))
                .filter(|id| self.grids.contains_key(id))
                .collect();

            let survivor = if component.len() >= 2 {
                existing.first().copied()
            } else {
                None
            };
            if existing.len() > 1 {
                merged += existing.len() - 1;
            }

            for &id in &existing {
                let Some(grid) = self.grids.remove(&id) else {
                    continue;
                };
                let leftovers: Vec<Entity> = grid
                    .connections
                    .iter()
                    .copied()
                    .filter(|c| !component.contains(c))
                    .collect();
                if !leftovers.is_empty() {
                    split += 1;
                }
                // Members no longer reachable from the seed are rediscovered
                for member in leftovers {
                    clear_grid_if(world, member, id);
                    pending.push_back(member);
                }
            }

            if component.len() < 2 {
                for &member in &component {
                    set_grid(world, member, None);
                }
                continue;
            }

            let id = match survivor {
                Some(id) => id,
                None => {
                    created += 1;
                    self.allocate_id()
                }
            };
            for &member in &component {
                set_grid(world, member, Some(id));
            }
            self.grids.insert(id, Grid::new(id, component));
        }

        let undersized: Vec<GridId> = self
            .grids
            .values()
            .filter(|g| g.len() < 2)
            .map(|g| g.id)
            .collect();
        for id in undersized {
            self.remove_grid(world, id);
        }

        log::debug!(
            "Resolved grid changes: {} created, {} merged, {} split, {} live",
            created,
            merged,
            split,
            self.grids.len()
        );
    }
}

fn is_power(world: &World, connection: Entity) -> bool {
    world
        .get::<&Connection>(connection)
        .map(|c| c.is_power)
        .unwrap_or(false)
}

fn set_grid(world: &World, connection: Entity, grid: Option<GridId>) {
    if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
        conn.grid = grid;
    }
}

/// Clear a member's grid reference unless it already moved to another grid.
fn clear_grid_if(world: &World, connection: Entity, id: GridId) {
    if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
        if conn.grid == Some(id) {
            conn.grid = None;
        }
    }
}

/// Order seeds device by device, in the order devices were first touched.
fn group_by_item(world: &World, changed: Vec<Entity>) -> Vec<Entity> {
    let mut groups: Vec<(Option<Entity>, Vec<Entity>)> = Vec::new();
    for connection in changed {
        let item = world.get::<&Connection>(connection).ok().map(|c| c.item);
        match groups.iter_mut().find(|(i, _)| *i == item) {
            Some((_, members)) => members.push(connection),
            None => groups.push((item, vec![connection])),
        }
    }
    groups.into_iter().flat_map(|(_, members)| members).collect()
}

/// Breadth-first search over wires, restricted to power connections.
fn discover(world: &World, seed: Entity) -> BTreeSet<Entity> {
    let mut found = BTreeSet::new();
    let mut queue = VecDeque::new();
    found.insert(seed);
    queue.push_back(seed);

    while let Some(current) = queue.pop_front() {
        for next in recipients(world, current) {
            if is_power(world, next) && found.insert(next) {
                queue.push_back(next);
            }
        }
    }
    found
}
