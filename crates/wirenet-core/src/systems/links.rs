//! Wire linking - attaching and detaching wires at connections.
//!
//! Every function here keeps three things in step: the connection's wire
//! list, the wire's endpoint slots, and grid membership (patched directly
//! when the outcome is obvious, otherwise deferred to the coordinator).

use crate::components::{Connection, ConnectionPanel, Item, ItemId, ItemRegistry, Wire};
use crate::systems::grid::GridCoordinator;
use hecs::{Entity, World};

/// Directly wired peer connections, refreshed lazily when the cache is dirty.
pub fn recipients(world: &World, connection: Entity) -> Vec<Entity> {
    let wires = {
        let Ok(conn) = world.get::<&Connection>(connection) else {
            return Vec::new();
        };
        if !conn.recipients_dirty {
            return conn.recipients.clone();
        }
        conn.wires.clone()
    };

    let fresh: Vec<Entity> = wires
        .iter()
        .filter_map(|&wire| other_connection(world, wire, connection))
        .collect();

    if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
        conn.recipients.clone_from(&fresh);
        conn.recipients_dirty = false;
    }
    fresh
}

/// The far end of `wire` as seen from `connection`
pub fn other_connection(world: &World, wire: Entity, connection: Entity) -> Option<Entity> {
    world.get::<&Wire>(wire).ok()?.other_connection(connection)
}

/// Both ends are power connections, so the wire carries grid membership.
pub fn valid_power_connection(world: &World, a: Entity, b: Entity) -> bool {
    let is_power = |c: Entity| {
        world
            .get::<&Connection>(c)
            .map(|c| c.is_power)
            .unwrap_or(false)
    };
    is_power(a) && is_power(b)
}

fn grid_of(world: &World, connection: Entity) -> Option<crate::components::GridId> {
    world.get::<&Connection>(connection).ok()?.grid
}

fn power_recipient_count(world: &World, connection: Entity) -> usize {
    recipients(world, connection)
        .into_iter()
        .filter(|&r| {
            world
                .get::<&Connection>(r)
                .map(|c| c.is_power)
                .unwrap_or(false)
        })
        .count()
}

fn mark_recipients_dirty(world: &World, connection: Entity) {
    if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
        conn.mark_recipients_dirty();
    }
}

/// Invalidate the recipient cache; power connections are also queued for
/// grid recomputation.
pub fn set_recipients_dirty(world: &mut World, grids: &mut GridCoordinator, connection: Entity) {
    let is_power = match world.get::<&mut Connection>(connection) {
        Ok(mut conn) => {
            conn.mark_recipients_dirty();
            conn.is_power
        }
        Err(_) => return,
    };
    if is_power {
        grids.mark_changed(connection);
    }
}

/// Find a device's connection by name
pub fn find_connection(world: &World, item: Entity, name: &str) -> Option<Entity> {
    let panel = world.get::<&ConnectionPanel>(item).ok()?;
    panel.connections.iter().copied().find(|&c| {
        world
            .get::<&Connection>(c)
            .map(|conn| conn.name == name)
            .unwrap_or(false)
    })
}

/// Find the wire attached to `connection` whose item id is `wire_id`
pub fn find_wire_by_item(world: &World, connection: Entity, wire_id: ItemId) -> Option<Entity> {
    let conn = world.get::<&Connection>(connection).ok()?;
    conn.wires.iter().copied().find(|&w| {
        world
            .get::<&Item>(w)
            .map(|item| item.id == wire_id)
            .unwrap_or(false)
    })
}

/// Attach `wire` to `connection` if capacity allows.
///
/// Fails without side effects when `wire` is not a live wire, is already
/// attached, or the connection is full.
pub fn try_add_link(world: &mut World, connection: Entity, wire: Entity) -> bool {
    if world.get::<&Wire>(wire).is_err() {
        return false;
    }
    match world.get::<&mut Connection>(connection) {
        Ok(mut conn) => conn.try_add_link(wire),
        Err(_) => false,
    }
}

/// Connect `wire` to `connection` and reconcile grid membership.
///
/// The connection takes a free endpoint slot on the wire. When the wire now
/// joins two power connections and exactly one side is already in a grid,
/// the other side joins it immediately; otherwise both sides are queued for
/// recomputation.
pub fn connect_wire(
    world: &mut World,
    grids: &mut GridCoordinator,
    connection: Entity,
    wire: Entity,
) -> bool {
    if !try_add_link(world, connection, wire) {
        return false;
    }

    let seated = world
        .get::<&mut Wire>(wire)
        .map(|mut w| w.connect(connection))
        .unwrap_or(false);
    if !seated {
        // Both wire ends are taken by other connections
        if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
            conn.unlink(wire);
        }
        log::debug!("Wire {:?} has no free end for {:?}", wire, connection);
        return false;
    }

    let item = world.get::<&Connection>(connection).ok().map(|c| c.item);
    if let Some(item) = item {
        if let Ok(mut panel) = world.get::<&mut ConnectionPanel>(item) {
            panel.forget_wire(wire);
        }
    }

    if let Some(other) = other_connection(world, wire, connection) {
        if valid_power_connection(world, connection, other) {
            let adopted = match (grid_of(world, connection), grid_of(world, other)) {
                (None, Some(id)) => grids.add_connection(world, id, connection),
                (Some(id), None) => grids.add_connection(world, id, other),
                _ => false,
            };
            if !adopted {
                grids.mark_changed(connection);
                grids.mark_changed(other);
            }
        }
        mark_recipients_dirty(world, other);
    }
    mark_recipients_dirty(world, connection);
    true
}

/// Connect on behalf of a player, honoring the player-facing wire limit.
pub fn player_connect_wire(
    world: &mut World,
    grids: &mut GridCoordinator,
    connection: Entity,
    wire: Entity,
) -> bool {
    if !player_can_connect(world, connection) {
        return false;
    }
    connect_wire(world, grids, connection, wire)
}

pub fn player_can_connect(world: &World, connection: Entity) -> bool {
    world
        .get::<&Connection>(connection)
        .map(|c| c.player_slots_available())
        .unwrap_or(false)
}

/// Detach `wire` from `connection`. The wire keeps its other end.
///
/// When both ends were power connections in the same grid, membership is
/// patched without a search where the local wiring makes the outcome
/// certain:
/// - both sides still have other power peers: shape unknown, queue both,
///   `connection` first so its side keeps the grid id if the grid splits
/// - only one side does: the other side hung on this wire alone and leaves
/// - neither does and the grid had two members: the grid is deleted
pub fn disconnect_wire(
    world: &mut World,
    grids: &mut GridCoordinator,
    connection: Entity,
    wire: Entity,
) {
    let attached = world
        .get::<&Connection>(connection)
        .map(|c| c.has_wire(wire))
        .unwrap_or(false);
    if !attached {
        return;
    }

    if let Some(other) = other_connection(world, wire, connection) {
        if valid_power_connection(world, connection, other) {
            let this_grid = grid_of(world, connection);
            let other_grid = grid_of(world, other);
            match this_grid {
                Some(id) if other_grid == Some(id) => {
                    let this_peers = power_recipient_count(world, connection);
                    let other_peers = power_recipient_count(world, other);
                    if this_peers > 1 && other_peers > 1 {
                        grids.mark_changed(connection);
                        grids.mark_changed(other);
                    } else if this_peers > 1 {
                        grids.remove_connection(world, other);
                    } else if other_peers > 1 {
                        grids.remove_connection(world, connection);
                    } else if grids.grid(id).map(|g| g.len() == 2).unwrap_or(false) {
                        grids.remove_grid(world, id);
                    } else {
                        grids.mark_changed(connection);
                        grids.mark_changed(other);
                    }
                }
                _ if this_grid.is_some() || other_grid.is_some() => {
                    grids.mark_changed(connection);
                    grids.mark_changed(other);
                }
                _ => {}
            }
        }
        mark_recipients_dirty(world, other);
    }

    let item = match world.get::<&mut Connection>(connection) {
        Ok(mut conn) => {
            conn.unlink(wire);
            Some(conn.item)
        }
        Err(_) => None,
    };
    if let Ok(mut w) = world.get::<&mut Wire>(wire) {
        w.remove_connection(connection);
    }
    if let Some(item) = item {
        if let Ok(mut panel) = world.get::<&mut ConnectionPanel>(item) {
            panel.remember_wire(wire);
        }
    }
}

/// Unlink every wire from `connection`, e.g. before its device is destroyed.
pub fn clear_connections(world: &mut World, grids: &mut GridCoordinator, connection: Entity) {
    let (is_power, in_grid, wires) = match world.get::<&Connection>(connection) {
        Ok(conn) => (conn.is_power, conn.grid.is_some(), conn.wires.clone()),
        Err(_) => return,
    };

    if is_power && in_grid {
        grids.mark_changed(connection);
        for peer in recipients(world, connection) {
            grids.mark_changed(peer);
        }
    }

    for wire in wires {
        let other = other_connection(world, wire, connection);
        if let Ok(mut w) = world.get::<&mut Wire>(wire) {
            w.remove_connection(connection);
        }
        if let Some(other) = other {
            mark_recipients_dirty(world, other);
        }
    }

    if let Ok(mut conn) = world.get::<&mut Connection>(connection) {
        conn.wires.clear();
        conn.recipients.clear();
        conn.recipients_dirty = true;
    }
}

/// Resolve persisted wire ids into live links. Runs once per connection
/// after every item of a save has been spawned; ids that no longer name a
/// wire are skipped.
pub fn initialize_from_loaded(
    world: &mut World,
    grids: &mut GridCoordinator,
    items: &ItemRegistry,
    connection: Entity,
) {
    let ids = match world.get::<&mut Connection>(connection) {
        Ok(mut conn) => std::mem::take(&mut conn.loaded_wire_ids),
        Err(_) => return,
    };

    for id in ids {
        let Some(wire) = items.get(id) else {
            log::trace!("Wire {} missing, link dropped", id);
            continue;
        };
        if !connect_wire(world, grids, connection, wire) {
            log::debug!("Could not relink wire {} to {:?}", id, connection);
        }
    }
}
