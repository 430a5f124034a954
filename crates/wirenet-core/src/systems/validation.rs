//! Consistency checks over the wiring graph.
//!
//! Each check returns a list of problems; an empty list means the invariant
//! holds. Used by tests and the headless harness after every tick.

use crate::components::{Connection, Wire};
use crate::systems::grid::GridCoordinator;
use crate::systems::links::recipients;
use hecs::{Entity, World};
use std::collections::HashMap;

/// A broken invariant.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub category: &'static str,
    pub message: String,
}

fn error(category: &'static str, message: String) -> ValidationError {
    ValidationError { category, message }
}

/// No connection holds more wires than it allows, and wire lists are unique.
pub fn check_wire_capacity(world: &World) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (entity, conn) in world.query::<&Connection>().iter() {
        if conn.wires.len() > conn.max_wires {
            errors.push(error(
                "capacity",
                format!(
                    "{:?} '{}' holds {} wires, max {}",
                    entity,
                    conn.name,
                    conn.wires.len(),
                    conn.max_wires
                ),
            ));
        }
        let mut seen = conn.wires.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != conn.wires.len() {
            errors.push(error(
                "capacity",
                format!("{:?} '{}' lists a wire twice", entity, conn.name),
            ));
        }
    }
    errors
}

/// Every wire endpoint lists the wire, and every listed wire either holds
/// the connection or dangles from it.
pub fn check_wire_symmetry(world: &World) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (wire_entity, wire) in world.query::<&Wire>().iter() {
        for endpoint in wire.connections().into_iter().flatten() {
            let listed = world
                .get::<&Connection>(endpoint)
                .map(|c| c.has_wire(wire_entity))
                .unwrap_or(false);
            if !listed {
                errors.push(error(
                    "symmetry",
                    format!("wire {:?} ends at {:?} which does not list it", wire_entity, endpoint),
                ));
            }
        }
    }
    for (entity, conn) in world.query::<&Connection>().iter() {
        for &wire in &conn.wires {
            let holds = world
                .get::<&Wire>(wire)
                .map(|w| w.is_connected_to(entity))
                .unwrap_or(false);
            if !holds {
                errors.push(error(
                    "symmetry",
                    format!("{:?} '{}' lists wire {:?} that is not attached", entity, conn.name, wire),
                ));
            }
        }
    }
    errors
}

/// Grid partition: after a resolve, a power connection is in a grid exactly
/// when it has a power peer, all peers share its grid, grid records match
/// the connections' own references, and no grid has fewer than two members.
pub fn check_grid_partition(world: &World, grids: &GridCoordinator) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut owner: HashMap<Entity, crate::components::GridId> = HashMap::new();
    for grid in grids.grids() {
        if grid.len() < 2 {
            errors.push(error(
                "grid",
                format!("{} has {} members", grid.id(), grid.len()),
            ));
        }
        for &member in grid.connections() {
            if let Some(previous) = owner.insert(member, grid.id()) {
                errors.push(error(
                    "grid",
                    format!("{:?} is in both {} and {}", member, previous, grid.id()),
                ));
            }
        }
    }

    let power: Vec<(Entity, Option<crate::components::GridId>)> = world
        .query::<&Connection>()
        .iter()
        .filter(|(_, c)| c.is_power)
        .map(|(e, c)| (e, c.grid))
        .collect();

    for (entity, grid) in power {
        if grid != owner.get(&entity).copied() {
            errors.push(error(
                "grid",
                format!(
                    "{:?} references {:?} but is recorded in {:?}",
                    entity,
                    grid,
                    owner.get(&entity)
                ),
            ));
        }

        let peers: Vec<Entity> = recipients(world, entity)
            .into_iter()
            .filter(|&p| {
                world
                    .get::<&Connection>(p)
                    .map(|c| c.is_power)
                    .unwrap_or(false)
            })
            .collect();
        if !peers.is_empty() && grid.is_none() {
            errors.push(error(
                "grid",
                format!("{:?} has {} power peers but no grid", entity, peers.len()),
            ));
        }
        for peer in peers {
            let peer_grid = world.get::<&Connection>(peer).ok().and_then(|c| c.grid);
            if peer_grid != grid {
                errors.push(error(
                    "grid",
                    format!("{:?} and peer {:?} are wired but in different grids", entity, peer),
                ));
            }
        }
    }
    errors
}

/// Run every check.
pub fn validate_all(world: &World, grids: &GridCoordinator) -> Vec<ValidationError> {
    let mut errors = check_wire_capacity(world);
    errors.extend(check_wire_symmetry(world));
    errors.extend(check_grid_partition(world, grids));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ConnectionDef, IdRemap};
    use crate::systems::links::connect_wire;

    fn power(world: &mut World) -> Entity {
        let item = world.spawn(());
        world.spawn((Connection::from_def(
            &ConnectionDef::input("power"),
            item,
            "device",
            5,
            &IdRemap::IDENTITY,
        ),))
    }

    #[test]
    fn test_clean_network_passes() {
        let mut world = World::new();
        let mut grids = GridCoordinator::new();
        let a = power(&mut world);
        let b = power(&mut world);
        let w = world.spawn((Wire::new(),));
        connect_wire(&mut world, &mut grids, a, w);
        connect_wire(&mut world, &mut grids, b, w);
        grids.resolve_changes(&mut world);
        assert!(validate_all(&world, &grids).is_empty());
    }

    #[test]
    fn test_unresolved_changes_are_reported() {
        let mut world = World::new();
        let mut grids = GridCoordinator::new();
        let a = power(&mut world);
        let b = power(&mut world);
        let w = world.spawn((Wire::new(),));
        connect_wire(&mut world, &mut grids, a, w);
        connect_wire(&mut world, &mut grids, b, w);

        let errors = check_grid_partition(&world, &grids);
        assert!(errors.iter().any(|e| e.message.contains("no grid")));
    }

    #[test]
    fn test_asymmetric_wire_reported() {
        let mut world = World::new();
        let a = power(&mut world);
        let mut wire = Wire::new();
        wire.connect(a);
        world.spawn((wire,));
        assert_eq!(check_wire_symmetry(&world).len(), 1);
    }
}
