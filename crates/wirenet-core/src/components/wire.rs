//! Wire component - an edge between two connections.

use hecs::Entity;

/// Wire component. Each wire is also an item with its own `ItemId`.
///
/// A wire holds two endpoint slots. While it is being laid, or after one end
/// was pulled out, it dangles with zero or one endpoint set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wire {
    connections: [Option<Entity>; 2],
}

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint slots, in slot order
    pub fn connections(&self) -> [Option<Entity>; 2] {
        self.connections
    }

    pub fn is_connected_to(&self, connection: Entity) -> bool {
        self.connections.contains(&Some(connection))
    }

    /// Number of occupied endpoint slots
    pub fn endpoint_count(&self) -> usize {
        self.connections.iter().flatten().count()
    }

    /// The endpoint that is not `connection`.
    ///
    /// Returns `None` when `connection` is not attached to this wire or the
    /// opposite slot is empty.
    pub fn other_connection(&self, connection: Entity) -> Option<Entity> {
        match self.connections {
            [Some(a), other] if a == connection => other,
            [other, Some(b)] if b == connection => other,
            _ => None,
        }
    }

    /// Seat `connection` in the first free slot.
    ///
    /// Returns true if the connection now occupies a slot (including when it
    /// already did), false when both slots are taken by other connections.
    pub fn connect(&mut self, connection: Entity) -> bool {
        if self.is_connected_to(connection) {
            return true;
        }
        match self.connections.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(connection);
                true
            }
            None => false,
        }
    }

    /// Clear the slot holding `connection`; the wire itself stays alive.
    pub fn remove_connection(&mut self, connection: Entity) {
        for slot in &mut self.connections {
            if *slot == Some(connection) {
                *slot = None;
            }
        }
    }
}
