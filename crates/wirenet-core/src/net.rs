//! Wire-attach messages exchanged with clients.
//!
//! A client asks to mount a wire-bearing device at a simulation position;
//! the server validates the request, moves and attaches the device, and
//! answers with a state sync. Invalid requests get no reply at all.

use crate::components::{Holdable, Item, ItemId, Vec2};
use crate::config::WiringConfig;
use crate::error::Result;
use hecs::{Entity, World};
use serde::{Deserialize, Serialize};

/// Requests further than this multiple of the attach distance from the
/// requester's character are pulled back to it.
const ATTACH_DISTANCE_MARGIN: f32 = 1.5;

/// Client to server: attach the held device at this position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachRequest {
    pub sim_x: f32,
    pub sim_y: f32,
}

impl AttachRequest {
    pub fn new(position: Vec2) -> Self {
        Self {
            sim_x: position.x,
            sim_y: position.y,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.sim_x, self.sim_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachData {
    pub attached: bool,
    pub sim_x: f32,
    pub sim_y: f32,
    /// Containing vessel, `NULL_ENTITY_ID` when there is none
    pub vessel: u16,
}

/// Server to client: attach state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachState {
    pub item: ItemId,
    pub attach: Option<AttachData>,
}

impl AttachState {
    pub fn has_attach_data(&self) -> bool {
        self.attach.is_some()
    }
}

/// The requesting client as seen by the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientInfo {
    pub id: u32,
    pub character_position: Option<Vec2>,
    /// Whether the client may manipulate the device in question
    pub can_access: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    ItemState(AttachState),
    InventoryChanged { client: u32 },
}

/// Current attach state of `item`, if it is an item.
pub fn attach_state(world: &World, item: Entity) -> Option<AttachState> {
    let id = world.get::<&Item>(item).ok()?.id;
    let attach = world.get::<&Holdable>(item).ok().map(|h| AttachData {
        attached: h.attached,
        sim_x: h.position.x,
        sim_y: h.position.y,
        vessel: h.vessel_id(),
    });
    Some(AttachState { item: id, attach })
}

/// Validate and apply an attach request.
///
/// Returns the events to send back, or `None` when the request is rejected:
/// no access, the device cannot be attached or already is, or the position
/// is not finite.
pub fn handle_attach_request(
    world: &mut World,
    item: Entity,
    client: &ClientInfo,
    request: &AttachRequest,
    config: &WiringConfig,
) -> Option<Vec<ServerEvent>> {
    if !client.can_access {
        return None;
    }
    let mut position = request.position();
    if !position.is_finite() {
        return None;
    }
    if let Some(origin) = client.character_position {
        let reach = config.max_attach_distance * ATTACH_DISTANCE_MARGIN;
        position = origin + (position - origin).clamp_length(reach);
    }

    {
        let mut holdable = world.get::<&mut Holdable>(item).ok()?;
        if !holdable.attachable || holdable.attached {
            return None;
        }
        holdable.position = position;
        holdable.attached = true;
    }

    let state = attach_state(world, item)?;
    log::info!(
        "Client {} attached {} at ({:.2}, {:.2})",
        client.id,
        state.item,
        position.x,
        position.y
    );
    Some(vec![
        ServerEvent::ItemState(state),
        ServerEvent::InventoryChanged { client: client.id },
    ])
}

/// Decode and apply a raw attach request. Undecodable messages are dropped
/// like any other invalid request.
pub fn handle_attach_message(
    world: &mut World,
    item: Entity,
    client: &ClientInfo,
    bytes: &[u8],
    config: &WiringConfig,
) -> Option<Vec<ServerEvent>> {
    match decode_request(bytes) {
        Ok(request) => handle_attach_request(world, item, client, &request, config),
        Err(e) => {
            log::debug!("Dropping attach request from client {}: {}", client.id, e);
            None
        }
    }
}

pub fn encode_request(request: &AttachRequest) -> Result<Vec<u8>> {
    Ok(bincode::serialize(request)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<AttachRequest> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn encode_event(event: &ServerEvent) -> Result<Vec<u8>> {
    Ok(bincode::serialize(event)?)
}

pub fn decode_event(bytes: &[u8]) -> Result<ServerEvent> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::NULL_ENTITY_ID;

    fn setup(holdable: Holdable) -> (World, Entity) {
        let mut world = World::new();
        let item = world.spawn((Item::new(ItemId(7), "junction box"), holdable));
        (world, item)
    }

    fn client() -> ClientInfo {
        ClientInfo {
            id: 3,
            character_position: None,
            can_access: true,
        }
    }

    #[test]
    fn test_attach_success() {
        let (mut world, item) = setup(Holdable::attachable());
        let config = WiringConfig::default();
        let request = AttachRequest { sim_x: 1.0, sim_y: 2.0 };

        let events = handle_attach_request(&mut world, item, &client(), &request, &config).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            ServerEvent::ItemState(state) => {
                assert_eq!(state.item, ItemId(7));
                let data = state.attach.unwrap();
                assert!(data.attached);
                assert_eq!((data.sim_x, data.sim_y), (1.0, 2.0));
                assert_eq!(data.vessel, NULL_ENTITY_ID);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[1], ServerEvent::InventoryChanged { client: 3 });
        assert!(world.get::<&Holdable>(item).unwrap().attached);
    }

    #[test]
    fn test_attach_state_reports_vessel() {
        let mut holdable = Holdable::attachable();
        holdable.vessel = Some(4);
        let (world, item) = setup(holdable);
        let state = attach_state(&world, item).unwrap();
        assert_eq!(state.item, ItemId(7));
        assert_eq!(state.attach.unwrap().vessel, 4);
    }

    #[test]
    fn test_rejections_are_silent() {
        let config = WiringConfig::default();
        let request = AttachRequest { sim_x: 0.0, sim_y: 0.0 };

        let (mut world, item) = setup(Holdable::attachable());
        let no_access = ClientInfo {
            can_access: false,
            ..client()
        };
        assert!(handle_attach_request(&mut world, item, &no_access, &request, &config).is_none());

        let mut fixed = Holdable::attachable();
        fixed.attachable = false;
        let (mut world, item) = setup(fixed);
        assert!(handle_attach_request(&mut world, item, &client(), &request, &config).is_none());

        let (mut world, item) = setup(Holdable::attachable());
        assert!(handle_attach_request(&mut world, item, &client(), &request, &config).is_some());
        // Already attached
        assert!(handle_attach_request(&mut world, item, &client(), &request, &config).is_none());

        let (mut world, item) = setup(Holdable::attachable());
        let nan = AttachRequest {
            sim_x: f32::NAN,
            sim_y: 0.0,
        };
        assert!(handle_attach_request(&mut world, item, &client(), &nan, &config).is_none());
        assert!(!world.get::<&Holdable>(item).unwrap().attached);
    }

    #[test]
    fn test_far_request_is_pulled_in() {
        let (mut world, item) = setup(Holdable::attachable());
        let config = WiringConfig::default();
        let requester = ClientInfo {
            character_position: Some(Vec2::new(10.0, 0.0)),
            ..client()
        };
        let request = AttachRequest {
            sim_x: 20.0,
            sim_y: 0.0,
        };
        handle_attach_request(&mut world, item, &requester, &request, &config).unwrap();

        let position = world.get::<&Holdable>(item).unwrap().position;
        let reach = config.max_attach_distance * ATTACH_DISTANCE_MARGIN;
        assert!((position.distance(&Vec2::new(10.0, 0.0)) - reach).abs() < 1e-4);
    }

    #[test]
    fn test_state_without_holdable() {
        let mut world = World::new();
        let item = world.spawn((Item::new(ItemId(1), "lamp"),));
        let state = attach_state(&world, item).unwrap();
        assert!(!state.has_attach_data());
    }

    #[test]
    fn test_garbage_message_dropped() {
        let (mut world, item) = setup(Holdable::attachable());
        let config = WiringConfig::default();
        assert!(handle_attach_message(&mut world, item, &client(), &[1, 2], &config).is_none());

        let bytes = encode_request(&AttachRequest { sim_x: 0.5, sim_y: 0.5 }).unwrap();
        let events = handle_attach_message(&mut world, item, &client(), &bytes, &config).unwrap();
        let decoded = decode_event(&encode_event(&events[0]).unwrap()).unwrap();
        assert_eq!(decoded, events[0]);
    }
}
