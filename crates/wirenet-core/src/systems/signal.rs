//! Signal routing - fan-out along wires into receiving devices.
//!
//! Delivery is synchronous and depth-first: a behavior that sends while
//! handling a signal sees its own signal delivered before it returns.

use crate::components::{Connection, GridId, Properties, Signal, SignalHistory, Wire};
use crate::systems::grid::GridCoordinator;
use crate::systems::links::find_connection;
use hecs::{Entity, World};
use std::collections::{HashMap, VecDeque};

/// Device logic plugged into the router (gates, relays, lamps...).
pub trait ItemBehavior: Send + Sync {
    /// Registry name, also what save files record
    fn name(&self) -> &'static str;

    /// A signal arrived on `connection`, one of this device's connections.
    fn receive_signal(&mut self, ctx: &mut SignalContext<'_>, signal: &Signal, connection: Entity);

    /// Per-tick update, run after grids are resolved.
    fn update(&mut self, _ctx: &mut SignalContext<'_>, _delta: f32) {}
}

/// The behaviors of one device.
///
/// While a device is handling a dispatch its behaviors are checked out. A
/// signal routed back into the same device during that time waits in
/// `inbox` and is handed to the behaviors before the outer dispatch returns.
#[derive(Default)]
pub struct Behaviors {
    list: Vec<Box<dyn ItemBehavior>>,
    busy: bool,
    inbox: VecDeque<(Signal, Entity)>,
}

impl Behaviors {
    pub fn new(list: Vec<Box<dyn ItemBehavior>>) -> Self {
        Self {
            list,
            ..Self::default()
        }
    }

    pub fn push(&mut self, behavior: Box<dyn ItemBehavior>) {
        self.list.push(behavior);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.list.iter().map(|b| b.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl std::fmt::Debug for Behaviors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behaviors")
            .field("list", &self.names())
            .field("busy", &self.busy)
            .field("inbox", &self.inbox.len())
            .finish()
    }
}

/// What a behavior can reach while it runs.
pub struct SignalContext<'a> {
    pub world: &'a mut World,
    pub grids: &'a GridCoordinator,
    /// The device the running behavior belongs to
    pub item: Entity,
}

impl SignalContext<'_> {
    /// Send from one of this device's connections. Returns false if the
    /// device has no connection with that name.
    pub fn send(&mut self, connection_name: &str, signal: &Signal) -> bool {
        match find_connection(self.world, self.item, connection_name) {
            Some(connection) => {
                send_signal(self.world, self.grids, connection, signal);
                true
            }
            None => false,
        }
    }

    /// Start a new causal chain from this device
    pub fn signal(&self, value: impl Into<String>) -> Signal {
        Signal::new(value).with_source(self.item)
    }

    pub fn connection_name(&self, connection: Entity) -> Option<String> {
        self.world
            .get::<&Connection>(connection)
            .ok()
            .map(|c| c.name.clone())
    }

    /// Grid of one of this device's connections
    pub fn grid_of(&self, connection_name: &str) -> Option<GridId> {
        let connection = find_connection(self.world, self.item, connection_name)?;
        self.grids.grid_of(self.world, connection).map(|g| g.id())
    }

    pub fn property(&self, name: &str) -> f32 {
        self.world
            .get::<&Properties>(self.item)
            .map(|p| p.get(name))
            .unwrap_or(0.0)
    }

    pub fn set_property(&mut self, name: &str, value: f32) {
        if let Ok(mut props) = self.world.get::<&mut Properties>(self.item) {
            props.set(name, value);
        }
    }
}

#[derive(Clone, Copy)]
enum Dispatch<'s> {
    Signal(&'s Signal, Entity),
    Update(f32),
}

/// Run every behavior of `item` for one dispatch, then every signal that
/// re-entered the device meanwhile, in arrival order.
fn run_behaviors(world: &mut World, grids: &GridCoordinator, item: Entity, dispatch: Dispatch<'_>) {
    let mut list = match world.get::<&mut Behaviors>(item) {
        Ok(mut behaviors) => {
            if behaviors.busy {
                if let Dispatch::Signal(signal, connection) = dispatch {
                    log::trace!("Signal re-entered busy item {:?}, deferred", item);
                    behaviors.inbox.push_back((signal.clone(), connection));
                }
                return;
            }
            behaviors.busy = true;
            std::mem::take(&mut behaviors.list)
        }
        Err(_) => return,
    };

    let mut ctx = SignalContext {
        world: &mut *world,
        grids,
        item,
    };
    dispatch_to(&mut list, &mut ctx, dispatch);
    loop {
        let next = ctx
            .world
            .get::<&mut Behaviors>(item)
            .ok()
            .and_then(|mut behaviors| behaviors.inbox.pop_front());
        let Some((signal, connection)) = next else {
            break;
        };
        dispatch_to(&mut list, &mut ctx, Dispatch::Signal(&signal, connection));
    }

    if let Ok(mut behaviors) = world.get::<&mut Behaviors>(item) {
        let added = std::mem::replace(&mut behaviors.list, list);
        behaviors.list.extend(added);
        behaviors.busy = false;
    }
}

fn dispatch_to(list: &mut [Box<dyn ItemBehavior>], ctx: &mut SignalContext<'_>, dispatch: Dispatch<'_>) {
    for behavior in list.iter_mut() {
        match dispatch {
            Dispatch::Signal(signal, connection) => behavior.receive_signal(ctx, signal, connection),
            Dispatch::Update(delta) => behavior.update(ctx, delta),
        }
    }
}

/// Deliver `signal` from `connection` to every directly wired peer.
///
/// Peers on the same device are skipped, as is the peer that most recently
/// received a signal from the same source device (two-device ping-pong).
/// Longer cycles are not detected here: a ring of forwarding devices keeps
/// delivering until something in it stops forwarding. Effects on the receiving connection
/// fire once per delivery unless the value is the off sentinel.
pub fn send_signal(world: &mut World, grids: &GridCoordinator, connection: Entity, signal: &Signal) {
    let (item, wires) = match world.get::<&Connection>(connection) {
        Ok(conn) => (conn.item, conn.wires.clone()),
        Err(_) => return,
    };

    for wire in wires {
        let recipient = match world.get::<&Wire>(wire) {
            Ok(w) => w.other_connection(connection),
            Err(_) => None,
        };
        let Some(recipient) = recipient else {
            continue;
        };
        let Some(recipient_item) = world.get::<&Connection>(recipient).ok().map(|c| c.item) else {
            continue;
        };
        if recipient_item == item {
            continue;
        }

        if let Some(source) = signal.source {
            if let Ok(mut history) = world.get::<&mut SignalHistory>(source) {
                if history.last() == Some(recipient) {
                    continue;
                }
                history.record(recipient);
            }
        }

        run_behaviors(world, grids, recipient_item, Dispatch::Signal(signal, recipient));

        if !signal.is_off() {
            apply_effects(world, recipient, recipient_item);
        }
    }
}

fn apply_effects(world: &World, connection: Entity, item: Entity) {
    let Ok(conn) = world.get::<&Connection>(connection) else {
        return;
    };
    if conn.effects.is_empty() {
        return;
    }
    if let Ok(mut props) = world.get::<&mut Properties>(item) {
        for effect in &conn.effects {
            effect.apply(&mut props);
        }
    }
}

/// Run the per-tick update of every device that has behaviors
pub fn update_behaviors(world: &mut World, grids: &GridCoordinator, items: &[Entity], delta: f32) {
    for &item in items {
        run_behaviors(world, grids, item, Dispatch::Update(delta));
    }
}

/// Forget last tick's deliveries for every device
pub fn clear_signal_histories(world: &mut World) {
    for (_, history) in world.query_mut::<&mut SignalHistory>() {
        history.clear();
    }
}

/// Constructor for a named behavior
pub type BehaviorFactory = fn() -> Box<dyn ItemBehavior>;

/// Maps behavior names used in definitions and saves to constructors.
#[derive(Debug, Clone, Default)]
pub struct BehaviorRegistry {
    factories: HashMap<String, BehaviorFactory>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: BehaviorFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn ItemBehavior>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
