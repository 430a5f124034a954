//! Signals and the per-device delivery history used for loop suppression.

use hecs::Entity;
use serde::{Deserialize, Serialize};

/// Canonical "off/false" signal value. Status effects are not applied for it.
pub const SIGNAL_OFF: &str = "0";

/// A message travelling along wires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    /// String payload, interpreted by the receiving device
    pub value: String,
    /// Device that started the causal chain this signal belongs to
    pub source: Option<Entity>,
}

impl Signal {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Entity) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_off(&self) -> bool {
        self.value == SIGNAL_OFF
    }
}

/// Connections a device's signals were delivered to during the current tick.
///
/// Attached to every device; the signal router consults the last entry to
/// suppress two-device ping-pong. Cleared at the start of each tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalHistory {
    last_sent_recipients: Vec<Entity>,
}

impl SignalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Entity> {
        self.last_sent_recipients.last().copied()
    }

    pub fn record(&mut self, recipient: Entity) {
        self.last_sent_recipients.push(recipient);
    }

    pub fn recipients(&self) -> &[Entity] {
        &self.last_sent_recipients
    }

    pub fn clear(&mut self) {
        self.last_sent_recipients.clear();
    }
}

/// How a status effect changes its target property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectOp {
    Set(f32),
    Add(f32),
}

/// Device behavior trigger fired when a non-off signal arrives at a
/// connection that carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub property: String,
    pub op: EffectOp,
}

impl StatusEffect {
    pub fn set(property: impl Into<String>, value: f32) -> Self {
        Self {
            property: property.into(),
            op: EffectOp::Set(value),
        }
    }

    pub fn add(property: impl Into<String>, amount: f32) -> Self {
        Self {
            property: property.into(),
            op: EffectOp::Add(amount),
        }
    }

    pub fn apply(&self, properties: &mut super::Properties) {
        match self.op {
            EffectOp::Set(value) => properties.set(&self.property, value),
            EffectOp::Add(amount) => properties.add(&self.property, amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Properties;

    #[test]
    fn test_off_sentinel() {
        assert!(Signal::new("0").is_off());
        assert!(!Signal::new("1").is_off());
        assert!(!Signal::new("").is_off());
    }

    #[test]
    fn test_effects_apply_to_properties() {
        let mut props = Properties::default();
        StatusEffect::add("heat", 2.0).apply(&mut props);
        StatusEffect::add("heat", 1.5).apply(&mut props);
        StatusEffect::set("lit", 1.0).apply(&mut props);
        assert_eq!(props.get("heat"), 3.5);
        assert_eq!(props.get("lit"), 1.0);
    }
}
