//! Common components and identifiers shared by items, wires and connections.

use serde::{Deserialize, Serialize};

/// Persisted identifier of the null entity.
pub const NULL_ENTITY_ID: u16 = 0;

/// Persistent item identifier, stable across save/load.
///
/// Both devices and wires are items. `ItemId(0)` is the null entity and never
/// resolves to anything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ItemId(pub u16);

impl ItemId {
    pub const NULL: Self = Self(NULL_ENTITY_ID);

    pub fn is_null(self) -> bool {
        self.0 == NULL_ENTITY_ID
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a power grid. Lower ids survive merges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GridId(pub u32);

impl std::fmt::Display for GridId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "grid {}", self.0)
    }
}

/// Offset table applied to persisted ids when a save is loaded into a world
/// that already holds items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRemap {
    offset: u16,
}

impl IdRemap {
    /// Remap that leaves ids untouched.
    pub const IDENTITY: Self = Self { offset: 0 };

    /// Shift every loaded id past `max_existing_id`.
    pub fn new(max_existing_id: u16) -> Self {
        Self {
            offset: max_existing_id,
        }
    }

    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Map a persisted id into the live id space.
    ///
    /// Negative and zero ids map to the null entity, as do ids that would
    /// overflow the id space.
    pub fn offset_id(&self, id: i32) -> ItemId {
        if id <= 0 {
            return ItemId::NULL;
        }
        u16::try_from(id)
            .ok()
            .and_then(|id| id.checked_add(self.offset))
            .map(ItemId)
            .unwrap_or(ItemId::NULL)
    }
}

/// 2D simulation-space position
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(&self, other: &Self) -> f32 {
        (*self - *other).length()
    }

    /// Both coordinates are neither NaN nor infinite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Scale the vector down so that its length does not exceed `max`.
    pub fn clamp_length(&self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_remap_offsets_positive_ids() {
        let remap = IdRemap::new(100);
        assert_eq!(remap.offset_id(5), ItemId(105));
        assert_eq!(IdRemap::IDENTITY.offset_id(5), ItemId(5));
    }

    #[test]
    fn test_id_remap_null_and_negative() {
        let remap = IdRemap::new(10);
        assert_eq!(remap.offset_id(0), ItemId::NULL);
        assert_eq!(remap.offset_id(-3), ItemId::NULL);
        assert_eq!(remap.offset_id(70_000), ItemId::NULL);
        assert_eq!(IdRemap::new(u16::MAX).offset_id(1), ItemId::NULL);
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2::new(3.0, 4.0);
        let clamped = v.clamp_length(2.5);
        assert!((clamped.length() - 2.5).abs() < 0.0001);
        assert_eq!(Vec2::new(1.0, 0.0).clamp_length(2.0), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_is_finite() {
        assert!(Vec2::new(1.0, -2.0).is_finite());
        assert!(!Vec2::new(f32::NAN, 0.0).is_finite());
        assert!(!Vec2::new(0.0, f32::INFINITY).is_finite());
    }
}
