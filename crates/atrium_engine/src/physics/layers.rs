//! Collision layer system for filtering collision detection
//!
//! Game code refers to layers by name; the backend filters on a 32-bit
//! mask. The registry owns the mapping. Built-in layers cover the common
//! world roles; games register custom names at startup and the registry
//! allocates the remaining bits.

use std::collections::HashMap;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Built-in collision layer bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BuiltinLayers: u32 {
        /// Default layer for entities that declare nothing else
        const DEFAULT = 1 << 0;
        /// Static environment geometry
        const ENVIRONMENT = 1 << 1;
        /// Player characters
        const PLAYER = 1 << 2;
        /// Dynamic props
        const PROP = 1 << 3;
        /// Projectiles
        const PROJECTILE = 1 << 4;
        /// Trigger volumes
        const TRIGGER = 1 << 5;
        /// Vehicles
        const VEHICLE = 1 << 6;
        /// Pickups and collectibles
        const PICKUP = 1 << 7;
    }
}

/// Mask matching every layer
pub const ALL_LAYERS: u32 = u32::MAX;

/// Collision layer errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayerError {
    /// A name was used without being registered first
    #[error("unknown collision layer '{0}'")]
    UnknownLayer(String),

    /// All 32 layer bits are taken
    #[error("collision layer capacity exhausted (32 layers)")]
    Exhausted,
}

/// Registry mapping stable layer names to bits
///
/// Owned by the world instance; bindings resolve their declared layer
/// names through it when they build backend state. Unknown names are
/// rejected rather than silently ignored, since a typo that resolves to
/// "no layers" would disable collision without a trace.
pub struct LayerRegistry {
    bits_by_name: HashMap<String, u32>,
    next_bit: u32,
}

impl LayerRegistry {
    /// Create a registry pre-populated with the built-in layers
    pub fn new() -> Self {
        let mut bits_by_name = HashMap::new();
        for (name, layer) in [
            ("default", BuiltinLayers::DEFAULT),
            ("environment", BuiltinLayers::ENVIRONMENT),
            ("player", BuiltinLayers::PLAYER),
            ("prop", BuiltinLayers::PROP),
            ("projectile", BuiltinLayers::PROJECTILE),
            ("trigger", BuiltinLayers::TRIGGER),
            ("vehicle", BuiltinLayers::VEHICLE),
            ("pickup", BuiltinLayers::PICKUP),
        ] {
            bits_by_name.insert(name.to_string(), layer.bits());
        }

        Self {
            bits_by_name,
            next_bit: 8,
        }
    }

    /// Register a custom layer name, returning its bit
    ///
    /// Registering an existing name returns the already-assigned bit.
    pub fn register(&mut self, name: &str) -> Result<u32, LayerError> {
        if let Some(&bits) = self.bits_by_name.get(name) {
            return Ok(bits);
        }
        if self.next_bit >= 32 {
            return Err(LayerError::Exhausted);
        }
        let bits = 1u32 << self.next_bit;
        self.next_bit += 1;
        self.bits_by_name.insert(name.to_string(), bits);
        Ok(bits)
    }

    /// Resolve a single layer name to its bit
    pub fn resolve(&self, name: &str) -> Result<u32, LayerError> {
        self.bits_by_name
            .get(name)
            .copied()
            .ok_or_else(|| LayerError::UnknownLayer(name.to_string()))
    }

    /// Resolve a set of layer names to a combined bitmask
    ///
    /// An empty set resolves to the default layer.
    pub fn resolve_set<'a, I>(&self, names: I) -> Result<u32, LayerError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut bits = 0u32;
        for name in names {
            bits |= self.resolve(name)?;
        }
        if bits == 0 {
            bits = BuiltinLayers::DEFAULT.bits();
        }
        Ok(bits)
    }

    /// Check if two colliders should interact based on their layer bits
    /// and masks
    ///
    /// A's layer must be in B's mask and B's layer must be in A's mask.
    pub fn should_collide(bits_a: u32, mask_a: u32, bits_b: u32, mask_b: u32) -> bool {
        (bits_a & mask_b) != 0 && (bits_b & mask_a) != 0
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
