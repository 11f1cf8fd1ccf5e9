//! Physics backend boundary
//!
//! Everything below this trait is an external collaborator: the engine
//! hands it cooked shape data and collider descriptions, and reads back
//! resolved positions and contact events. All calls are synchronous.
//!
//! A world may run with no backend at all (headless authoritative roles),
//! so every consumer holds `Option<Box<dyn PhysicsBackend>>` and treats
//! absence as "no collision for now", never as an error.

pub mod software;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::foundation::math::Vec3;
use crate::physics::geometry::CookingIndices;
use crate::world::Entity;

new_key_type! {
    /// Stable handle to a cooked collision shape owned by the backend
    pub struct CookedShapeHandle;

    /// Stable handle to a live collider instance owned by the backend
    pub struct ColliderHandle;
}

/// Surface material properties applied to a collider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Coulomb friction coefficient
    pub friction: f32,
    /// Bounciness in `[0, 1]`
    pub restitution: f32,
    /// Mass density used when deriving collider mass
    pub density: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.6,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

/// Primitive collider shapes, constructed directly by the backend
///
/// Primitives are cheap to build and carry no shared cooked data, so they
/// bypass the cooked-shape cache entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitiveShape {
    /// Axis-aligned box described by half extents
    Box {
        /// Half extents along each axis
        half_extents: Vec3,
    },
    /// Sphere
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Capsule aligned to the Y axis
    Capsule {
        /// Capsule radius
        radius: f32,
        /// Half the cylindrical segment height
        half_height: f32,
    },
}

/// Shape source for a collider instance
#[derive(Debug, Clone, Copy)]
pub enum ShapeRef {
    /// A primitive built directly by the backend
    Primitive(PrimitiveShape),
    /// A cooked shape shared through the cache
    Cooked(CookedShapeHandle),
}

/// Description of a collider instance to create
#[derive(Debug, Clone, Copy)]
pub struct BackendColliderDesc {
    /// Entity the collider represents (reported back in contact events)
    pub entity: Entity,
    /// Shape source
    pub shape: ShapeRef,
    /// Initial world position
    pub position: Vec3,
    /// Whether the collider reports overlaps without physical response
    pub is_trigger: bool,
    /// Whether the backend may move this collider during resolution
    pub dynamic: bool,
    /// Surface material
    pub material: PhysicsMaterial,
    /// Layer membership bits
    pub layer_bits: u32,
    /// Mask of layers this collider interacts with
    pub layer_mask: u32,
}

/// Phase of a contact or trigger event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    /// The pair started touching this step
    Begin,
    /// The pair stopped touching this step
    End,
}

/// Contact or trigger event emitted by the backend
///
/// Events are the only collision query surface: the backend has no
/// synchronous "what touches X" call, and callers must fold these events
/// into their own recorded state.
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    /// Event phase
    pub phase: ContactPhase,
    /// Whether either collider in the pair is a trigger
    pub is_trigger: bool,
    /// First entity of the pair
    pub a: Entity,
    /// Second entity of the pair
    pub b: Entity,
}

/// Result of an in-place mutation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The backend applied the mutation to the live handle
    Applied,
    /// The backend cannot mutate the live handle; the caller must rebuild
    Unsupported,
}

/// The native physics backend boundary
///
/// Cooking calls return `None` when the backend rejects malformed input;
/// that is a deterministic outcome, not an error to propagate.
pub trait PhysicsBackend {
    /// Cook a convex hull from packed `x y z` positions
    fn cook_convex(&mut self, positions: &[f32]) -> Option<CookedShapeHandle>;

    /// Cook an exact triangle mesh from packed positions and 16/32-bit
    /// indices
    fn cook_triangle_mesh(
        &mut self,
        positions: &[f32],
        indices: &CookingIndices<'_>,
    ) -> Option<CookedShapeHandle>;

    /// Destroy a cooked shape
    ///
    /// Callers must guarantee no collider still references the shape.
    fn destroy_shape(&mut self, shape: CookedShapeHandle);

    /// Instantiate a collider; `None` if the description references a
    /// destroyed cooked shape
    fn create_collider(&mut self, desc: &BackendColliderDesc) -> Option<ColliderHandle>;

    /// Remove a collider instance
    ///
    /// Pairs the collider was touching produce `End` events on the next
    /// step.
    fn destroy_collider(&mut self, collider: ColliderHandle);

    /// Move a collider to a new world position
    fn set_position(&mut self, collider: ColliderHandle, position: Vec3);

    /// Read a collider's resolved world position
    fn position(&self, collider: ColliderHandle) -> Option<Vec3>;

    /// Update a collider's material in place
    fn set_material(&mut self, collider: ColliderHandle, material: PhysicsMaterial);

    /// Update a collider's layer bits and mask in place
    fn set_layers(&mut self, collider: ColliderHandle, layer_bits: u32, layer_mask: u32);

    /// Flip a collider's trigger flag in place, if the backend supports
    /// mutating live handles
    fn set_trigger(&mut self, collider: ColliderHandle, is_trigger: bool) -> MutationOutcome;

    /// Advance the simulation one fixed tick, appending contact events
    fn step(&mut self, dt: f32, events: &mut Vec<ContactEvent>);
}
