//! Physics resource layer
//!
//! Sits between renderable geometry and the physics backend: cooks
//! collision shapes once and shares them through refcounted leases,
//! binds declared collider intent to live backend handles, and records
//! backend contact events into queryable per-entity state.

pub mod backend;
pub mod binding;
pub mod contact;
pub mod geometry;
pub mod layers;
pub mod shape_cache;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests;

pub use backend::{
    BackendColliderDesc, ColliderHandle, ContactEvent, ContactPhase, CookedShapeHandle,
    MutationOutcome, PhysicsBackend, PhysicsMaterial, PrimitiveShape, ShapeRef,
};
pub use backend::software::SoftwareBackend;
pub use binding::{
    BindingError, BindingState, ColliderDesc, ColliderShape, PhysicsBinding, PhysicsContext,
};
pub use contact::ContactState;
pub use geometry::{GeometryError, GeometryId, GeometrySource, IndexData, PositionData};
pub use layers::{BuiltinLayers, LayerError, LayerRegistry, ALL_LAYERS};
pub use shape_cache::{CookedShapeCache, CookingMode, GeometryKey, ShapeLease};
