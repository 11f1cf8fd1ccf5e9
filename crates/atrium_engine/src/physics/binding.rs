//! Collider capability attached to world entities
//!
//! A [`PhysicsBinding`] translates declared shape intent (kind,
//! dimensions, trigger flag, material, layers) into a live backend
//! collider handle and keeps the two consistent under mutation. Mesh
//! shapes go through the cooked-shape cache; primitives are cheap and
//! built directly by the backend.
//!
//! State machine: `Uninitialized -> Built -> Stale -> Built | Destroyed`.
//! Shape-defining setters (shape, trigger flag) mark the binding stale;
//! the replacement handle is built before the previous one is destroyed,
//! so at every observable point the entity has either the old or the new
//! collider, never neither. The one exception is a cook that
//! legitimately fails, where collision degrades to "none".

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::foundation::math::Vec3;
use crate::physics::backend::{
    BackendColliderDesc, ColliderHandle, MutationOutcome, PhysicsBackend, PhysicsMaterial,
    PrimitiveShape, ShapeRef,
};
use crate::physics::geometry::GeometrySource;
use crate::physics::layers::{LayerError, LayerRegistry, ALL_LAYERS};
use crate::physics::shape_cache::{CookedShapeCache, CookingMode, ShapeLease};
use crate::world::Entity;

/// Binding errors
///
/// Only programmer errors surface here (bad dimensions, unknown layer
/// names, use after destroy); backend absence and cook failures degrade
/// silently to "no collision" instead.
#[derive(Error, Debug)]
pub enum BindingError {
    /// Shape dimensions are zero or negative
    #[error("invalid collider dimensions: {0}")]
    InvalidDimensions(String),

    /// A layer name is not registered
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// The binding was already destroyed
    #[error("binding has been destroyed")]
    Destroyed,
}

/// Declared collider shape
#[derive(Debug, Clone)]
pub enum ColliderShape {
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
    /// Cooked mesh shape shared through the cache
    Mesh {
        /// Source geometry (shared with the render side)
        geometry: Arc<GeometrySource>,
        /// Cooking mode
        mode: CookingMode,
    },
}

impl ColliderShape {
    fn validate(&self) -> Result<(), BindingError> {
        match self {
            Self::Box { half_extents } => {
                if half_extents.x <= 0.0 || half_extents.y <= 0.0 || half_extents.z <= 0.0 {
                    return Err(BindingError::InvalidDimensions(format!(
                        "box half extents {half_extents:?}"
                    )));
                }
            }
            Self::Sphere { radius } => {
                if *radius <= 0.0 {
                    return Err(BindingError::InvalidDimensions(format!(
                        "sphere radius {radius}"
                    )));
                }
            }
            Self::Capsule {
                radius,
                half_height,
            } => {
                if *radius <= 0.0 || *half_height <= 0.0 {
                    return Err(BindingError::InvalidDimensions(format!(
                        "capsule radius {radius}, half height {half_height}"
                    )));
                }
            }
            Self::Mesh { geometry, .. } => {
                if geometry.vertex_count() == 0 {
                    return Err(BindingError::InvalidDimensions(
                        "mesh geometry has no vertices".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Collider description used when attaching a binding to an entity
#[derive(Debug, Clone)]
pub struct ColliderDesc {
    /// Declared shape
    pub shape: ColliderShape,
    /// Whether the collider reports overlaps without physical response
    pub is_trigger: bool,
    /// Whether the backend may move the collider during resolution
    pub dynamic: bool,
    /// Surface material (`None` = the world's configured default)
    pub material: Option<PhysicsMaterial>,
    /// Layer membership names
    pub layers: Vec<String>,
    /// Names of layers this collider interacts with (`None` = all)
    pub collides_with: Option<Vec<String>>,
}

impl ColliderDesc {
    /// Create a description with default settings
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            is_trigger: false,
            dynamic: false,
            material: None,
            layers: Vec::new(),
            collides_with: None,
        }
    }

    /// Mark the collider as a trigger volume
    pub fn as_trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }

    /// Allow the backend to move the collider during resolution
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Set the surface material
    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = Some(material);
        self
    }

    /// Set layer membership by name
    pub fn with_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layers = layers.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict which layers the collider interacts with
    pub fn collides_with<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collides_with = Some(layers.into_iter().map(Into::into).collect());
        self
    }
}

/// Logical build state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Created but never attached
    Uninitialized,
    /// Backend handle matches declared intent
    Built,
    /// Declared intent changed (or the backend was unavailable); the
    /// handle needs rebuilding
    Stale,
    /// Torn down with its owning entity
    Destroyed,
}

/// Shared resources a binding operates against
///
/// Owned by the world and lent out per call; nothing here is global.
pub struct PhysicsContext<'a> {
    /// Backend, absent on roles without physics
    pub backend: Option<&'a mut (dyn PhysicsBackend + 'static)>,
    /// The world's cooked-shape cache
    pub cache: &'a mut CookedShapeCache,
    /// The world's layer registry
    pub layers: &'a LayerRegistry,
}

impl PhysicsContext<'_> {
    fn backend(&mut self) -> Option<&mut (dyn PhysicsBackend + 'static)> {
        self.backend.as_deref_mut()
    }
}

/// Per-entity collider capability
pub struct PhysicsBinding {
    entity: Entity,
    shape: ColliderShape,
    is_trigger: bool,
    dynamic: bool,
    material: PhysicsMaterial,
    layers: Vec<String>,
    collides_with: Option<Vec<String>>,
    state: BindingState,
    // The trigger flag alone went stale; rebuild may use the cheap
    // in-place backend path instead of replacing the collider.
    trigger_only_stale: bool,
    lease: Option<ShapeLease>,
    collider: Option<ColliderHandle>,
}

impl PhysicsBinding {
    /// Create a binding from a collider description
    pub fn new(entity: Entity, desc: ColliderDesc) -> Result<Self, BindingError> {
        desc.shape.validate()?;
        Ok(Self {
            entity,
            shape: desc.shape,
            is_trigger: desc.is_trigger,
            dynamic: desc.dynamic,
            material: desc.material.unwrap_or_default(),
            layers: desc.layers,
            collides_with: desc.collides_with,
            state: BindingState::Uninitialized,
            trigger_only_stale: false,
            lease: None,
            collider: None,
        })
    }

    /// Owning entity
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Current build state
    pub fn state(&self) -> BindingState {
        self.state
    }

    /// Declared shape
    pub fn shape(&self) -> &ColliderShape {
        &self.shape
    }

    /// Whether the collider is a trigger volume
    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    /// Whether the backend may move the collider
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Current material
    pub fn material(&self) -> PhysicsMaterial {
        self.material
    }

    /// Live backend collider handle, if built
    pub fn collider_handle(&self) -> Option<ColliderHandle> {
        self.collider
    }

    /// Current cache lease, held only for mesh shapes
    pub fn lease(&self) -> Option<&ShapeLease> {
        self.lease.as_ref()
    }

    /// Build the initial backend handle
    ///
    /// With no backend loaded the binding becomes inert (no handle, no
    /// lease) and waits in `Stale`; that is a normal state on headless
    /// roles, not an error.
    pub fn attach(
        &mut self,
        ctx: &mut PhysicsContext<'_>,
        position: Vec3,
    ) -> Result<(), BindingError> {
        self.ensure_live()?;
        self.build(ctx, position)
    }

    /// Replace the declared shape (kind or dimensions); marks the
    /// binding stale
    pub fn set_shape(&mut self, shape: ColliderShape) -> Result<(), BindingError> {
        self.ensure_live()?;
        shape.validate()?;
        self.shape = shape;
        if self.state != BindingState::Uninitialized {
            self.state = BindingState::Stale;
            self.trigger_only_stale = false;
        }
        Ok(())
    }

    /// Change the trigger flag; marks the binding stale
    ///
    /// Rebuild applies the flag to the live handle in place when the
    /// backend supports that mutation, and replaces the collider when it
    /// does not.
    pub fn set_trigger(&mut self, is_trigger: bool) -> Result<(), BindingError> {
        self.ensure_live()?;
        if self.is_trigger == is_trigger {
            return Ok(());
        }
        self.is_trigger = is_trigger;
        if self.state == BindingState::Built {
            self.state = BindingState::Stale;
            self.trigger_only_stale = true;
        }
        Ok(())
    }

    /// Update the surface material on the live handle; does not change
    /// build state
    pub fn set_material(
        &mut self,
        backend: Option<&mut (dyn PhysicsBackend + 'static)>,
        material: PhysicsMaterial,
    ) -> Result<(), BindingError> {
        self.ensure_live()?;
        self.material = material;
        if let (Some(collider), Some(backend)) = (self.collider, backend) {
            backend.set_material(collider, material);
        }
        Ok(())
    }

    /// Update layer membership on the live handle; does not change build
    /// state
    ///
    /// Unknown names are rejected before any stored state changes.
    pub fn set_layers<I, S>(
        &mut self,
        backend: Option<&mut (dyn PhysicsBackend + 'static)>,
        registry: &LayerRegistry,
        layers: I,
    ) -> Result<(), BindingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_live()?;
        let layers: Vec<String> = layers.into_iter().map(Into::into).collect();
        let bits = registry.resolve_set(layers.iter().map(String::as_str))?;
        let mask = self.resolve_mask(registry)?;

        self.layers = layers;
        if let (Some(collider), Some(backend)) = (self.collider, backend) {
            backend.set_layers(collider, bits, mask);
        }
        Ok(())
    }

    /// Rebuild the backend handle to match declared intent
    ///
    /// No-op when already `Built`. Called by the world after any
    /// staleness-marking setter.
    pub fn rebuild(
        &mut self,
        ctx: &mut PhysicsContext<'_>,
        position: Vec3,
    ) -> Result<(), BindingError> {
        self.ensure_live()?;
        if self.state != BindingState::Stale {
            return Ok(());
        }

        if self.trigger_only_stale {
            self.trigger_only_stale = false;
            if let (Some(collider), Some(backend)) = (self.collider, ctx.backend()) {
                match backend.set_trigger(collider, self.is_trigger) {
                    MutationOutcome::Applied => {
                        self.state = BindingState::Built;
                        return Ok(());
                    }
                    MutationOutcome::Unsupported => {
                        warn!(
                            "backend cannot flip trigger flag in place; \
                             rebuilding collider for entity {:?}",
                            self.entity
                        );
                    }
                }
            }
        }

        self.build(ctx, position)
    }

    /// Tear down the backend handle and release the lease
    ///
    /// Idempotent; called from the owning entity's destroy hook before
    /// the entity leaves the world.
    pub fn destroy(&mut self, ctx: &mut PhysicsContext<'_>) {
        if self.state == BindingState::Destroyed {
            return;
        }
        self.teardown_current(ctx);
        self.state = BindingState::Destroyed;
        debug!("destroyed physics binding for entity {:?}", self.entity);
    }

    fn ensure_live(&self) -> Result<(), BindingError> {
        if self.state == BindingState::Destroyed {
            Err(BindingError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn resolve_mask(&self, registry: &LayerRegistry) -> Result<u32, LayerError> {
        match &self.collides_with {
            Some(names) => registry.resolve_set(names.iter().map(String::as_str)),
            None => Ok(ALL_LAYERS),
        }
    }

    /// Build a fresh backend handle and swap it in
    ///
    /// The replacement shape is acquired before the current handle is
    /// touched, so a cache hit on the same geometry keeps the record
    /// alive across the swap.
    fn build(&mut self, ctx: &mut PhysicsContext<'_>, position: Vec3) -> Result<(), BindingError> {
        let layer_bits = ctx
            .layers
            .resolve_set(self.layers.iter().map(String::as_str))?;
        let layer_mask = self.resolve_mask(ctx.layers)?;

        if ctx.backend.is_none() {
            warn!(
                "physics backend unavailable; collision disabled for entity {:?}",
                self.entity
            );
            self.teardown_current(ctx);
            self.state = BindingState::Stale;
            return Ok(());
        }

        let (new_lease, shape_ref) = match &self.shape {
            ColliderShape::Mesh { geometry, mode } => {
                let Some(lease) = ctx.cache.acquire(ctx.backend.as_deref_mut(), geometry, *mode)
                else {
                    warn!(
                        "shape cook failed; collision disabled for entity {:?}",
                        self.entity
                    );
                    self.teardown_current(ctx);
                    self.state = BindingState::Stale;
                    return Ok(());
                };
                let handle = lease.handle();
                (Some(lease), ShapeRef::Cooked(handle))
            }
            ColliderShape::Box { half_extents } => (
                None,
                ShapeRef::Primitive(PrimitiveShape::Box {
                    half_extents: *half_extents,
                }),
            ),
            ColliderShape::Sphere { radius } => (
                None,
                ShapeRef::Primitive(PrimitiveShape::Sphere { radius: *radius }),
            ),
            ColliderShape::Capsule {
                radius,
                half_height,
            } => (
                None,
                ShapeRef::Primitive(PrimitiveShape::Capsule {
                    radius: *radius,
                    half_height: *half_height,
                }),
            ),
        };

        let desc = BackendColliderDesc {
            entity: self.entity,
            shape: shape_ref,
            position,
            is_trigger: self.is_trigger,
            dynamic: self.dynamic,
            material: self.material,
            layer_bits,
            layer_mask,
        };

        let new_collider = ctx.backend().and_then(|b| b.create_collider(&desc));
        match new_collider {
            Some(handle) => {
                self.teardown_current(ctx);
                self.collider = Some(handle);
                self.lease = new_lease;
                self.state = BindingState::Built;
                debug!("built collider for entity {:?}", self.entity);
                Ok(())
            }
            None => {
                if let Some(mut lease) = new_lease {
                    ctx.cache.release(ctx.backend.as_deref_mut(), &mut lease);
                }
                warn!(
                    "collider creation failed; collision disabled for entity {:?}",
                    self.entity
                );
                self.teardown_current(ctx);
                self.state = BindingState::Stale;
                Ok(())
            }
        }
    }

    fn teardown_current(&mut self, ctx: &mut PhysicsContext<'_>) {
        if let Some(collider) = self.collider.take() {
            if let Some(backend) = ctx.backend() {
                backend.destroy_collider(collider);
            }
        }
        if let Some(mut lease) = self.lease.take() {
            ctx.cache.release(ctx.backend.as_deref_mut(), &mut lease);
        }
    }
}
