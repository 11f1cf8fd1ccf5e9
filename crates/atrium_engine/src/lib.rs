//! # Atrium Engine
//!
//! The simulation core of a multiplayer 3D world platform: the physics
//! resource and reactive transform layer between renderable geometry and
//! a collision backend that consumes cooked shapes.
//!
//! ## Features
//!
//! - **Cooked Shape Cache**: identity-keyed, refcounted sharing of
//!   cooked collision shapes; identical geometry is never cooked twice
//!   while a cooked copy is alive
//! - **Reactive Transforms**: transform mutations propagate to the
//!   physics backend through change observers instead of per-frame
//!   polling
//! - **Collider Bindings**: declared shape intent stays consistent with
//!   the live backend handle across mutation, with no gap where an
//!   entity has no collider
//! - **Event-Sourced Contacts**: "what touches X" is answered from
//!   recorded enter/exit events, never by polling the backend
//! - **Optional Backend**: worlds run headless (no physics loaded) and
//!   degrade to "no collision" without errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use atrium_engine::prelude::*;
//!
//! fn main() {
//!     atrium_engine::foundation::logging::init();
//!
//!     let mut world = World::with_backend(
//!         PhysicsConfig::default(),
//!         Box::new(SoftwareBackend::new()),
//!     );
//!
//!     let player = world.spawn_at(Vec3::new(0.0, 1.0, 0.0));
//!     world
//!         .attach_collider(
//!             player,
//!             ColliderDesc::new(ColliderShape::Capsule {
//!                 radius: 0.4,
//!                 half_height: 0.6,
//!             })
//!             .dynamic()
//!             .with_layers(["player"]),
//!         )
//!         .expect("valid collider");
//!
//!     // Game logic moves the player; the change is pushed to the
//!     // backend on the next fixed tick
//!     if let Some(position) = world.position_mut(player) {
//!         position.set(1.0, 1.0, 0.0);
//!     }
//!     world.update(1.0 / 30.0);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod physics;
pub mod world;

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::{Config, ConfigError, PhysicsConfig};
    pub use crate::foundation::{
        math::{Mat4, Quat, Transform, Vec3},
        reactive::ReactiveVec3,
    };
    pub use crate::physics::{
        BindingError, BindingState, ColliderDesc, ColliderShape, ContactPhase, ContactState,
        CookedShapeCache, CookingMode, GeometryId, GeometrySource, IndexData, LayerRegistry,
        PhysicsBackend, PhysicsMaterial, PositionData, SoftwareBackend,
    };
    pub use crate::world::{Entity, World};
}
