//! World: entity container and fixed-tick simulation loop
//!
//! One `World` is one logical simulation: a cooperative, single-threaded
//! tick loop whose phases run in a fixed order. Game logic mutates
//! reactive transforms, dirty transforms are pushed into the physics
//! backend, the backend steps, resolved positions are pulled back
//! (silently, so they are not re-pushed next tick), and contact events
//! are folded into per-entity state and dispatched to subscribers.
//!
//! The world owns its cooked-shape cache, layer registry, and backend
//! instance outright; two worlds never share cached shapes, which keeps
//! tests and multi-world servers isolated by construction.

pub mod entity;
pub mod events;

pub use entity::Entity;
pub use events::{ContactHandler, ContactRouter};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, warn};

use crate::config::PhysicsConfig;
use crate::foundation::math::Vec3;
use crate::foundation::reactive::ReactiveVec3;
use crate::physics::backend::{ContactEvent, ContactPhase, PhysicsBackend, PhysicsMaterial};
use crate::physics::binding::{
    BindingError, ColliderDesc, ColliderShape, PhysicsBinding, PhysicsContext,
};
use crate::physics::contact::ContactState;
use crate::physics::geometry::GeometrySource;
use crate::physics::layers::LayerRegistry;
use crate::physics::shape_cache::{CookedShapeCache, CookingMode, ShapeLease};

struct EntityRecord {
    position: ReactiveVec3,
    binding: Option<PhysicsBinding>,
    contacts: ContactState,
    triggers: ContactState,
}

/// A world instance
pub struct World {
    config: PhysicsConfig,
    backend: Option<Box<dyn PhysicsBackend>>,
    cache: CookedShapeCache,
    layers: LayerRegistry,
    entities: HashMap<Entity, EntityRecord>,
    next_entity_id: u32,
    // Entities whose transform changed since the last tick; filled by
    // ReactiveVec3 observers, drained once per fixed tick.
    dirty: Rc<RefCell<HashSet<Entity>>>,
    dirty_scratch: Vec<Entity>,
    events_scratch: Vec<ContactEvent>,
    router: ContactRouter,
    accumulator: f32,
    prewarmed: Vec<ShapeLease>,
}

impl World {
    /// Create a world with no physics backend (headless role)
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            backend: None,
            cache: CookedShapeCache::new(),
            layers: LayerRegistry::new(),
            entities: HashMap::new(),
            next_entity_id: 0,
            dirty: Rc::new(RefCell::new(HashSet::new())),
            dirty_scratch: Vec::new(),
            events_scratch: Vec::new(),
            router: ContactRouter::new(),
            accumulator: 0.0,
            prewarmed: Vec::new(),
        }
    }

    /// Create a world backed by the given physics backend
    ///
    /// The backend is discarded when the configuration disables physics
    /// for this role.
    pub fn with_backend(config: PhysicsConfig, backend: Box<dyn PhysicsBackend>) -> Self {
        let mut world = Self::new(config);
        if world.config.enabled {
            world.backend = Some(backend);
        } else {
            warn!("physics disabled by configuration; running without a backend");
        }
        world
    }

    /// The world's physics configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Whether a physics backend is loaded
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// The world's cooked-shape cache (read-only introspection)
    pub fn shape_cache(&self) -> &CookedShapeCache {
        &self.cache
    }

    /// The world's collision layer registry
    pub fn layers_mut(&mut self) -> &mut LayerRegistry {
        &mut self.layers
    }

    /// Create an entity at the origin
    pub fn spawn(&mut self) -> Entity {
        self.spawn_at(Vec3::zeros())
    }

    /// Create an entity at a position
    pub fn spawn_at(&mut self, position: Vec3) -> Entity {
        let entity = Entity::new(self.next_entity_id);
        self.next_entity_id += 1;

        let mut reactive = ReactiveVec3::from(position);
        let dirty = Rc::clone(&self.dirty);
        reactive.on_change(Box::new(move |_| {
            dirty.borrow_mut().insert(entity);
        }));

        self.entities.insert(
            entity,
            EntityRecord {
                position: reactive,
                binding: None,
                contacts: ContactState::default(),
                triggers: ContactState::default(),
            },
        );
        debug!("spawned entity {entity:?}");
        entity
    }

    /// Remove an entity, tearing down its physics binding first
    pub fn despawn(&mut self, entity: Entity) {
        let Some(mut record) = self.entities.remove(&entity) else {
            return;
        };
        if let Some(binding) = record.binding.as_mut() {
            let mut ctx = PhysicsContext {
                backend: self.backend.as_deref_mut(),
                cache: &mut self.cache,
                layers: &self.layers,
            };
            binding.destroy(&mut ctx);
        }
        record.position.clear_on_change();
        self.router.unsubscribe_all(entity);
        self.dirty.borrow_mut().remove(&entity);
        debug!("despawned entity {entity:?}");
    }

    /// Whether an entity is alive
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Current position of an entity
    pub fn position(&self, entity: Entity) -> Option<Vec3> {
        self.entities.get(&entity).map(|r| r.position.get())
    }

    /// Mutable access to an entity's reactive position
    ///
    /// Any mutation through the returned reference marks the entity's
    /// physics transform dirty for the next tick.
    pub fn position_mut(&mut self, entity: Entity) -> Option<&mut ReactiveVec3> {
        self.entities.get_mut(&entity).map(|r| &mut r.position)
    }

    /// Attach a collider capability to an entity
    pub fn attach_collider(
        &mut self,
        entity: Entity,
        desc: ColliderDesc,
    ) -> Result<(), BindingError> {
        let Some(record) = self.entities.get_mut(&entity) else {
            warn!("attach_collider on unknown entity {entity:?}");
            return Ok(());
        };
        let mut desc = desc;
        if desc.material.is_none() {
            desc.material = Some(self.config.default_material);
        }
        let mut binding = PhysicsBinding::new(entity, desc)?;
        let position = record.position.get();
        let mut ctx = PhysicsContext {
            backend: self.backend.as_deref_mut(),
            cache: &mut self.cache,
            layers: &self.layers,
        };
        binding.attach(&mut ctx, position)?;
        record.binding = Some(binding);
        Ok(())
    }

    /// Detach and destroy an entity's collider capability
    pub fn detach_collider(&mut self, entity: Entity) {
        let Some(record) = self.entities.get_mut(&entity) else {
            return;
        };
        if let Some(mut binding) = record.binding.take() {
            let mut ctx = PhysicsContext {
                backend: self.backend.as_deref_mut(),
                cache: &mut self.cache,
                layers: &self.layers,
            };
            binding.destroy(&mut ctx);
        }
    }

    /// An entity's physics binding
    pub fn binding(&self, entity: Entity) -> Option<&PhysicsBinding> {
        self.entities.get(&entity).and_then(|r| r.binding.as_ref())
    }

    /// Replace a collider's shape and rebuild its backend handle
    pub fn set_collider_shape(
        &mut self,
        entity: Entity,
        shape: ColliderShape,
    ) -> Result<(), BindingError> {
        let Some(record) = self.entities.get_mut(&entity) else {
            warn!("set_collider_shape on unknown entity {entity:?}");
            return Ok(());
        };
        let Some(binding) = record.binding.as_mut() else {
            warn!("set_collider_shape on entity {entity:?} without a collider");
            return Ok(());
        };
        binding.set_shape(shape)?;
        let position = record.position.get();
        let mut ctx = PhysicsContext {
            backend: self.backend.as_deref_mut(),
            cache: &mut self.cache,
            layers: &self.layers,
        };
        binding.rebuild(&mut ctx, position)
    }

    /// Change a collider's trigger flag and rebuild as needed
    pub fn set_collider_trigger(
        &mut self,
        entity: Entity,
        is_trigger: bool,
    ) -> Result<(), BindingError> {
        let Some(record) = self.entities.get_mut(&entity) else {
            warn!("set_collider_trigger on unknown entity {entity:?}");
            return Ok(());
        };
        let Some(binding) = record.binding.as_mut() else {
            warn!("set_collider_trigger on entity {entity:?} without a collider");
            return Ok(());
        };
        binding.set_trigger(is_trigger)?;
        let position = record.position.get();
        let mut ctx = PhysicsContext {
            backend: self.backend.as_deref_mut(),
            cache: &mut self.cache,
            layers: &self.layers,
        };
        binding.rebuild(&mut ctx, position)
    }

    /// Update a collider's material in place
    pub fn set_collider_material(
        &mut self,
        entity: Entity,
        material: PhysicsMaterial,
    ) -> Result<(), BindingError> {
        let Some(record) = self.entities.get_mut(&entity) else {
            warn!("set_collider_material on unknown entity {entity:?}");
            return Ok(());
        };
        let Some(binding) = record.binding.as_mut() else {
            warn!("set_collider_material on entity {entity:?} without a collider");
            return Ok(());
        };
        binding.set_material(self.backend.as_deref_mut(), material)
    }

    /// Update a collider's layer membership in place
    pub fn set_collider_layers<I, S>(&mut self, entity: Entity, layers: I) -> Result<(), BindingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(record) = self.entities.get_mut(&entity) else {
            warn!("set_collider_layers on unknown entity {entity:?}");
            return Ok(());
        };
        let Some(binding) = record.binding.as_mut() else {
            warn!("set_collider_layers on entity {entity:?} without a collider");
            return Ok(());
        };
        binding.set_layers(self.backend.as_deref_mut(), &self.layers, layers)
    }

    /// Cook a shape ahead of first use
    ///
    /// Cooking is synchronous CPU work; doing it during loading avoids a
    /// latency spike the first time a mesh collider is built mid-play.
    /// The world keeps one lease so the cooked shape stays alive.
    pub fn prewarm_shape(&mut self, geometry: &GeometrySource, mode: CookingMode) {
        if let Some(lease) = self
            .cache
            .acquire(self.backend.as_deref_mut(), geometry, mode)
        {
            self.prewarmed.push(lease);
        }
    }

    /// Entities currently in solid contact with `entity`
    ///
    /// Populated exclusively from backend enter/exit events; there is no
    /// synchronous backend query behind this.
    pub fn touching(&self, entity: Entity) -> Option<&ContactState> {
        self.entities.get(&entity).map(|r| &r.contacts)
    }

    /// Entities currently overlapping `entity`'s trigger volume (or
    /// whose trigger volume `entity` overlaps)
    pub fn trigger_overlaps(&self, entity: Entity) -> Option<&ContactState> {
        self.entities.get(&entity).map(|r| &r.triggers)
    }

    /// Whether two entities are currently in solid contact
    pub fn is_touching(&self, a: Entity, b: Entity) -> bool {
        self.touching(a).is_some_and(|state| state.is_touching(b))
    }

    /// Subscribe to collision begin events for an entity
    pub fn on_collision_enter(&mut self, entity: Entity, handler: ContactHandler) {
        self.router.on_collision_enter(entity, handler);
    }

    /// Subscribe to collision end events for an entity
    pub fn on_collision_exit(&mut self, entity: Entity, handler: ContactHandler) {
        self.router.on_collision_exit(entity, handler);
    }

    /// Subscribe to trigger begin events for an entity
    pub fn on_trigger_enter(&mut self, entity: Entity, handler: ContactHandler) {
        self.router.on_trigger_enter(entity, handler);
    }

    /// Subscribe to trigger end events for an entity
    pub fn on_trigger_exit(&mut self, entity: Entity, handler: ContactHandler) {
        self.router.on_trigger_exit(entity, handler);
    }

    /// Advance the simulation by `dt` seconds of wall time
    ///
    /// Consumes whole fixed ticks from the accumulated time; a long
    /// frame is bounded by `max_ticks_per_update` and the remaining
    /// backlog is shed.
    pub fn update(&mut self, dt: f32) {
        self.accumulator += dt;
        let tick = self.config.tick_interval();

        let mut ticks = 0;
        while self.accumulator >= tick && ticks < self.config.max_ticks_per_update {
            self.accumulator -= tick;
            self.fixed_step(tick);
            ticks += 1;
        }

        if self.accumulator >= tick {
            debug!(
                "simulation falling behind; shedding {:.3}s of backlog",
                self.accumulator
            );
            self.accumulator %= tick;
        }
    }

    /// One fixed tick: push dirty transforms, step the backend, pull
    /// resolved transforms back, fold and dispatch contact events
    fn fixed_step(&mut self, dt: f32) {
        self.dirty_scratch.clear();
        self.dirty_scratch.extend(self.dirty.borrow_mut().drain());

        if let Some(backend) = self.backend.as_deref_mut() {
            for &entity in &self.dirty_scratch {
                let Some(record) = self.entities.get(&entity) else {
                    continue;
                };
                let Some(handle) = record
                    .binding
                    .as_ref()
                    .and_then(PhysicsBinding::collider_handle)
                else {
                    continue;
                };
                backend.set_position(handle, record.position.get());
            }
        }

        let mut events = std::mem::take(&mut self.events_scratch);
        if let Some(backend) = self.backend.as_deref_mut() {
            backend.step(dt, &mut events);
        }

        // Write resolved positions back without notifying observers;
        // notifying would re-mark the transform dirty and push the same
        // value out again next tick.
        if let Some(backend) = self.backend.as_deref() {
            for record in self.entities.values_mut() {
                let Some(binding) = record.binding.as_ref() else {
                    continue;
                };
                if !binding.is_dynamic() {
                    continue;
                }
                let Some(handle) = binding.collider_handle() else {
                    continue;
                };
                if let Some(resolved) = backend.position(handle) {
                    record.position.write_back(resolved);
                }
            }
        }

        for record in self.entities.values_mut() {
            record.contacts.clear_tick_data();
            record.triggers.clear_tick_data();
        }
        for event in &events {
            for (target, other) in [(event.a, event.b), (event.b, event.a)] {
                if let Some(record) = self.entities.get_mut(&target) {
                    let state = if event.is_trigger {
                        &mut record.triggers
                    } else {
                        &mut record.contacts
                    };
                    match event.phase {
                        ContactPhase::Begin => state.record_begin(other),
                        ContactPhase::End => state.record_end(other),
                    }
                }
            }
            self.router.dispatch(event);
        }

        events.clear();
        self.events_scratch = events;
    }
}

impl Drop for World {
    fn drop(&mut self) {
        let mut entities = std::mem::take(&mut self.entities);
        for record in entities.values_mut() {
            if let Some(binding) = record.binding.as_mut() {
                let mut ctx = PhysicsContext {
                    backend: self.backend.as_deref_mut(),
                    cache: &mut self.cache,
                    layers: &self.layers,
                };
                binding.destroy(&mut ctx);
            }
        }
        let mut prewarmed = std::mem::take(&mut self.prewarmed);
        for lease in &mut prewarmed {
            self.cache.release(self.backend.as_deref_mut(), lease);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::backend::software::SoftwareBackend;
    use crate::physics::geometry::{IndexData, PositionData};
    use crate::physics::test_support::{tetrahedron_geometry, triangle_geometry, RecordingBackend};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn recording_world() -> World {
        World::with_backend(PhysicsConfig::default(), Box::new(RecordingBackend::new()))
    }

    fn tick(world: &mut World) {
        let dt = world.config().tick_interval();
        world.update(dt);
    }

    fn floor_geometry() -> Arc<GeometrySource> {
        Arc::new(
            GeometrySource::new(PositionData::Planar(vec![
                -5.0, 0.0, -5.0, //
                5.0, 0.0, -5.0, //
                5.0, 0.0, 5.0, //
                -5.0, 0.0, 5.0, //
            ]))
            .with_indices(IndexData::U16(vec![0, 1, 2, 0, 2, 3])),
        )
    }

    #[test]
    fn test_transform_mutation_is_pushed_to_backend() {
        let mut world = World::with_backend(
            PhysicsConfig::default(),
            Box::new(SoftwareBackend::new()),
        );
        let a = world.spawn_at(Vec3::zeros());
        let b = world.spawn_at(Vec3::new(10.0, 0.0, 0.0));
        for entity in [a, b] {
            world
                .attach_collider(
                    entity,
                    ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 }),
                )
                .unwrap();
        }

        tick(&mut world);
        assert!(!world.is_touching(a, b));

        // Game logic moves b into overlap; the dirty transform must reach
        // the backend on the next tick, observable as a new contact
        world.position_mut(b).unwrap().set(0.4, 0.0, 0.0);
        tick(&mut world);
        assert!(world.is_touching(a, b));
    }

    #[test]
    fn test_resolved_position_written_back_silently() {
        let mut world = World::with_backend(
            PhysicsConfig::default(),
            Box::new(SoftwareBackend::new()),
        );
        let floor = world.spawn();
        world
            .attach_collider(
                floor,
                ColliderDesc::new(ColliderShape::Mesh {
                    geometry: floor_geometry(),
                    mode: CookingMode::TriangleMesh,
                })
                .with_layers(["environment"]),
            )
            .unwrap();

        let ball = world.spawn_at(Vec3::new(0.0, 0.2, 0.0));
        world
            .attach_collider(
                ball,
                ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 }).dynamic(),
            )
            .unwrap();

        tick(&mut world);

        // The backend de-penetrated the ball; the corrected position is
        // visible in game state
        assert_relative_eq!(world.position(ball).unwrap().y, 0.5, epsilon = 1e-4);

        // The write-back must not have re-marked the transform dirty:
        // an idle tick pushes nothing and the position stays put
        tick(&mut world);
        assert_relative_eq!(world.position(ball).unwrap().y, 0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_contact_events_fold_into_touching_sets() {
        let mut world = World::with_backend(
            PhysicsConfig::default(),
            Box::new(SoftwareBackend::new()),
        );
        let a = world.spawn_at(Vec3::zeros());
        let b = world.spawn_at(Vec3::new(0.4, 0.0, 0.0));
        for entity in [a, b] {
            world
                .attach_collider(
                    entity,
                    ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 }),
                )
                .unwrap();
        }

        tick(&mut world);
        assert!(world.is_touching(a, b));
        assert!(world.is_touching(b, a));
        assert_eq!(world.touching(a).unwrap().entered(), &[b]);

        // Move apart: exit is recorded on the next tick
        world.position_mut(b).unwrap().set_x(5.0);
        tick(&mut world);
        assert!(!world.is_touching(a, b));
        assert_eq!(world.touching(a).unwrap().exited(), &[b]);
    }

    #[test]
    fn test_contact_handlers_fire_on_enter_and_exit() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut world = World::with_backend(
            PhysicsConfig::default(),
            Box::new(SoftwareBackend::new()),
        );
        let a = world.spawn_at(Vec3::zeros());
        let b = world.spawn_at(Vec3::new(0.4, 0.0, 0.0));
        for entity in [a, b] {
            world
                .attach_collider(
                    entity,
                    ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 }),
                )
                .unwrap();
        }

        let entered = Rc::new(RefCell::new(Vec::new()));
        let exited = Rc::new(RefCell::new(Vec::new()));
        {
            let entered = Rc::clone(&entered);
            world.on_collision_enter(a, Box::new(move |other| entered.borrow_mut().push(other)));
        }
        {
            let exited = Rc::clone(&exited);
            world.on_collision_exit(a, Box::new(move |other| exited.borrow_mut().push(other)));
        }

        tick(&mut world);
        assert_eq!(entered.borrow().as_slice(), &[b]);

        world.position_mut(b).unwrap().set_x(5.0);
        tick(&mut world);
        assert_eq!(exited.borrow().as_slice(), &[b]);
    }

    #[test]
    fn test_trigger_volume_routes_to_trigger_state() {
        let mut world = World::with_backend(
            PhysicsConfig::default(),
            Box::new(SoftwareBackend::new()),
        );
        let zone = world.spawn_at(Vec3::zeros());
        world
            .attach_collider(
                zone,
                ColliderDesc::new(ColliderShape::Sphere { radius: 2.0 }).as_trigger(),
            )
            .unwrap();
        let visitor = world.spawn_at(Vec3::new(1.0, 0.0, 0.0));
        world
            .attach_collider(
                visitor,
                ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 }),
            )
            .unwrap();

        tick(&mut world);

        assert!(world
            .trigger_overlaps(zone)
            .unwrap()
            .is_touching(visitor));
        // Solid contact state stays empty for trigger pairs
        assert!(!world.is_touching(zone, visitor));
    }

    #[test]
    fn test_despawn_releases_lease_and_collider() {
        let mut world = recording_world();
        let entity = world.spawn();
        world
            .attach_collider(
                entity,
                ColliderDesc::new(ColliderShape::Mesh {
                    geometry: Arc::new(triangle_geometry(IndexData::U16(vec![0, 1, 2]))),
                    mode: CookingMode::TriangleMesh,
                }),
            )
            .unwrap();
        assert_eq!(world.shape_cache().shape_count(), 1);

        world.despawn(entity);

        assert!(!world.contains(entity));
        assert!(world.shape_cache().is_empty());
    }

    #[test]
    fn test_headless_world_degrades_gracefully() {
        let mut world = World::new(PhysicsConfig::default());
        let entity = world.spawn();
        world
            .attach_collider(
                entity,
                ColliderDesc::new(ColliderShape::Mesh {
                    geometry: Arc::new(triangle_geometry(IndexData::U16(vec![0, 1, 2]))),
                    mode: CookingMode::TriangleMesh,
                }),
            )
            .unwrap();

        // Inert binding: no handle, no cache entries
        assert!(world.binding(entity).unwrap().collider_handle().is_none());
        assert!(world.shape_cache().is_empty());

        world.position_mut(entity).unwrap().set(1.0, 0.0, 0.0);
        tick(&mut world);
        assert_relative_eq!(world.position(entity).unwrap().x, 1.0);
    }

    #[test]
    fn test_disabled_config_discards_backend() {
        let mut config = PhysicsConfig::default();
        config.enabled = false;
        let world = World::with_backend(config, Box::new(RecordingBackend::new()));
        assert!(!world.has_backend());
    }

    #[test]
    fn test_prewarm_avoids_second_cook() {
        let mut world = recording_world();
        let geometry = tetrahedron_geometry();
        world.prewarm_shape(&geometry, CookingMode::Convex);
        assert_eq!(world.shape_cache().shape_count(), 1);

        let entity = world.spawn();
        world
            .attach_collider(
                entity,
                ColliderDesc::new(ColliderShape::Mesh {
                    geometry: Arc::new(geometry),
                    mode: CookingMode::Convex,
                }),
            )
            .unwrap();

        // Attach hit the prewarmed record instead of cooking again
        let key = world.binding(entity).unwrap().lease().unwrap().key();
        assert_eq!(world.shape_cache().shape_count(), 1);
        assert_eq!(world.shape_cache().ref_count(key), Some(2));
    }

    #[test]
    fn test_events_for_unknown_entities_are_ignored() {
        // A backend may report events for entities that despawned in the
        // same tick; folding must skip them without panicking
        let mut backend = RecordingBackend::new();
        backend.queued_events.push(ContactEvent {
            phase: ContactPhase::Begin,
            is_trigger: false,
            a: Entity::new(500),
            b: Entity::new(501),
        });
        let mut world = World::with_backend(PhysicsConfig::default(), Box::new(backend));
        let entity = world.spawn();

        tick(&mut world);

        assert!(!world.touching(entity).unwrap().is_touching_any());
    }

    #[test]
    fn test_backlog_is_bounded() {
        let mut world = recording_world();
        // A huge frame only consumes max_ticks_per_update ticks
        world.update(10.0);
        // Subsequent small updates work normally
        tick(&mut world);
    }
}
