//! Shared test doubles for the physics layer
//!
//! `RecordingBackend` implements the backend boundary with bookkeeping
//! instead of simulation, so tests can assert exactly what crossed the
//! boundary (cook counts, index widths, collider lifecycles) and script
//! contact events.

use slotmap::SlotMap;

use crate::foundation::math::Vec3;
use crate::physics::backend::{
    BackendColliderDesc, ColliderHandle, ContactEvent, CookedShapeHandle, MutationOutcome,
    PhysicsBackend, PhysicsMaterial, ShapeRef,
};
use crate::physics::geometry::{CookingIndices, GeometrySource, IndexData, PositionData};
use crate::world::Entity;

pub(crate) struct RecordedCollider {
    pub entity: Entity,
    pub shape: ShapeRef,
    pub position: Vec3,
    pub is_trigger: bool,
    pub material: PhysicsMaterial,
    pub layer_bits: u32,
    pub layer_mask: u32,
}

/// Backend double that records boundary traffic
pub(crate) struct RecordingBackend {
    pub convex_cooks: u32,
    pub mesh_cooks: u32,
    pub destroyed_shapes: Vec<CookedShapeHandle>,
    /// Width (16 or 32) of the last index buffer handed to a mesh cook
    pub last_index_width: Option<u8>,
    pub last_indices: Vec<u32>,
    /// When set, every cooking call is rejected
    pub fail_cooking: bool,
    /// When set, in-place trigger flips report `Unsupported`
    pub trigger_unsupported: bool,
    /// Events handed out on the next step
    pub queued_events: Vec<ContactEvent>,
    pub created_colliders: u32,
    pub destroyed_colliders: u32,
    /// Ordered log of boundary calls, for sequencing assertions
    pub ops: Vec<&'static str>,
    shapes: SlotMap<CookedShapeHandle, ()>,
    colliders: SlotMap<ColliderHandle, RecordedCollider>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            convex_cooks: 0,
            mesh_cooks: 0,
            destroyed_shapes: Vec::new(),
            last_index_width: None,
            last_indices: Vec::new(),
            fail_cooking: false,
            trigger_unsupported: false,
            queued_events: Vec::new(),
            created_colliders: 0,
            destroyed_colliders: 0,
            ops: Vec::new(),
            shapes: SlotMap::with_key(),
            colliders: SlotMap::with_key(),
        }
    }

    pub fn live_shapes(&self) -> usize {
        self.shapes.len()
    }

    pub fn live_colliders(&self) -> usize {
        self.colliders.len()
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&RecordedCollider> {
        self.colliders.get(handle)
    }
}

impl PhysicsBackend for RecordingBackend {
    fn cook_convex(&mut self, positions: &[f32]) -> Option<CookedShapeHandle> {
        self.ops.push("cook_convex");
        self.convex_cooks += 1;
        if self.fail_cooking || positions.is_empty() {
            return None;
        }
        Some(self.shapes.insert(()))
    }

    fn cook_triangle_mesh(
        &mut self,
        positions: &[f32],
        indices: &CookingIndices<'_>,
    ) -> Option<CookedShapeHandle> {
        self.ops.push("cook_triangle_mesh");
        self.mesh_cooks += 1;
        if self.fail_cooking || positions.is_empty() || indices.is_empty() {
            return None;
        }
        self.last_index_width = Some(match indices {
            CookingIndices::U16(_) => 16,
            CookingIndices::U32(_) => 32,
        });
        self.last_indices = (0..indices.len()).map(|i| indices.get(i)).collect();
        Some(self.shapes.insert(()))
    }

    fn destroy_shape(&mut self, shape: CookedShapeHandle) {
        self.ops.push("destroy_shape");
        self.shapes.remove(shape);
        self.destroyed_shapes.push(shape);
    }

    fn create_collider(&mut self, desc: &BackendColliderDesc) -> Option<ColliderHandle> {
        self.ops.push("create_collider");
        if let ShapeRef::Cooked(handle) = desc.shape {
            if !self.shapes.contains_key(handle) {
                return None;
            }
        }
        self.created_colliders += 1;
        Some(self.colliders.insert(RecordedCollider {
            entity: desc.entity,
            shape: desc.shape,
            position: desc.position,
            is_trigger: desc.is_trigger,
            material: desc.material,
            layer_bits: desc.layer_bits,
            layer_mask: desc.layer_mask,
        }))
    }

    fn destroy_collider(&mut self, collider: ColliderHandle) {
        self.ops.push("destroy_collider");
        if self.colliders.remove(collider).is_some() {
            self.destroyed_colliders += 1;
        }
    }

    fn set_position(&mut self, collider: ColliderHandle, position: Vec3) {
        if let Some(c) = self.colliders.get_mut(collider) {
            c.position = position;
        }
    }

    fn position(&self, collider: ColliderHandle) -> Option<Vec3> {
        self.colliders.get(collider).map(|c| c.position)
    }

    fn set_material(&mut self, collider: ColliderHandle, material: PhysicsMaterial) {
        if let Some(c) = self.colliders.get_mut(collider) {
            c.material = material;
        }
    }

    fn set_layers(&mut self, collider: ColliderHandle, layer_bits: u32, layer_mask: u32) {
        if let Some(c) = self.colliders.get_mut(collider) {
            c.layer_bits = layer_bits;
            c.layer_mask = layer_mask;
        }
    }

    fn set_trigger(&mut self, collider: ColliderHandle, is_trigger: bool) -> MutationOutcome {
        if self.trigger_unsupported {
            return MutationOutcome::Unsupported;
        }
        if let Some(c) = self.colliders.get_mut(collider) {
            c.is_trigger = is_trigger;
            MutationOutcome::Applied
        } else {
            MutationOutcome::Unsupported
        }
    }

    fn step(&mut self, _dt: f32, events: &mut Vec<ContactEvent>) {
        events.append(&mut self.queued_events);
    }
}

/// Four points spanning a volume, valid for convex cooking
pub(crate) fn tetrahedron_geometry() -> GeometrySource {
    GeometrySource::new(PositionData::Planar(vec![
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0, //
    ]))
}

/// A single indexed triangle, valid for mesh cooking
pub(crate) fn triangle_geometry(indices: IndexData) -> GeometrySource {
    GeometrySource::new(PositionData::Planar(vec![
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, //
    ]))
    .with_indices(indices)
}
