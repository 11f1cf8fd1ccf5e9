//! Software reference backend
//!
//! An in-process implementation of the backend boundary, used by headless
//! tools, tests, and roles that want contact events without a native
//! physics library. Cooked shapes are kept as point sets and triangle
//! lists; the step performs bounding-sphere broad phase, exact
//! sphere/box/mesh narrow phase, and positional de-penetration for
//! dynamic colliders. Box and capsule pairs beyond those cases are
//! approximated by their bounding spheres.

use std::collections::HashMap;

use log::warn;
use slotmap::SlotMap;

use crate::foundation::math::Vec3;
use crate::physics::geometry::CookingIndices;
use crate::physics::layers::LayerRegistry;
use crate::world::Entity;

use super::{
    BackendColliderDesc, ColliderHandle, ContactEvent, ContactPhase, CookedShapeHandle,
    MutationOutcome, PhysicsBackend, PhysicsMaterial, PrimitiveShape, ShapeRef,
};

/// A triangle in shape-local space
#[derive(Debug, Clone, Copy)]
struct Triangle {
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
}

impl Triangle {
    fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    fn translated(&self, offset: Vec3) -> Self {
        Self {
            v0: self.v0 + offset,
            v1: self.v1 + offset,
            v2: self.v2 + offset,
        }
    }

    /// Closest point on the triangle to a given point
    fn closest_point(&self, point: Vec3) -> Vec3 {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let v0_to_point = point - self.v0;

        let d1 = edge1.dot(&v0_to_point);
        let d2 = edge2.dot(&v0_to_point);
        if d1 <= 0.0 && d2 <= 0.0 {
            return self.v0;
        }

        let v1_to_point = point - self.v1;
        let d3 = edge1.dot(&v1_to_point);
        let d4 = edge2.dot(&v1_to_point);
        if d3 >= 0.0 && d4 <= d3 {
            return self.v1;
        }

        let v2_to_point = point - self.v2;
        let d5 = edge1.dot(&v2_to_point);
        let d6 = edge2.dot(&v2_to_point);
        if d6 >= 0.0 && d5 <= d6 {
            return self.v2;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return self.v0 + edge1 * v;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return self.v0 + edge2 * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.v1 + (self.v2 - self.v1) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        self.v0 + edge1 * v + edge2 * w
    }
}

/// Cooked shape data kept by the software backend
enum CookedShapeData {
    Convex {
        points: Vec<Vec3>,
        bounding_radius: f32,
    },
    TriangleMesh {
        triangles: Vec<Triangle>,
        bounding_radius: f32,
    },
}

impl CookedShapeData {
    fn bounding_radius(&self) -> f32 {
        match self {
            Self::Convex {
                bounding_radius, ..
            }
            | Self::TriangleMesh {
                bounding_radius, ..
            } => *bounding_radius,
        }
    }
}

struct Collider {
    entity: Entity,
    shape: ShapeRef,
    position: Vec3,
    is_trigger: bool,
    dynamic: bool,
    material: PhysicsMaterial,
    layer_bits: u32,
    layer_mask: u32,
}

/// A narrow-phase contact between two colliders
struct Contact {
    /// Unit normal pointing from the second collider toward the first
    normal: Vec3,
    /// Penetration depth along the normal
    depth: f32,
    /// Whether the depth is exact enough to de-penetrate against
    resolvable: bool,
}

#[derive(Clone, Copy)]
struct PairInfo {
    a: Entity,
    b: Entity,
    is_trigger: bool,
}

type PairKey = (ColliderHandle, ColliderHandle);

/// In-process physics backend
pub struct SoftwareBackend {
    shapes: SlotMap<CookedShapeHandle, CookedShapeData>,
    colliders: SlotMap<ColliderHandle, Collider>,
    touching: HashMap<PairKey, PairInfo>,
    // Events produced outside step (collider removal) and drained on the
    // next step.
    pending: Vec<ContactEvent>,
}

impl SoftwareBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self {
            shapes: SlotMap::with_key(),
            colliders: SlotMap::with_key(),
            touching: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Number of live cooked shapes (introspection for tools and tests)
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Number of live colliders (introspection for tools and tests)
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// Material currently applied to a collider
    pub fn collider_material(&self, collider: ColliderHandle) -> Option<PhysicsMaterial> {
        self.colliders.get(collider).map(|c| c.material)
    }

    /// Trigger flag currently applied to a collider
    pub fn collider_is_trigger(&self, collider: ColliderHandle) -> Option<bool> {
        self.colliders.get(collider).map(|c| c.is_trigger)
    }

    fn bounding_radius(&self, shape: &ShapeRef) -> f32 {
        match shape {
            ShapeRef::Primitive(PrimitiveShape::Sphere { radius }) => *radius,
            ShapeRef::Primitive(PrimitiveShape::Box { half_extents }) => half_extents.magnitude(),
            ShapeRef::Primitive(PrimitiveShape::Capsule {
                radius,
                half_height,
            }) => radius + half_height,
            ShapeRef::Cooked(handle) => self
                .shapes
                .get(*handle)
                .map_or(0.0, CookedShapeData::bounding_radius),
        }
    }

    fn narrow_phase(&self, first: &Collider, second: &Collider) -> Option<Contact> {
        // Exact tests where one side is a sphere; everything else falls
        // back to the bounding-sphere result.
        if let ShapeRef::Primitive(PrimitiveShape::Sphere { radius }) = first.shape {
            if let Some(contact) = self.sphere_versus(first.position, radius, second) {
                return Some(contact);
            }
            return None;
        }
        if let ShapeRef::Primitive(PrimitiveShape::Sphere { radius }) = second.shape {
            let contact = self.sphere_versus(second.position, radius, first)?;
            return Some(Contact {
                normal: -contact.normal,
                ..contact
            });
        }

        self.bounding_contact(first, second)
    }

    /// Sphere against an arbitrary collider; normal points toward the
    /// sphere center
    fn sphere_versus(&self, center: Vec3, radius: f32, other: &Collider) -> Option<Contact> {
        match other.shape {
            ShapeRef::Primitive(PrimitiveShape::Sphere {
                radius: other_radius,
            }) => sphere_sphere(center, radius, other.position, other_radius),
            ShapeRef::Primitive(PrimitiveShape::Box { half_extents }) => {
                sphere_aabb(center, radius, other.position, half_extents)
            }
            ShapeRef::Cooked(handle) => match self.shapes.get(handle)? {
                CookedShapeData::TriangleMesh { triangles, .. } => {
                    sphere_mesh(center, radius, other.position, triangles)
                }
                CookedShapeData::Convex {
                    bounding_radius, ..
                } => {
                    // Convex hulls are approximated by their bounding sphere
                    let mut contact =
                        sphere_sphere(center, radius, other.position, *bounding_radius)?;
                    contact.resolvable = false;
                    Some(contact)
                }
            },
            ShapeRef::Primitive(PrimitiveShape::Capsule { .. }) => {
                let mut contact = sphere_sphere(
                    center,
                    radius,
                    other.position,
                    self.bounding_radius(&other.shape),
                )?;
                contact.resolvable = false;
                Some(contact)
            }
        }
    }

    fn bounding_contact(&self, first: &Collider, second: &Collider) -> Option<Contact> {
        let mut contact = sphere_sphere(
            first.position,
            self.bounding_radius(&first.shape),
            second.position,
            self.bounding_radius(&second.shape),
        )?;
        contact.resolvable = false;
        Some(contact)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_points(positions: &[f32]) -> Option<Vec<Vec3>> {
    if positions.is_empty() || positions.len() % 3 != 0 {
        return None;
    }
    Some(
        positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect(),
    )
}

fn bounding_radius_of(points: impl Iterator<Item = Vec3>) -> f32 {
    points
        .map(|p| p.magnitude_squared())
        .fold(0.0f32, f32::max)
        .sqrt()
}

fn sphere_sphere(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
) -> Option<Contact> {
    let offset = center_a - center_b;
    let distance_squared = offset.magnitude_squared();
    let radius_sum = radius_a + radius_b;
    if distance_squared > radius_sum * radius_sum {
        return None;
    }
    let distance = distance_squared.sqrt();
    let normal = if distance > 1e-6 {
        offset / distance
    } else {
        Vec3::y()
    };
    Some(Contact {
        normal,
        depth: radius_sum - distance,
        resolvable: true,
    })
}

fn sphere_aabb(center: Vec3, radius: f32, box_center: Vec3, half_extents: Vec3) -> Option<Contact> {
    let local = center - box_center;
    let closest = Vec3::new(
        local.x.clamp(-half_extents.x, half_extents.x),
        local.y.clamp(-half_extents.y, half_extents.y),
        local.z.clamp(-half_extents.z, half_extents.z),
    );
    let offset = local - closest;
    let distance_squared = offset.magnitude_squared();
    if distance_squared > radius * radius {
        return None;
    }
    let distance = distance_squared.sqrt();
    let normal = if distance > 1e-6 {
        offset / distance
    } else {
        Vec3::y()
    };
    Some(Contact {
        normal,
        depth: radius - distance,
        resolvable: true,
    })
}

fn sphere_mesh(
    center: Vec3,
    radius: f32,
    mesh_position: Vec3,
    triangles: &[Triangle],
) -> Option<Contact> {
    let mut deepest: Option<Contact> = None;
    for triangle in triangles {
        let world = triangle.translated(mesh_position);
        let closest = world.closest_point(center);
        let offset = center - closest;
        let distance_squared = offset.magnitude_squared();
        if distance_squared > radius * radius {
            continue;
        }
        let distance = distance_squared.sqrt();
        let normal = if distance > 1e-6 {
            offset / distance
        } else {
            Vec3::y()
        };
        let depth = radius - distance;
        if deepest.as_ref().map_or(true, |c| depth > c.depth) {
            deepest = Some(Contact {
                normal,
                depth,
                resolvable: true,
            });
        }
    }
    deepest
}

fn ordered_pair(a: ColliderHandle, b: ColliderHandle) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl PhysicsBackend for SoftwareBackend {
    fn cook_convex(&mut self, positions: &[f32]) -> Option<CookedShapeHandle> {
        let points = parse_points(positions)?;
        if points.len() < 4 {
            warn!(
                "convex cooking rejected: {} points (minimum 4)",
                points.len()
            );
            return None;
        }
        let bounding_radius = bounding_radius_of(points.iter().copied());
        Some(self.shapes.insert(CookedShapeData::Convex {
            points,
            bounding_radius,
        }))
    }

    fn cook_triangle_mesh(
        &mut self,
        positions: &[f32],
        indices: &CookingIndices<'_>,
    ) -> Option<CookedShapeHandle> {
        let points = parse_points(positions)?;
        if indices.is_empty() || indices.len() % 3 != 0 {
            warn!("triangle mesh cooking rejected: {} indices", indices.len());
            return None;
        }

        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for triangle in 0..indices.len() / 3 {
            let base = triangle * 3;
            let fetch = |i: usize| -> Option<Vec3> {
                points.get(indices.get(base + i) as usize).copied()
            };
            triangles.push(Triangle::new(fetch(0)?, fetch(1)?, fetch(2)?));
        }

        let bounding_radius =
            bounding_radius_of(triangles.iter().flat_map(|t| [t.v0, t.v1, t.v2]));
        Some(self.shapes.insert(CookedShapeData::TriangleMesh {
            triangles,
            bounding_radius,
        }))
    }

    fn destroy_shape(&mut self, shape: CookedShapeHandle) {
        if self.shapes.remove(shape).is_none() {
            warn!("destroy_shape called on unknown handle {shape:?}");
        }
    }

    fn create_collider(&mut self, desc: &BackendColliderDesc) -> Option<ColliderHandle> {
        if let ShapeRef::Cooked(handle) = desc.shape {
            if !self.shapes.contains_key(handle) {
                warn!("create_collider references destroyed shape {handle:?}");
                return None;
            }
        }
        Some(self.colliders.insert(Collider {
            entity: desc.entity,
            shape: desc.shape,
            position: desc.position,
            is_trigger: desc.is_trigger,
            dynamic: desc.dynamic,
            material: desc.material,
            layer_bits: desc.layer_bits,
            layer_mask: desc.layer_mask,
        }))
    }

    fn destroy_collider(&mut self, collider: ColliderHandle) {
        if self.colliders.remove(collider).is_none() {
            warn!("destroy_collider called on unknown handle {collider:?}");
            return;
        }
        // Pairs the collider was part of lose touch now; report them on
        // the next step so callers see a clean End.
        let pending = &mut self.pending;
        self.touching.retain(|&(first, second), info| {
            if first == collider || second == collider {
                pending.push(ContactEvent {
                    phase: ContactPhase::End,
                    is_trigger: info.is_trigger,
                    a: info.a,
                    b: info.b,
                });
                false
            } else {
                true
            }
        });
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
        if let Some(c) = self.colliders.get_mut(collider) {
            c.is_trigger = is_trigger;
            MutationOutcome::Applied
        } else {
            MutationOutcome::Unsupported
        }
    }

    fn step(&mut self, _dt: f32, events: &mut Vec<ContactEvent>) {
        events.append(&mut self.pending);

        let keys: Vec<ColliderHandle> = self.colliders.keys().collect();
        let mut current: HashMap<PairKey, PairInfo> = HashMap::new();
        let mut corrections: Vec<(ColliderHandle, Vec3)> = Vec::new();

        for (i, &key_a) in keys.iter().enumerate() {
            for &key_b in &keys[i + 1..] {
                let a = &self.colliders[key_a];
                let b = &self.colliders[key_b];

                if !LayerRegistry::should_collide(
                    a.layer_bits,
                    a.layer_mask,
                    b.layer_bits,
                    b.layer_mask,
                ) {
                    continue;
                }

                // Broad phase: bounding spheres
                let reach = self.bounding_radius(&a.shape) + self.bounding_radius(&b.shape);
                if (a.position - b.position).magnitude_squared() > reach * reach {
                    continue;
                }

                let Some(contact) = self.narrow_phase(a, b) else {
                    continue;
                };

                current.insert(
                    ordered_pair(key_a, key_b),
                    PairInfo {
                        a: a.entity,
                        b: b.entity,
                        is_trigger: a.is_trigger || b.is_trigger,
                    },
                );

                // Positional de-penetration for solid, exactly-tested pairs
                if contact.resolvable && !a.is_trigger && !b.is_trigger && contact.depth > 0.0 {
                    let push = contact.normal * contact.depth;
                    match (a.dynamic, b.dynamic) {
                        (true, false) => corrections.push((key_a, push)),
                        (false, true) => corrections.push((key_b, -push)),
                        (true, true) => {
                            corrections.push((key_a, push * 0.5));
                            corrections.push((key_b, -push * 0.5));
                        }
                        (false, false) => {}
                    }
                }
            }
        }

        for (key, delta) in corrections {
            if let Some(c) = self.colliders.get_mut(key) {
                c.position += delta;
            }
        }

        for (pair, info) in &current {
            if !self.touching.contains_key(pair) {
                events.push(ContactEvent {
                    phase: ContactPhase::Begin,
                    is_trigger: info.is_trigger,
                    a: info.a,
                    b: info.b,
                });
            }
        }
        for (pair, info) in &self.touching {
            if !current.contains_key(pair) {
                events.push(ContactEvent {
                    phase: ContactPhase::End,
                    is_trigger: info.is_trigger,
                    a: info.a,
                    b: info.b,
                });
            }
        }

        self.touching = current;
    }
}
