//! Cooked collision shape cache
//!
//! Cooking is synchronous CPU work on raw buffers, expensive enough that
//! identical geometry must never be cooked twice while a cooked copy is
//! alive. The cache keys on geometry *identity* plus cooking mode (not
//! on vertex content) and shares each cooked shape through refcounted
//! leases. A record lives exactly as long as at least one lease is
//! outstanding; the backend handle is destroyed on the last release.
//!
//! Each world owns its own cache instance; there is no process-wide
//! shared cache, so separate worlds (and tests) never alias cooked
//! shapes.

use std::collections::HashMap;

use log::{debug, warn};

use crate::physics::backend::{CookedShapeHandle, PhysicsBackend};
use crate::physics::geometry::{GeometryId, GeometrySource};

/// How geometry is cooked for collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CookingMode {
    /// Convex hull of the vertex positions
    Convex,
    /// Exact triangle mesh (requires an index buffer)
    TriangleMesh,
}

/// Cache key: geometry identity plus cooking mode
///
/// Two geometry instances with identical vertex content but different
/// identities produce distinct keys; that trade-off (occasional duplicate
/// cooks for zero hashing cost) is deliberate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    /// Identity of the source geometry
    pub geometry: GeometryId,
    /// Cooking mode
    pub mode: CookingMode,
}

impl GeometryKey {
    /// Build a key from a geometry identity and cooking mode
    pub fn new(geometry: GeometryId, mode: CookingMode) -> Self {
        Self { geometry, mode }
    }
}

/// One unit of shared ownership over a cached cooked shape
///
/// Exactly one release is observable per lease: the first
/// [`CookedShapeCache::release`] decrements the record, any further call
/// is a no-op. Leases are not cloneable; ownership transfers only via
/// release plus a fresh acquire.
#[derive(Debug)]
pub struct ShapeLease {
    key: GeometryKey,
    handle: CookedShapeHandle,
    released: bool,
}

impl ShapeLease {
    /// The backend handle this lease keeps alive
    pub fn handle(&self) -> CookedShapeHandle {
        self.handle
    }

    /// The cache key this lease belongs to
    pub fn key(&self) -> GeometryKey {
        self.key
    }

    /// Whether this lease has already been released
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for ShapeLease {
    fn drop(&mut self) {
        if !self.released {
            // The refcount this lease holds can no longer be returned;
            // the record will outlive its last real user.
            warn!(
                "shape lease for {:?} dropped without release; cooked shape will leak",
                self.key
            );
        }
    }
}

struct CookedShapeRecord {
    handle: CookedShapeHandle,
    ref_count: u32,
}

/// Refcounted cache of cooked collision shapes
pub struct CookedShapeCache {
    records: HashMap<GeometryKey, CookedShapeRecord>,
}

impl CookedShapeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Acquire a lease on the cooked shape for `geometry` in `mode`
    ///
    /// Returns `None` when the backend is absent (physics is optional on
    /// some runtime roles; callers treat this as "no collision for
    /// now") or when the backend rejects the geometry. Neither case
    /// leaves a cache entry behind, and extraction scratch buffers are
    /// freed on every path.
    pub fn acquire(
        &mut self,
        backend: Option<&mut (dyn PhysicsBackend + 'static)>,
        geometry: &GeometrySource,
        mode: CookingMode,
    ) -> Option<ShapeLease> {
        let Some(backend) = backend else {
            warn!(
                "physics backend unavailable; skipping shape cook for {:?}",
                geometry.id()
            );
            return None;
        };

        let key = GeometryKey::new(geometry.id(), mode);
        if let Some(record) = self.records.get_mut(&key) {
            record.ref_count += 1;
            return Some(ShapeLease {
                key,
                handle: record.handle,
                released: false,
            });
        }

        let positions = match geometry.packed_positions() {
            Ok(positions) => positions,
            Err(err) => {
                warn!("shape cook rejected for {:?}: {err}", geometry.id());
                return None;
            }
        };

        let handle = match mode {
            CookingMode::Convex => backend.cook_convex(&positions),
            CookingMode::TriangleMesh => {
                let indices = match geometry.cooking_indices() {
                    Ok(indices) => indices,
                    Err(err) => {
                        warn!("shape cook rejected for {:?}: {err}", geometry.id());
                        return None;
                    }
                };
                backend.cook_triangle_mesh(&positions, &indices)
            }
        };

        let Some(handle) = handle else {
            warn!("backend rejected geometry {:?} in {mode:?} mode", geometry.id());
            return None;
        };

        debug!("cooked shape for {key:?}");
        self.records.insert(
            key,
            CookedShapeRecord {
                handle,
                ref_count: 1,
            },
        );
        Some(ShapeLease {
            key,
            handle,
            released: false,
        })
    }

    /// Return a lease
    ///
    /// When the last outstanding lease for a record is released the
    /// backend handle is destroyed and the record removed. Releasing an
    /// already-released lease is a no-op.
    pub fn release(&mut self, backend: Option<&mut (dyn PhysicsBackend + 'static)>, lease: &mut ShapeLease) {
        if lease.released {
            return;
        }
        lease.released = true;

        let Some(record) = self.records.get_mut(&lease.key) else {
            warn!("released lease for unknown record {:?}", lease.key);
            return;
        };

        record.ref_count -= 1;
        if record.ref_count > 0 {
            return;
        }

        let handle = record.handle;
        self.records.remove(&lease.key);
        match backend {
            Some(backend) => backend.destroy_shape(handle),
            // The backend owning the handle is already gone; nothing to
            // destroy.
            None => warn!("backend unavailable while destroying cooked shape {handle:?}"),
        }
        debug!("destroyed cooked shape for {:?}", lease.key);
    }

    /// Number of live records
    pub fn shape_count(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current refcount for a key, if a record exists
    pub fn ref_count(&self, key: GeometryKey) -> Option<u32> {
        self.records.get(&key).map(|r| r.ref_count)
    }
}

impl Default for CookedShapeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::geometry::{IndexData, PositionData};
    use crate::physics::test_support::{tetrahedron_geometry, triangle_geometry, RecordingBackend};

    fn acquire(
        cache: &mut CookedShapeCache,
        backend: &mut RecordingBackend,
        geometry: &GeometrySource,
        mode: CookingMode,
    ) -> Option<ShapeLease> {
        cache.acquire(Some(backend), geometry, mode)
    }

    #[test]
    fn test_cache_reuse_shares_one_handle() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();
        let geometry = tetrahedron_geometry();
        let key = GeometryKey::new(geometry.id(), CookingMode::Convex);

        let mut first = acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).unwrap();
        let mut second = acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).unwrap();

        // One cook, one handle, refcount 2
        assert_eq!(backend.convex_cooks, 1);
        assert_eq!(first.handle(), second.handle());
        assert_eq!(cache.ref_count(key), Some(2));

        cache.release(Some(&mut backend), &mut first);
        assert_eq!(cache.ref_count(key), Some(1));
        assert!(backend.destroyed_shapes.is_empty());

        cache.release(Some(&mut backend), &mut second);
        assert_eq!(cache.ref_count(key), None);
        assert_eq!(backend.destroyed_shapes.len(), 1);
    }

    #[test]
    fn test_no_premature_destruction() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();
        let geometry = tetrahedron_geometry();

        let mut leases: Vec<ShapeLease> = (0..5)
            .map(|_| acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).unwrap())
            .collect();

        // Releasing all but one keeps the handle alive
        for lease in leases.iter_mut().take(4) {
            cache.release(Some(&mut backend), lease);
        }
        assert!(backend.destroyed_shapes.is_empty());
        assert_eq!(cache.shape_count(), 1);

        cache.release(Some(&mut backend), &mut leases[4]);
        assert_eq!(backend.destroyed_shapes.len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();
        let geometry = tetrahedron_geometry();

        let mut first = acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).unwrap();
        let mut second = acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).unwrap();

        cache.release(Some(&mut backend), &mut first);
        // Second release of the same lease must not decrement again
        cache.release(Some(&mut backend), &mut first);

        let key = GeometryKey::new(geometry.id(), CookingMode::Convex);
        assert_eq!(cache.ref_count(key), Some(1));
        assert!(backend.destroyed_shapes.is_empty());

        cache.release(Some(&mut backend), &mut second);
        assert_eq!(backend.destroyed_shapes.len(), 1);
    }

    #[test]
    fn test_unavailable_backend_creates_no_entries() {
        let mut cache = CookedShapeCache::new();
        let geometry = tetrahedron_geometry();

        for _ in 0..3 {
            assert!(cache.acquire(None, &geometry, CookingMode::Convex).is_none());
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cook_failure_leaves_cache_unchanged() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();
        backend.fail_cooking = true;
        let geometry = tetrahedron_geometry();

        assert!(acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex).is_none());
        assert!(cache.is_empty());

        // A later successful cook works normally
        backend.fail_cooking = false;
        let lease = acquire(&mut cache, &mut backend, &geometry, CookingMode::Convex);
        assert!(lease.is_some());
        let mut lease = lease.unwrap();
        cache.release(Some(&mut backend), &mut lease);
    }

    #[test]
    fn test_malformed_geometry_rejected_before_backend() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();

        // Triangle mode without indices never reaches a cooking call
        let geometry = GeometrySource::new(PositionData::Planar(vec![0.0; 9]));
        assert!(acquire(&mut cache, &mut backend, &geometry, CookingMode::TriangleMesh).is_none());
        assert_eq!(backend.mesh_cooks, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eight_bit_indices_reach_backend_as_sixteen() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();

        let geometry = triangle_geometry(IndexData::U8(vec![0, 1, 2]));
        let mut lease =
            acquire(&mut cache, &mut backend, &geometry, CookingMode::TriangleMesh).unwrap();

        assert_eq!(backend.last_index_width, Some(16));
        assert_eq!(backend.last_indices, vec![0, 1, 2]);
        cache.release(Some(&mut backend), &mut lease);
    }

    #[test]
    fn test_sixteen_bit_indices_pass_through() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();

        let geometry = triangle_geometry(IndexData::U16(vec![0, 1, 2]));
        let mut lease =
            acquire(&mut cache, &mut backend, &geometry, CookingMode::TriangleMesh).unwrap();

        assert_eq!(backend.last_index_width, Some(16));
        assert_eq!(backend.last_indices, vec![0, 1, 2]);
        cache.release(Some(&mut backend), &mut lease);
    }

    #[test]
    fn test_identity_and_mode_are_distinct_keys() {
        let mut cache = CookedShapeCache::new();
        let mut backend = RecordingBackend::new();

        // Same content, different identities: two cooks by design
        let first = tetrahedron_geometry();
        let second = tetrahedron_geometry();
        let mut lease_a = acquire(&mut cache, &mut backend, &first, CookingMode::Convex).unwrap();
        let mut lease_b = acquire(&mut cache, &mut backend, &second, CookingMode::Convex).unwrap();
        assert_eq!(backend.convex_cooks, 2);
        assert_eq!(cache.shape_count(), 2);

        // Same identity, different mode: separate record
        let meshable = triangle_geometry(IndexData::U16(vec![0, 1, 2]));
        let mut lease_c =
            acquire(&mut cache, &mut backend, &meshable, CookingMode::Convex).unwrap();
        let mut lease_d =
            acquire(&mut cache, &mut backend, &meshable, CookingMode::TriangleMesh).unwrap();
        assert_ne!(lease_c.key(), lease_d.key());
        assert_eq!(cache.shape_count(), 4);

        for lease in [&mut lease_a, &mut lease_b, &mut lease_c, &mut lease_d] {
            cache.release(Some(&mut backend), lease);
        }
        assert!(cache.is_empty());
    }
}
