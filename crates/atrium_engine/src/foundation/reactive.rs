//! Reactive value types
//!
//! A reactive vector notifies a single registered observer on every
//! mutation, which lets dependent systems (physics, rendering) mark state
//! dirty lazily instead of polling for changes every frame.

use super::math::Vec3;

/// Observer invoked after a mutation is committed.
///
/// Receives the freshly committed value.
pub type ChangeObserver = Box<dyn FnMut(Vec3)>;

/// A 3-component vector that invokes a registered observer on every
/// mutation.
///
/// All write paths (`set`, `copy`, per-axis setters, `load`) funnel through
/// one commit point, so exactly one observer invocation occurs per logical
/// mutation: `set(1.0, 2.0, 3.0)` notifies once, not three times. The
/// observer runs strictly after the new value is committed and strictly
/// before the mutating call returns.
///
/// Reads never notify. A vector without an observer is a valid, silent
/// state (entities use it before they are attached to a world).
pub struct ReactiveVec3 {
    value: Vec3,
    observer: Option<ChangeObserver>,
    // Guards against the observer indirectly re-triggering itself.
    in_observer: bool,
}

impl ReactiveVec3 {
    /// Create a new reactive vector with the given components
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            value: Vec3::new(x, y, z),
            observer: None,
            in_observer: false,
        }
    }

    /// Create a zero vector
    pub fn zeros() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Current value
    pub fn get(&self) -> Vec3 {
        self.value
    }

    /// X component
    pub fn x(&self) -> f32 {
        self.value.x
    }

    /// Y component
    pub fn y(&self) -> f32 {
        self.value.y
    }

    /// Z component
    pub fn z(&self) -> f32 {
        self.value.z
    }

    /// Set all three components (one observer invocation)
    pub fn set(&mut self, x: f32, y: f32, z: f32) {
        self.commit(Vec3::new(x, y, z));
    }

    /// Set the X component (one observer invocation)
    pub fn set_x(&mut self, x: f32) {
        let mut value = self.value;
        value.x = x;
        self.commit(value);
    }

    /// Set the Y component (one observer invocation)
    pub fn set_y(&mut self, y: f32) {
        let mut value = self.value;
        value.y = y;
        self.commit(value);
    }

    /// Set the Z component (one observer invocation)
    pub fn set_z(&mut self, z: f32) {
        let mut value = self.value;
        value.z = z;
        self.commit(value);
    }

    /// Copy the value of another reactive vector (one observer invocation)
    pub fn copy(&mut self, other: &Self) {
        self.commit(other.value);
    }

    /// Assign from a plain vector (one observer invocation)
    pub fn set_vec(&mut self, value: Vec3) {
        self.commit(value);
    }

    /// Load three consecutive components from a float slice starting at
    /// `offset` (one observer invocation)
    ///
    /// # Panics
    ///
    /// Panics if `data` holds fewer than `offset + 3` elements.
    pub fn load(&mut self, data: &[f32], offset: usize) {
        self.commit(Vec3::new(data[offset], data[offset + 1], data[offset + 2]));
    }

    /// Register the observer, replacing any previous one
    pub fn on_change(&mut self, observer: ChangeObserver) {
        self.observer = Some(observer);
    }

    /// Remove the registered observer
    pub fn clear_on_change(&mut self) {
        self.observer = None;
    }

    /// Commit a value without notifying the observer
    ///
    /// Used by the physics step to store solver-resolved positions back
    /// into game state; notifying here would immediately re-mark the
    /// transform dirty and push the same value out again next tick.
    pub fn write_back(&mut self, value: Vec3) {
        self.value = value;
    }

    /// Single commit point for all mutating operations
    fn commit(&mut self, value: Vec3) {
        self.value = value;
        self.notify();
    }

    fn notify(&mut self) {
        if self.in_observer {
            return;
        }
        if let Some(mut observer) = self.observer.take() {
            self.in_observer = true;
            observer(self.value);
            self.in_observer = false;
            // The observer may have registered a replacement; keep it.
            if self.observer.is_none() {
                self.observer = Some(observer);
            }
        }
    }
}

impl std::fmt::Debug for ReactiveVec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveVec3")
            .field("value", &self.value)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

impl Default for ReactiveVec3 {
    fn default() -> Self {
        Self::zeros()
    }
}

impl From<Vec3> for ReactiveVec3 {
    fn from(value: Vec3) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}
