//! Event-sourced contact state
//!
//! The backend has no synchronous "what touches X" query; the only
//! collision information it produces is the enter/exit event stream.
//! This module folds that stream into a per-entity set of currently
//! touching entities, exposed as a read-only view, so "is X touching Y"
//! never tempts anyone into polling the backend.

use std::collections::HashSet;

use crate::world::Entity;

/// Current contact (or trigger-overlap) state of one entity
///
/// Updated exclusively from backend enter/exit events, once per fixed
/// tick.
#[derive(Debug, Default, Clone)]
pub struct ContactState {
    /// All entities currently touching
    touching: HashSet<Entity>,

    /// Entities that started touching this tick
    entered: Vec<Entity>,

    /// Entities that stopped touching this tick
    exited: Vec<Entity>,
}

impl ContactState {
    /// Whether anything is currently touching
    pub fn is_touching_any(&self) -> bool {
        !self.touching.is_empty()
    }

    /// Whether a specific entity is currently touching
    pub fn is_touching(&self, entity: Entity) -> bool {
        self.touching.contains(&entity)
    }

    /// Read-only view of all currently touching entities
    pub fn touching(&self) -> &HashSet<Entity> {
        &self.touching
    }

    /// Number of currently touching entities
    pub fn touch_count(&self) -> usize {
        self.touching.len()
    }

    /// Entities that started touching this tick
    pub fn entered(&self) -> &[Entity] {
        &self.entered
    }

    /// Entities that stopped touching this tick
    pub fn exited(&self) -> &[Entity] {
        &self.exited
    }

    /// Record a begin event
    pub(crate) fn record_begin(&mut self, other: Entity) {
        if self.touching.insert(other) {
            self.entered.push(other);
        }
    }

    /// Record an end event
    pub(crate) fn record_end(&mut self, other: Entity) {
        if self.touching.remove(&other) {
            self.exited.push(other);
        }
    }

    /// Clear per-tick data (called at the start of each fixed tick)
    pub(crate) fn clear_tick_data(&mut self) {
        self.entered.clear();
        self.exited.clear();
    }
}
