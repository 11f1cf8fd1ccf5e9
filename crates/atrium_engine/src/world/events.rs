//! Contact event routing
//!
//! Backend contact events are queued during the physics step and
//! dispatched afterwards to per-entity subscriptions. Handlers receive
//! the *other* entity of the pair; both sides of a pair are notified.

use std::collections::HashMap;

use crate::physics::backend::{ContactEvent, ContactPhase};
use crate::world::Entity;

/// Handler invoked with the other entity of a contact pair
pub type ContactHandler = Box<dyn FnMut(Entity)>;

#[derive(Default)]
struct EntitySubscriptions {
    collision_enter: Vec<ContactHandler>,
    collision_exit: Vec<ContactHandler>,
    trigger_enter: Vec<ContactHandler>,
    trigger_exit: Vec<ContactHandler>,
}

/// Per-entity contact event subscriptions
#[derive(Default)]
pub struct ContactRouter {
    subscriptions: HashMap<Entity, EntitySubscriptions>,
}

impl ContactRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to collision begin events for `entity`
    pub fn on_collision_enter(&mut self, entity: Entity, handler: ContactHandler) {
        self.subscriptions
            .entry(entity)
            .or_default()
            .collision_enter
            .push(handler);
    }

    /// Subscribe to collision end events for `entity`
    pub fn on_collision_exit(&mut self, entity: Entity, handler: ContactHandler) {
        self.subscriptions
            .entry(entity)
            .or_default()
            .collision_exit
            .push(handler);
    }

    /// Subscribe to trigger begin events for `entity`
    pub fn on_trigger_enter(&mut self, entity: Entity, handler: ContactHandler) {
        self.subscriptions
            .entry(entity)
            .or_default()
            .trigger_enter
            .push(handler);
    }

    /// Subscribe to trigger end events for `entity`
    pub fn on_trigger_exit(&mut self, entity: Entity, handler: ContactHandler) {
        self.subscriptions
            .entry(entity)
            .or_default()
            .trigger_exit
            .push(handler);
    }

    /// Drop all subscriptions for an entity (called on despawn)
    pub fn unsubscribe_all(&mut self, entity: Entity) {
        self.subscriptions.remove(&entity);
    }

    /// Deliver one event to both entities of the pair
    pub fn dispatch(&mut self, event: &ContactEvent) {
        self.notify(event, event.a, event.b);
        self.notify(event, event.b, event.a);
    }

    fn notify(&mut self, event: &ContactEvent, target: Entity, other: Entity) {
        let Some(subscriptions) = self.subscriptions.get_mut(&target) else {
            return;
        };
        let handlers = match (event.is_trigger, event.phase) {
            (false, ContactPhase::Begin) => &mut subscriptions.collision_enter,
            (false, ContactPhase::End) => &mut subscriptions.collision_exit,
            (true, ContactPhase::Begin) => &mut subscriptions.trigger_enter,
            (true, ContactPhase::End) => &mut subscriptions.trigger_exit,
        };
        for handler in handlers.iter_mut() {
            handler(other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn event(phase: ContactPhase, is_trigger: bool, a: Entity, b: Entity) -> ContactEvent {
        ContactEvent {
            phase,
            is_trigger,
            a,
            b,
        }
    }

    #[test]
    fn test_both_sides_of_pair_are_notified() {
        let mut router = ContactRouter::new();
        let (a, b) = (Entity::new(1), Entity::new(2));

        let seen = Rc::new(RefCell::new(Vec::new()));
        for entity in [a, b] {
            let seen = Rc::clone(&seen);
            router.on_collision_enter(
                entity,
                Box::new(move |other| seen.borrow_mut().push((entity, other))),
            );
        }

        router.dispatch(&event(ContactPhase::Begin, false, a, b));

        let seen = seen.borrow();
        assert!(seen.contains(&(a, b)));
        assert!(seen.contains(&(b, a)));
    }

    #[test]
    fn test_trigger_events_route_to_trigger_handlers() {
        let mut router = ContactRouter::new();
        let (a, b) = (Entity::new(1), Entity::new(2));

        let collisions = Rc::new(RefCell::new(0u32));
        let triggers = Rc::new(RefCell::new(0u32));
        {
            let collisions = Rc::clone(&collisions);
            router.on_collision_enter(a, Box::new(move |_| *collisions.borrow_mut() += 1));
        }
        {
            let triggers = Rc::clone(&triggers);
            router.on_trigger_enter(a, Box::new(move |_| *triggers.borrow_mut() += 1));
        }

        router.dispatch(&event(ContactPhase::Begin, true, a, b));

        assert_eq!(*collisions.borrow(), 0);
        assert_eq!(*triggers.borrow(), 1);
    }

    #[test]
    fn test_unsubscribe_all_silences_entity() {
        let mut router = ContactRouter::new();
        let (a, b) = (Entity::new(1), Entity::new(2));

        let count = Rc::new(RefCell::new(0u32));
        {
            let count = Rc::clone(&count);
            router.on_collision_exit(a, Box::new(move |_| *count.borrow_mut() += 1));
        }

        router.unsubscribe_all(a);
        router.dispatch(&event(ContactPhase::End, false, a, b));

        assert_eq!(*count.borrow(), 0);
    }
}
