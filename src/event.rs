//! Entity lifecycle notifications published by the world.

use crate::entity::EntityId;
use std::any::TypeId;

/// Entity lifecycle events, published on the world's event bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityEvent {
    /// Entity was created
    Created(EntityId),

    /// Entity was destroyed; its handle is already invalid
    Destroyed(EntityId),

    /// Component was added to entity
    ComponentAdded(EntityId, TypeId),

    /// Every component of the given type was removed from entity
    ComponentRemoved(EntityId, TypeId),
}

impl EntityEvent {
    /// Get the entity involved in this event
    pub fn entity_id(&self) -> EntityId {
        match self {
            EntityEvent::Created(id) => *id,
            EntityEvent::Destroyed(id) => *id,
            EntityEvent::ComponentAdded(id, _) => *id,
            EntityEvent::ComponentRemoved(id, _) => *id,
        }
    }

    /// Get event type name for debugging
    pub fn event_type(&self) -> &'static str {
        match self {
            EntityEvent::Created(_) => "Created",
            EntityEvent::Destroyed(_) => "Destroyed",
            EntityEvent::ComponentAdded(_, _) => "ComponentAdded",
            EntityEvent::ComponentRemoved(_, _) => "ComponentRemoved",
        }
    }
}
