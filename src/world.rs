// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! World: the entity registry
//!
//! Issues entity handles through a [`HandleTable`], routes component calls to
//! the per-type [`ComponentStore`]s and publishes [`EntityEvent`]
//! notifications on its own [`EventBus`].
//!
//! Stale or invalid handles never reach a store: lookups return `None`,
//! mutations return [`EcsError::EntityNotFound`], and both log a warning.
//!
//! Lifecycle events are only queued while something subscribes to
//! [`EntityEvent`], and stay queued until [`World::drain_events`] runs
//! ([`App::update`](crate::app::App::update) does this every frame).

use ahash::AHashMap;
use std::any::TypeId;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{Component, ComponentStorage, ComponentStore};
use crate::config::WorldConfig;
use crate::entity::{EntityId, EntityRecord};
use crate::error::{EcsError, Result};
use crate::event::EntityEvent;
use crate::event_bus::{Event, EventBus};
use crate::handle::HandleTable;
use crate::hierarchy::{Hierarchy, HierarchyBuilder};

/// Central registry of entities and their components
pub struct World {
    entities: HandleTable<EntityRecord>,
    stores: AHashMap<TypeId, Box<dyn ComponentStorage>>,
    events: EventBus,
    config: WorldConfig,
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self::build(WorldConfig::default())
    }

    /// Create a world sized by `config`.
    pub fn with_config(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            entities: HandleTable::with_chunk_size(config.handle_chunk_size),
            stores: AHashMap::with_capacity(32),
            events: EventBus::with_arena_capacity(config.event_arena_bytes),
            config,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Issue a new entity handle.
    pub fn create(&mut self) -> Result<EntityId> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("world.create", entity_count = self.entities.len()).entered();

        let id = self.entities.allocate(EntityRecord::new())?;
        self.notify(EntityEvent::Created(id));
        tracing::trace!(entity = ?id, "entity created");
        Ok(id)
    }

    /// Invalidate `entity` and remove every component it owns.
    ///
    /// The entity is first unlinked from the hierarchy: its parent forgets it
    /// and its children become roots. Use
    /// [`HierarchyBuilder::destroy_recursive`] to take the subtree with it.
    pub fn destroy(&mut self, entity: EntityId) -> Result<()> {
        if entity.is_invalid() {
            tracing::warn!("destroy called with the invalid handle");
            return Err(EcsError::InvalidEntity);
        }
        let linked = self
            .store::<Hierarchy>()
            .is_some_and(|store| store.contains(entity));
        if linked && self.entities.valid(entity) {
            HierarchyBuilder::remove_from_hierarchy(self, entity)?;
        }
        let Some(record) = self.entities.release(entity) else {
            tracing::warn!(entity = ?entity, "destroy called with a stale entity handle");
            return Err(EcsError::EntityNotFound);
        };

        for &type_id in record.component_types() {
            if let Some(store) = self.stores.get_mut(&type_id) {
                store.remove_all(entity);
            }
            self.notify(EntityEvent::ComponentRemoved(entity, type_id));
        }
        self.notify(EntityEvent::Destroyed(entity));
        tracing::trace!(entity = ?entity, components = record.component_types().len(), "entity destroyed");
        Ok(())
    }

    /// `true` while `entity` refers to a live entity.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.valid(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(|(id, _)| id)
    }

    /// Component types currently owned by `entity`.
    pub fn component_types(&self, entity: EntityId) -> Option<&[TypeId]> {
        self.entities.get(entity).map(EntityRecord::component_types)
    }

    fn check_alive(&self, entity: EntityId, op: &'static str) -> bool {
        if self.entities.valid(entity) {
            return true;
        }
        tracing::warn!(entity = ?entity, op, "stale or invalid entity handle");
        false
    }

    /// Ensure a store exists for `T`.
    pub fn register<T: Component>(&mut self) {
        let capacity = self.config.initial_store_capacity;
        self.stores
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStore::<T>::with_capacity(capacity)));
    }

    /// Attach a new component to `entity` and return it.
    ///
    /// An entity may own several components of the same type.
    pub fn add<T: Component>(&mut self, entity: EntityId, value: T) -> Result<&mut T> {
        if !self.check_alive(entity, "add") {
            return Err(EcsError::EntityNotFound);
        }
        self.register::<T>();
        let type_id = TypeId::of::<T>();

        let slot = self
            .store_mut::<T>()
            .ok_or(EcsError::ComponentNotFound)?
            .insert(entity, value);
        if let Some(record) = self.entities.get_mut(entity) {
            record.track(type_id);
        }
        self.notify(EntityEvent::ComponentAdded(entity, type_id));

        self.store_mut::<T>()
            .and_then(|store| store.value_mut(slot))
            .ok_or(EcsError::ComponentNotFound)
    }

    /// First component of type `T` owned by `entity`.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        if !self.check_alive(entity, "get") {
            return None;
        }
        self.store::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        if !self.check_alive(entity, "get_mut") {
            return None;
        }
        self.store_mut::<T>()?.get_mut(entity)
    }

    /// Every component of type `T` owned by `entity`, in insertion order.
    pub fn get_all<T: Component>(&self, entity: EntityId) -> impl Iterator<Item = &T> + '_ {
        let store = if self.check_alive(entity, "get_all") {
            self.store::<T>()
        } else {
            None
        };
        store.into_iter().flat_map(move |store| store.get_all(entity))
    }

    /// Remove every `T` owned by `entity`. Returns how many were removed.
    ///
    /// Components of other types on the same entity are untouched.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> usize {
        if !self.check_alive(entity, "remove") {
            return 0;
        }
        let removed = self
            .store_mut::<T>()
            .map_or(0, |store| store.remove_all(entity));
        if removed > 0 {
            let type_id = TypeId::of::<T>();
            if let Some(record) = self.entities.get_mut(entity) {
                record.untrack(type_id);
            }
            self.notify(EntityEvent::ComponentRemoved(entity, type_id));
        }
        removed
    }

    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.check_alive(entity, "has") && self.store::<T>().is_some_and(|s| s.contains(entity))
    }

    /// Set the active flag on every `T` owned by `entity`.
    pub fn set_active<T: Component>(&mut self, entity: EntityId, active: bool) -> usize {
        if !self.check_alive(entity, "set_active") {
            return 0;
        }
        self.store_mut::<T>()
            .map_or(0, |store| store.set_active(entity, active))
    }

    pub fn is_active<T: Component>(&self, entity: EntityId) -> Option<bool> {
        if !self.check_alive(entity, "is_active") {
            return None;
        }
        self.store::<T>()?.is_active(entity)
    }

    /// Visit every active `T` with its owner.
    pub fn for_each_active<T, F>(&mut self, f: F)
    where
        T: Component,
        F: FnMut(EntityId, &mut T),
    {
        if let Some(store) = self.store_mut::<T>() {
            store.for_each_active(f);
        }
    }

    /// Every `T`, active or not, with its owner.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.store::<T>().into_iter().flat_map(|store| store.iter())
    }

    pub fn component_count<T: Component>(&self) -> usize {
        self.store::<T>().map_or(0, ComponentStore::len)
    }

    pub fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        let store: &dyn ComponentStorage = &**self.stores.get(&TypeId::of::<T>())?;
        store.as_any().downcast_ref::<ComponentStore<T>>()
    }

    pub fn store_mut<T: Component>(&mut self) -> Option<&mut ComponentStore<T>> {
        let store: &mut dyn ComponentStorage = &mut **self.stores.get_mut(&TypeId::of::<T>())?;
        store.as_any_mut().downcast_mut::<ComponentStore<T>>()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Queue an event on the world bus.
    pub fn publish<E: Event>(&mut self, event: E) {
        self.events.publish(event);
    }

    /// Deliver every queued world event. Returns the number processed.
    pub fn drain_events(&mut self) -> usize {
        self.events.drain()
    }

    fn notify(&mut self, event: EntityEvent) {
        if self.events.has_subscribers::<EntityEvent>() {
            self.events.publish(event);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
