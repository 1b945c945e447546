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

//! Component stores
//!
//! Every component type gets its own [`ComponentStore`], so registering a new
//! type never touches existing stores. An entity may own several components of
//! the same type; each one occupies its own store slot and is tagged with its
//! owner and an active flag.

use ahash::AHashMap;
use smallvec::SmallVec;
use std::any::Any;

use crate::entity::EntityId;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static {}

/// Automatically implement Component for all valid types
impl<T: 'static> Component for T {}

/// One stored component instance.
#[derive(Debug)]
pub struct Stored<T> {
    owner: EntityId,
    active: bool,
    value: T,
}

impl<T> Stored<T> {
    /// Owner recorded at insertion. Never changes afterwards.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

/// Dense-ish storage for one component type.
///
/// `slots` is indexed by a store-local slot number; freed slots are reused.
/// `by_owner` keeps each owner's slots in insertion order.
pub struct ComponentStore<T> {
    slots: Vec<Option<Stored<T>>>,
    free: Vec<u32>,
    by_owner: AHashMap<EntityId, SmallVec<[u32; 2]>>,
    len: usize,
}

impl<T: Component> ComponentStore<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            by_owner: AHashMap::with_capacity(capacity),
            len: 0,
        }
    }

    /// Insert a new, active component for `owner`. Returns its slot number.
    pub fn insert(&mut self, owner: EntityId, value: T) -> u32 {
        let stored = Some(Stored {
            owner,
            active: true,
            value,
        });
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = stored;
                slot
            }
            None => {
                self.slots.push(stored);
                (self.slots.len() - 1) as u32
            }
        };
        self.by_owner.entry(owner).or_default().push(slot);
        self.len += 1;
        slot
    }

    /// First component (in insertion order) owned by `owner`.
    pub fn get(&self, owner: EntityId) -> Option<&T> {
        let slot = *self.by_owner.get(&owner)?.first()?;
        self.value(slot)
    }

    pub fn get_mut(&mut self, owner: EntityId) -> Option<&mut T> {
        let slot = *self.by_owner.get(&owner)?.first()?;
        self.value_mut(slot)
    }

    /// Every component of this type owned by `owner`, in insertion order.
    pub fn get_all(&self, owner: EntityId) -> impl Iterator<Item = &T> + '_ {
        self.by_owner
            .get(&owner)
            .into_iter()
            .flat_map(|slots| slots.iter())
            .filter_map(|&slot| self.value(slot))
    }

    /// Access a component by its store-local slot.
    pub fn slot(&self, slot: u32) -> Option<&Stored<T>> {
        self.slots.get(slot as usize)?.as_ref()
    }

    pub fn value(&self, slot: u32) -> Option<&T> {
        self.slot(slot).map(|stored| &stored.value)
    }

    pub fn value_mut(&mut self, slot: u32) -> Option<&mut T> {
        self.slots
            .get_mut(slot as usize)?
            .as_mut()
            .map(|stored| &mut stored.value)
    }

    pub fn contains(&self, owner: EntityId) -> bool {
        self.by_owner.contains_key(&owner)
    }

    /// Number of components of this type owned by `owner`.
    pub fn count_for(&self, owner: EntityId) -> usize {
        self.by_owner.get(&owner).map_or(0, |slots| slots.len())
    }

    /// Drop every component owned by `owner`. Returns how many were removed.
    pub fn remove_all(&mut self, owner: EntityId) -> usize {
        let Some(slots) = self.by_owner.remove(&owner) else {
            return 0;
        };
        for &slot in &slots {
            self.slots[slot as usize] = None;
            self.free.push(slot);
        }
        self.len -= slots.len();
        slots.len()
    }

    /// Set the active flag on every component `owner` has in this store.
    pub fn set_active(&mut self, owner: EntityId, active: bool) -> usize {
        let Some(slots) = self.by_owner.get(&owner) else {
            return 0;
        };
        let mut changed = 0;
        for &slot in slots {
            if let Some(stored) = self.slots[slot as usize].as_mut() {
                stored.active = active;
                changed += 1;
            }
        }
        changed
    }

    /// Active flag of the first component `owner` has in this store.
    pub fn is_active(&self, owner: EntityId) -> Option<bool> {
        let slot = *self.by_owner.get(&owner)?.first()?;
        self.slot(slot).map(|stored| stored.active)
    }

    /// Visit components with `active == true` in slot order.
    ///
    /// The store is borrowed exclusively for the whole visit, so the callback
    /// cannot add or remove components of this type mid-iteration.
    pub fn for_each_active<F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, &mut T),
    {
        for stored in self.slots.iter_mut().flatten() {
            if stored.active {
                f(stored.owner, &mut stored.value);
            }
        }
    }

    /// All components, active or not, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots
            .iter()
            .flatten()
            .map(|stored| (stored.owner, &stored.value))
    }

    /// Distinct owners with at least one component in this store.
    pub fn owners(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.by_owner.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Component> Default for ComponentStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a [`ComponentStore`], keyed by `TypeId` in the world.
pub trait ComponentStorage: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_all(&mut self, owner: EntityId) -> usize;
    fn len(&self) -> usize;
    fn component_name(&self) -> &'static str;
}

impl<T: Component> ComponentStorage for ComponentStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn remove_all(&mut self, owner: EntityId) -> usize {
        ComponentStore::remove_all(self, owner)
    }
    fn len(&self) -> usize {
        self.len
    }
    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    #[derive(Debug, PartialEq)]
    struct Health(i32);

    fn owner(index: u64) -> EntityId {
        Handle::new(index, 0)
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = ComponentStore::new();
        store.insert(owner(0), Health(10));
        assert_eq!(store.get(owner(0)), Some(&Health(10)));
        assert_eq!(store.get(owner(1)), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_multiple_per_owner() {
        let mut store = ComponentStore::new();
        store.insert(owner(0), Health(1));
        store.insert(owner(0), Health(2));
        assert_eq!(store.count_for(owner(0)), 2);
        assert_eq!(store.get(owner(0)), Some(&Health(1)));
        let all: Vec<_> = store.get_all(owner(0)).collect();
        assert_eq!(all, vec![&Health(1), &Health(2)]);
    }

    #[test]
    fn test_remove_all_recycles_slots() {
        let mut store = ComponentStore::new();
        let a = store.insert(owner(0), Health(1));
        store.insert(owner(1), Health(2));
        assert_eq!(store.remove_all(owner(0)), 1);
        assert!(!store.contains(owner(0)));
        assert_eq!(store.get(owner(1)), Some(&Health(2)));

        let reused = store.insert(owner(2), Health(3));
        assert_eq!(reused, a);
        assert_eq!(store.slot(reused).map(|s| s.owner()), Some(owner(2)));
    }

    #[test]
    fn test_for_each_active_skips_inactive() {
        let mut store = ComponentStore::new();
        store.insert(owner(0), Health(1));
        store.insert(owner(1), Health(2));
        store.insert(owner(2), Health(3));
        assert_eq!(store.set_active(owner(1), false), 1);
        assert_eq!(store.is_active(owner(1)), Some(false));

        let mut seen = Vec::new();
        store.for_each_active(|id, health| {
            health.0 *= 10;
            seen.push(id);
        });
        assert_eq!(seen, vec![owner(0), owner(2)]);
        assert_eq!(store.get(owner(1)), Some(&Health(2)));
        assert_eq!(store.get(owner(2)), Some(&Health(30)));
    }

    #[test]
    fn test_erased_storage_downcast() {
        let mut boxed: Box<dyn ComponentStorage> = Box::new(ComponentStore::<Health>::new());
        boxed
            .as_any_mut()
            .downcast_mut::<ComponentStore<Health>>()
            .unwrap()
            .insert(owner(4), Health(7));
        assert_eq!(boxed.len(), 1);
        assert!(boxed.component_name().ends_with("Health"));
        assert_eq!(boxed.remove_all(owner(4)), 1);
        assert_eq!(boxed.len(), 0);
    }
}
