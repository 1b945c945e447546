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

//! Generational handles and the chunked slot table that issues them.
//!
//! A [`Handle`] packs a slot index (low 40 bits) and a generation (high 24
//! bits) into one `u64`. The [`HandleTable`] bumps a slot's generation every
//! time the slot is released, so a handle issued to a previous occupant
//! no longer matches and every lookup through it yields `None`.
//!
//! Generations wrap after 2^24 releases of the same slot. A handle held across
//! that many reuse cycles can validate against an unrelated occupant again;
//! anything that must survive that long should be keyed by a stable external
//! identifier and re-resolved.

use std::fmt;

use crate::error::{Result, SpawnError};

/// Bits reserved for the slot index.
pub const INDEX_BITS: u32 = 40;
/// Bits reserved for the generation counter.
pub const GENERATION_BITS: u32 = 24;
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
pub const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;
/// Highest index a table hands out. `INDEX_MASK` stays out of circulation so
/// no issued handle can equal [`Handle::INVALID`].
pub const MAX_INDEX: u64 = INDEX_MASK - 1;
/// Slots per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Packed `{index, generation}` reference to a table slot.
///
/// Equality is raw-value equality: two handles are equal only if both index
/// and generation match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// Reserved all-ones value. Never issued, never valid.
    pub const INVALID: Handle = Handle(u64::MAX);

    #[inline]
    pub const fn new(index: u64, generation: u32) -> Self {
        debug_assert!(index <= INDEX_MASK);
        Handle(((generation & GENERATION_MASK) as u64) << INDEX_BITS | (index & INDEX_MASK))
    }

    #[inline]
    pub const fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> INDEX_BITS) as u32 & GENERATION_MASK
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Handle(bits)
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::INVALID
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Handle(INVALID)")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

struct Slot<T> {
    generation: u32,
    occupant: Option<T>,
}

/// Chunked slot allocator.
///
/// ```text
/// chunks:    [[s0 s1 .. s1023] [s1024 ..]]   fixed-size, never moved once created
/// free_list: [7, 2]                          LIFO; released slots are reused first
/// ```
///
/// `allocate`, `release`, `valid` and `get` are all O(1).
pub struct HandleTable<T> {
    chunks: Vec<Vec<Slot<T>>>,
    chunk_shift: u32,
    chunk_mask: u64,
    free_list: Vec<u64>,
    slot_count: u64,
    len: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Chunk size is rounded up to the next power of two.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1).next_power_of_two();
        Self {
            chunks: Vec::new(),
            chunk_shift: chunk_size.trailing_zeros(),
            chunk_mask: chunk_size as u64 - 1,
            free_list: Vec::new(),
            slot_count: 0,
            len: 0,
        }
    }

    /// Store `data` in a free slot and return its handle.
    pub fn allocate(&mut self, data: T) -> Result<Handle> {
        if let Some(index) = self.free_list.pop() {
            let (chunk, offset) = self.locate(index);
            let slot = &mut self.chunks[chunk][offset];
            debug_assert!(slot.occupant.is_none());
            slot.occupant = Some(data);
            self.len += 1;
            return Ok(Handle::new(index, slot.generation));
        }

        let index = self.slot_count;
        if index > MAX_INDEX {
            return Err(SpawnError::EntityCapacityExhausted {
                attempted: index,
                capacity: MAX_INDEX + 1,
            }
            .into());
        }

        if index & self.chunk_mask == 0 {
            self.chunks.push(Vec::with_capacity(self.chunk_size()));
        }
        // Slots are appended in index order, so the last chunk owns `index`.
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.push(Slot {
                generation: 0,
                occupant: Some(data),
            });
        }
        self.slot_count += 1;
        self.len += 1;
        Ok(Handle::new(index, 0))
    }

    /// Free the slot behind `handle`, returning its data.
    ///
    /// Returns `None` (and changes nothing) for stale or invalid handles, so a
    /// double release is harmless.
    pub fn release(&mut self, handle: Handle) -> Option<T> {
        let index = handle.index();
        let slot = self.slot_mut(handle)?;
        let data = slot.occupant.take()?;
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        self.free_list.push(index);
        self.len -= 1;
        Some(data)
    }

    /// `true` while `handle` refers to the current occupant of its slot.
    #[inline]
    pub fn valid(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Dereference `handle`. Generation mismatch yields `None`.
    #[doc(alias = "dereference")]
    #[inline]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slot(handle)?;
        slot.occupant.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slot_mut(handle)?;
        slot.occupant.as_mut()
    }

    /// Live occupants.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots ever created, live or free.
    pub fn slot_count(&self) -> u64 {
        self.slot_count
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_size(&self) -> usize {
        1 << self.chunk_shift
    }

    /// Live `(handle, data)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        let shift = self.chunk_shift;
        self.chunks.iter().enumerate().flat_map(move |(c, chunk)| {
            chunk.iter().enumerate().filter_map(move |(o, slot)| {
                let index = ((c as u64) << shift) | o as u64;
                slot.occupant
                    .as_ref()
                    .map(|data| (Handle::new(index, slot.generation), data))
            })
        })
    }

    #[inline]
    fn locate(&self, index: u64) -> (usize, usize) {
        (
            (index >> self.chunk_shift) as usize,
            (index & self.chunk_mask) as usize,
        )
    }

    #[inline]
    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        let index = handle.index();
        if handle.is_invalid() || index >= self.slot_count {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        let slot = &self.chunks[chunk][offset];
        (slot.generation == handle.generation()).then_some(slot)
    }

    #[inline]
    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<T>> {
        let index = handle.index();
        if handle.is_invalid() || index >= self.slot_count {
            return None;
        }
        let (chunk, offset) = self.locate(index);
        let slot = &mut self.chunks[chunk][offset];
        (slot.generation == handle.generation()).then_some(slot)
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;

    #[test]
    fn test_handle_packing() {
        let h = Handle::new(12345, 678);
        assert_eq!(h.index(), 12345);
        assert_eq!(h.generation(), 678);
        assert_eq!(Handle::from_bits(h.to_bits()), h);
        assert!(!h.is_invalid());
        assert!(Handle::INVALID.is_invalid());
        assert_eq!(Handle::default(), Handle::INVALID);
    }

    #[test]
    fn test_handle_equality_is_raw() {
        assert_eq!(Handle::new(3, 1), Handle::new(3, 1));
        assert_ne!(Handle::new(3, 1), Handle::new(3, 2));
        assert_ne!(Handle::new(3, 1), Handle::new(4, 1));
    }

    #[test]
    fn test_allocate_sequential() {
        let mut table = HandleTable::new();
        let h0 = table.allocate("a").unwrap();
        let h1 = table.allocate("b").unwrap();
        assert_eq!(h0.index(), 0);
        assert_eq!(h1.index(), 1);
        assert_eq!(h0.generation(), 0);
        assert_eq!(table.get(h0), Some(&"a"));
        assert_eq!(table.get(h1), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_release_bumps_generation() {
        let mut table = HandleTable::new();
        let h = table.allocate(1u32).unwrap();
        assert_eq!(table.release(h), Some(1));
        assert!(!table.valid(h));
        assert_eq!(table.get(h), None);

        let reused = table.allocate(2u32).unwrap();
        assert_eq!(reused.index(), h.index());
        assert_eq!(reused.generation(), h.generation() + 1);
        assert!(!table.valid(h));
        assert_eq!(table.get(reused), Some(&2));
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut table = HandleTable::new();
        let h = table.allocate(()).unwrap();
        assert!(table.release(h).is_some());
        assert!(table.release(h).is_none());
        assert_eq!(table.free_count(), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_invalid_handle_never_resolves() {
        let mut table = HandleTable::new();
        table.allocate(0u8).unwrap();
        assert!(!table.valid(Handle::INVALID));
        assert!(table.get_mut(Handle::INVALID).is_none());
        assert!(table.release(Handle::INVALID).is_none());
        assert!(!table.valid(Handle::new(99, 0)));
    }

    #[test]
    fn test_grows_in_chunks() {
        let mut table = HandleTable::with_chunk_size(4);
        assert_eq!(table.chunk_count(), 0);
        let handles: Vec<_> = (0..9).map(|i| table.allocate(i).unwrap()).collect();
        assert_eq!(table.chunk_count(), 3);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(table.get(*h), Some(&i));
        }
    }

    #[test]
    fn test_chunk_size_rounds_to_power_of_two() {
        let table: HandleTable<()> = HandleTable::with_chunk_size(100);
        assert_eq!(table.chunk_size(), 128);
        let table: HandleTable<()> = HandleTable::with_chunk_size(0);
        assert_eq!(table.chunk_size(), 1);
    }

    #[test]
    fn test_generation_wraps_without_panic() {
        let mut table = HandleTable::new();
        let h = table.allocate(()).unwrap();
        table.chunks[0][0].generation = GENERATION_MASK;
        let old = Handle::new(h.index(), GENERATION_MASK);
        assert!(table.valid(old));

        table.release(old);
        let wrapped = table.allocate(()).unwrap();
        assert_eq!(wrapped.generation(), 0);
        assert!(!table.valid(old));
        // The accepted wraparound hazard: the generation-0 handle matches again.
        assert!(table.valid(h));
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut table = HandleTable::with_chunk_size(1);
        table.slot_count = MAX_INDEX + 1;
        let err = table.allocate(()).unwrap_err();
        assert!(matches!(
            err,
            EcsError::SpawnError(SpawnError::EntityCapacityExhausted { .. })
        ));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut table = HandleTable::with_chunk_size(2);
        let a = table.allocate('a').unwrap();
        let b = table.allocate('b').unwrap();
        let c = table.allocate('c').unwrap();
        table.release(b);
        let live: Vec<_> = table.iter().collect();
        assert_eq!(live, vec![(a, &'a'), (c, &'c')]);
    }
}
