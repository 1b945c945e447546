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

//! Entity identifiers and per-entity bookkeeping.

use smallvec::SmallVec;
use std::any::TypeId;

use crate::handle::Handle;

/// Entity identifier: a generational handle issued by the world's handle table.
pub type EntityId = Handle;

/// What the world remembers about a live entity: the component types it
/// currently owns, so `destroy` can visit exactly those stores.
#[derive(Debug, Default, Clone)]
pub struct EntityRecord {
    components: SmallVec<[TypeId; 8]>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&mut self, type_id: TypeId) {
        if !self.components.contains(&type_id) {
            self.components.push(type_id);
        }
    }

    pub(crate) fn untrack(&mut self, type_id: TypeId) {
        self.components.retain(|t| *t != type_id);
    }

    pub fn has(&self, type_id: TypeId) -> bool {
        self.components.contains(&type_id)
    }

    pub fn component_types(&self) -> &[TypeId] {
        &self.components
    }
}
