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

//! Simcore - runtime core for real-time simulations
//!
//! Generational entity handles, per-type component stores, an arena-pooled
//! re-entrant event bus, a priority/interval system scheduler and dirty-flag
//! propagation of derived state down an entity hierarchy.

pub mod app;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod handle;
pub mod hierarchy;
pub mod prelude;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod propagation;
pub mod schedule;
pub mod system;
pub mod transform;
pub mod world;

pub use app::*;
pub use component::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use event::*;
pub use event_bus::*;
pub use handle::*;
pub use hierarchy::*;
pub use propagation::*;
pub use schedule::*;
pub use system::*;
pub use transform::*;
pub use world::*;
