//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use simcore::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::component::Component;
pub use crate::config::WorldConfig;
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::event::EntityEvent;
pub use crate::event_bus::{Event, EventBus, EventContext, SubscriptionId};
pub use crate::handle::{Handle, HandleTable};
pub use crate::hierarchy::{Hierarchy, HierarchyBuilder};
pub use crate::propagation::{propagate, Dependent, PropagateSystem, Propagation};
pub use crate::schedule::Scheduler;
pub use crate::system::{BoxedSystem, System, SystemId, UpdateInterval};
pub use crate::transform::{GlobalTransform, LocalTransform, Transform, TransformPropagation};
pub use crate::world::World;
