use std::time::Duration;

use crate::error::Result;
use crate::schedule::Scheduler;
use crate::system::{BoxedSystem, SystemId, UpdateInterval};
use crate::world::World;

/// A world paired with the scheduler that drives it.
pub struct App {
    pub world: World,
    pub scheduler: Scheduler,
}

impl App {
    /// Create new application
    pub fn new() -> Self {
        Self::with_world(World::new())
    }

    pub fn with_world(world: World) -> Self {
        Self {
            world,
            scheduler: Scheduler::new(),
        }
    }

    /// Add a system that runs every tick at `priority`
    pub fn add_system(&mut self, system: BoxedSystem, priority: u32) -> SystemId {
        self.scheduler.add(system, priority, UpdateInterval::EveryTick)
    }

    /// Add a system that runs at most once per `interval`
    pub fn add_system_with_interval(
        &mut self,
        system: BoxedSystem,
        priority: u32,
        interval: UpdateInterval,
    ) -> SystemId {
        self.scheduler.add(system, priority, interval)
    }

    /// Run one frame: tick the scheduler, then settle queued events.
    ///
    /// Returns the number of systems that ran.
    pub fn update(&mut self, dt: Duration) -> Result<usize> {
        let ran = self.scheduler.tick(&mut self.world, dt)?;
        let delivered = self.world.drain_events();
        tracing::trace!(ran, delivered, "frame complete");
        Ok(ran)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
