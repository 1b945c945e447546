//! System trait and update intervals

use std::time::Duration;

use crate::error::Result;
use crate::world::World;

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

/// How often a system runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateInterval {
    /// Due on every tick.
    EveryTick,
    /// Due once at least this much time has accumulated.
    Every(Duration),
}

impl UpdateInterval {
    /// Negative (or NaN) seconds mean "every tick".
    pub fn from_secs_f32(secs: f32) -> Self {
        if secs.is_nan() || secs < 0.0 {
            UpdateInterval::EveryTick
        } else {
            UpdateInterval::Every(Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX))
        }
    }

    pub fn is_due(&self, accumulated: Duration) -> bool {
        match self {
            UpdateInterval::EveryTick => true,
            UpdateInterval::Every(interval) => accumulated >= *interval,
        }
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        UpdateInterval::EveryTick
    }
}

/// A unit of per-tick logic.
///
/// Every due system gets `pre_update`, then every due system gets `update`,
/// then every due system gets `post_update`. `elapsed` is the time
/// accumulated since the system last ran (the tick delta for systems that run
/// every tick).
pub trait System {
    /// Get system name
    fn name(&self) -> &'static str;

    /// Stage cross-system data or publish events for this tick.
    fn pre_update(&mut self, _world: &mut World, _elapsed: Duration) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, world: &mut World, elapsed: Duration) -> Result<()>;

    /// Flush or clean up after every due system has updated.
    fn post_update(&mut self, _world: &mut World, _elapsed: Duration) -> Result<()> {
        Ok(())
    }
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_interval_means_every_tick() {
        assert_eq!(UpdateInterval::from_secs_f32(-1.0), UpdateInterval::EveryTick);
        assert_eq!(UpdateInterval::from_secs_f32(f32::NAN), UpdateInterval::EveryTick);
        assert_eq!(
            UpdateInterval::from_secs_f32(0.5),
            UpdateInterval::Every(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_is_due() {
        let every = UpdateInterval::Every(Duration::from_secs(1));
        assert!(!every.is_due(Duration::from_millis(999)));
        assert!(every.is_due(Duration::from_secs(1)));
        assert!(UpdateInterval::EveryTick.is_due(Duration::ZERO));
    }

    #[derive(Default)]
    struct DummySystem {
        runs: u32,
    }

    impl System for DummySystem {
        fn name(&self) -> &'static str {
            "dummy_system"
        }

        fn update(&mut self, world: &mut World, _elapsed: Duration) -> Result<()> {
            // Create and immediately destroy to ensure mutable access works
            let entity = world.create()?;
            world.destroy(entity)?;
            self.runs += 1;
            Ok(())
        }
    }

    #[test]
    fn test_system_phases_default_to_noop() {
        let mut world = World::new();
        let mut system = DummySystem::default();
        system.pre_update(&mut world, Duration::ZERO).unwrap();
        system.update(&mut world, Duration::ZERO).expect("system should run");
        system.post_update(&mut world, Duration::ZERO).unwrap();
        assert_eq!(system.runs, 1);
        assert_eq!(world.entity_count(), 0);
    }
}
