//! Priority- and interval-driven system scheduler
//!
//! Systems run in descending priority; equal priorities keep insertion order.
//! Each tick adds `dt` to every active system's accumulator, then runs the
//! three phases over the systems that are due:
//!
//! ```text
//! pre_update(A) pre_update(C) pre_update(B)
//! update(A)     update(C)     update(B)
//! post_update(A) post_update(C) post_update(B)
//! ```
//!
//! A due system's accumulator is reset to zero afterwards; any remainder past
//! the interval is dropped, not carried.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::time::{Duration, Instant};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::{EcsError, Result};
use crate::system::{BoxedSystem, SystemId, UpdateInterval};
use crate::world::World;

/// Timing data collected for one system
#[derive(Debug, Clone, Default)]
pub struct SystemStats {
    pub run_count: u64,
    pub last_duration: Duration,
    pub total_duration: Duration,
}

impl SystemStats {
    pub fn average(&self) -> Duration {
        if self.run_count == 0 {
            Duration::ZERO
        } else {
            self.total_duration.div_f64(self.run_count as f64)
        }
    }
}

struct SystemEntry {
    id: SystemId,
    system: BoxedSystem,
    priority: u32,
    interval: UpdateInterval,
    accumulated: Duration,
    active: bool,
    sequence: u64,
}

#[derive(Clone, Copy)]
enum Phase {
    Pre,
    Update,
    Post,
}

/// Holds systems and runs them once per [`tick`](Scheduler::tick).
pub struct Scheduler {
    entries: Vec<SystemEntry>,
    next_id: u32,
    next_sequence: u64,
    sorted: bool,
    tick_count: u64,
    stats: FxHashMap<SystemId, SystemStats>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            next_sequence: 0,
            sorted: true,
            tick_count: 0,
            stats: FxHashMap::default(),
        }
    }

    /// Register a system. Higher `priority` runs first.
    pub fn add(&mut self, system: BoxedSystem, priority: u32, interval: UpdateInterval) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;
        tracing::debug!(system = system.name(), priority, ?interval, "system added");
        self.entries.push(SystemEntry {
            id,
            system,
            priority,
            interval,
            accumulated: Duration::ZERO,
            active: true,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        self.sorted = false;
        id
    }

    /// Unregister a system and hand it back.
    pub fn remove(&mut self, id: SystemId) -> Option<BoxedSystem> {
        let position = self.entries.iter().position(|e| e.id == id)?;
        self.stats.remove(&id);
        Some(self.entries.remove(position).system)
    }

    /// Activate or deactivate a system between ticks.
    ///
    /// Deactivation zeroes the accumulator so a later reactivation waits a
    /// full interval.
    pub fn set_active(&mut self, id: SystemId, active: bool) -> Result<()> {
        let entry = self.entry_mut(id).ok_or(EcsError::SystemNotFound)?;
        entry.active = active;
        if !active {
            entry.accumulated = Duration::ZERO;
        }
        Ok(())
    }

    pub fn set_priority(&mut self, id: SystemId, priority: u32) -> Result<()> {
        self.entry_mut(id).ok_or(EcsError::SystemNotFound)?.priority = priority;
        self.sorted = false;
        Ok(())
    }

    pub fn set_interval(&mut self, id: SystemId, interval: UpdateInterval) -> Result<()> {
        self.entry_mut(id).ok_or(EcsError::SystemNotFound)?.interval = interval;
        Ok(())
    }

    pub fn is_active(&self, id: SystemId) -> Option<bool> {
        self.entry(id).map(|e| e.active)
    }

    /// Time accumulated towards the system's next run.
    pub fn accumulated(&self, id: SystemId) -> Option<Duration> {
        self.entry(id).map(|e| e.accumulated)
    }

    pub fn stats(&self, id: SystemId) -> Option<&SystemStats> {
        self.stats.get(&id)
    }

    pub fn system_count(&self) -> usize {
        self.entries.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// System names in execution order.
    pub fn execution_order(&mut self) -> Vec<&'static str> {
        self.ensure_sorted();
        self.entries.iter().map(|e| e.system.name()).collect()
    }

    /// Advance every active system by `dt` and run the ones that are due.
    ///
    /// Returns how many systems ran. The first phase error aborts the tick;
    /// accumulators of the systems that were due are then left unreset.
    pub fn tick(&mut self, world: &mut World, dt: Duration) -> Result<usize> {
        #[cfg(feature = "profiling")]
        let _span = info_span!("scheduler.tick", systems = self.entries.len()).entered();

        self.ensure_sorted();

        let mut due: SmallVec<[usize; 16]> = SmallVec::new();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if !entry.active {
                continue;
            }
            entry.accumulated += dt;
            if entry.interval.is_due(entry.accumulated) {
                due.push(index);
            }
        }

        for phase in [Phase::Pre, Phase::Update, Phase::Post] {
            for &index in &due {
                self.run_phase(index, phase, world)?;
            }
        }

        for &index in &due {
            self.entries[index].accumulated = Duration::ZERO;
        }

        self.tick_count += 1;
        tracing::trace!(tick = self.tick_count, due = due.len(), "scheduler tick");
        Ok(due.len())
    }

    fn run_phase(&mut self, index: usize, phase: Phase, world: &mut World) -> Result<()> {
        let entry = &mut self.entries[index];
        let elapsed = entry.accumulated;

        let start = Instant::now();
        let result = match phase {
            Phase::Pre => entry.system.pre_update(world, elapsed),
            Phase::Update => entry.system.update(world, elapsed),
            Phase::Post => entry.system.post_update(world, elapsed),
        };
        let duration = start.elapsed();

        if let Err(err) = result {
            tracing::warn!(system = entry.system.name(), error = %err, "system failed, tick aborted");
            return Err(err);
        }

        let stats = self.stats.entry(entry.id).or_default();
        stats.total_duration += duration;
        match phase {
            Phase::Pre => stats.last_duration = duration,
            Phase::Update => stats.last_duration += duration,
            Phase::Post => {
                stats.last_duration += duration;
                stats.run_count += 1;
            }
        }
        Ok(())
    }

    fn ensure_sorted(&mut self) {
        if self.sorted {
            return;
        }
        self.entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.sequence.cmp(&b.sequence))
        });
        self.sorted = true;
    }

    fn entry(&self, id: SystemId) -> Option<&SystemEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: SystemId) -> Option<&mut SystemEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
