//! Dirty-flag propagation of derived state down a hierarchy
//!
//! A [`Propagation`] kind describes how a node's derived value is computed
//! from its parent's derived value and its own local value. Nodes carry a
//! [`Dependent`] component holding both; [`propagate`] recomputes only what a
//! local edit or a reparent could have affected.
//!
//! The pass runs in two phases:
//!
//! 1. **Mark**: every node whose local value changed, or whose hierarchy
//!    version moved since it last settled, marks itself and its subtree dirty.
//! 2. **Settle**: each dirty node whose parent is clean (or absent) recomputes
//!    and then recomputes its whole subtree top-down. A node whose parent is
//!    still dirty is skipped; the parent's subtree pass reaches it.
//!
//! After [`propagate`] returns, no participating node is dirty and every
//! cached value equals `combine(parent_cached, local)`.

use ahash::AHashSet;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::entity::EntityId;
use crate::error::Result;
use crate::hierarchy::Hierarchy;
use crate::system::System;
use crate::world::World;

/// How derived state flows from parent to child.
pub trait Propagation: 'static {
    /// State owned by the node itself.
    type Local: 'static;
    /// State computed from the parent's derived state and the local state.
    type Derived: Clone + 'static;

    /// Derived value used for roots and nodes with no participating parent.
    fn identity() -> Self::Derived;

    fn combine(parent: &Self::Derived, local: &Self::Local) -> Self::Derived;
}

/// Per-node component: local value plus cached derived value.
pub struct Dependent<P: Propagation> {
    local: P::Local,
    cached: P::Derived,
    dirty: bool,
    changed: bool,
    seen_version: u32,
}

impl<P: Propagation> Dependent<P> {
    /// A new node is unsettled until the next [`propagate`].
    pub fn new(local: P::Local) -> Self {
        Self {
            local,
            cached: P::identity(),
            dirty: true,
            changed: true,
            seen_version: 0,
        }
    }

    pub fn local(&self) -> &P::Local {
        &self.local
    }

    /// Mutable access to the local value; marks the node changed.
    pub fn local_mut(&mut self) -> &mut P::Local {
        self.changed = true;
        &mut self.local
    }

    pub fn set_local(&mut self, local: P::Local) {
        self.local = local;
        self.changed = true;
    }

    /// Derived value as of the last settle.
    pub fn cached(&self) -> &P::Derived {
        &self.cached
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Force a recompute of this node and its subtree on the next pass.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }
}

impl<P: Propagation> Clone for Dependent<P>
where
    P::Local: Clone,
{
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            cached: self.cached.clone(),
            dirty: self.dirty,
            changed: self.changed,
            seen_version: self.seen_version,
        }
    }
}

impl<P: Propagation> fmt::Debug for Dependent<P>
where
    P::Local: fmt::Debug,
    P::Derived: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependent")
            .field("local", &self.local)
            .field("cached", &self.cached)
            .field("dirty", &self.dirty)
            .field("changed", &self.changed)
            .finish()
    }
}

/// Counters from a single [`propagate`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Nodes that started the pass changed or reparented.
    pub sources: usize,
    /// Nodes marked dirty.
    pub marked: usize,
    /// Nodes recomputed.
    pub settled: usize,
}

/// Recompute derived state of kind `P` for every node that needs it.
pub fn propagate<P: Propagation>(world: &mut World) -> PropagationStats {
    #[cfg(feature = "profiling")]
    let _span = info_span!("propagate", kind = std::any::type_name::<P>()).entered();

    let mut stats = PropagationStats::default();

    let sources = collect_sources::<P>(world);
    stats.sources = sources.len();
    if sources.is_empty() {
        return stats;
    }

    mark_dirty::<P>(world, &sources, &mut stats);

    let dirty: Vec<EntityId> = match world.store::<Dependent<P>>() {
        Some(store) => store
            .iter()
            .filter(|(_, dep)| dep.dirty)
            .map(|(id, _)| id)
            .collect(),
        None => return stats,
    };
    for node in dirty {
        try_settle::<P>(world, node, &mut stats);
    }

    tracing::debug!(
        kind = std::any::type_name::<P>(),
        sources = stats.sources,
        marked = stats.marked,
        settled = stats.settled,
        "propagation pass"
    );
    stats
}

fn collect_sources<P: Propagation>(world: &World) -> Vec<EntityId> {
    let Some(store) = world.store::<Dependent<P>>() else {
        return Vec::new();
    };
    store
        .iter()
        .filter(|(id, dep)| dep.changed || dep.seen_version != hierarchy_version(world, *id))
        .map(|(id, _)| id)
        .collect()
}

fn mark_dirty<P: Propagation>(world: &mut World, sources: &[EntityId], stats: &mut PropagationStats) {
    // Subtrees already walked this pass.
    let mut covered: AHashSet<EntityId> = AHashSet::with_capacity(sources.len());
    let mut stack: Vec<EntityId> = Vec::new();

    for &source in sources {
        stack.push(source);
        while let Some(node) = stack.pop() {
            if !covered.insert(node) {
                continue;
            }
            let Some(dep) = dependent_mut::<P>(world, node) else {
                continue;
            };
            dep.dirty = true;
            stats.marked += 1;
            stack.extend_from_slice(children(world, node));
        }
    }
}

fn try_settle<P: Propagation>(world: &mut World, node: EntityId, stats: &mut PropagationStats) {
    match world.store::<Dependent<P>>().and_then(|s| s.get(node)) {
        Some(dep) if dep.dirty => {}
        _ => return,
    }

    let parent = parent_of(world, node).and_then(|p| world.store::<Dependent<P>>()?.get(p));
    let parent_derived = match parent {
        Some(parent) if parent.dirty => return,
        Some(parent) => parent.cached.clone(),
        None => P::identity(),
    };

    settle_subtree::<P>(world, node, parent_derived, stats);
}

/// Recompute `root` and everything below it, unconditionally.
fn settle_subtree<P: Propagation>(
    world: &mut World,
    root: EntityId,
    parent_derived: P::Derived,
    stats: &mut PropagationStats,
) {
    let mut stack: Vec<(EntityId, P::Derived)> = vec![(root, parent_derived)];
    let mut below: Vec<EntityId> = Vec::new();

    while let Some((node, parent_derived)) = stack.pop() {
        let version = hierarchy_version(world, node);
        let Some(dep) = dependent_mut::<P>(world, node) else {
            continue;
        };
        dep.cached = P::combine(&parent_derived, &dep.local);
        dep.dirty = false;
        dep.changed = false;
        dep.seen_version = version;
        stats.settled += 1;
        let derived = dep.cached.clone();

        below.clear();
        below.extend_from_slice(children(world, node));
        for &child in below.iter().rev() {
            stack.push((child, derived.clone()));
        }
    }
}

fn dependent_mut<P: Propagation>(world: &mut World, node: EntityId) -> Option<&mut Dependent<P>> {
    world.store_mut::<Dependent<P>>()?.get_mut(node)
}

fn parent_of(world: &World, node: EntityId) -> Option<EntityId> {
    world.store::<Hierarchy>()?.get(node)?.parent()
}

fn children(world: &World, node: EntityId) -> &[EntityId] {
    world
        .store::<Hierarchy>()
        .and_then(|s| s.get(node))
        .map(Hierarchy::children)
        .unwrap_or_default()
}

fn hierarchy_version(world: &World, node: EntityId) -> u32 {
    world
        .store::<Hierarchy>()
        .and_then(|s| s.get(node))
        .map_or(0, Hierarchy::version)
}

/// Runs [`propagate`] for kind `P` once per update.
pub struct PropagateSystem<P: Propagation> {
    last: PropagationStats,
    _kind: PhantomData<fn() -> P>,
}

impl<P: Propagation> PropagateSystem<P> {
    pub fn new() -> Self {
        Self {
            last: PropagationStats::default(),
            _kind: PhantomData,
        }
    }

    /// Counters from the most recent run.
    pub fn last_stats(&self) -> PropagationStats {
        self.last
    }
}

impl<P: Propagation> Default for PropagateSystem<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Propagation> System for PropagateSystem<P> {
    fn name(&self) -> &'static str {
        "PropagateSystem"
    }

    fn update(&mut self, world: &mut World, _dt: Duration) -> Result<()> {
        self.last = propagate::<P>(world);
        Ok(())
    }
}
