//! Parent/child relationships
//!
//! Links are stored as plain handles on a [`Hierarchy`] component and resolved
//! through the world at use, so a destroyed parent simply stops resolving.
//! Every structural change goes through [`HierarchyBuilder`], which keeps
//! `child.parent == p` in step with `p.children` containing `child` and
//! refuses edits that would make a node its own ancestor.

use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

/// Parent link, ordered child list and a structure version.
///
/// The version is bumped whenever the node's parent changes; dependent-state
/// propagation compares it to detect reparenting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hierarchy {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    version: u32,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn contains(&self, child: EntityId) -> bool {
        self.children.contains(&child)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn add_child(&mut self, child: EntityId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    fn remove_child(&mut self, child: EntityId) -> bool {
        if let Some(pos) = self.children.iter().position(|&c| c == child) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    fn relink(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
        self.version = self.version.wrapping_add(1);
    }
}

/// Helper to establish parent-child relationships
pub struct HierarchyBuilder;

impl HierarchyBuilder {
    /// Move `child` under `parent`, or make it a root with `None`.
    ///
    /// Rejected, with the hierarchy left untouched, if either handle is stale,
    /// if `parent == child`, or if `parent` is a descendant of `child`.
    pub fn set_parent(world: &mut World, child: EntityId, parent: Option<EntityId>) -> Result<()> {
        if !world.is_alive(child) {
            tracing::warn!(entity = ?child, "set_parent on a stale entity handle");
            return Err(EcsError::EntityNotFound);
        }
        if let Some(parent) = parent {
            if !world.is_alive(parent) {
                tracing::warn!(entity = ?parent, "set_parent to a stale parent handle");
                return Err(EcsError::EntityNotFound);
            }
            if parent == child {
                return Err(EcsError::HierarchyError(
                    "Cannot attach entity to itself".to_string(),
                ));
            }
            if Self::is_descendant(world, parent, child) {
                return Err(EcsError::HierarchyError(format!(
                    "Entity {parent:?} is a descendant of {child:?}; attaching would create a cycle"
                )));
            }
        }

        let old_parent = Self::parent(world, child);
        if old_parent == parent {
            return Ok(());
        }

        if let Some(old) = old_parent {
            if let Some(links) = Self::links_mut(world, old) {
                links.remove_child(child);
            }
        }
        if let Some(new) = parent {
            Self::ensure(world, new)?.add_child(child);
        }
        Self::ensure(world, child)?.relink(parent);

        tracing::trace!(child = ?child, ?old_parent, new_parent = ?parent, "reparented");
        Ok(())
    }

    /// Attach child entity to parent
    pub fn attach(world: &mut World, parent: EntityId, child: EntityId) -> Result<()> {
        Self::set_parent(world, child, Some(parent))
    }

    /// Detach child from its parent, making it a root
    pub fn detach(world: &mut World, child: EntityId) -> Result<()> {
        Self::set_parent(world, child, None)
    }

    /// Attaches multiple children to a parent
    pub fn create_hierarchy(world: &mut World, parent: EntityId, children: &[EntityId]) -> Result<()> {
        for &child in children {
            Self::attach(world, parent, child)?;
        }
        Ok(())
    }

    /// Parent of `entity`, if it has one.
    pub fn parent(world: &World, entity: EntityId) -> Option<EntityId> {
        world.store::<Hierarchy>()?.get(entity)?.parent()
    }

    /// Children of `entity` in attachment order.
    pub fn children(world: &World, entity: EntityId) -> &[EntityId] {
        world
            .store::<Hierarchy>()
            .and_then(|store| store.get(entity))
            .map(Hierarchy::children)
            .unwrap_or_default()
    }

    /// `true` if `ancestor` appears on `node`'s parent chain.
    pub fn is_descendant(world: &World, node: EntityId, ancestor: EntityId) -> bool {
        let mut current = Self::parent(world, node);
        // A well-formed chain is never longer than the entity count.
        let mut budget = world.entity_count();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if budget == 0 {
                tracing::warn!(entity = ?node, "parent chain longer than entity count");
                return false;
            }
            budget -= 1;
            current = Self::parent(world, id);
        }
        false
    }

    /// `entity` followed by all of its descendants, depth first.
    pub fn descendants(world: &World, entity: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![entity];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(Self::children(world, node).iter().rev());
        }
        out
    }

    /// Unlink `entity` from its parent and orphan its children.
    pub fn remove_from_hierarchy(world: &mut World, entity: EntityId) -> Result<()> {
        Self::detach(world, entity)?;
        let children = Self::children(world, entity).to_vec();
        for child in children {
            if let Some(links) = Self::links_mut(world, child) {
                links.relink(None);
            }
        }
        if let Some(links) = Self::links_mut(world, entity) {
            links.children.clear();
        }
        Ok(())
    }

    /// Destroy `entity` and its whole subtree. Returns how many were destroyed.
    pub fn destroy_recursive(world: &mut World, entity: EntityId) -> Result<usize> {
        Self::detach(world, entity)?;
        let doomed = Self::descendants(world, entity);
        for &id in &doomed {
            world.destroy(id)?;
        }
        Ok(doomed.len())
    }

    fn ensure(world: &mut World, entity: EntityId) -> Result<&mut Hierarchy> {
        if !world.has::<Hierarchy>(entity) {
            world.add(entity, Hierarchy::new())?;
        }
        world.get_mut::<Hierarchy>(entity).ok_or(EcsError::ComponentNotFound)
    }

    fn links_mut(world: &mut World, entity: EntityId) -> Option<&mut Hierarchy> {
        world.store_mut::<Hierarchy>()?.get_mut(entity)
    }
}
