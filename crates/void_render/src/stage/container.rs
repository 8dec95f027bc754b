//! Instance containers
//!
//! A stage owns its instances through a container. Entries are kept in
//! insertion order; visibility queries return entry indices in that order so
//! batching stays deterministic whatever the container's query structure.

use std::collections::HashMap;
use void_core::InstanceId;

use crate::flow::RenderParameter;
use crate::instance::Instance;
use crate::spatial::{Bvh, FrustumPlanes};

/// An instance and the parameter it was registered with
pub struct Registered {
    pub instance: Box<dyn Instance>,
    pub parameter: RenderParameter,
}

impl Registered {
    pub fn new(instance: Box<dyn Instance>, parameter: RenderParameter) -> Self {
        Self { instance, parameter }
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id()
    }
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("id", &self.instance.id())
            .field("flow", &self.parameter.flow_type())
            .finish()
    }
}

/// Storage and visibility query for the instances of a stage
pub trait InstanceContainer: Send {
    /// Add an instance, replacing any entry with the same id
    fn insert(&mut self, entry: Registered);

    fn remove(&mut self, id: InstanceId) -> Option<Registered>;

    fn get(&self, id: InstanceId) -> Option<&Registered>;

    /// Entries in insertion order
    fn entries(&self) -> &[Registered];

    fn entries_mut(&mut self) -> &mut [Registered];

    /// Keep entries for which `keep` returns true. Returns the removed ids.
    fn retain(&mut self, keep: &mut dyn FnMut(&Registered) -> bool) -> Vec<InstanceId>;

    /// Pick up bounds changes. Returns the number of entries restructured.
    fn refresh_bounds(&mut self) -> usize {
        0
    }

    /// Indices of entries that render this frame and are not culled by
    /// `frustum`, ascending
    fn query_visible(&self, frustum: Option<&FrustumPlanes>) -> Vec<usize>;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Insertion-ordered entries with an id index
#[derive(Debug, Default)]
struct Entries {
    items: Vec<Registered>,
    index: HashMap<InstanceId, usize>,
}

impl Entries {
    /// Insert or replace. Returns the replaced entry.
    fn insert(&mut self, entry: Registered) -> Option<Registered> {
        let id = entry.id();
        match self.index.get(&id) {
            Some(&i) => Some(std::mem::replace(&mut self.items[i], entry)),
            None => {
                self.index.insert(id, self.items.len());
                self.items.push(entry);
                None
            }
        }
    }

    fn remove(&mut self, id: InstanceId) -> Option<Registered> {
        let i = self.index.remove(&id)?;
        let entry = self.items.remove(i);
        self.reindex_from(i);
        Some(entry)
    }

    fn get(&self, id: InstanceId) -> Option<&Registered> {
        self.index.get(&id).map(|&i| &self.items[i])
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&Registered) -> bool) -> Vec<InstanceId> {
        let mut removed = Vec::new();
        self.items.retain(|entry| {
            let kept = keep(entry);
            if !kept {
                removed.push(entry.id());
            }
            kept
        });
        if !removed.is_empty() {
            for id in &removed {
                self.index.remove(id);
            }
            self.reindex_from(0);
        }
        removed
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, entry) in self.items.iter().enumerate().skip(start) {
            self.index.insert(entry.id(), i);
        }
    }
}

/// Frustum test on an entry without a tree
fn passes_frustum(entry: &Registered, frustum: Option<&FrustumPlanes>) -> bool {
    match (frustum, entry.instance.bounds()) {
        (Some(frustum), Some(bounds)) => frustum.contains_aabb(&bounds).is_visible(),
        _ => true,
    }
}

/// Plain insertion-ordered container
#[derive(Debug, Default)]
pub struct OrderedContainer {
    entries: Entries,
}

impl OrderedContainer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceContainer for OrderedContainer {
    fn insert(&mut self, entry: Registered) {
        self.entries.insert(entry);
    }

    fn remove(&mut self, id: InstanceId) -> Option<Registered> {
        self.entries.remove(id)
    }

    fn get(&self, id: InstanceId) -> Option<&Registered> {
        self.entries.get(id)
    }

    fn entries(&self) -> &[Registered] {
        &self.entries.items
    }

    fn entries_mut(&mut self) -> &mut [Registered] {
        &mut self.entries.items
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&Registered) -> bool) -> Vec<InstanceId> {
        self.entries.retain(keep)
    }

    fn query_visible(&self, frustum: Option<&FrustumPlanes>) -> Vec<usize> {
        self.entries
            .items
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.instance.should_render() && passes_frustum(entry, frustum))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Container indexing bounded instances in a [`Bvh`]. Instances without
/// bounds are never culled.
#[derive(Debug)]
pub struct BvhContainer {
    entries: Entries,
    bvh: Bvh,
}

impl BvhContainer {
    /// `margin` fattens tree leaves so small movements skip reinsertion
    pub fn new(margin: f32) -> Self {
        Self {
            entries: Entries::default(),
            bvh: Bvh::new(margin),
        }
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }
}

impl Default for BvhContainer {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl InstanceContainer for BvhContainer {
    fn insert(&mut self, entry: Registered) {
        let id = entry.id();
        match entry.instance.bounds() {
            Some(bounds) => self.bvh.insert(id, bounds),
            None => {
                self.bvh.remove(id);
            }
        }
        self.entries.insert(entry);
    }

    fn remove(&mut self, id: InstanceId) -> Option<Registered> {
        self.bvh.remove(id);
        self.entries.remove(id)
    }

    fn get(&self, id: InstanceId) -> Option<&Registered> {
        self.entries.get(id)
    }

    fn entries(&self) -> &[Registered] {
        &self.entries.items
    }

    fn entries_mut(&mut self) -> &mut [Registered] {
        &mut self.entries.items
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&Registered) -> bool) -> Vec<InstanceId> {
        let removed = self.entries.retain(keep);
        for id in &removed {
            self.bvh.remove(*id);
        }
        removed
    }

    fn refresh_bounds(&mut self) -> usize {
        let mut restructured = 0;
        for entry in &self.entries.items {
            let id = entry.id();
            match entry.instance.bounds() {
                Some(bounds) => {
                    if self.bvh.update(id, bounds) {
                        restructured += 1;
                    }
                }
                None => {
                    if self.bvh.remove(id) {
                        restructured += 1;
                    }
                }
            }
        }
        restructured
    }

    fn query_visible(&self, frustum: Option<&FrustumPlanes>) -> Vec<usize> {
        let Some(frustum) = frustum else {
            return self
                .entries
                .items
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.instance.should_render())
                .map(|(i, _)| i)
                .collect();
        };

        let mut visible: Vec<usize> = self
            .bvh
            .frustum_cull(frustum)
            .into_iter()
            .filter_map(|id| self.entries.index.get(&id).copied())
            .collect();
        visible.extend(
            self.entries
                .items
                .iter()
                .enumerate()
                .filter(|(_, entry)| !self.bvh.contains(entry.id()))
                .map(|(i, _)| i),
        );
        visible.sort_unstable();
        visible.retain(|&i| self.entries.items[i].instance.should_render());
        visible
    }
}
