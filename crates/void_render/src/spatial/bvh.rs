//! Bounding Volume Hierarchy for visibility queries
//!
//! A dynamic binary tree keyed by [`InstanceId`]. Leaves store fattened
//! bounds so small movements only touch the leaf; larger ones remove and
//! reinsert it. Insertion picks the sibling that grows the tree's surface
//! area the least and refits the ancestors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use void_core::InstanceId;

use void_math::{FrustumPlanes, FrustumTestResult, AABB};

/// BVH node internal representation
#[derive(Clone, Debug)]
struct BvhNode {
    /// Bounding box; fattened for leaves
    bounds: AABB,
    /// Exact bounds (leaf only)
    tight: AABB,
    /// Instance (leaf only)
    instance: Option<InstanceId>,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none()
    }
}

/// Query counters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BvhStats {
    pub leaves: usize,
    pub nodes: usize,
    pub reinserts: u64,
    pub refits: u64,
}

/// Bounding Volume Hierarchy over instances
#[derive(Clone, Debug)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    free: Vec<usize>,
    root: Option<usize>,
    leaves: HashMap<InstanceId, usize>,
    margin: f32,
    reinserts: u64,
    refits: u64,
}

impl Bvh {
    /// Create an empty tree; `margin` fattens every leaf
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: HashMap::new(),
            margin: margin.max(0.0),
            reinserts: 0,
            refits: 0,
        }
    }

    fn allocate(&mut self, node: BvhNode) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.instance = None;
        node.parent = None;
        node.left = None;
        node.right = None;
        self.free.push(index);
    }

    /// Insert an instance, or update it if already present
    pub fn insert(&mut self, id: InstanceId, bounds: AABB) {
        if self.leaves.contains_key(&id) {
            self.update(id, bounds);
            return;
        }
        let leaf = self.allocate(BvhNode {
            bounds: bounds.expand(self.margin),
            tight: bounds,
            instance: Some(id),
            parent: None,
            left: None,
            right: None,
        });
        self.leaves.insert(id, leaf);
        self.insert_leaf(leaf);
    }

    /// Remove an instance. Returns false if it was not present.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        match self.leaves.remove(&id) {
            Some(leaf) => {
                self.remove_leaf(leaf);
                self.release(leaf);
                true
            }
            None => false,
        }
    }

    /// Move an instance. Returns true if the leaf had to be reinserted.
    pub fn update(&mut self, id: InstanceId, bounds: AABB) -> bool {
        let Some(&leaf) = self.leaves.get(&id) else {
            self.insert(id, bounds);
            return true;
        };

        self.nodes[leaf].tight = bounds;
        if self.nodes[leaf].bounds.contains_aabb(&bounds) {
            return false;
        }

        self.remove_leaf(leaf);
        self.nodes[leaf].bounds = bounds.expand(self.margin);
        self.insert_leaf(leaf);
        self.reinserts += 1;
        true
    }

    fn insert_leaf(&mut self, leaf: usize) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.nodes[leaf].parent = None;
            return;
        };

        let leaf_bounds = self.nodes[leaf].bounds;
        let sibling = self.find_sibling(root, &leaf_bounds);

        let old_parent = self.nodes[sibling].parent;
        let parent = self.allocate(BvhNode {
            bounds: self.nodes[sibling].bounds.union(&leaf_bounds),
            tight: AABB::EMPTY,
            instance: None,
            parent: old_parent,
            left: Some(sibling),
            right: Some(leaf),
        });
        self.nodes[sibling].parent = Some(parent);
        self.nodes[leaf].parent = Some(parent);

        match old_parent {
            Some(old) => {
                if self.nodes[old].left == Some(sibling) {
                    self.nodes[old].left = Some(parent);
                } else {
                    self.nodes[old].right = Some(parent);
                }
            }
            None => self.root = Some(parent),
        }

        self.refit(old_parent);
    }

    /// Descend toward the child whose area grows least
    fn find_sibling(&self, root: usize, bounds: &AABB) -> usize {
        let mut index = root;
        loop {
            let node = &self.nodes[index];
            let (Some(left), Some(right)) = (node.left, node.right) else {
                return index;
            };

            let area = node.bounds.surface_area();
            let combined = node.bounds.union(bounds).surface_area();
            // Cost of making a new parent here, versus pushing down
            let cost_here = 2.0 * combined;
            let inheritance = 2.0 * (combined - area);

            let child_cost = |child: usize| {
                let child = &self.nodes[child];
                let grown = child.bounds.union(bounds).surface_area();
                if child.is_leaf() {
                    grown + inheritance
                } else {
                    grown - child.bounds.surface_area() + inheritance
                }
            };
            let cost_left = child_cost(left);
            let cost_right = child_cost(right);

            if cost_here < cost_left && cost_here < cost_right {
                return index;
            }
            index = if cost_left <= cost_right { left } else { right };
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let sibling = if self.nodes[parent].left == Some(leaf) {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };
        let Some(sibling) = sibling else {
            return;
        };
        let grandparent = self.nodes[parent].parent;

        match grandparent {
            Some(grand) => {
                if self.nodes[grand].left == Some(parent) {
                    self.nodes[grand].left = Some(sibling);
                } else {
                    self.nodes[grand].right = Some(sibling);
                }
                self.nodes[sibling].parent = Some(grand);
                self.release(parent);
                self.refit(Some(grand));
            }
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].parent = None;
                self.release(parent);
            }
        }
        self.nodes[leaf].parent = None;
    }

    /// Recompute bounds from `start` up to the root
    fn refit(&mut self, start: Option<usize>) {
        let mut current = start;
        while let Some(index) = current {
            let node = &self.nodes[index];
            if let (Some(left), Some(right)) = (node.left, node.right) {
                let bounds = self.nodes[left].bounds.union(&self.nodes[right].bounds);
                self.nodes[index].bounds = bounds;
                self.refits += 1;
            }
            current = self.nodes[index].parent;
        }
    }

    /// Instances whose bounds are not outside the frustum
    pub fn frustum_cull(&self, frustum: &FrustumPlanes) -> Vec<InstanceId> {
        self.frustum_cull_counted(frustum).0
    }

    /// Like [`Bvh::frustum_cull`], also returning the number of nodes tested
    pub fn frustum_cull_counted(&self, frustum: &FrustumPlanes) -> (Vec<InstanceId>, usize) {
        let mut results = Vec::new();
        let mut visited = 0;
        if let Some(root) = self.root {
            self.frustum_cull_recursive(root, frustum, &mut results, &mut visited);
        }
        (results, visited)
    }

    fn frustum_cull_recursive(
        &self,
        node_idx: usize,
        frustum: &FrustumPlanes,
        results: &mut Vec<InstanceId>,
        visited: &mut usize,
    ) {
        *visited += 1;
        let node = &self.nodes[node_idx];

        if node.is_leaf() {
            if frustum.contains_aabb(&node.tight).is_visible() {
                results.extend(node.instance);
            }
            return;
        }

        match frustum.contains_aabb(&node.bounds) {
            FrustumTestResult::Outside => {}
            FrustumTestResult::Inside => self.collect_all(node_idx, results),
            FrustumTestResult::Intersecting => {
                if let Some(left) = node.left {
                    self.frustum_cull_recursive(left, frustum, results, visited);
                }
                if let Some(right) = node.right {
                    self.frustum_cull_recursive(right, frustum, results, visited);
                }
            }
        }
    }

    fn collect_all(&self, node_idx: usize, results: &mut Vec<InstanceId>) {
        let node = &self.nodes[node_idx];
        results.extend(node.instance);
        if let Some(left) = node.left {
            self.collect_all(left, results);
        }
        if let Some(right) = node.right {
            self.collect_all(right, results);
        }
    }

    /// Instances whose bounds overlap `query`
    pub fn query_aabb(&self, query: &AABB) -> Vec<InstanceId> {
        let mut results = Vec::new();
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                if node.tight.intersects(query) {
                    results.extend(node.instance);
                }
                continue;
            }
            if node.bounds.intersects(query) {
                stack.extend(node.left);
                stack.extend(node.right);
            }
        }
        results
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.leaves.contains_key(&id)
    }

    pub fn bounds_of(&self, id: InstanceId) -> Option<AABB> {
        self.leaves.get(&id).map(|&leaf| self.nodes[leaf].tight)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn root_bounds(&self) -> Option<AABB> {
        self.root.map(|root| self.nodes[root].bounds)
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.leaves.clear();
        self.root = None;
    }

    pub fn stats(&self) -> BvhStats {
        BvhStats {
            leaves: self.leaves.len(),
            nodes: self.nodes.len() - self.free.len(),
            reinserts: self.reinserts,
            refits: self.refits,
        }
    }

    /// Depth of the deepest leaf
    pub fn height(&self) -> usize {
        fn depth(nodes: &[BvhNode], index: usize) -> usize {
            let node = &nodes[index];
            let left = node.left.map_or(0, |l| depth(nodes, l));
            let right = node.right.map_or(0, |r| depth(nodes, r));
            1 + left.max(right)
        }
        self.root.map_or(0, |root| depth(&self.nodes, root))
    }
}

impl Default for Bvh {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::box_frustum;
    use void_math::Vec3;

    fn cube(x: f32) -> AABB {
        AABB::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    fn id(raw: u64) -> InstanceId {
        InstanceId::from_raw(raw)
    }

    /// Parent links agree with child links and every node encloses its children
    fn assert_valid(bvh: &Bvh) {
        let Some(root) = bvh.root else {
            assert!(bvh.leaves.is_empty());
            return;
        };
        assert!(bvh.nodes[root].parent.is_none());
        let mut stack = vec![root];
        let mut leaves = 0;
        while let Some(index) = stack.pop() {
            let node = &bvh.nodes[index];
            if node.is_leaf() {
                leaves += 1;
                assert!(node.bounds.contains_aabb(&node.tight));
                continue;
            }
            for child in [node.left, node.right] {
                let child = child.unwrap();
                assert_eq!(bvh.nodes[child].parent, Some(index));
                assert!(node.bounds.contains_aabb(&bvh.nodes[child].bounds));
                stack.push(child);
            }
        }
        assert_eq!(leaves, bvh.len());
    }

    #[test]
    fn test_insert_remove() {
        let mut bvh = Bvh::new(0.1);
        for i in 0..10 {
            bvh.insert(id(i), cube(i as f32 * 2.0));
        }
        assert_eq!(bvh.len(), 10);
        assert_valid(&bvh);

        assert!(bvh.remove(id(3)));
        assert!(!bvh.remove(id(3)));
        assert_eq!(bvh.len(), 9);
        assert_valid(&bvh);

        for i in 0..10 {
            bvh.remove(id(i));
        }
        assert!(bvh.is_empty());
        assert!(bvh.root_bounds().is_none());
    }

    #[test]
    fn test_frustum_cull() {
        let mut bvh = Bvh::new(0.0);
        for i in 0..20 {
            bvh.insert(id(i), cube(i as f32 * 3.0));
        }
        // Covers x in [-10, 10]: cubes at 0, 3, 6, 9
        let mut visible = bvh.frustum_cull(&box_frustum(10.0));
        visible.sort();
        assert_eq!(visible, vec![id(0), id(1), id(2), id(3)]);

        let (all, visited) = bvh.frustum_cull_counted(&box_frustum(1000.0));
        assert_eq!(all.len(), 20);
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_update_within_margin() {
        let mut bvh = Bvh::new(0.5);
        bvh.insert(id(1), cube(0.0));
        bvh.insert(id(2), cube(10.0));

        assert!(!bvh.update(id(1), cube(0.25)));
        assert_eq!(bvh.bounds_of(id(1)), Some(cube(0.25)));

        assert!(bvh.update(id(1), cube(20.0)));
        assert_eq!(bvh.stats().reinserts, 1);
        assert_valid(&bvh);
        assert_eq!(bvh.query_aabb(&cube(20.0)), vec![id(1)]);
    }

    #[test]
    fn test_churn_keeps_tree_valid() {
        let mut bvh = Bvh::new(0.1);
        let mut seed = 12345u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as f32 / (1u64 << 31) as f32 * 100.0
        };

        for i in 0..200 {
            bvh.insert(id(i), cube(next()));
        }
        for i in (0..200).step_by(3) {
            bvh.remove(id(i));
        }
        for i in (1..200).step_by(3) {
            bvh.update(id(i), cube(next()));
        }
        assert_valid(&bvh);
        assert_eq!(bvh.len(), 200 - 67);
        assert!(bvh.height() < 64);

        let everything = bvh.query_aabb(&AABB::new(Vec3::splat(-1.0), Vec3::splat(1000.0)));
        assert_eq!(everything.len(), bvh.len());
    }
}
