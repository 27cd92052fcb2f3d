//! # Spatial Partitioning System
//!
//! A loose quadtree over the XZ plane. Nodes are created only while their
//! subtree holds at least one object; each node keeps a subtree object count
//! that doubles as its reference count. The root (code 1) is created with a
//! permanent count of 1 and never goes away.
//!
//! ## Object placement
//!
//! An object goes to the coarsest level whose cell half-size is not smaller
//! than the object's largest half extent. Objects smaller than the deepest
//! cell sink to the deepest level. Only the object's center has to be inside
//! the cell, which is why node boxes are doubled ("loose") for culling.
//!
//! ## Visibility
//!
//! Nodes are classified in arena order, which is a parent-before-child
//! order. A node whose parent is fully inside or fully outside inherits the
//! parent's state without being tested.

use crate::arena::NodeArena;
use crate::frustum::{ClipStatus, Frustum};
use crate::morton::{self, Morton, BITS_PER_LEVEL, MAX_DEPTH, ROOT};
use meridian_shared::{Aabb, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Index meaning "no tree node".
pub const NO_NODE: u32 = u32::MAX;

/// Bounds closer than this to the stored ones are not an update.
const BOUNDS_EPSILON: f32 = 1e-5;

/// Default subdivision depth.
pub const DEFAULT_MAX_DEPTH: u32 = 12;

/// SPS tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpsConfig {
    /// Upper bound for the subdivision depth of any tree.
    pub max_depth: u32,
    /// Also test near and far planes. Off keeps the four-side-plane
    /// classification, which never rejects by depth.
    pub test_near_far: bool,
}

impl Default for SpsConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            test_near_far: false,
        }
    }
}

/// Quadtree node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    /// Morton code of the cell.
    pub morton: Morton,
    /// Arena index of the parent, [`NO_NODE`] for the root.
    pub parent: u32,
    /// Objects in this node and below. The root carries one extra.
    pub subtree_object_count: u32,
    /// Cell center.
    pub center: Vec3,
    /// Cell half size relative to the world half size, `1 / 2^depth`.
    pub extent_coeff: f32,
}

/// Handle of a spatial record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);

impl RecordId {
    /// Raw value
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// An object registered in the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialRecord {
    /// World-space bounds.
    pub aabb: Aabb,
    /// Opaque back-reference supplied by the owner.
    pub user_data: u64,
    /// Node the object is counted in, [`NO_NODE`] if outside the tree.
    pub node_index: u32,
    /// Morton code of that node, 0 if outside the tree.
    pub node_morton: Morton,
    /// 0 while the bounds are invalid, otherwise bumped on every change.
    pub bounds_version: u32,
}

/// Per-frustum node classification, reusable across frames.
///
/// As long as the frustum and the tree's rebuild version stay the same,
/// only nodes appended since the previous pass are classified.
#[derive(Debug, Clone, Default)]
pub struct VisibilityCache {
    statuses: Vec<ClipStatus>,
    frustum: Option<Frustum>,
    tree_version: u32,
}

impl VisibilityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of the node at `index`.
    #[inline]
    #[must_use]
    pub fn status(&self, index: u32) -> ClipStatus {
        self.statuses
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Number of classified slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// True if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Forces a full pass next time.
    pub fn invalidate(&mut self) {
        self.statuses.clear();
        self.frustum = None;
    }
}

/// Counters of one frustum query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes that needed a plane test.
    pub nodes_tested: usize,
    /// Objects accepted because their node is fully inside.
    pub objects_accepted_by_node: usize,
    /// Objects rejected because their node is fully outside.
    pub objects_culled_by_node: usize,
    /// Objects that needed their own plane test.
    pub objects_tested: usize,
    /// Objects returned, always-visible ones included.
    pub visible: usize,
}

/// Morton-coded loose quadtree.
#[derive(Debug, Clone)]
pub struct Sps {
    world_center: Vec3,
    world_extent: f32,
    inv_world_size: f32,
    smallest_extent: f32,
    max_depth: u32,
    test_near_far: bool,
    nodes: NodeArena<TreeNode>,
    morton_to_index: HashMap<Morton, u32>,
    records: BTreeMap<RecordId, SpatialRecord>,
    next_record_id: u64,
    always_visible: Vec<u64>,
    rebuild_version: u32,
}

impl Sps {
    /// Creates a tree covering a square of `size` around `center`.
    ///
    /// `max_depth` is clamped to [`MAX_DEPTH`].
    #[must_use]
    pub fn new(center: Vec3, size: f32, max_depth: u32) -> Self {
        let size = size.max(f32::EPSILON);
        let max_depth = max_depth.min(MAX_DEPTH);
        let world_extent = size * 0.5;
        #[allow(clippy::cast_precision_loss)]
        let smallest_extent = world_extent / (1u32 << max_depth) as f32;

        let mut sps = Self {
            world_center: center,
            world_extent,
            inv_world_size: 1.0 / size,
            smallest_extent,
            max_depth,
            test_near_far: false,
            nodes: NodeArena::new(),
            morton_to_index: HashMap::new(),
            records: BTreeMap::new(),
            next_record_id: 1,
            always_visible: Vec::new(),
            rebuild_version: 0,
        };
        sps.create_root();
        sps
    }

    /// Creates a tree with depth limit and plane policy from `config`.
    #[must_use]
    pub fn with_config(center: Vec3, size: f32, max_depth: u32, config: &SpsConfig) -> Self {
        let mut sps = Self::new(center, size, max_depth.min(config.max_depth));
        sps.test_near_far = config.test_near_far;
        sps
    }

    fn create_root(&mut self) {
        // The fake count of 1 keeps the root alive forever
        let (index, _) = self.nodes.insert_after(
            None,
            TreeNode {
                morton: ROOT,
                parent: NO_NODE,
                subtree_object_count: 1,
                center: self.world_center,
                extent_coeff: 1.0,
            },
        );
        self.morton_to_index.insert(ROOT, index);
    }

    /// World center.
    #[must_use]
    pub const fn world_center(&self) -> Vec3 {
        self.world_center
    }

    /// Half size of the world square.
    #[must_use]
    pub const fn world_extent(&self) -> f32 {
        self.world_extent
    }

    /// Subdivision depth.
    #[must_use]
    pub const fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Whether near/far planes are tested.
    #[must_use]
    pub const fn test_near_far(&self) -> bool {
        self.test_near_far
    }

    /// Enables or disables near/far plane testing.
    pub fn set_test_near_far(&mut self, enabled: bool) {
        self.test_near_far = enabled;
    }

    /// Bumped whenever existing arena slots get new meaning, which
    /// invalidates cached visibility.
    #[must_use]
    pub const fn rebuild_version(&self) -> u32 {
        self.rebuild_version
    }

    fn bump_rebuild_version(&mut self) {
        self.rebuild_version = self.rebuild_version.wrapping_add(1).max(1);
    }

    /// Maps an object's bounds to the code of the node it belongs to.
    ///
    /// Returns 0 if the center is outside the world or the object is larger
    /// than the world; such objects live outside the tree.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn calculate_morton_code(&self, center: Vec3, extent: Vec3) -> Morton {
        // Loose tree requires only the center being inside
        let diff = (center - self.world_center).abs();
        if diff.x >= self.world_extent || diff.y >= self.world_extent || diff.z >= self.world_extent
        {
            return 0;
        }

        // Too small and degenerate boxes sink to the deepest level
        let mut coeff: u32 = 1 << self.max_depth;
        if extent.x >= self.smallest_extent
            || extent.y >= self.smallest_extent
            || extent.z >= self.smallest_extent
        {
            let share = morton::prev_pow2((self.world_extent / extent.max_element()) as u32);
            if share == 0 {
                return 0;
            }
            coeff = coeff.min(share);
        }

        let cell_coeff = coeff as f32 * self.inv_world_size;
        let max_cell = coeff - 1;
        let cell = |c: f32, wc: f32| -> u16 {
            let v = ((c + self.world_extent - wc) * cell_coeff) as u32;
            v.min(max_cell) as u16
        };

        (coeff * coeff) | morton::morton_code2(cell(center.x, self.world_center.x), cell(center.z, self.world_center.z))
    }

    /// Center and relative extent of the cell `code`.
    #[allow(clippy::cast_precision_loss)]
    fn cell_bounds(&self, code: Morton) -> (Vec3, f32) {
        let Some((depth, x, z)) = morton::to_cell(code) else {
            return (self.world_center, 1.0);
        };
        let extent_coeff = 1.0 / (1u32 << depth) as f32;
        let axis = |cell: u16, wc: f32| {
            ((2.0 * f32::from(cell) + 1.0) * extent_coeff - 1.0) * self.world_extent + wc
        };
        (
            Vec3::new(
                axis(x, self.world_center.x),
                self.world_center.y,
                axis(z, self.world_center.z),
            ),
            extent_coeff,
        )
    }

    fn node_extent(&self, extent_coeff: f32, loose: bool) -> Vec3 {
        let we = self.world_extent;
        if loose {
            Vec3::new(2.0 * we * extent_coeff, we * (1.0 + extent_coeff), 2.0 * we * extent_coeff)
        } else {
            Vec3::new(we * extent_coeff, we, we * extent_coeff)
        }
    }

    /// Box of the node at `index`. Loose boxes bound every object counted
    /// in the node.
    #[must_use]
    pub fn node_aabb(&self, index: u32, loose: bool) -> Option<Aabb> {
        let node = self.nodes.get(index)?;
        Some(Aabb::from_center_extent(
            node.center,
            self.node_extent(node.extent_coeff, loose),
        ))
    }

    fn create_node(&mut self, code: Morton, parent: u32) -> u32 {
        let (center, extent_coeff) = self.cell_bounds(code);
        let (index, reused) = self.nodes.insert_after(
            Some(parent),
            TreeNode {
                morton: code,
                parent,
                subtree_object_count: 1,
                center,
                extent_coeff,
            },
        );
        if reused {
            // Existing slots changed meaning
            self.bump_rebuild_version();
        }
        self.morton_to_index.insert(code, index);
        tracing::trace!("sps node {:#x} created at {}", code, index);
        index
    }

    /// Counts one object in `code` and all its ancestors below `stop`,
    /// creating missing nodes. Returns the node index of `code`.
    ///
    /// `stop = 0` walks all the way through the root.
    pub fn add_single_object(&mut self, code: Morton, stop: Morton) -> u32 {
        if code == 0 {
            return NO_NODE;
        }

        // Find the deepest existing node. The root always exists.
        let mut missing = 0;
        let mut curr = code;
        let existing = loop {
            if let Some(&index) = self.morton_to_index.get(&curr) {
                break index;
            }
            if curr == 0 {
                return NO_NODE;
            }
            missing += 1;
            curr >>= BITS_PER_LEVEL;
        };

        // Increment existing nodes' object counts
        let mut index = existing;
        while curr != stop {
            let Some(node) = self.nodes.get_mut(index) else {
                break;
            };
            node.subtree_object_count += 1;
            index = node.parent;
            curr >>= BITS_PER_LEVEL;
        }

        // Create missing nodes top-down so each lands after its parent
        let mut parent = existing;
        while missing > 0 {
            missing -= 1;
            parent = self.create_node(code >> (missing * BITS_PER_LEVEL), parent);
        }
        parent
    }

    /// Uncounts one object from the node at `index` (code `code`) and its
    /// ancestors below `stop`, pruning nodes left empty.
    pub fn remove_single_object(&mut self, index: u32, code: Morton, stop: Morton) {
        let mut index = index;
        let mut code = code;
        while code != stop {
            let Some(node) = self.nodes.get_mut(index) else {
                break;
            };
            let parent = node.parent;
            node.subtree_object_count -= 1;
            if node.subtree_object_count == 0 {
                let morton = node.morton;
                self.morton_to_index.remove(&morton);
                self.nodes.remove(index);
                tracing::trace!("sps node {:#x} pruned at {}", morton, index);
            }
            index = parent;
            code >>= BITS_PER_LEVEL;
        }
    }

    /// Registers an object. Invalid bounds keep it outside the tree.
    pub fn add_record(&mut self, aabb: Aabb, user_data: u64) -> RecordId {
        let record = if aabb.is_valid() {
            let code = self.calculate_morton_code(aabb.center(), aabb.extent());
            SpatialRecord {
                aabb,
                user_data,
                node_index: self.add_single_object(code, 0),
                node_morton: code,
                bounds_version: 1,
            }
        } else {
            SpatialRecord {
                aabb,
                user_data,
                node_index: NO_NODE,
                node_morton: 0,
                bounds_version: 0,
            }
        };

        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        self.records.insert(id, record);
        id
    }

    /// Moves an object to new bounds. Returns false for unknown records.
    ///
    /// The object leaves its old node chain only up to the lowest common
    /// ancestor of the old and new nodes; shared ancestors keep their count.
    pub fn update_record(&mut self, id: RecordId, aabb: Aabb) -> bool {
        let Some(&record) = self.records.get(&id) else {
            return false;
        };

        if record.aabb.min.near_equal(aabb.min, BOUNDS_EPSILON)
            && record.aabb.max.near_equal(aabb.max, BOUNDS_EPSILON)
        {
            return true;
        }

        let valid = aabb.is_valid();
        let code = if valid {
            self.calculate_morton_code(aabb.center(), aabb.extent())
        } else {
            0
        };

        let mut node_index = record.node_index;
        if code != record.node_morton {
            let lca = morton::lca(record.node_morton, code);
            self.remove_single_object(record.node_index, record.node_morton, lca);
            node_index = self.add_single_object(code, lca);
        }

        self.records.insert(
            id,
            SpatialRecord {
                aabb,
                user_data: record.user_data,
                node_index,
                node_morton: code,
                bounds_version: if valid {
                    record.bounds_version.wrapping_add(1).max(1)
                } else {
                    0
                },
            },
        );
        true
    }

    /// Unregisters an object.
    pub fn remove_record(&mut self, id: RecordId) -> Option<SpatialRecord> {
        let record = self.records.remove(&id)?;
        self.remove_single_object(record.node_index, record.node_morton, 0);
        Some(record)
    }

    /// Record by id.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<&SpatialRecord> {
        self.records.get(&id)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = (RecordId, &SpatialRecord)> + '_ {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Number of records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Adds an object returned by every query regardless of the frustum.
    pub fn add_always_visible(&mut self, user_data: u64) {
        self.always_visible.push(user_data);
    }

    /// Removes one always-visible entry.
    pub fn remove_always_visible(&mut self, user_data: u64) -> bool {
        match self.always_visible.iter().position(|u| *u == user_data) {
            Some(pos) => {
                self.always_visible.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Always-visible entries.
    #[must_use]
    pub fn always_visible(&self) -> &[u64] {
        &self.always_visible
    }

    /// Node at arena `index`.
    #[must_use]
    pub fn node(&self, index: u32) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// Arena index of the node with `code`.
    #[must_use]
    pub fn node_index(&self, code: Morton) -> Option<u32> {
        self.morton_to_index.get(&code).copied()
    }

    /// Live nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = (u32, &TreeNode)> + '_ {
        self.nodes.iter()
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Drops all objects and nodes except the root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.morton_to_index.clear();
        self.records.clear();
        self.always_visible.clear();
        self.bump_rebuild_version();
        self.create_root();
    }

    fn clip_node(&self, frustum: &Frustum, node: &TreeNode) -> ClipStatus {
        frustum.clip_box(
            node.center,
            self.node_extent(node.extent_coeff, true),
            self.test_near_far,
        )
    }

    /// Classifies every node against `frustum`, reusing `cache` where it is
    /// still valid. Returns the number of nodes that needed a plane test.
    pub fn test_visibility(&self, frustum: &Frustum, cache: &mut VisibilityCache) -> usize {
        if cache.frustum.as_ref() != Some(frustum) || cache.tree_version != self.rebuild_version {
            cache.statuses.clear();
            cache.frustum = Some(*frustum);
            cache.tree_version = self.rebuild_version;
        }

        let cached = cache.statuses.len();
        cache
            .statuses
            .resize(self.nodes.sparse_len(), ClipStatus::Untested);

        let mut tested = 0;
        for (index, node) in self.nodes.iter_from(cached) {
            let status = if node.parent == NO_NODE {
                tested += 1;
                self.clip_node(frustum, node)
            } else {
                debug_assert!(node.parent < index, "arena order must put parents first");
                let parent = cache.status(node.parent);
                if parent.is_settled() {
                    parent
                } else {
                    tested += 1;
                    self.clip_node(frustum, node)
                }
            };
            cache.statuses[index as usize] = status;
        }
        tested
    }

    /// Appends the user data of every potentially visible object to `out`.
    ///
    /// Objects in fully inside nodes are accepted without a test, objects in
    /// fully outside nodes are rejected without one. Objects in partially
    /// visible nodes and valid objects outside the tree are tested on their
    /// own. Invalid-bounds objects are never returned.
    pub fn query_visible(
        &self,
        frustum: &Frustum,
        cache: &mut VisibilityCache,
        out: &mut Vec<u64>,
    ) -> QueryStats {
        let mut stats = QueryStats {
            nodes_tested: self.test_visibility(frustum, cache),
            ..QueryStats::default()
        };

        let start = out.len();
        out.reserve(self.records.len() + self.always_visible.len());
        out.extend_from_slice(&self.always_visible);

        for record in self.records.values() {
            if record.bounds_version == 0 {
                continue;
            }
            let status = if record.node_index == NO_NODE {
                ClipStatus::Partial
            } else {
                cache.status(record.node_index)
            };
            match status {
                ClipStatus::Inside => {
                    stats.objects_accepted_by_node += 1;
                    out.push(record.user_data);
                }
                ClipStatus::Outside | ClipStatus::Untested => stats.objects_culled_by_node += 1,
                ClipStatus::Partial => {
                    stats.objects_tested += 1;
                    let clip = frustum.clip_box(
                        record.aabb.center(),
                        record.aabb.extent(),
                        self.test_near_far,
                    );
                    if clip.is_visible() {
                        out.push(record.user_data);
                    }
                }
            }
        }

        stats.visible = out.len() - start;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frustum::Plane;

    fn world() -> Sps {
        Sps::new(Vec3::ZERO, 256.0, 5)
    }

    fn cube(center: Vec3, half: f32) -> Aabb {
        Aabb::from_center_extent(center, Vec3::splat(half))
    }

    /// Axis-aligned "frustum" bounding x and z, open in y.
    fn xz_window(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> Frustum {
        Frustum::from_planes([
            Plane::new(1.0, 0.0, 0.0, -min_x),
            Plane::new(-1.0, 0.0, 0.0, max_x),
            Plane::new(0.0, 0.0, 1.0, -min_z),
            Plane::new(0.0, 0.0, -1.0, max_z),
            Plane::new(0.0, 1.0, 0.0, 1000.0),
            Plane::new(0.0, -1.0, 0.0, 1000.0),
        ])
    }

    #[test]
    fn test_root_always_present() {
        let mut sps = world();
        assert_eq!(sps.node_count(), 1);
        let id = sps.add_record(cube(Vec3::new(10.0, 0.0, 10.0), 0.5), 7);
        assert!(sps.node_count() > 1);
        sps.remove_record(id);
        assert_eq!(sps.node_count(), 1);
        let root = sps.node(0).unwrap();
        assert_eq!(root.morton, ROOT);
        assert_eq!(root.subtree_object_count, 1);
    }

    #[test]
    fn test_morton_code_levels() {
        let sps = world();
        // World half size 128, depth 5: smallest cell half size is 4
        let tiny = sps.calculate_morton_code(Vec3::new(1.0, 0.0, 1.0), Vec3::splat(0.1));
        assert_eq!(morton::depth(tiny), 5);

        let mid = sps.calculate_morton_code(Vec3::new(1.0, 0.0, 1.0), Vec3::splat(30.0));
        // 128 / 30 = 4.26, previous power of two 4, so depth 2
        assert_eq!(morton::depth(mid), 2);

        let huge = sps.calculate_morton_code(Vec3::ZERO, Vec3::splat(100.0));
        assert_eq!(huge, ROOT);

        assert_eq!(sps.calculate_morton_code(Vec3::ZERO, Vec3::splat(500.0)), 0);
        assert_eq!(sps.calculate_morton_code(Vec3::new(200.0, 0.0, 0.0), Vec3::splat(1.0)), 0);
    }

    #[test]
    fn test_cell_contains_center() {
        let sps = world();
        let center = Vec3::new(-37.0, 3.0, 90.0);
        let code = sps.calculate_morton_code(center, Vec3::splat(0.5));
        let mut sps = sps;
        let index = sps.add_single_object(code, 0);
        assert_eq!(sps.add_single_object(code, 0), index);
        let tight = sps.node_aabb(index, false).unwrap();
        assert!(tight.contains_point(center));
    }

    #[test]
    fn test_shared_ancestors_counted_once_per_object() {
        let mut sps = world();
        let a = sps.add_record(cube(Vec3::new(10.0, 0.0, 10.0), 0.5), 1);
        let b = sps.add_record(cube(Vec3::new(11.0, 0.0, 11.0), 0.5), 2);
        let code = sps.record(a).unwrap().node_morton;
        assert_eq!(code, sps.record(b).unwrap().node_morton);

        let leaf = sps.node(sps.record(a).unwrap().node_index).unwrap();
        assert_eq!(leaf.subtree_object_count, 2);
        assert_eq!(sps.node(0).unwrap().subtree_object_count, 3);
    }

    #[test]
    fn test_update_moves_between_cells() {
        let mut sps = world();
        let id = sps.add_record(cube(Vec3::new(10.0, 0.0, 10.0), 0.5), 1);
        let old = sps.record(id).unwrap().node_morton;

        assert!(sps.update_record(id, cube(Vec3::new(-100.0, 0.0, -100.0), 0.5)));
        let rec = *sps.record(id).unwrap();
        assert_ne!(rec.node_morton, old);
        assert_eq!(rec.bounds_version, 2);
        assert!(sps.node_index(old).is_none());
        assert_eq!(sps.node(rec.node_index).unwrap().morton, rec.node_morton);
        assert_eq!(sps.node(0).unwrap().subtree_object_count, 2);
    }

    #[test]
    fn test_invalid_bounds_leave_tree() {
        let mut sps = world();
        let id = sps.add_record(cube(Vec3::new(10.0, 0.0, 10.0), 0.5), 1);
        let invalid = Aabb::new(Vec3::splat(1.0), Vec3::splat(-1.0));
        assert!(sps.update_record(id, invalid));

        let rec = sps.record(id).unwrap();
        assert_eq!(rec.bounds_version, 0);
        assert_eq!(rec.node_index, NO_NODE);
        assert_eq!(sps.node_count(), 1);

        let id2 = sps.add_record(invalid, 2);
        assert_eq!(sps.record(id2).unwrap().bounds_version, 0);
        assert!(!sps.update_record(RecordId(999), invalid));
    }

    #[test]
    fn test_parents_precede_children() {
        let mut sps = world();
        let ids: Vec<_> = (0..20)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let f = i as f32 * 11.0 - 100.0;
                sps.add_record(cube(Vec3::new(f, 0.0, -f), 0.5), i)
            })
            .collect();
        for id in ids.iter().step_by(3) {
            sps.remove_record(*id);
        }
        for i in 0..10 {
            #[allow(clippy::cast_precision_loss)]
            let f = i as f32 * 7.0;
            sps.add_record(cube(Vec3::new(f, 0.0, f), 0.5), 100 + i);
        }
        for (index, node) in sps.nodes() {
            if node.parent != NO_NODE {
                assert!(node.parent < index);
            }
        }
    }

    #[test]
    fn test_visibility_inherits_settled_parents() {
        let mut sps = world();
        sps.add_record(cube(Vec3::new(-100.0, 0.0, -100.0), 0.5), 1);
        sps.add_record(cube(Vec3::new(100.0, 0.0, 100.0), 0.5), 2);

        let mut cache = VisibilityCache::new();
        let frustum = xz_window(0.0, 128.0, 0.0, 128.0);
        sps.test_visibility(&frustum, &mut cache);

        for (index, node) in sps.nodes() {
            if node.parent == NO_NODE {
                continue;
            }
            let parent = cache.status(node.parent);
            if parent.is_settled() {
                assert_eq!(cache.status(index), parent);
            }
        }
    }

    #[test]
    fn test_query_culls_and_accepts() {
        let mut sps = world();
        sps.add_record(cube(Vec3::new(-100.0, 0.0, -100.0), 0.5), 1);
        sps.add_record(cube(Vec3::new(60.0, 0.0, 60.0), 0.5), 2);
        sps.add_always_visible(99);

        let mut cache = VisibilityCache::new();
        let mut out = Vec::new();
        let stats = sps.query_visible(&xz_window(0.0, 128.0, 0.0, 128.0), &mut cache, &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![2, 99]);
        assert_eq!(stats.visible, 2);
        assert_eq!(stats.objects_culled_by_node, 1);
    }

    #[test]
    fn test_inside_nodes_skip_object_tests() {
        let mut sps = world();
        for i in 0..50u8 {
            let x = f32::from(i % 10) * 20.0 - 100.0;
            let z = f32::from(i / 10) * 20.0 - 50.0;
            sps.add_record(cube(Vec3::new(x, 0.0, z), 0.5 + f32::from(i % 4)), u64::from(i));
        }

        let mut cache = VisibilityCache::new();
        let mut out = Vec::new();
        let all = xz_window(-1000.0, 1000.0, -1000.0, 1000.0);
        let stats = sps.query_visible(&all, &mut cache, &mut out);
        assert_eq!(stats.objects_tested, 0);
        assert_eq!(stats.objects_accepted_by_node, 50);
        assert_eq!(stats.objects_culled_by_node, 0);
        assert_eq!(stats.visible, 50);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn test_cache_only_tests_appended_nodes() {
        let mut sps = world();
        sps.add_record(cube(Vec3::new(50.0, 0.0, 50.0), 0.5), 1);
        let frustum = xz_window(-20.0, 20.0, -20.0, 20.0);
        let mut cache = VisibilityCache::new();

        assert!(sps.test_visibility(&frustum, &mut cache) > 0);
        assert_eq!(sps.test_visibility(&frustum, &mut cache), 0);

        sps.add_record(cube(Vec3::new(-50.0, 0.0, 50.0), 0.5), 2);
        let retested = sps.test_visibility(&frustum, &mut cache);
        assert!(retested <= morton::depth(sps.record(RecordId(2)).unwrap().node_morton) as usize);

        let other = xz_window(-30.0, 20.0, -20.0, 20.0);
        assert!(sps.test_visibility(&other, &mut cache) > 0);
    }

    #[test]
    fn test_outside_world_objects_are_tested() {
        let mut sps = world();
        sps.add_record(cube(Vec3::new(300.0, 0.0, 0.0), 1.0), 5);
        let mut cache = VisibilityCache::new();
        let mut out = Vec::new();
        let stats = sps.query_visible(&xz_window(250.0, 350.0, -10.0, 10.0), &mut cache, &mut out);
        assert_eq!(out, vec![5]);
        assert_eq!(stats.objects_tested, 1);
    }

    #[test]
    fn test_clear_keeps_root() {
        let mut sps = world();
        sps.add_record(cube(Vec3::new(1.0, 0.0, 1.0), 0.5), 1);
        sps.clear();
        assert_eq!(sps.node_count(), 1);
        assert_eq!(sps.record_count(), 0);
        assert_eq!(sps.node_index(ROOT), Some(0));
    }
}
