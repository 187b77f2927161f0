//! Dynamic octree
//!
//! Broad-phase index over collidable objects. Nodes live in an arena and refer
//! to each other by [`NodeIndex`]. Each node stores the objects whose bounds
//! it fully contains but none of its children do.
//!
//! Empty childless nodes are not freed right away. They count down a lifespan
//! first, and nodes that keep flipping between empty and populated get a
//! longer lifespan each time (doubling up to a cap).
//!
//! Octant layout, shared by bulk build and incremental insert:
//!
//! ```text
//! 0: -X -Y -Z    4: -X -Y +Z
//! 1: +X -Y -Z    5: +X -Y +Z
//! 2: -X +Y -Z    6: -X +Y +Z
//! 3: +X +Y -Z    7: +X +Y +Z
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::foundation::collections::{FreeList, SlotMap};
use crate::foundation::math::Vec3;
use crate::scene::{Aabb, Bounding, ContainmentType, ObjectId, Ray, SceneObject};

/// Configuration for octree behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Nodes whose half-extent is at most this on every axis are never split
    pub min_size: f32,

    /// Lifespan given to new nodes, in ticks
    pub initial_lifespan: i32,

    /// Upper bound for a node's lifespan after doubling
    pub max_lifespan_cap: i32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            min_size: 1.0,
            initial_lifespan: 8,
            max_lifespan_cap: 64,
        }
    }
}

impl OctreeConfig {
    /// Check that the values describe a usable tree
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size.is_nan() || self.min_size <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "octree.min_size",
                reason: format!("must be positive, got {}", self.min_size),
            });
        }
        if self.max_lifespan_cap < 1 {
            return Err(ConfigError::Invalid {
                field: "octree.max_lifespan_cap",
                reason: format!("must be at least 1, got {}", self.max_lifespan_cap),
            });
        }
        if self.initial_lifespan < 1 || self.initial_lifespan > self.max_lifespan_cap {
            return Err(ConfigError::Invalid {
                field: "octree.initial_lifespan",
                reason: format!(
                    "must be within 1..={}, got {}",
                    self.max_lifespan_cap, self.initial_lifespan
                ),
            });
        }
        Ok(())
    }
}

/// Index of a node in the octree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Raw arena slot
    pub const fn get(self) -> usize {
        self.0
    }
}

/// Supplies the current world-space bounds of objects
///
/// The octree stores only ids; whoever owns the objects answers these.
pub trait BoundsSource {
    /// Collision volume, or `None` if the object is gone or not collidable
    fn collision_bounds(&self, id: ObjectId) -> Option<Bounding>;

    /// Whether the object's world transform was recomputed this tick
    fn moved(&self, id: ObjectId) -> bool;
}

impl BoundsSource for SlotMap<ObjectId, SceneObject> {
    fn collision_bounds(&self, id: ObjectId) -> Option<Bounding> {
        self.get(id)
            .filter(|object| object.is_collidable())
            .map(|object| *object.world_bounds())
    }

    fn moved(&self, id: ObjectId) -> bool {
        self.get(id).is_some_and(SceneObject::moved_this_tick)
    }
}

/// Two objects whose volumes overlap, ordered by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair {
    /// Lower id
    pub first: ObjectId,
    /// Higher id
    pub second: ObjectId,
}

impl CollisionPair {
    /// Pair in canonical order
    pub fn new(a: ObjectId, b: ObjectId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// Whether `id` is one of the two
    pub fn involves(&self, id: ObjectId) -> bool {
        self.first == id || self.second == id
    }
}

/// The eight octants of `region`
///
/// Both the bulk build and incremental insert split through here, so an
/// object lands in the same octant whichever path placed it.
pub fn octant_regions(region: &Aabb) -> [Aabb; 8] {
    let c = region.center;
    let h = region.extents * 0.5;
    [
        Aabb::new(Vec3::new(c.x - h.x, c.y - h.y, c.z - h.z), h),
        Aabb::new(Vec3::new(c.x + h.x, c.y - h.y, c.z - h.z), h),
        Aabb::new(Vec3::new(c.x - h.x, c.y + h.y, c.z - h.z), h),
        Aabb::new(Vec3::new(c.x + h.x, c.y + h.y, c.z - h.z), h),
        Aabb::new(Vec3::new(c.x - h.x, c.y - h.y, c.z + h.z), h),
        Aabb::new(Vec3::new(c.x + h.x, c.y - h.y, c.z + h.z), h),
        Aabb::new(Vec3::new(c.x - h.x, c.y + h.y, c.z + h.z), h),
        Aabb::new(Vec3::new(c.x + h.x, c.y + h.y, c.z + h.z), h),
    ]
}

fn first_containing_octant(octants: &[Aabb; 8], bounds: &Bounding) -> Option<usize> {
    octants
        .iter()
        .position(|octant| bounds.contained_by(octant) == ContainmentType::Contains)
}

/// Single node in the octree
#[derive(Debug, Clone)]
pub struct OctreeNode {
    region: Aabb,
    objects: Vec<ObjectId>,
    children: [Option<NodeIndex>; 8],
    active: u8,
    max_lifespan: i32,
    current_life: i32,
    parent: Option<NodeIndex>,
}

impl OctreeNode {
    fn new(region: Aabb, parent: Option<NodeIndex>, lifespan: i32) -> Self {
        Self {
            region,
            objects: Vec::new(),
            children: [None; 8],
            active: 0,
            max_lifespan: lifespan,
            current_life: -1,
            parent,
        }
    }

    /// Region covered by this node
    pub fn region(&self) -> &Aabb {
        &self.region
    }

    /// Objects stored directly in this node
    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    /// Child in each octant
    pub fn children(&self) -> &[Option<NodeIndex>; 8] {
        &self.children
    }

    /// Bitmask of existing children
    pub fn active_children(&self) -> u8 {
        self.active
    }

    /// Whether any child exists
    pub fn has_children(&self) -> bool {
        self.active != 0
    }

    /// Lifespan granted the next time the node empties
    pub fn max_lifespan(&self) -> i32 {
        self.max_lifespan
    }

    /// Remaining empty ticks before deletion; -1 while populated
    pub fn current_life(&self) -> i32 {
        self.current_life
    }

    /// Parent node; `None` for the root
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    fn is_min_size(&self, min_size: f32) -> bool {
        self.region.extents.iter().all(|extent| *extent <= min_size)
    }

    fn is_expired(&self) -> bool {
        self.current_life == 0 && self.objects.is_empty() && self.active == 0
    }
}

/// Octree over object ids
#[derive(Debug)]
pub struct Octree {
    nodes: FreeList<OctreeNode>,
    root: NodeIndex,
    locations: HashMap<ObjectId, NodeIndex>,
    pending: Vec<ObjectId>,
    built: bool,
    config: OctreeConfig,
}

impl Octree {
    /// Empty tree whose root covers `world`
    pub fn new(world: Aabb, config: &OctreeConfig) -> Self {
        let mut nodes = FreeList::new();
        let root = NodeIndex(nodes.insert(OctreeNode::new(world, None, config.initial_lifespan)));
        log::info!(
            "Created octree over {:?}..{:?} (min size {})",
            world.min(),
            world.max(),
            config.min_size
        );

        Self {
            nodes,
            root,
            locations: HashMap::new(),
            pending: Vec::new(),
            built: false,
            config: config.clone(),
        }
    }

    /// Root node index
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Node at `index`, if it exists
    pub fn node(&self, index: NodeIndex) -> Option<&OctreeNode> {
        self.nodes.get(index.0)
    }

    /// Every live node
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &OctreeNode)> {
        self.nodes.iter().map(|(index, node)| (NodeIndex(index), node))
    }

    /// Node currently storing `id`
    pub fn node_of(&self, id: ObjectId) -> Option<NodeIndex> {
        self.locations.get(&id).copied()
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of objects stored in the tree
    pub fn object_count(&self) -> usize {
        self.locations.len()
    }

    /// Whether [`Octree::build_tree`] has run
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Queue objects for the next build or update
    pub fn enqueue(&mut self, ids: impl IntoIterator<Item = ObjectId>) {
        self.pending.extend(ids);
    }

    /// Rebuild the whole tree from every stored and queued object
    pub fn build_tree<S: BoundsSource + ?Sized>(&mut self, source: &S) {
        let mut ids: Vec<ObjectId> = self.locations.keys().copied().collect();
        ids.append(&mut self.pending);
        ids.sort_unstable();
        ids.dedup();

        self.reset_nodes();
        let root = self.root;
        let mut placed = Vec::with_capacity(ids.len());
        for id in ids {
            if source.collision_bounds(id).is_some() {
                self.locations.insert(id, root);
                placed.push(id);
            }
        }
        if let Some(node) = self.nodes.get_mut(root.0) {
            node.objects = placed;
        }

        self.build_node(root, source);
        self.built = true;
        log::debug!(
            "Built octree: {} objects in {} nodes",
            self.object_count(),
            self.node_count()
        );
    }

    fn build_node<S: BoundsSource + ?Sized>(&mut self, index: NodeIndex, source: &S) {
        let min_size = self.config.min_size;
        let Some(node) = self.nodes.get_mut(index.0) else {
            return;
        };
        if node.objects.len() <= 1 || node.is_min_size(min_size) {
            return;
        }

        let octants = octant_regions(&node.region);
        let mut buckets: [Vec<ObjectId>; 8] = Default::default();
        let mut stay = Vec::new();
        for id in std::mem::take(&mut node.objects) {
            let octant = source
                .collision_bounds(id)
                .and_then(|bounds| first_containing_octant(&octants, &bounds));
            match octant {
                Some(octant) => buckets[octant].push(id),
                None => stay.push(id),
            }
        }
        node.objects = stay;

        for (octant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let child = self.create_child(index, octant, octants[octant]);
            for id in &bucket {
                self.locations.insert(*id, child);
            }
            if let Some(child_node) = self.nodes.get_mut(child.0) {
                child_node.objects = bucket;
            }
            self.build_node(child, source);
        }
    }

    /// Insert one object, descending from the root
    ///
    /// Returns false for objects without a collision volume. Objects outside
    /// the world bounds are kept in the root.
    pub fn insert<S: BoundsSource + ?Sized>(&mut self, id: ObjectId, source: &S) -> bool {
        let Some(bounds) = source.collision_bounds(id) else {
            return false;
        };
        self.remove(id);
        self.insert_from(self.root, id, &bounds);
        true
    }

    fn insert_from(&mut self, start: NodeIndex, id: ObjectId, bounds: &Bounding) {
        let min_size = self.config.min_size;
        let mut current = start;

        loop {
            let Some(node) = self.nodes.get(current.0) else {
                return;
            };

            let stop_here = (node.objects.len() <= 1 && !node.has_children())
                || node.is_min_size(min_size)
                || bounds.contained_by(&node.region) != ContainmentType::Contains;
            if stop_here {
                break;
            }

            let octants = octant_regions(&node.region);
            let Some(octant) = first_containing_octant(&octants, bounds) else {
                break;
            };
            let existing = node.children[octant];
            current = match existing {
                Some(child) => child,
                None => self.create_child(current, octant, octants[octant]),
            };
        }

        if let Some(node) = self.nodes.get_mut(current.0) {
            node.objects.push(id);
            self.locations.insert(id, current);
        }
    }

    fn create_child(&mut self, parent: NodeIndex, octant: usize, region: Aabb) -> NodeIndex {
        let child = NodeIndex(self.nodes.insert(OctreeNode::new(
            region,
            Some(parent),
            self.config.initial_lifespan,
        )));
        if let Some(node) = self.nodes.get_mut(parent.0) {
            node.children[octant] = Some(child);
            node.active |= 1 << octant;
        }
        log::trace!("Created octree node {} (octant {} of {})", child.0, octant, parent.0);
        child
    }

    /// Remove one object; returns whether it was stored
    pub fn remove(&mut self, id: ObjectId) -> bool {
        self.pending.retain(|pending| *pending != id);
        let Some(index) = self.locations.remove(&id) else {
            return false;
        };
        if let Some(node) = self.nodes.get_mut(index.0) {
            node.objects.retain(|stored| *stored != id);
        }
        true
    }

    /// Keep only objects for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(ObjectId) -> bool) {
        self.pending.retain(|id| keep(*id));
        let removed: Vec<ObjectId> = self
            .locations
            .keys()
            .copied()
            .filter(|id| !keep(*id))
            .collect();
        for id in removed {
            self.remove(id);
        }
    }

    /// Advance one tick and return this tick's collisions
    ///
    /// Queued objects are placed first (building the tree if it was never
    /// built), then lifespans advance, moved objects are re-bucketed, expired
    /// nodes are freed, and finally overlapping pairs are collected.
    pub fn update<S: BoundsSource + ?Sized>(&mut self, source: &S) -> Vec<CollisionPair> {
        if !self.built {
            self.build_tree(source);
        } else if !self.pending.is_empty() {
            for id in std::mem::take(&mut self.pending) {
                self.insert(id, source);
            }
        }

        self.update_node(self.root, source);

        let mut pairs = Vec::new();
        let mut ancestors = Vec::new();
        self.collect_collisions(self.root, source, &mut ancestors, &mut pairs);
        pairs
    }

    fn update_node<S: BoundsSource + ?Sized>(&mut self, index: NodeIndex, source: &S) {
        let cap = self.config.max_lifespan_cap;
        let Some(node) = self.nodes.get_mut(index.0) else {
            return;
        };

        if node.objects.is_empty() {
            if !node.has_children() {
                if node.current_life == -1 {
                    node.current_life = node.max_lifespan;
                } else if node.current_life > 0 {
                    node.current_life -= 1;
                }
            }
        } else if node.current_life != -1 {
            // Emptied and refilled before expiring; keep it around longer next time.
            node.max_lifespan = (node.max_lifespan * 2).min(cap);
            node.current_life = -1;
        }

        let moved: Vec<ObjectId> = node
            .objects
            .iter()
            .copied()
            .filter(|id| source.moved(*id))
            .collect();
        let children = node.children;

        for child in children.into_iter().flatten() {
            self.update_node(child, source);
        }

        for id in moved {
            self.relocate(id, source);
        }

        self.prune_children(index);
    }

    fn relocate<S: BoundsSource + ?Sized>(&mut self, id: ObjectId, source: &S) {
        let Some(bounds) = source.collision_bounds(id) else {
            self.remove(id);
            return;
        };
        let Some(from) = self.node_of(id) else {
            return;
        };

        let mut target = from;
        while let Some(node) = self.nodes.get(target.0) {
            if bounds.contained_by(&node.region) == ContainmentType::Contains {
                break;
            }
            match node.parent {
                Some(parent) => target = parent,
                None => break,
            }
        }

        if let Some(node) = self.nodes.get_mut(from.0) {
            node.objects.retain(|stored| *stored != id);
        }
        self.locations.remove(&id);
        self.insert_from(target, id, &bounds);
    }

    fn prune_children(&mut self, index: NodeIndex) {
        let Some(children) = self.nodes.get(index.0).map(|node| node.children) else {
            return;
        };

        for (octant, child) in children.iter().enumerate() {
            let Some(child) = *child else {
                continue;
            };
            if !self.nodes.get(child.0).is_some_and(OctreeNode::is_expired) {
                continue;
            }

            self.nodes.remove(child.0);
            if let Some(node) = self.nodes.get_mut(index.0) {
                node.children[octant] = None;
                node.active &= !(1 << octant);
            }
            log::trace!("Freed octree node {} (octant {} of {})", child.0, octant, index.0);
        }
    }

    fn collect_collisions<S: BoundsSource + ?Sized>(
        &self,
        index: NodeIndex,
        source: &S,
        ancestors: &mut Vec<(ObjectId, Bounding)>,
        pairs: &mut Vec<CollisionPair>,
    ) {
        let Some(node) = self.nodes.get(index.0) else {
            return;
        };

        let local: Vec<(ObjectId, Bounding)> = node
            .objects
            .iter()
            .filter_map(|id| source.collision_bounds(*id).map(|bounds| (*id, bounds)))
            .collect();

        for (ancestor, ancestor_bounds) in ancestors.iter() {
            for (id, bounds) in &local {
                if ancestor_bounds.intersects(bounds) {
                    pairs.push(CollisionPair::new(*ancestor, *id));
                }
            }
        }
        for (i, (a, a_bounds)) in local.iter().enumerate() {
            for (b, b_bounds) in &local[i + 1..] {
                if a_bounds.intersects(b_bounds) {
                    pairs.push(CollisionPair::new(*a, *b));
                }
            }
        }

        // Only the ancestor chain is tested; objects in sibling subtrees never
        // meet unless one of them sits in a shared ancestor.
        let mark = ancestors.len();
        ancestors.extend(local);
        for child in node.children.iter().flatten() {
            self.collect_collisions(*child, source, ancestors, pairs);
        }
        ancestors.truncate(mark);
    }

    /// Objects hit by `ray`, nearest first
    pub fn query_ray<S: BoundsSource + ?Sized>(&self, ray: &Ray, source: &S) -> Vec<(ObjectId, f32)> {
        let mut hits = Vec::new();
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index.0) else {
                continue;
            };
            // The root may hold objects outside its region.
            if index != self.root && node.region.intersect_ray(ray).is_none() {
                continue;
            }

            for id in &node.objects {
                if let Some(distance) = source.collision_bounds(*id).and_then(|bounds| bounds.intersects_ray(ray)) {
                    hits.push((*id, distance));
                }
            }
            stack.extend(node.children.iter().flatten());
        }

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    /// Objects whose volume touches `region`, e.g. culling candidates
    pub fn query_region<S: BoundsSource + ?Sized>(&self, region: &Aabb, source: &S) -> Vec<ObjectId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index.0) else {
                continue;
            };
            if index != self.root && !node.region.intersects(region) {
                continue;
            }

            found.extend(node.objects.iter().copied().filter(|id| {
                source
                    .collision_bounds(*id)
                    .is_some_and(|bounds| bounds.contained_by(region) != ContainmentType::Disjoint)
            }));
            stack.extend(node.children.iter().flatten());
        }
        found
    }

    /// Drop every object and node except an empty root
    pub fn clear(&mut self) {
        self.reset_nodes();
        self.pending.clear();
        self.built = false;
    }

    fn reset_nodes(&mut self) {
        let world = self
            .nodes
            .get(self.root.0)
            .map_or_else(|| Aabb::new(Vec3::zeros(), Vec3::zeros()), |root| root.region);
        self.nodes.clear();
        self.locations.clear();
        self.root = NodeIndex(
            self.nodes
                .insert(OctreeNode::new(world, None, self.config.initial_lifespan)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct TestScene {
        bounds: SlotMap<ObjectId, Bounding>,
        moved: HashSet<ObjectId>,
    }

    impl TestScene {
        fn add_box(&mut self, center: Vec3, half: f32) -> ObjectId {
            self.bounds.insert(Bounding::Aabb(Aabb::new(center, Vec3::repeat(half))))
        }

        fn move_to(&mut self, id: ObjectId, center: Vec3) {
            if let Some(Bounding::Aabb(aabb)) = self.bounds.get_mut(id) {
                aabb.center = center;
            }
            self.moved.insert(id);
        }

        fn ids(&self) -> Vec<ObjectId> {
            self.bounds.keys().collect()
        }
    }

    impl BoundsSource for TestScene {
        fn collision_bounds(&self, id: ObjectId) -> Option<Bounding> {
            self.bounds.get(id).copied().filter(Bounding::is_some)
        }

        fn moved(&self, id: ObjectId) -> bool {
            self.moved.contains(&id)
        }
    }

    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            (self.0 >> 40) as f32 / (1u64 << 24) as f32
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * self.next_f32()
        }
    }

    fn world_100() -> Aabb {
        Aabb::from_min_max(Vec3::zeros(), Vec3::repeat(100.0))
    }

    fn assert_stored_objects_contained(tree: &Octree, scene: &TestScene) {
        for (_, node) in tree.nodes() {
            for id in node.objects() {
                let bounds = scene.collision_bounds(*id).unwrap();
                assert_eq!(
                    bounds.contained_by(node.region()),
                    ContainmentType::Contains,
                    "{id:?} stored in a node that does not contain it"
                );
            }
        }
    }

    fn assert_lifespans_in_range(tree: &Octree) {
        for (_, node) in tree.nodes() {
            assert!(node.max_lifespan() <= 64);
            assert!(
                node.current_life() == -1 || (0..=node.max_lifespan()).contains(&node.current_life()),
                "current_life {} outside [0, {}]",
                node.current_life(),
                node.max_lifespan()
            );
        }
    }

    #[test]
    fn test_octants_tile_the_parent() {
        let region = Aabb::from_min_max(Vec3::new(-3.0, 0.0, 10.0), Vec3::new(5.0, 4.0, 18.0));
        let octants = octant_regions(&region);

        for (index, octant) in octants.iter().enumerate() {
            assert_eq!(region.contains(octant), ContainmentType::Contains);
            let positive_x = octant.center.x > region.center.x;
            let positive_y = octant.center.y > region.center.y;
            let positive_z = octant.center.z > region.center.z;
            assert_eq!(positive_x, index & 1 != 0);
            assert_eq!(positive_y, index & 2 != 0);
            assert_eq!(positive_z, index & 4 != 0);
        }
    }

    #[test]
    fn test_build_and_insert_produce_identical_octants() {
        // One object per octant, plus two straddlers that keep the root populated.
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(50.0), 1.0);
        scene.add_box(Vec3::new(50.0, 20.0, 20.0), 1.0);
        let mut leaves = Vec::new();
        for octant in octant_regions(&world_100()) {
            leaves.push(scene.add_box(octant.center, 1.0));
        }

        let mut built = Octree::new(world_100(), &OctreeConfig::default());
        built.enqueue(scene.ids());
        built.build_tree(&scene);

        let mut inserted = Octree::new(world_100(), &OctreeConfig::default());
        for id in scene.ids() {
            assert!(inserted.insert(id, &scene));
        }

        for id in leaves {
            let a = built.node(built.node_of(id).unwrap()).unwrap().region();
            let b = inserted.node(inserted.node_of(id).unwrap()).unwrap().region();
            for axis in 0..3 {
                assert_eq!(a.center[axis].to_bits(), b.center[axis].to_bits());
                assert_eq!(a.extents[axis].to_bits(), b.extents[axis].to_bits());
            }
        }
    }

    #[test]
    fn test_build_keeps_straddlers_in_parent() {
        let mut scene = TestScene::default();
        let straddler = scene.add_box(Vec3::repeat(50.0), 2.0);
        let inside = scene.add_box(Vec3::repeat(25.0), 2.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);

        assert_eq!(tree.node_of(straddler), Some(tree.root()));
        assert_ne!(tree.node_of(inside), Some(tree.root()));
        assert_stored_objects_contained(&tree, &scene);
    }

    #[test]
    fn test_single_object_and_min_size_stop_recursion() {
        let mut scene = TestScene::default();
        let lone = scene.add_box(Vec3::repeat(10.0), 0.5);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue([lone]);
        tree.build_tree(&scene);
        assert_eq!(tree.node_count(), 1);

        // Two tiny objects in a 2x2x2 world cannot be split below the minimum size.
        let tiny = Aabb::from_min_max(Vec3::zeros(), Vec3::repeat(2.0));
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(0.5), 0.1);
        scene.add_box(Vec3::repeat(1.5), 0.1);
        let mut tree = Octree::new(tiny, &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.object_count(), 2);
    }

    #[test]
    fn test_non_collidable_objects_are_skipped() {
        let mut scene = TestScene::default();
        let ghost = scene.bounds.insert(Bounding::None);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        assert!(!tree.insert(ghost, &scene));
        assert_eq!(tree.object_count(), 0);

        tree.enqueue([ghost]);
        tree.build_tree(&scene);
        assert_eq!(tree.object_count(), 0);
    }

    #[test]
    fn test_objects_outside_world_stay_in_root() {
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(50.0), 1.0);
        scene.add_box(Vec3::repeat(51.0), 1.0);
        let outside = scene.add_box(Vec3::repeat(500.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        for id in scene.ids() {
            tree.insert(id, &scene);
        }
        assert_eq!(tree.node_of(outside), Some(tree.root()));
    }

    #[test]
    fn test_random_scene_collisions() {
        let mut rng = Lcg(0x5eed);
        let mut scene = TestScene::default();
        for _ in 0..100 {
            let center = Vec3::new(rng.range(5.0, 95.0), rng.range(5.0, 95.0), rng.range(5.0, 95.0));
            scene.add_box(center, rng.range(0.5, 3.0));
        }
        // Known overlap: one box straddles the world center, the other sits next to it.
        let a = scene.add_box(Vec3::repeat(50.0), 2.0);
        let b = scene.add_box(Vec3::new(52.0, 51.0, 50.5), 2.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        assert_eq!(tree.object_count(), 102);
        assert!(tree.node_count() > 1);
        assert_stored_objects_contained(&tree, &scene);

        let pairs = tree.update(&scene);

        for pair in &pairs {
            let first = scene.collision_bounds(pair.first).unwrap();
            let second = scene.collision_bounds(pair.second).unwrap();
            assert!(first.intersects(&second), "{pair:?} reported but does not overlap");
        }
        assert!(pairs.contains(&CollisionPair::new(a, b)));

        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
    }

    #[test]
    fn test_incremental_inserts_respect_containment() {
        let mut rng = Lcg(42);
        let mut scene = TestScene::default();
        let mut tree = Octree::new(world_100(), &OctreeConfig::default());

        for _ in 0..200 {
            let center = Vec3::new(rng.range(3.0, 97.0), rng.range(3.0, 97.0), rng.range(3.0, 97.0));
            let id = scene.add_box(center, rng.range(0.1, 3.0));
            assert!(tree.insert(id, &scene));
        }

        assert_eq!(tree.object_count(), 200);
        assert_stored_objects_contained(&tree, &scene);
    }

    #[test]
    fn test_moved_objects_are_rebucketed() {
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(50.0), 1.0);
        let mover = scene.add_box(Vec3::repeat(20.0), 1.0);
        scene.add_box(Vec3::repeat(22.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        let before = tree.node_of(mover).unwrap();

        scene.move_to(mover, Vec3::repeat(80.0));
        tree.update(&scene);
        scene.moved.clear();

        let after = tree.node_of(mover).unwrap();
        assert_ne!(before, after);
        assert_stored_objects_contained(&tree, &scene);
        assert_eq!(tree.object_count(), 3);
    }

    #[test]
    fn test_empty_node_expires_after_lifespan() {
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(50.0), 1.0);
        scene.add_box(Vec3::new(50.0, 10.0, 10.0), 1.0);
        let visitor = scene.add_box(Vec3::repeat(10.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        assert_eq!(tree.node_count(), 2);

        tree.remove(visitor);
        // First empty tick arms the countdown at 8, the next eight count it down.
        for _ in 0..8 {
            tree.update(&scene);
            assert_eq!(tree.node_count(), 2);
        }
        tree.update(&scene);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.node(tree.root()).unwrap().active_children(), 0);
    }

    #[test]
    fn test_oscillating_node_lifespan_doubles_up_to_cap() {
        let mut scene = TestScene::default();
        scene.add_box(Vec3::repeat(50.0), 1.0);
        scene.add_box(Vec3::new(50.0, 10.0, 10.0), 1.0);
        let visitor = scene.add_box(Vec3::repeat(10.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        let node = tree.node_of(visitor).unwrap();

        let mut previous = tree.node(node).unwrap().max_lifespan();
        for expected in [16, 32, 64, 64, 64] {
            tree.remove(visitor);
            tree.update(&scene);
            tree.update(&scene);
            assert!(tree.node(node).unwrap().current_life() >= 0);

            assert!(tree.insert(visitor, &scene));
            assert_eq!(tree.node_of(visitor), Some(node));
            tree.update(&scene);

            let lifespan = tree.node(node).unwrap().max_lifespan();
            assert_eq!(lifespan, expected);
            assert!(lifespan >= previous);
            assert_eq!(tree.node(node).unwrap().current_life(), -1);
            previous = lifespan;
        }
    }

    #[test]
    fn test_lifespan_bounds_hold_under_churn() {
        let mut rng = Lcg(7);
        let mut scene = TestScene::default();
        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        let mut live = Vec::new();

        for _ in 0..300 {
            if live.is_empty() || rng.next_f32() < 0.6 {
                let center = Vec3::new(rng.range(5.0, 95.0), rng.range(5.0, 95.0), rng.range(5.0, 95.0));
                let id = scene.add_box(center, 1.0);
                tree.insert(id, &scene);
                live.push(id);
            } else {
                let index = (rng.next_f32() * live.len() as f32) as usize % live.len();
                let id = live.swap_remove(index);
                tree.remove(id);
                scene.bounds.remove(id);
            }

            tree.update(&scene);
            assert_lifespans_in_range(&tree);
        }
        assert_stored_objects_contained(&tree, &scene);
    }

    #[test]
    fn test_retain_sweeps_objects() {
        let mut scene = TestScene::default();
        let keep = scene.add_box(Vec3::repeat(20.0), 1.0);
        let gone = scene.add_box(Vec3::repeat(70.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);
        tree.retain(|id| id != gone);

        assert_eq!(tree.object_count(), 1);
        assert!(tree.node_of(gone).is_none());
        assert!(tree.node_of(keep).is_some());
        assert!(tree.nodes().all(|(_, node)| !node.objects().contains(&gone)));
    }

    #[test]
    fn test_queries() {
        let mut scene = TestScene::default();
        let near = scene.add_box(Vec3::new(20.0, 50.0, 50.0), 1.0);
        let far = scene.add_box(Vec3::new(80.0, 50.0, 50.0), 1.0);
        let off_axis = scene.add_box(Vec3::new(50.0, 10.0, 10.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue(scene.ids());
        tree.build_tree(&scene);

        let ray = Ray::new(Vec3::new(0.0, 50.0, 50.0), Vec3::x());
        let hits: Vec<ObjectId> = tree.query_ray(&ray, &scene).into_iter().map(|(id, _)| id).collect();
        assert_eq!(hits, vec![near, far]);

        let region = Aabb::from_min_max(Vec3::new(40.0, 0.0, 0.0), Vec3::new(60.0, 20.0, 20.0));
        assert_eq!(tree.query_region(&region, &scene), vec![off_axis]);
    }

    #[test]
    fn test_update_places_queued_objects() {
        let mut scene = TestScene::default();
        let first = scene.add_box(Vec3::repeat(20.0), 1.0);

        let mut tree = Octree::new(world_100(), &OctreeConfig::default());
        tree.enqueue([first]);
        tree.update(&scene);
        assert!(tree.is_built());

        let second = scene.add_box(Vec3::repeat(21.0), 1.0);
        tree.enqueue([second]);
        let pairs = tree.update(&scene);
        assert_eq!(tree.object_count(), 2);
        assert_eq!(pairs, vec![CollisionPair::new(first, second)]);
    }

    #[test]
    fn test_config_validation() {
        assert!(OctreeConfig::default().validate().is_ok());
        let bad = OctreeConfig {
            initial_lifespan: 100,
            ..OctreeConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = OctreeConfig {
            min_size: 0.0,
            ..OctreeConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
