//! Spatial partitioning
//!
//! Broad-phase collision, ray picking and region queries over scene objects.

mod octree;

pub use octree::{
    octant_regions, BoundsSource, CollisionPair, NodeIndex, Octree, OctreeConfig, OctreeNode,
};
