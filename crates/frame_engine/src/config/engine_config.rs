//! # Engine Configuration
//!
//! Tunables for the frame loop, the octree and the initial buffer pool sizes.
//! Every field has a default, so config files only need to list overrides.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::render::PoolConfig;
use crate::scene::Aabb;
use crate::spatial::OctreeConfig;
use crate::foundation::math::Vec3;

/// Hard upper bound on frames in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Axis-aligned world extent covered by the octree root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Minimum corner
    pub min: [f32; 3],
    /// Maximum corner
    pub max: [f32; 3],
}

impl WorldBounds {
    /// Convert to the octree root region
    pub fn to_aabb(&self) -> Aabb {
        Aabb::from_min_max(Vec3::from(self.min), Vec3::from(self.max))
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min: [-500.0, -500.0, -500.0],
            max: [500.0, 500.0, 500.0],
        }
    }
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of frame slots the CPU may run ahead of the GPU
    pub frames_in_flight: usize,
    /// World region covered by the octree root
    pub world_bounds: WorldBounds,
    /// Octree tuning
    pub octree: OctreeConfig,
    /// Initial element counts for each per-frame buffer pool
    pub pools: PoolConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            world_bounds: WorldBounds::default(),
            octree: OctreeConfig::default(),
            pools: PoolConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the world bounds
    pub fn with_world_bounds(mut self, min: [f32; 3], max: [f32; 3]) -> Self {
        self.world_bounds = WorldBounds { min, max };
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid {
                field: "frames_in_flight",
                reason: format!("must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {}", self.frames_in_flight),
            });
        }

        let WorldBounds { min, max } = &self.world_bounds;
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo >= hi) {
            return Err(ConfigError::Invalid {
                field: "world_bounds",
                reason: format!("min {min:?} must be below max {max:?} on every axis"),
            });
        }

        self.octree.validate()
    }
}
