//! # Frame Engine
//!
//! Frame orchestration for a real-time renderer: a bounded ring of per-frame
//! GPU resources, scene objects whose constants replicate into every frame
//! slot, and a dynamic octree for collision detection and queries.
//!
//! ## Features
//!
//! - **Frame-resource ring**: N slots, fence-bounded CPU run-ahead
//! - **Growable constant pools**: 256-byte aligned, doubled on demand
//! - **Dirty propagation**: per-object replication countdowns
//! - **Dynamic octree**: lazy subdivision, node lifespans, collision pairs
//! - **Software device**: the whole loop runs and tests without a GPU
//!
//! ## Quick Start
//!
//! ```rust
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let device = SoftwareDevice::new(SubmissionMode::Immediate);
//!     let mut framework = Framework::new(device, EngineConfig::default())?;
//!
//!     framework.assets_mut().add_mesh("cube", 36, Aabb::new(Vec3::zeros(), Vec3::repeat(0.5)));
//!     framework.assets_mut().add_material("stone", MaterialConstants::default());
//!     framework.add_object(SceneObjectDesc::mesh("cube", Transform::identity(), "cube", "stone"));
//!     framework.build();
//!
//!     for _ in 0..3 {
//!         framework.run_frame(1.0 / 60.0)?;
//!     }
//!     framework.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod gpu;
pub mod assets;
pub mod render;
pub mod scene;
pub mod spatial;

mod framework;

pub use framework::{EngineError, EngineResult, Framework};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        Framework, EngineError, EngineResult,
        assets::{AssetProvider, AssetRegistry, MaterialHandle, MeshHandle},
        config::{Config, ConfigError, EngineConfig},
        foundation::{
            math::{Mat4, Quat, Transform, Vec3},
            time::GameTimer,
        },
        gpu::{GpuCommandSink, GpuDevice, GpuError, SoftwareDevice, SubmissionMode},
        render::{BufferKind, FrameResourceRing, MaterialConstants, PoolConfig},
        scene::{
            Aabb, Bounding, Camera, CollisionKind, LightData, ObjectFlags, ObjectId, ObjectKind,
            ParticleData, RenderLayer, SceneObject, SceneObjectDesc, WidgetData,
        },
        spatial::{CollisionPair, Octree, OctreeConfig},
    };
}
