//! Asset provider
//!
//! The frame loop only consumes opaque handles and a little per-asset data
//! (index counts, local bounds, material constants). Parsing mesh or texture
//! files happens elsewhere; scene-build code registers the results here and
//! looks them up by name.

mod registry;

pub use registry::AssetRegistry;

use crate::foundation::collections::TypedHandle;
use crate::render::MaterialConstants;
use crate::scene::{Aabb, ReplicationCountdown};

/// Asset handle type
pub type AssetHandle<T> = TypedHandle<T>;

/// Handle to a registered mesh
pub type MeshHandle = AssetHandle<MeshAsset>;

/// Handle to a registered material
pub type MaterialHandle = AssetHandle<MaterialAsset>;

/// Handle to a registered texture
pub type TextureHandle = AssetHandle<TextureAsset>;

/// GPU-resident mesh as seen by the frame loop
#[derive(Debug, Clone)]
pub struct MeshAsset {
    /// Lookup name
    pub name: String,
    /// Indices drawn per instance
    pub index_count: u32,
    /// Model-space bounds, used to derive collision volumes
    pub local_bounds: Aabb,
}

/// Material with per-frame constant replication
#[derive(Debug, Clone)]
pub struct MaterialAsset {
    /// Lookup name
    pub name: String,
    /// Values uploaded to the material constant buffer
    pub constants: MaterialConstants,
    /// Diffuse texture, if any
    pub diffuse: Option<TextureHandle>,
    /// Frames whose material buffer copy is still stale
    pub dirty: ReplicationCountdown,
    /// Element index in the material constant buffer
    pub cb_index: usize,
}

/// Texture as seen by the frame loop
#[derive(Debug, Clone)]
pub struct TextureAsset {
    /// Lookup name
    pub name: String,
    /// Descriptor heap index
    pub heap_index: u32,
}

/// Name-based asset lookup
///
/// A miss is not an error: callers get `None` and decide what to do.
pub trait AssetProvider {
    /// Look up a mesh by name
    fn mesh(&self, name: &str) -> Option<MeshHandle>;

    /// Look up a material by name
    fn material(&self, name: &str) -> Option<MaterialHandle>;

    /// Look up a texture by name
    fn texture(&self, name: &str) -> Option<TextureHandle>;

    /// Mesh data for a handle
    fn mesh_data(&self, handle: MeshHandle) -> Option<&MeshAsset>;

    /// Material data for a handle
    fn material_data(&self, handle: MaterialHandle) -> Option<&MaterialAsset>;
}
