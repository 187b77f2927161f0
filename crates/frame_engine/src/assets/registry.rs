//! In-memory asset registry

use std::collections::HashMap;

use super::{
    AssetProvider, MaterialAsset, MaterialHandle, MeshAsset, MeshHandle, TextureAsset,
    TextureHandle,
};
use crate::foundation::collections::SlotMap;
use crate::foundation::collections::DefaultKey;
use crate::render::MaterialConstants;
use crate::scene::{Aabb, ReplicationCountdown};

/// Registry of meshes, materials and textures addressed by name
#[derive(Debug)]
pub struct AssetRegistry {
    meshes: SlotMap<DefaultKey, MeshAsset>,
    materials: SlotMap<DefaultKey, MaterialAsset>,
    textures: SlotMap<DefaultKey, TextureAsset>,
    mesh_names: HashMap<String, MeshHandle>,
    material_names: HashMap<String, MaterialHandle>,
    texture_names: HashMap<String, TextureHandle>,
    frames_in_flight: usize,
}

impl AssetRegistry {
    /// Create an empty registry; material constants replicate over `frames_in_flight`
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            meshes: SlotMap::new(),
            materials: SlotMap::new(),
            textures: SlotMap::new(),
            mesh_names: HashMap::new(),
            material_names: HashMap::new(),
            texture_names: HashMap::new(),
            frames_in_flight,
        }
    }

    /// Register a mesh, replacing any previous mesh with the same name
    pub fn add_mesh(&mut self, name: impl Into<String>, index_count: u32, local_bounds: Aabb) -> MeshHandle {
        let name = name.into();
        let handle = MeshHandle::new(self.meshes.insert(MeshAsset {
            name: name.clone(),
            index_count,
            local_bounds,
        }));
        self.mesh_names.insert(name, handle);
        handle
    }

    /// Register a material; it starts dirty so every frame slot receives it
    pub fn add_material(&mut self, name: impl Into<String>, constants: MaterialConstants) -> MaterialHandle {
        let name = name.into();
        let mut dirty = ReplicationCountdown::new(self.frames_in_flight);
        dirty.mark();
        let cb_index = self.materials.len();
        let handle = MaterialHandle::new(self.materials.insert(MaterialAsset {
            name: name.clone(),
            constants,
            diffuse: None,
            dirty,
            cb_index,
        }));
        self.material_names.insert(name, handle);
        handle
    }

    /// Register a texture
    pub fn add_texture(&mut self, name: impl Into<String>) -> TextureHandle {
        let name = name.into();
        let heap_index = u32::try_from(self.textures.len()).unwrap_or(u32::MAX);
        let handle = TextureHandle::new(self.textures.insert(TextureAsset {
            name: name.clone(),
            heap_index,
        }));
        self.texture_names.insert(name, handle);
        handle
    }

    /// Attach a diffuse texture to a material
    pub fn set_diffuse(&mut self, material: MaterialHandle, texture: TextureHandle) -> bool {
        match self.materials.get_mut(material.key()) {
            Some(asset) => {
                asset.diffuse = Some(texture);
                asset.constants.diffuse_map_index = self.textures.get(texture.key()).map_or(0, |t| t.heap_index);
                asset.dirty.mark();
                true
            }
            None => false,
        }
    }

    /// Replace a material's constants and restart its replication countdown
    pub fn update_material(&mut self, handle: MaterialHandle, constants: MaterialConstants) -> bool {
        match self.materials.get_mut(handle.key()) {
            Some(asset) => {
                asset.constants = constants;
                asset.dirty.mark();
                true
            }
            None => false,
        }
    }

    /// Number of materials (sizes the material constant buffer)
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Iterate materials mutably, for the per-frame constant upload
    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut MaterialAsset> {
        self.materials.values_mut()
    }

    /// Mark every material stale, e.g. after its buffer was reallocated
    pub fn mark_all_materials_dirty(&mut self) {
        for material in self.materials.values_mut() {
            material.dirty.mark();
        }
    }

    /// Texture data for a handle
    pub fn texture_data(&self, handle: TextureHandle) -> Option<&TextureAsset> {
        self.textures.get(handle.key())
    }
}

fn report_miss(kind: &str, name: &str) {
    if cfg!(debug_assertions) {
        log::warn!("{kind} '{name}' not found");
    }
}

impl AssetProvider for AssetRegistry {
    fn mesh(&self, name: &str) -> Option<MeshHandle> {
        let handle = self.mesh_names.get(name).copied();
        if handle.is_none() {
            report_miss("Mesh", name);
        }
        handle
    }

    fn material(&self, name: &str) -> Option<MaterialHandle> {
        let handle = self.material_names.get(name).copied();
        if handle.is_none() {
            report_miss("Material", name);
        }
        handle
    }

    fn texture(&self, name: &str) -> Option<TextureHandle> {
        let handle = self.texture_names.get(name).copied();
        if handle.is_none() {
            report_miss("Texture", name);
        }
        handle
    }

    fn mesh_data(&self, handle: MeshHandle) -> Option<&MeshAsset> {
        self.meshes.get(handle.key())
    }

    fn material_data(&self, handle: MaterialHandle) -> Option<&MaterialAsset> {
        self.materials.get(handle.key())
    }
}
