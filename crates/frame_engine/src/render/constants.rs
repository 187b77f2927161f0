//! Constant-buffer payloads
//!
//! Layouts must match the shader-side cbuffers: 16-byte rows, no implicit
//! padding. Matrices are stored column-major as nalgebra produces them.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

fn mat4_to_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

fn identity() -> [[f32; 4]; 4] {
    mat4_to_array(&Mat4::identity())
}

/// Per-object constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object-to-world matrix
    pub world: [[f32; 4]; 4],
    /// Texture coordinate transform
    pub tex_transform: [[f32; 4]; 4],
    /// Index into the material buffer
    pub material_index: u32,
    /// Row padding
    pub _padding: [u32; 3],
}

impl ObjectConstants {
    /// Build from a world matrix and material index
    pub fn new(world: &Mat4, material_index: u32) -> Self {
        Self {
            world: mat4_to_array(world),
            tex_transform: identity(),
            material_index,
            _padding: [0; 3],
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self::new(&Mat4::identity(), 0)
    }
}

/// Per-pass constants, rewritten every frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    /// View matrix
    pub view: [[f32; 4]; 4],
    /// Projection matrix
    pub proj: [[f32; 4]; 4],
    /// View * projection
    pub view_proj: [[f32; 4]; 4],
    /// Camera position in world space
    pub eye_position: [f32; 3],
    /// Seconds since start, excluding pauses
    pub total_time: f32,
    /// Seconds since the previous frame
    pub delta_time: f32,
    /// Number of active lights in the light buffer
    pub light_count: u32,
    /// Row padding
    pub _padding: [f32; 2],
}

impl PassConstants {
    /// Build from camera matrices and timing
    pub fn new(view: &Mat4, proj: &Mat4, eye: Vec3, total_time: f32, delta_time: f32, light_count: u32) -> Self {
        Self {
            view: mat4_to_array(view),
            proj: mat4_to_array(proj),
            view_proj: mat4_to_array(&(proj * view)),
            eye_position: eye.into(),
            total_time,
            delta_time,
            light_count,
            _padding: [0.0; 2],
        }
    }
}

/// One light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    /// Radiant strength (RGB)
    pub strength: [f32; 3],
    /// Distance where falloff begins (point/spot)
    pub falloff_start: f32,
    /// Direction (directional/spot)
    pub direction: [f32; 3],
    /// Distance where the light reaches zero (point/spot)
    pub falloff_end: f32,
    /// Position (point/spot)
    pub position: [f32; 3],
    /// Spot cone exponent
    pub spot_power: f32,
}

/// Material parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Base color and alpha
    pub diffuse_albedo: [f32; 4],
    /// Reflectance at normal incidence
    pub fresnel_r0: [f32; 3],
    /// Surface roughness in [0, 1]
    pub roughness: f32,
    /// Texture coordinate transform
    pub mat_transform: [[f32; 4]; 4],
    /// Descriptor index of the diffuse map
    pub diffuse_map_index: u32,
    /// Descriptor index of the normal map
    pub normal_map_index: u32,
    /// Row padding
    pub _padding: [u32; 2],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            diffuse_albedo: [1.0, 1.0, 1.0, 1.0],
            fresnel_r0: [0.01, 0.01, 0.01],
            roughness: 0.25,
            mat_transform: identity(),
            diffuse_map_index: 0,
            normal_map_index: 0,
            _padding: [0; 2],
        }
    }
}

impl MaterialConstants {
    /// Material with the given albedo and roughness
    pub fn with_albedo(albedo: [f32; 4], roughness: f32) -> Self {
        Self {
            diffuse_albedo: albedo,
            roughness,
            ..Self::default()
        }
    }
}

/// Screen-space widget
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WidgetConstants {
    /// Left, top, width, height in normalized screen units
    pub rect: [f32; 4],
    /// Tint
    pub color: [f32; 4],
    /// Draw depth
    pub depth: f32,
    /// Row padding
    pub _padding: [f32; 3],
}

/// Particle emitter parameters consumed by the simulation pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticleConstants {
    /// Emitter position in world space
    pub emitter_position: [f32; 3],
    /// Billboard size
    pub particle_size: f32,
    /// Initial velocity
    pub velocity: [f32; 3],
    /// Seconds each particle lives
    pub lifetime: f32,
    /// Tint
    pub color: [f32; 4],
    /// Upper bound on live particles
    pub max_particles: u32,
    /// Row padding
    pub _padding: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_are_whole_rows() {
        for size in [
            std::mem::size_of::<ObjectConstants>(),
            std::mem::size_of::<PassConstants>(),
            std::mem::size_of::<LightConstants>(),
            std::mem::size_of::<MaterialConstants>(),
            std::mem::size_of::<WidgetConstants>(),
            std::mem::size_of::<ParticleConstants>(),
        ] {
            assert_eq!(size % 16, 0, "size {size} is not a multiple of 16");
        }
    }

    #[test]
    fn test_object_constants_store_translation() {
        let world = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let constants = ObjectConstants::new(&world, 7);
        // Column-major: translation lives in the last column.
        assert_eq!(constants.world[3][0..3], [1.0, 2.0, 3.0]);
        assert_eq!(constants.material_index, 7);
    }
}
