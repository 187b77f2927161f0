//! Scene objects
//!
//! One type covers meshes, lights, widgets and particle emitters; the
//! [`ObjectKind`] variant decides which constant buffer the object lives in.
//! All of them follow the same lifecycle:
//!
//! ```text
//! Clean --mutation--> WorldDirty --tick--> BuffersDirty(N) --N uploads--> Clean
//! ```

use bitflags::bitflags;

use super::{Aabb, Bounding, CollisionKind, ReplicationCountdown};
use crate::assets::{MaterialHandle, MeshHandle};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::render::{
    BufferKind, LightConstants, ObjectConstants, ParticleConstants, WidgetConstants,
};

slotmap::new_key_type! {
    /// Handle to an object owned by the framework
    pub struct ObjectId;
}

bitflags! {
    /// Object capabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        /// Moves after creation; the octree re-buckets it when it does
        const MOVABLE = 1 << 0;
        /// Takes part in collision detection
        const COLLIDABLE = 1 << 1;
        /// Rendered into shadow maps
        const CASTS_SHADOW = 1 << 2;
        /// Drawn at all
        const VISIBLE = 1 << 3;
    }
}

impl Default for ObjectFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::COLLIDABLE
    }
}

/// Render layer, in draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RenderLayer {
    /// Opaque geometry
    #[default]
    Opaque,
    /// Alpha-tested geometry
    AlphaTested,
    /// Blended geometry, drawn after everything opaque
    Transparent,
    /// Sky dome
    Sky,
    /// Screen-space widgets
    Widget,
    /// Particle billboards
    Particle,
}

impl RenderLayer {
    /// Every layer in draw order
    pub const ALL: [Self; 6] = [
        Self::Opaque,
        Self::AlphaTested,
        Self::Transparent,
        Self::Sky,
        Self::Widget,
        Self::Particle,
    ];
}

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightType {
    /// Infinitely distant, direction only
    Directional,
    /// Omnidirectional with falloff
    Point,
    /// Cone with falloff
    Spot,
}

/// Light parameters; position comes from the object's transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    /// Light type
    pub light_type: LightType,
    /// Radiant strength
    pub strength: Vec3,
    /// Direction for directional and spot lights
    pub direction: Vec3,
    /// Distance where falloff starts
    pub falloff_start: f32,
    /// Distance where the light reaches zero
    pub falloff_end: f32,
    /// Spot cone exponent
    pub spot_power: f32,
}

impl LightData {
    /// Directional light
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            light_type: LightType::Directional,
            strength,
            direction: direction.normalize(),
            falloff_start: 0.0,
            falloff_end: 0.0,
            spot_power: 0.0,
        }
    }

    /// Point light
    pub fn point(strength: Vec3, falloff_start: f32, falloff_end: f32) -> Self {
        Self {
            light_type: LightType::Point,
            strength,
            direction: Vec3::zeros(),
            falloff_start,
            falloff_end,
            spot_power: 0.0,
        }
    }
}

/// Screen-space widget parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetData {
    /// Left, top, width, height in normalized screen units
    pub rect: [f32; 4],
    /// Tint
    pub color: [f32; 4],
    /// Draw depth
    pub depth: f32,
}

/// Particle emitter parameters; the emitter sits at the object's position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleData {
    /// Initial particle velocity
    pub velocity: Vec3,
    /// Billboard size
    pub particle_size: f32,
    /// Seconds each particle lives
    pub lifetime: f32,
    /// Tint
    pub color: [f32; 4],
    /// Upper bound on live particles
    pub max_particles: u32,
}

/// What an object is
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectKind {
    /// Mesh drawn with a material
    Mesh,
    /// Light source
    Light(LightData),
    /// Screen-space widget
    Widget(WidgetData),
    /// Particle emitter
    Particle(ParticleData),
}

impl ObjectKind {
    /// Constant buffer the object's data is uploaded to
    pub const fn buffer_kind(&self) -> BufferKind {
        match self {
            Self::Mesh => BufferKind::Object,
            Self::Light(_) => BufferKind::Light,
            Self::Widget(_) => BufferKind::Widget,
            Self::Particle(_) => BufferKind::Particle,
        }
    }
}

/// Everything needed to add an object to the scene
#[derive(Debug, Clone)]
pub struct SceneObjectDesc {
    /// Name, for logs and lookups
    pub name: String,
    /// Initial transform
    pub transform: Transform,
    /// Mesh looked up by name in the asset provider
    pub mesh: Option<String>,
    /// Material looked up by name in the asset provider
    pub material: Option<String>,
    /// Draw layer
    pub layer: RenderLayer,
    /// Object kind
    pub kind: ObjectKind,
    /// Collision volume derived from the mesh bounds
    pub collision: CollisionKind,
    /// Capability flags
    pub flags: ObjectFlags,
}

impl SceneObjectDesc {
    /// Opaque mesh object at `transform`
    pub fn mesh(name: impl Into<String>, transform: Transform, mesh: &str, material: &str) -> Self {
        Self {
            name: name.into(),
            transform,
            mesh: Some(mesh.to_string()),
            material: Some(material.to_string()),
            layer: RenderLayer::Opaque,
            kind: ObjectKind::Mesh,
            collision: CollisionKind::Aabb,
            flags: ObjectFlags::default(),
        }
    }

    /// Set the draw layer
    pub fn with_layer(mut self, layer: RenderLayer) -> Self {
        self.layer = layer;
        self
    }

    /// Set the collision volume kind
    pub fn with_collision(mut self, collision: CollisionKind) -> Self {
        self.collision = collision;
        self
    }

    /// Mark as movable
    pub fn movable(mut self) -> Self {
        self.flags |= ObjectFlags::MOVABLE;
        self
    }

    /// Replace the capability flags
    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// An object in the scene
#[derive(Debug, Clone)]
pub struct SceneObject {
    name: String,
    kind: ObjectKind,
    layer: RenderLayer,
    flags: ObjectFlags,

    transform: Transform,
    world: Mat4,
    world_dirty: bool,
    moved_this_tick: bool,
    velocity: Vec3,
    angular_velocity: Vec3,
    lifetime: Option<f32>,

    local_bounds: Bounding,
    world_bounds: Bounding,

    mesh: Option<MeshHandle>,
    material: Option<MaterialHandle>,
    index_count: u32,

    dirty: ReplicationCountdown,
    cb_index: usize,
    destroyed: bool,
}

impl SceneObject {
    /// Build an object from its description and resolved assets
    ///
    /// `mesh` carries the handle, its index count and its model-space box.
    /// Without a mesh the object has no collision volume.
    pub fn new(
        desc: SceneObjectDesc,
        mesh: Option<(MeshHandle, u32, Aabb)>,
        material: Option<MaterialHandle>,
        frames_in_flight: usize,
    ) -> Self {
        let local_bounds = mesh.map_or(Bounding::None, |(_, _, local)| {
            Bounding::from_local_box(desc.collision, &local)
        });

        Self {
            name: desc.name,
            kind: desc.kind,
            layer: desc.layer,
            flags: desc.flags,
            transform: desc.transform,
            world: Mat4::identity(),
            world_dirty: true,
            moved_this_tick: false,
            velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            lifetime: None,
            local_bounds,
            world_bounds: Bounding::None,
            mesh: mesh.map(|(handle, _, _)| handle),
            material,
            index_count: mesh.map_or(0, |(_, count, _)| count),
            dirty: ReplicationCountdown::new(frames_in_flight),
            cb_index: 0,
            destroyed: false,
        }
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Draw layer
    pub fn layer(&self) -> RenderLayer {
        self.layer
    }

    /// Capability flags
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Current transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// World matrix as of the last [`SceneObject::calculate_world`]
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world
    }

    /// Whether the transform changed since the world matrix was composed
    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty
    }

    /// Whether the world matrix was recomputed during this tick
    pub fn moved_this_tick(&self) -> bool {
        self.moved_this_tick
    }

    /// Model-space collision volume
    pub fn local_bounds(&self) -> &Bounding {
        &self.local_bounds
    }

    /// World-space collision volume; valid once the world matrix is current
    pub fn world_bounds(&self) -> &Bounding {
        &self.world_bounds
    }

    /// Mesh drawn for this object
    pub fn mesh(&self) -> Option<MeshHandle> {
        self.mesh
    }

    /// Material used for drawing
    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    /// Indices drawn per instance
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Replication state of this object's constants
    pub fn countdown(&self) -> &ReplicationCountdown {
        &self.dirty
    }

    /// Element index in the constant buffer of its kind
    pub fn cb_index(&self) -> usize {
        self.cb_index
    }

    /// Whether [`SceneObject::destroy`] was called
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Whether the object takes part in collision and octree queries
    pub fn is_collidable(&self) -> bool {
        self.flags.contains(ObjectFlags::COLLIDABLE) && self.world_bounds.is_some()
    }

    /// Whether the object issues a draw
    pub fn is_drawable(&self) -> bool {
        self.flags.contains(ObjectFlags::VISIBLE) && self.mesh.is_some() && self.material.is_some()
    }

    /// Velocity in world units per second
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Move to `position`
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.world_dirty = true;
    }

    /// Move by `offset`
    pub fn translate(&mut self, offset: Vec3) {
        self.transform.position += offset;
        self.world_dirty = true;
    }

    /// Replace the rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.world_dirty = true;
    }

    /// Apply `rotation` on top of the current one
    pub fn rotate(&mut self, rotation: Quat) {
        self.transform.rotation = rotation * self.transform.rotation;
        self.world_dirty = true;
    }

    /// Replace the scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.world_dirty = true;
    }

    /// Linear velocity integrated every tick
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    /// Angular velocity (axis scaled by radians per second) integrated every tick
    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.angular_velocity = angular_velocity;
    }

    /// Destroy the object on its own once `seconds` of ticks have passed
    pub fn set_lifetime(&mut self, seconds: f32) {
        self.lifetime = Some(seconds);
    }

    /// Seconds left before the object destroys itself
    pub fn lifetime(&self) -> Option<f32> {
        self.lifetime
    }

    /// Replace the kind-specific data; the constants are re-uploaded
    pub fn set_kind(&mut self, kind: ObjectKind) {
        self.kind = kind;
        self.dirty.mark();
    }

    /// Assign the constant buffer element; returns whether it changed
    ///
    /// A new index means every slot needs the data at the new position.
    pub fn set_cb_index(&mut self, index: usize) -> bool {
        if self.cb_index == index {
            return false;
        }
        self.cb_index = index;
        self.dirty.mark();
        true
    }

    /// Force a re-upload to every slot, e.g. after the buffer was reallocated
    pub fn mark_buffers_dirty(&mut self) {
        self.dirty.mark();
    }

    /// Take one pending upload; false when every slot is current
    pub fn consume_upload(&mut self) -> bool {
        self.dirty.consume()
    }

    /// Flag for removal; the object stays alive until the next sweep
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Compose the world matrix and world bounds from the transform
    pub fn calculate_world(&mut self) {
        self.world = self.transform.to_matrix();
        self.world_bounds = self.local_bounds.transformed(&self.transform);
        self.world_dirty = false;
        self.dirty.mark();
        if self.flags.contains(ObjectFlags::MOVABLE) {
            self.moved_this_tick = true;
        }
    }

    /// Advance one frame
    ///
    /// An expired lifetime marks the object destroyed, but it still finishes
    /// this tick and is drawn this frame.
    pub fn tick(&mut self, delta_time: f32) {
        self.moved_this_tick = false;

        if let Some(remaining) = self.lifetime.as_mut() {
            *remaining -= delta_time;
            if *remaining <= 0.0 {
                self.destroyed = true;
            }
        }

        if self.flags.contains(ObjectFlags::MOVABLE) {
            if self.velocity != Vec3::zeros() {
                self.translate(self.velocity * delta_time);
            }
            let angle = self.angular_velocity.norm() * delta_time;
            if angle > 0.0 {
                let spin = Quat::from_scaled_axis(self.angular_velocity * delta_time);
                self.rotate(spin);
            }
        }

        if self.world_dirty {
            self.calculate_world();
        }
    }

    /// Per-object constants
    pub fn object_constants(&self, material_index: u32) -> ObjectConstants {
        ObjectConstants::new(&self.world, material_index)
    }

    /// Light constants, for light objects
    pub fn light_constants(&self) -> Option<LightConstants> {
        let ObjectKind::Light(light) = &self.kind else {
            return None;
        };
        Some(LightConstants {
            strength: light.strength.into(),
            falloff_start: light.falloff_start,
            direction: light.direction.into(),
            falloff_end: light.falloff_end,
            position: self.transform.position.into(),
            spot_power: light.spot_power,
        })
    }

    /// Widget constants, for widgets
    pub fn widget_constants(&self) -> Option<WidgetConstants> {
        let ObjectKind::Widget(widget) = &self.kind else {
            return None;
        };
        Some(WidgetConstants {
            rect: widget.rect,
            color: widget.color,
            depth: widget.depth,
            _padding: [0.0; 3],
        })
    }

    /// Particle emitter constants, for emitters
    pub fn particle_constants(&self) -> Option<ParticleConstants> {
        let ObjectKind::Particle(particle) = &self.kind else {
            return None;
        };
        Some(ParticleConstants {
            emitter_position: self.transform.position.into(),
            particle_size: particle.particle_size,
            velocity: particle.velocity.into(),
            lifetime: particle.lifetime,
            color: particle.color,
            max_particles: particle.max_particles,
            _padding: [0; 3],
        })
    }
}
