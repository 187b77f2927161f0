//! # Framework
//!
//! Owns the device, the frame-resource ring, the assets and every scene
//! object, and drives them through one frame at a time:
//!
//! ```text
//! tick(dt):  acquire slot -> sweep destroyed -> assign buffer indices
//!            -> tick objects -> octree update -> grow pools -> upload
//! render():  begin -> bind pass -> draw layers in order -> end/present -> fence
//! ```
//!
//! Objects destroyed during frame K are still ticked and drawn in frame K and
//! are gone from every list, the octree and the object map once tick K+1 has
//! swept them.

use std::collections::HashSet;

use slotmap::SlotMap;
use thiserror::Error;

use crate::assets::{AssetProvider, AssetRegistry};
use crate::config::{ConfigError, EngineConfig};
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::time::GameTimer;
use crate::gpu::{GpuDevice, GpuError, RootSlot};
use crate::render::{BufferKind, FrameResourceRing, PassConstants};
use crate::scene::{
    Aabb, Camera, CollisionKind, LightData, ObjectFlags, ObjectId, ObjectKind, ParticleData,
    RenderLayer, SceneObject, SceneObjectDesc, WidgetData,
};
use crate::spatial::{CollisionPair, Octree};

/// Framework errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// A device call failed
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// The configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for framework operations
pub type EngineResult<T> = Result<T, EngineError>;

const LAYER_COUNT: usize = RenderLayer::ALL.len();
const KIND_COUNT: usize = BufferKind::ALL.len();

/// Frame orchestrator over a GPU device `D`
pub struct Framework<D: GpuDevice> {
    device: D,
    config: EngineConfig,
    ring: FrameResourceRing,
    assets: AssetRegistry,
    objects: SlotMap<ObjectId, SceneObject>,
    layers: [Vec<ObjectId>; LAYER_COUNT],
    all_objects: Vec<ObjectId>,
    octree: Octree,
    camera: Camera,
    timer: GameTimer,
    collisions: Vec<CollisionPair>,
    kind_counts: [usize; KIND_COUNT],
    frame_open: bool,
    frames_rendered: u64,
}

impl<D: GpuDevice> Framework<D> {
    /// Validate `config` and allocate the frame-resource ring on `device`
    pub fn new(mut device: D, config: EngineConfig) -> EngineResult<Self> {
        log::info!("Initializing framework...");
        config.validate()?;

        let ring = FrameResourceRing::new(&mut device, config.frames_in_flight, &config.pools)?;
        let octree = Octree::new(config.world_bounds.to_aabb(), &config.octree);

        log::info!(
            "Framework initialized with {} frames in flight",
            config.frames_in_flight
        );

        Ok(Self {
            device,
            assets: AssetRegistry::new(config.frames_in_flight),
            config,
            ring,
            objects: SlotMap::with_key(),
            layers: Default::default(),
            all_objects: Vec::new(),
            octree,
            camera: Camera::default(),
            timer: GameTimer::new(),
            collisions: Vec::new(),
            kind_counts: [0; KIND_COUNT],
            frame_open: false,
            frames_rendered: 0,
        })
    }

    /// Add an object; mesh and material names are resolved through the assets
    ///
    /// A name that does not resolve leaves the handle empty: the object still
    /// ticks but is not drawn, and without a mesh it has no collision volume.
    pub fn add_object(&mut self, desc: SceneObjectDesc) -> ObjectId {
        let mesh = desc.mesh.as_deref().and_then(|name| {
            let handle = self.assets.mesh(name)?;
            let data = self.assets.mesh_data(handle)?;
            Some((handle, data.index_count, data.local_bounds))
        });
        let material = desc.material.as_deref().and_then(|name| self.assets.material(name));

        let name = desc.name.clone();
        let layer = desc.layer;
        let id = self
            .objects
            .insert(SceneObject::new(desc, mesh, material, self.config.frames_in_flight));

        self.layers[layer as usize].push(id);
        self.all_objects.push(id);
        self.octree.enqueue([id]);

        log::debug!("Added object '{name}' to layer {layer:?}");
        id
    }

    /// Add a light at `position`
    pub fn add_light(&mut self, name: &str, position: Vec3, light: LightData) -> ObjectId {
        let desc = SceneObjectDesc {
            name: name.to_string(),
            transform: Transform::from_position(position),
            mesh: None,
            material: None,
            layer: RenderLayer::Opaque,
            kind: ObjectKind::Light(light),
            collision: CollisionKind::None,
            flags: ObjectFlags::VISIBLE,
        };
        self.add_object(desc)
    }

    /// Add a screen-space widget drawn with `mesh` and `material`
    pub fn add_widget(&mut self, name: &str, widget: WidgetData, mesh: &str, material: &str) -> ObjectId {
        let desc = SceneObjectDesc {
            kind: ObjectKind::Widget(widget),
            collision: CollisionKind::None,
            flags: ObjectFlags::VISIBLE,
            ..SceneObjectDesc::mesh(name, Transform::identity(), mesh, material)
        }
        .with_layer(RenderLayer::Widget);
        self.add_object(desc)
    }

    /// Add a particle emitter at `position`
    pub fn add_particle(
        &mut self,
        name: &str,
        position: Vec3,
        particle: ParticleData,
        mesh: &str,
        material: &str,
    ) -> ObjectId {
        let desc = SceneObjectDesc {
            kind: ObjectKind::Particle(particle),
            collision: CollisionKind::None,
            flags: ObjectFlags::VISIBLE | ObjectFlags::MOVABLE,
            ..SceneObjectDesc::mesh(name, Transform::from_position(position), mesh, material)
        }
        .with_layer(RenderLayer::Particle);
        self.add_object(desc)
    }

    /// Bulk-build the octree from everything added so far
    ///
    /// Call once after scene construction. Objects added later are queued and
    /// inserted by the next tick.
    pub fn build(&mut self) {
        for object in self.objects.values_mut() {
            if object.is_world_dirty() {
                object.calculate_world();
            }
        }
        self.octree.build_tree(&self.objects);
        log::info!(
            "Octree built: {} objects in {} nodes",
            self.octree.object_count(),
            self.octree.node_count()
        );
    }

    /// Advance the scene by `delta_time` seconds and upload the frame's constants
    ///
    /// Blocks only while acquiring the next frame slot, if the GPU has not
    /// finished with it yet.
    pub fn tick(&mut self, delta_time: f32) -> EngineResult<()> {
        self.timer.tick_with(delta_time);
        self.ring.acquire_next(&mut self.device)?;

        self.sweep_destroyed();
        self.assign_buffer_indices();

        for id in &self.all_objects {
            if let Some(object) = self.objects.get_mut(*id) {
                object.tick(delta_time);
            }
        }

        self.collisions = self.octree.update(&self.objects);
        if !self.collisions.is_empty() {
            log::trace!("{} collision pairs this tick", self.collisions.len());
        }

        self.ensure_pool_capacity()?;
        self.upload_object_constants()?;
        self.upload_material_constants()?;
        self.upload_pass_constants(delta_time)?;

        self.frame_open = true;
        Ok(())
    }

    /// Record and submit the frame prepared by the last [`tick`](Self::tick)
    pub fn render(&mut self) -> EngineResult<()> {
        if !self.frame_open {
            return Err(GpuError::InvalidOperation {
                reason: "render called without a preceding tick".to_string(),
            }
            .into());
        }

        let slot = self.ring.current();
        self.device.begin_frame(slot.allocator())?;
        self.device
            .bind_constant_buffer(RootSlot::Pass, slot.gpu_address(BufferKind::Pass, 0));
        self.device
            .bind_constant_buffer(RootSlot::Material, slot.materials().base_address());
        self.device
            .bind_constant_buffer(RootSlot::Light, slot.lights().base_address());

        for layer in RenderLayer::ALL {
            for id in &self.layers[layer as usize] {
                let Some(object) = self.objects.get(*id) else {
                    continue;
                };
                let (Some(mesh), Some(material)) = (object.mesh(), object.material()) else {
                    continue;
                };
                if !object.is_drawable() {
                    continue;
                }

                let kind = object.kind().buffer_kind();
                self.device
                    .bind_constant_buffer(kind.root_slot(), slot.gpu_address(kind, object.cb_index()));
                self.device.draw_indexed(mesh, material, object.index_count());
            }
        }

        self.device.end_frame()?;
        self.device.present()?;

        let fence = self.device.signal_fence()?;
        self.ring.set_fence(fence);
        self.frame_open = false;
        self.frames_rendered += 1;
        Ok(())
    }

    /// [`tick`](Self::tick) followed by [`render`](Self::render)
    pub fn run_frame(&mut self, delta_time: f32) -> EngineResult<()> {
        self.tick(delta_time)?;
        self.render()
    }

    /// Wait for all submitted frames, release every pool and hand the device back
    pub fn shutdown(self) -> EngineResult<D> {
        log::info!("Shutting down framework after {} frames", self.frames_rendered);

        let Self { mut device, ring, .. } = self;
        ring.flush(&mut device)?;
        ring.release(&mut device);
        Ok(device)
    }

    /// Mark an object destroyed; it is removed at the start of the next tick
    pub fn destroy(&mut self, id: ObjectId) -> bool {
        match self.objects.get_mut(id) {
            Some(object) => {
                object.destroy();
                true
            }
            None => false,
        }
    }

    /// Closest object hit by a ray through normalized device coordinates
    pub fn pick(&self, ndc_x: f32, ndc_y: f32) -> Option<ObjectId> {
        let ray = self.camera.screen_to_world_ray(ndc_x, ndc_y)?;
        self.octree
            .query_ray(&ray, &self.objects)
            .first()
            .map(|(id, _)| *id)
    }

    /// Collidable objects whose bounds touch `region`
    pub fn objects_in_region(&self, region: &Aabb) -> Vec<ObjectId> {
        self.octree.query_region(region, &self.objects)
    }

    fn sweep_destroyed(&mut self) {
        let destroyed: HashSet<ObjectId> = self
            .all_objects
            .iter()
            .copied()
            .filter(|id| self.objects.get(*id).map_or(true, SceneObject::is_destroyed))
            .collect();
        if destroyed.is_empty() {
            return;
        }

        for layer in &mut self.layers {
            layer.retain(|id| !destroyed.contains(id));
        }
        self.all_objects.retain(|id| !destroyed.contains(id));
        self.octree.retain(|id| !destroyed.contains(&id));
        for id in &destroyed {
            self.objects.remove(*id);
        }

        log::debug!("Swept {} destroyed objects", destroyed.len());
    }

    fn assign_buffer_indices(&mut self) {
        let mut counts = [0; KIND_COUNT];
        for id in &self.all_objects {
            if let Some(object) = self.objects.get_mut(*id) {
                let slot = &mut counts[object.kind().buffer_kind() as usize];
                object.set_cb_index(*slot);
                *slot += 1;
            }
        }
        counts[BufferKind::Pass as usize] = 1;
        counts[BufferKind::Material as usize] = self.assets.material_count();
        self.kind_counts = counts;
    }

    fn ensure_pool_capacity(&mut self) -> EngineResult<()> {
        for kind in BufferKind::ALL {
            let grown = self
                .ring
                .ensure_capacity(&mut self.device, kind, self.kind_counts[kind as usize])?;
            if !grown {
                continue;
            }

            match kind {
                BufferKind::Pass => {}
                BufferKind::Material => self.assets.mark_all_materials_dirty(),
                _ => {
                    for object in self.objects.values_mut() {
                        if object.kind().buffer_kind() == kind {
                            object.mark_buffers_dirty();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn upload_object_constants(&mut self) -> EngineResult<()> {
        let slot = self.ring.current();
        for id in &self.all_objects {
            let Some(object) = self.objects.get_mut(*id) else {
                continue;
            };
            if !object.consume_upload() {
                continue;
            }

            let index = object.cb_index();
            match object.kind().buffer_kind() {
                BufferKind::Object => {
                    let material_index = object
                        .material()
                        .and_then(|handle| self.assets.material_data(handle))
                        .map_or(0, |material| u32::try_from(material.cb_index).unwrap_or(0));
                    slot.objects()
                        .copy_data(&mut self.device, index, &object.object_constants(material_index))?;
                }
                BufferKind::Light => {
                    if let Some(constants) = object.light_constants() {
                        slot.lights().copy_data(&mut self.device, index, &constants)?;
                    }
                }
                BufferKind::Widget => {
                    if let Some(constants) = object.widget_constants() {
                        slot.widgets().copy_data(&mut self.device, index, &constants)?;
                    }
                }
                BufferKind::Particle => {
                    if let Some(constants) = object.particle_constants() {
                        slot.particles().copy_data(&mut self.device, index, &constants)?;
                    }
                }
                BufferKind::Pass | BufferKind::Material => {}
            }
        }
        Ok(())
    }

    fn upload_material_constants(&mut self) -> EngineResult<()> {
        let slot = self.ring.current();
        for material in self.assets.materials_mut() {
            if material.dirty.consume() {
                slot.materials()
                    .copy_data(&mut self.device, material.cb_index, &material.constants)?;
            }
        }
        Ok(())
    }

    fn upload_pass_constants(&mut self, delta_time: f32) -> EngineResult<()> {
        let light_count = u32::try_from(self.kind_counts[BufferKind::Light as usize]).unwrap_or(u32::MAX);
        let pass = PassConstants::new(
            &self.camera.view_matrix(),
            &self.camera.projection_matrix(),
            self.camera.position,
            self.timer.total_time(),
            delta_time,
            light_count,
        );
        self.ring.current().passes().copy_data(&mut self.device, 0, &pass)?;
        Ok(())
    }

    /// Object by id, including objects marked destroyed but not yet swept
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    /// Mutable object by id
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id)
    }

    /// Number of objects, including any awaiting the sweep
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects of one layer, in insertion order
    pub fn objects_in_layer(&self, layer: RenderLayer) -> &[ObjectId] {
        &self.layers[layer as usize]
    }

    /// Every object in insertion order
    pub fn all_objects(&self) -> &[ObjectId] {
        &self.all_objects
    }

    /// Collision pairs found by the last tick
    pub fn collisions(&self) -> &[CollisionPair] {
        &self.collisions
    }

    /// Get the octree
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Get the frame-resource ring
    pub fn ring(&self) -> &FrameResourceRing {
        &self.ring
    }

    /// Get the device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get the device mutably
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Get the asset registry
    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Get the asset registry mutably
    pub fn assets_mut(&mut self) -> &mut AssetRegistry {
        &mut self.assets
    }

    /// Get the camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Get the camera mutably
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Get the simulation timer
    pub fn timer(&self) -> &GameTimer {
        &self.timer
    }

    /// Get the configuration the framework was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Frames submitted so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{SoftwareDevice, SubmissionMode};
    use crate::render::{MaterialConstants, ObjectConstants, PoolConfig};
    use crate::scene::{Aabb, ContainmentType};

    const DT: f32 = 1.0 / 60.0;

    fn framework(frames: usize) -> Framework<SoftwareDevice> {
        let config = EngineConfig::default().with_frames_in_flight(frames);
        let mut framework = Framework::new(SoftwareDevice::new(SubmissionMode::Immediate), config).unwrap();
        framework
            .assets_mut()
            .add_mesh("cube", 36, Aabb::new(Vec3::zeros(), Vec3::repeat(0.5)));
        framework
            .assets_mut()
            .add_material("stone", MaterialConstants::default());
        framework
    }

    fn cube_at(framework: &mut Framework<SoftwareDevice>, name: &str, position: Vec3) -> ObjectId {
        framework.add_object(
            SceneObjectDesc::mesh(name, Transform::from_position(position), "cube", "stone").movable(),
        )
    }

    fn stored_object_constants(framework: &Framework<SoftwareDevice>, slot: usize, index: usize) -> ObjectConstants {
        let pool = framework.ring().slot(slot).unwrap().objects();
        let bytes = framework.device().read_buffer(pool.buffer_id().unwrap()).unwrap();
        let start = (pool.element_byte_size() * index as u64) as usize;
        bytemuck::pod_read_unaligned(&bytes[start..start + std::mem::size_of::<ObjectConstants>()])
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default().with_frames_in_flight(0);
        let result = Framework::new(SoftwareDevice::default(), config);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_render_requires_tick() {
        let mut framework = framework(2);
        assert!(matches!(framework.render(), Err(EngineError::Gpu(_))));
    }

    #[test]
    fn test_mutation_replicates_into_every_slot() {
        let frames = 3;
        let mut framework = framework(frames);
        let id = cube_at(&mut framework, "cube", Vec3::zeros());
        framework.build();

        for _ in 0..frames {
            framework.run_frame(DT).unwrap();
        }
        assert!(framework.object(id).unwrap().countdown().is_clean());

        framework
            .object_mut(id)
            .unwrap()
            .set_position(Vec3::new(5.0, 1.0, -2.0));
        for _ in 0..frames {
            framework.run_frame(DT).unwrap();
        }

        let object = framework.object(id).unwrap();
        assert_eq!(object.countdown().remaining(), 0);

        let expected = object.object_constants(0);
        for slot in 0..frames {
            assert_eq!(stored_object_constants(&framework, slot, object.cb_index()), expected);
        }
    }

    #[test]
    fn test_destroyed_object_lives_until_next_sweep() {
        let mut framework = framework(2);
        let doomed = cube_at(&mut framework, "doomed", Vec3::zeros());
        let survivor = cube_at(&mut framework, "survivor", Vec3::new(10.0, 0.0, 0.0));
        framework.object_mut(doomed).unwrap().set_lifetime(0.01);
        framework.build();

        // Frame K: the lifetime runs out mid-tick
        framework.tick(DT).unwrap();
        assert!(framework.object(doomed).unwrap().is_destroyed());
        assert!(framework.objects_in_layer(RenderLayer::Opaque).contains(&doomed));
        assert!(framework.octree().node_of(doomed).is_some());
        framework.render().unwrap();
        assert_eq!(framework.device().last_frame_draws().len(), 2);

        // Frame K+1: swept before anything else sees it
        framework.tick(DT).unwrap();
        assert!(framework.object(doomed).is_none());
        assert!(!framework.objects_in_layer(RenderLayer::Opaque).contains(&doomed));
        assert!(!framework.all_objects().contains(&doomed));
        assert!(framework.octree().node_of(doomed).is_none());
        assert_eq!(framework.object(survivor).unwrap().cb_index(), 0);
        framework.render().unwrap();
        assert_eq!(framework.device().last_frame_draws().len(), 1);
    }

    #[test]
    fn test_destroy_between_tick_and_render_still_draws() {
        let mut framework = framework(2);
        let id = cube_at(&mut framework, "cube", Vec3::zeros());
        framework.build();

        framework.tick(DT).unwrap();
        assert!(framework.destroy(id));
        framework.render().unwrap();
        assert_eq!(framework.device().last_frame_draws().len(), 1);

        framework.run_frame(DT).unwrap();
        assert!(framework.device().last_frame_draws().is_empty());
        assert!(!framework.destroy(id));
    }

    #[test]
    fn test_pool_growth_reuploads_into_new_buffer() {
        let mut config = EngineConfig::default().with_frames_in_flight(2);
        config.pools = PoolConfig {
            object: 10,
            ..PoolConfig::default()
        };
        let mut framework = Framework::new(SoftwareDevice::default(), config).unwrap();
        framework
            .assets_mut()
            .add_mesh("cube", 36, Aabb::new(Vec3::zeros(), Vec3::repeat(0.5)));
        framework
            .assets_mut()
            .add_material("stone", MaterialConstants::default());

        let ids: Vec<ObjectId> = (0..25)
            .map(|i| cube_at(&mut framework, &format!("cube{i}"), Vec3::new(i as f32 * 3.0, 0.0, 0.0)))
            .collect();
        framework.build();
        framework.run_frame(DT).unwrap();
        framework.run_frame(DT).unwrap();

        for slot in 0..2 {
            assert!(framework.ring().slot(slot).unwrap().capacity(BufferKind::Object) >= 25);
        }
        let last = framework.object(ids[24]).unwrap();
        for slot in 0..2 {
            assert_eq!(
                stored_object_constants(&framework, slot, last.cb_index()),
                last.object_constants(0)
            );
        }
    }

    #[test]
    fn test_overlapping_objects_collide() {
        let mut framework = framework(2);
        let a = cube_at(&mut framework, "a", Vec3::zeros());
        let b = cube_at(&mut framework, "b", Vec3::new(0.5, 0.0, 0.0));
        let far = cube_at(&mut framework, "far", Vec3::new(40.0, 0.0, 0.0));
        framework.build();
        framework.run_frame(DT).unwrap();

        assert_eq!(framework.collisions(), &[CollisionPair::new(a, b)]);
        assert!(!framework.collisions().iter().any(|pair| pair.involves(far)));
    }

    #[test]
    fn test_objects_added_after_build_reach_the_octree() {
        let mut framework = framework(2);
        cube_at(&mut framework, "first", Vec3::zeros());
        framework.build();

        let late = cube_at(&mut framework, "late", Vec3::new(20.0, 0.0, 0.0));
        assert!(framework.octree().node_of(late).is_none());
        framework.run_frame(DT).unwrap();
        assert!(framework.octree().node_of(late).is_some());
    }

    #[test]
    fn test_missing_assets_leave_object_undrawn() {
        let mut framework = framework(2);
        let id = framework.add_object(SceneObjectDesc::mesh(
            "ghost",
            Transform::identity(),
            "missing",
            "stone",
        ));
        framework.build();
        framework.run_frame(DT).unwrap();

        let object = framework.object(id).unwrap();
        assert!(object.mesh().is_none());
        assert!(!object.is_collidable());
        assert!(framework.device().last_frame_draws().is_empty());
    }

    #[test]
    fn test_kinds_use_their_own_buffers() {
        let mut framework = framework(2);
        let cube = cube_at(&mut framework, "cube", Vec3::zeros());
        let light = framework.add_light(
            "sun",
            Vec3::new(0.0, 10.0, 0.0),
            LightData::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0)),
        );
        let widget = framework.add_widget(
            "hud",
            WidgetData {
                rect: [0.0, 0.0, 0.2, 0.1],
                color: [1.0; 4],
                depth: 0.0,
            },
            "cube",
            "stone",
        );
        framework.build();
        framework.run_frame(DT).unwrap();

        assert_eq!(framework.object(cube).unwrap().cb_index(), 0);
        assert_eq!(framework.object(light).unwrap().cb_index(), 0);
        assert_eq!(framework.object(widget).unwrap().cb_index(), 0);
        assert_eq!(framework.objects_in_layer(RenderLayer::Widget), &[widget]);

        // Lights have no mesh; the cube and the widget are drawn, opaque first
        let draws = framework.device().last_frame_draws();
        assert_eq!(draws.len(), 2);
        let slot = framework.ring().current();
        assert_eq!(draws[0].object_address, Some(slot.gpu_address(BufferKind::Object, 0)));
    }

    #[test]
    fn test_pick_hits_nearest_object() {
        let mut framework = framework(2);
        let near = cube_at(&mut framework, "near", Vec3::new(0.0, 0.0, 2.0));
        cube_at(&mut framework, "far", Vec3::new(0.0, 0.0, -4.0));
        framework.camera_mut().set_position(Vec3::new(0.0, 0.0, 10.0));
        framework.camera_mut().look_at(Vec3::zeros(), Vec3::y());
        framework.build();

        assert_eq!(framework.pick(0.0, 0.0), Some(near));
    }

    fn assert_tree_tracks_objects(framework: &Framework<SoftwareDevice>, frame: usize) {
        let octree = framework.octree();
        let cap = framework.config().octree.max_lifespan_cap;

        for id in framework.all_objects() {
            let object = framework.object(*id).unwrap();
            if !object.is_collidable() {
                continue;
            }
            let index = octree
                .node_of(*id)
                .unwrap_or_else(|| panic!("frame {frame}: '{}' is not in the tree", object.name()));
            let region = octree.node(index).unwrap().region();
            assert_eq!(
                object.world_bounds().contained_by(region),
                ContainmentType::Contains,
                "frame {frame}: '{}' escaped its node",
                object.name()
            );
        }

        for (_, node) in octree.nodes() {
            assert!(node.max_lifespan() <= cap);
            assert!(node.current_life() >= -1 && node.current_life() <= node.max_lifespan());
        }

        for pair in framework.collisions() {
            let first = framework.object(pair.first).unwrap();
            let second = framework.object(pair.second).unwrap();
            assert!(
                first.world_bounds().intersects(second.world_bounds()),
                "frame {frame}: '{}' and '{}' reported but apart",
                first.name(),
                second.name()
            );
        }
    }

    #[test]
    fn test_moving_objects_stay_inside_their_nodes() {
        let mut framework = framework(3);

        let tracked = cube_at(&mut framework, "tracked", Vec3::new(10.3, 10.3, 10.3));
        framework
            .object_mut(tracked)
            .unwrap()
            .set_velocity(Vec3::new(20.0, 0.0, 0.0));

        let movers: Vec<ObjectId> = (0..60)
            .map(|i| {
                let position = Vec3::new(
                    (i % 5) as f32 * 12.0 - 24.0,
                    ((i / 5) % 3) as f32 * 12.0 - 12.0,
                    (i / 15) as f32 * 12.0 - 18.0,
                );
                let id = cube_at(&mut framework, &format!("mover{i}"), position);
                let velocity = Vec3::new(
                    ((i % 7) as f32 - 3.0) * 4.0,
                    ((i % 5) as f32 - 2.0) * 3.0,
                    ((i % 3) as f32 - 1.0) * 5.0,
                );
                framework.object_mut(id).unwrap().set_velocity(velocity);
                id
            })
            .collect();
        framework.build();

        let start = framework.octree().node_of(tracked).unwrap();
        let mut tracked_relocated = false;
        let doomed = movers[17];

        for frame in 0..300 {
            if frame == 150 {
                assert!(framework.destroy(doomed));
            }
            framework.run_frame(DT).unwrap();
            if frame == 151 {
                assert!(framework.object(doomed).is_none());
                assert!(framework.octree().node_of(doomed).is_none());
            }

            tracked_relocated |= framework.octree().node_of(tracked) != Some(start);
            assert_tree_tracks_objects(&framework, frame);
        }

        assert!(tracked_relocated);
        assert_eq!(framework.octree().object_count(), 60);
    }

    #[test]
    fn test_shutdown_releases_every_buffer() {
        let mut framework = framework(3);
        cube_at(&mut framework, "cube", Vec3::zeros());
        framework.build();
        for _ in 0..4 {
            framework.run_frame(DT).unwrap();
        }

        let device = framework.shutdown().unwrap();
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.presented_frames(), 4);
    }
}
