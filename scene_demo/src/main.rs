//! Scene demo
//!
//! Builds a small code-driven scene (moving boxes and spheres, a light, a HUD
//! widget and a particle emitter) and runs the tick/render loop against the
//! software GPU device. A background thread plays the GPU, completing one
//! frame at a time, so the CPU really does block when it runs too far ahead.
//!
//! Usage: `scene_demo [config.toml|config.ron]`

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use frame_engine::foundation::logging;
use frame_engine::gpu::FenceTimeline;
use frame_engine::prelude::*;
use nalgebra::UnitQuaternion;

const FRAME_COUNT: u32 = 240;
const DELTA_TIME: f32 = 1.0 / 60.0;
const GPU_FRAME_TIME: Duration = Duration::from_millis(2);

// Scene layout
const BOX_COUNT: usize = 40;
const SPHERE_COUNT: usize = 20;
const ARENA_RADIUS: f32 = 30.0;
const DESTROY_AT_FRAME: u32 = 120;

/// Simulated GPU: completes signaled fences one at a time
struct GpuThread {
    published: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GpuThread {
    fn spawn(fence: FenceTimeline) -> Self {
        let published = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let published = Arc::clone(&published);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(GPU_FRAME_TIME);
                    let completed = fence.completed();
                    if completed < published.load(Ordering::Acquire) {
                        fence.complete(completed + 1);
                    }
                }
                fence.complete(published.load(Ordering::Acquire));
            })
        };

        Self {
            published,
            stop,
            handle: Some(handle),
        }
    }

    /// Make fences up to `value` available for completion
    fn publish(&self, value: u64) {
        self.published.store(value, Ordering::Release);
    }

    fn join(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("GPU thread panicked");
            }
        }
    }
}

fn register_assets(assets: &mut AssetRegistry) {
    let unit = Aabb::new(Vec3::zeros(), Vec3::repeat(0.5));
    assets.add_mesh("box", 36, unit);
    assets.add_mesh("sphere", 2880, unit);
    assets.add_mesh("quad", 6, Aabb::new(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.0)));

    assets.add_material("stone", MaterialConstants::with_albedo([0.6, 0.6, 0.6, 1.0], 0.8));
    assets.add_material("copper", MaterialConstants::with_albedo([0.95, 0.64, 0.54, 1.0], 0.3));
    assets.add_material("glass", MaterialConstants::with_albedo([0.8, 0.9, 1.0, 0.3], 0.05));
    assets.add_material("hud", MaterialConstants::with_albedo([1.0, 1.0, 1.0, 0.8], 1.0));
    assets.add_material("spark", MaterialConstants::with_albedo([1.0, 0.7, 0.2, 1.0], 1.0));
}

/// Point on a ring around the origin, `i` of `count`
fn ring_position(i: usize, count: usize, radius: f32, height: f32) -> Vec3 {
    let angle = i as f32 / count as f32 * std::f32::consts::TAU;
    Vec3::new(angle.cos() * radius, height, angle.sin() * radius)
}

fn populate(framework: &mut Framework<SoftwareDevice>) -> Vec<ObjectId> {
    let mut movers = Vec::with_capacity(BOX_COUNT + SPHERE_COUNT);

    for i in 0..BOX_COUNT {
        let position = ring_position(i, BOX_COUNT, ARENA_RADIUS, 0.0);
        let mut transform = Transform::from_position(position);
        transform.rotation = UnitQuaternion::from_euler_angles(0.0, i as f32 * 0.3, 0.0);

        let desc = SceneObjectDesc::mesh(format!("box_{i}"), transform, "box", "stone")
            .with_collision(CollisionKind::Obb)
            .movable();
        let id = framework.add_object(desc);
        if let Some(object) = framework.object_mut(id) {
            // Everything heads for the centre and piles up there
            object.set_velocity(-position.normalize() * 4.0);
            object.set_angular_velocity(Vec3::new(0.0, 1.0, 0.0));
        }
        movers.push(id);
    }

    for i in 0..SPHERE_COUNT {
        let position = ring_position(i, SPHERE_COUNT, ARENA_RADIUS * 0.5, 2.0);
        let layer = if i % 2 == 0 { RenderLayer::Opaque } else { RenderLayer::Transparent };
        let material = if i % 2 == 0 { "copper" } else { "glass" };

        let desc = SceneObjectDesc::mesh(format!("sphere_{i}"), Transform::from_position_scale(position, 1.5), "sphere", material)
            .with_layer(layer)
            .with_collision(CollisionKind::Sphere)
            .movable();
        let id = framework.add_object(desc);
        if let Some(object) = framework.object_mut(id) {
            object.set_velocity(Vec3::new(-position.z, 0.0, position.x).normalize() * 3.0);
        }
        movers.push(id);
    }

    framework.add_object(
        SceneObjectDesc::mesh("floor", Transform::from_position(Vec3::new(0.0, -1.0, 0.0)), "box", "stone")
            .with_flags(ObjectFlags::VISIBLE),
    );
    framework.add_light(
        "sun",
        Vec3::new(0.0, 50.0, 0.0),
        LightData::directional(Vec3::new(0.3, -1.0, 0.2), Vec3::new(1.0, 0.95, 0.9)),
    );
    framework.add_widget(
        "frame_counter",
        WidgetData {
            rect: [0.02, 0.02, 0.2, 0.05],
            color: [1.0, 1.0, 1.0, 0.8],
            depth: 0.0,
        },
        "quad",
        "hud",
    );
    let emitter = framework.add_particle(
        "sparks",
        Vec3::new(0.0, 1.0, 0.0),
        ParticleData {
            velocity: Vec3::new(0.0, 5.0, 0.0),
            particle_size: 0.1,
            lifetime: 1.5,
            color: [1.0, 0.7, 0.2, 1.0],
            max_particles: 256,
        },
        "quad",
        "spark",
    );
    if let Some(object) = framework.object_mut(emitter) {
        object.set_lifetime(3.0);
    }

    movers
}

fn run(config: EngineConfig) -> Result<(), EngineError> {
    let device = SoftwareDevice::new(SubmissionMode::Manual);
    let gpu = GpuThread::spawn(device.fence());

    let mut framework = Framework::new(device, config)?;
    register_assets(framework.assets_mut());
    {
        let camera = framework.camera_mut();
        camera.set_position(Vec3::new(0.0, 40.0, 60.0));
        camera.look_at(Vec3::zeros(), Vec3::y());
    }

    let movers = populate(&mut framework);
    framework.build();

    let mut clock = GameTimer::new();
    let mut total_collisions = 0usize;

    for frame in 0..FRAME_COUNT {
        if frame == DESTROY_AT_FRAME {
            // Drop every third mover; they disappear on the following tick
            let doomed: Vec<ObjectId> = movers.iter().copied().step_by(3).collect();
            for id in &doomed {
                framework.destroy(*id);
            }
            log::info!("Destroyed {} objects at frame {frame}", doomed.len());
        }

        framework.run_frame(DELTA_TIME)?;
        gpu.publish(framework.device().last_signaled());
        clock.tick();
        total_collisions += framework.collisions().len();

        if frame % 60 == 0 {
            let octree = framework.octree();
            log::info!(
                "frame {frame}: {} objects, {} octree nodes, {} collisions, {:.0} fps",
                framework.object_count(),
                octree.node_count(),
                framework.collisions().len(),
                clock.current_fps()
            );
        }
    }

    if let Some(id) = framework.pick(0.0, 0.0) {
        let name = framework.object(id).map_or("?", SceneObject::name);
        log::info!("Object under the screen centre: {name}");
    }

    let cpu_waits = framework.device().fence_waits().len();
    let rendered = framework.frames_rendered();
    let device = framework.shutdown()?;
    gpu.join();

    log::info!(
        "Rendered {rendered} frames in {:.2}s ({cpu_waits} CPU waits, {total_collisions} collision pairs, {} buffers live after shutdown)",
        clock.total_time(),
        device.live_buffer_count()
    );
    Ok(())
}

fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match EngineConfig::load_or_default(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log_level);

    log::info!("=== Scene Demo ===");
    if let Err(e) = run(config) {
        log::error!("Demo failed: {e}");
        std::process::exit(1);
    }
}
