//! Frame-resource ring
//!
//! N slots, each with its own command allocator, constant buffer pools and
//! fence value. The CPU writes into one slot per frame while the GPU may still
//! be reading the other N-1; [`FrameResourceRing::acquire_next`] is where the
//! CPU blocks when it gets N frames ahead.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use super::{
    BufferMemoryPool, LightConstants, MaterialConstants, ObjectConstants, ParticleConstants,
    PassConstants, WidgetConstants,
};
use crate::gpu::{CommandAllocatorId, GpuAddress, GpuDevice, GpuResult, RootSlot};

/// Kind of per-frame buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    /// Per-object constants
    Object,
    /// Per-pass constants
    Pass,
    /// Light constants
    Light,
    /// Material constants
    Material,
    /// Widget constants
    Widget,
    /// Particle emitter constants
    Particle,
}

impl BufferKind {
    /// Every kind, in slot order
    pub const ALL: [Self; 6] = [
        Self::Object,
        Self::Pass,
        Self::Light,
        Self::Material,
        Self::Widget,
        Self::Particle,
    ];

    /// Root slot the pool is bound to
    pub const fn root_slot(self) -> RootSlot {
        match self {
            Self::Object => RootSlot::Object,
            Self::Pass => RootSlot::Pass,
            Self::Light => RootSlot::Light,
            Self::Material => RootSlot::Material,
            Self::Widget => RootSlot::Widget,
            Self::Particle => RootSlot::Particle,
        }
    }
}

/// Initial element count of each pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Object constants
    pub object: usize,
    /// Pass constants
    pub pass: usize,
    /// Light constants
    pub light: usize,
    /// Material constants
    pub material: usize,
    /// Widget constants
    pub widget: usize,
    /// Particle constants
    pub particle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            object: 64,
            pass: 2,
            light: 8,
            material: 16,
            widget: 8,
            particle: 8,
        }
    }
}

impl PoolConfig {
    /// Initial capacity for `kind`
    pub const fn initial(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::Object => self.object,
            BufferKind::Pass => self.pass,
            BufferKind::Light => self.light,
            BufferKind::Material => self.material,
            BufferKind::Widget => self.widget,
            BufferKind::Particle => self.particle,
        }
    }
}

/// One set of per-frame GPU resources
#[derive(Debug)]
pub struct FrameSlot {
    allocator: CommandAllocatorId,
    objects: BufferMemoryPool<ObjectConstants>,
    passes: BufferMemoryPool<PassConstants>,
    lights: BufferMemoryPool<LightConstants>,
    materials: BufferMemoryPool<MaterialConstants>,
    widgets: BufferMemoryPool<WidgetConstants>,
    particles: BufferMemoryPool<ParticleConstants>,
    fence: u64,
}

impl FrameSlot {
    fn new<D: GpuDevice + ?Sized>(device: &mut D, pools: &PoolConfig) -> GpuResult<Self> {
        Ok(Self {
            allocator: device.create_command_allocator()?,
            objects: BufferMemoryPool::new(device, pools.object, true)?,
            passes: BufferMemoryPool::new(device, pools.pass, true)?,
            lights: BufferMemoryPool::new(device, pools.light, false)?,
            materials: BufferMemoryPool::new(device, pools.material, false)?,
            widgets: BufferMemoryPool::new(device, pools.widget, true)?,
            particles: BufferMemoryPool::new(device, pools.particle, true)?,
            fence: 0,
        })
    }

    /// Command allocator recorded into this frame
    pub fn allocator(&self) -> CommandAllocatorId {
        self.allocator
    }

    /// Fence value of the last submission from this slot; 0 if never submitted
    pub fn fence(&self) -> u64 {
        self.fence
    }

    /// Record the fence value of the work just submitted from this slot
    pub fn set_fence(&mut self, value: u64) {
        self.fence = value;
    }

    /// Object constants pool
    pub fn objects(&self) -> &BufferMemoryPool<ObjectConstants> {
        &self.objects
    }

    /// Pass constants pool
    pub fn passes(&self) -> &BufferMemoryPool<PassConstants> {
        &self.passes
    }

    /// Light constants pool
    pub fn lights(&self) -> &BufferMemoryPool<LightConstants> {
        &self.lights
    }

    /// Material constants pool
    pub fn materials(&self) -> &BufferMemoryPool<MaterialConstants> {
        &self.materials
    }

    /// Widget constants pool
    pub fn widgets(&self) -> &BufferMemoryPool<WidgetConstants> {
        &self.widgets
    }

    /// Particle constants pool
    pub fn particles(&self) -> &BufferMemoryPool<ParticleConstants> {
        &self.particles
    }

    /// Element capacity of the pool of `kind`
    pub fn capacity(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::Object => self.objects.capacity(),
            BufferKind::Pass => self.passes.capacity(),
            BufferKind::Light => self.lights.capacity(),
            BufferKind::Material => self.materials.capacity(),
            BufferKind::Widget => self.widgets.capacity(),
            BufferKind::Particle => self.particles.capacity(),
        }
    }

    /// Address of element `index` in the pool of `kind`
    pub fn gpu_address(&self, kind: BufferKind, index: usize) -> GpuAddress {
        match kind {
            BufferKind::Object => self.objects.gpu_address(index),
            BufferKind::Pass => self.passes.gpu_address(index),
            BufferKind::Light => self.lights.gpu_address(index),
            BufferKind::Material => self.materials.gpu_address(index),
            BufferKind::Widget => self.widgets.gpu_address(index),
            BufferKind::Particle => self.particles.gpu_address(index),
        }
    }

    fn ensure_capacity<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        kind: BufferKind,
        count: usize,
    ) -> GpuResult<bool> {
        match kind {
            BufferKind::Object => grow(&mut self.objects, device, count),
            BufferKind::Pass => grow(&mut self.passes, device, count),
            BufferKind::Light => grow(&mut self.lights, device, count),
            BufferKind::Material => grow(&mut self.materials, device, count),
            BufferKind::Widget => grow(&mut self.widgets, device, count),
            BufferKind::Particle => grow(&mut self.particles, device, count),
        }
    }

    fn release<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.objects.release(device);
        self.passes.release(device);
        self.lights.release(device);
        self.materials.release(device);
        self.widgets.release(device);
        self.particles.release(device);
    }
}

fn grow<T: Pod, D: GpuDevice + ?Sized>(
    pool: &mut BufferMemoryPool<T>,
    device: &mut D,
    count: usize,
) -> GpuResult<bool> {
    if pool.capacity() >= count {
        return Ok(false);
    }
    pool.resize(device, count * 2)?;
    Ok(true)
}

/// Ring of N frame slots used round-robin
#[derive(Debug)]
pub struct FrameResourceRing {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameResourceRing {
    /// Create `frames_in_flight` slots (at least one)
    ///
    /// No slot is current until the first [`FrameResourceRing::acquire_next`],
    /// which returns slot 0.
    pub fn new<D: GpuDevice + ?Sized>(device: &mut D, frames_in_flight: usize, pools: &PoolConfig) -> GpuResult<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(device, pools))
            .collect::<GpuResult<Vec<_>>>()?;

        log::info!("Created frame resource ring with {frames_in_flight} slots");
        Ok(Self {
            current: frames_in_flight - 1,
            slots,
        })
    }

    /// Advance to the next slot, blocking until the GPU has finished with it
    ///
    /// This is the only place the frame loop waits on the GPU.
    pub fn acquire_next<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> GpuResult<&mut FrameSlot> {
        self.current = (self.current + 1) % self.slots.len();
        let slot = &mut self.slots[self.current];

        if slot.fence != 0 && device.completed_fence_value() < slot.fence {
            log::trace!("Waiting for fence {} (slot {})", slot.fence, self.current);
            device.wait_for_fence(slot.fence)?;
        }
        device.reset_command_allocator(slot.allocator)?;

        Ok(slot)
    }

    /// Grow the current slot's pool of `kind` to hold `count` elements
    ///
    /// Grows to `count * 2` and never shrinks. Returns whether the pool was
    /// reallocated, in which case its contents and addresses are gone.
    pub fn ensure_capacity<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        kind: BufferKind,
        count: usize,
    ) -> GpuResult<bool> {
        let index = self.current;
        let grew = self.slots[index].ensure_capacity(device, kind, count)?;
        if grew {
            log::debug!(
                "Slot {} {:?} pool grew to {} elements",
                index,
                kind,
                self.slots[index].capacity(kind)
            );
        }
        Ok(grew)
    }

    /// Slot being written this frame
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    /// Slot being written this frame, mutably
    pub fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.current]
    }

    /// Index of the current slot
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Slot at `index`
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring has at least one slot
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record the fence of the work just submitted from the current slot
    pub fn set_fence(&mut self, value: u64) {
        self.current_mut().set_fence(value);
    }

    /// Wait until the GPU has finished with every slot
    pub fn flush<D: GpuDevice + ?Sized>(&self, device: &mut D) -> GpuResult<()> {
        let newest = self.slots.iter().map(FrameSlot::fence).max().unwrap_or(0);
        if newest != 0 && device.completed_fence_value() < newest {
            device.wait_for_fence(newest)?;
        }
        Ok(())
    }

    /// Free every pool. Call [`FrameResourceRing::flush`] first.
    pub fn release<D: GpuDevice + ?Sized>(self, device: &mut D) {
        for slot in self.slots {
            slot.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommandSink, SoftwareDevice, SubmissionMode};
    use std::thread;

    fn submit(ring: &mut FrameResourceRing, device: &mut SoftwareDevice) -> u64 {
        device.begin_frame(ring.current().allocator()).unwrap();
        device.end_frame().unwrap();
        device.present().unwrap();
        let fence = device.signal_fence().unwrap();
        ring.set_fence(fence);
        fence
    }

    #[test]
    fn test_first_acquire_returns_slot_zero() {
        let mut device = SoftwareDevice::default();
        let mut ring = FrameResourceRing::new(&mut device, 3, &PoolConfig::default()).unwrap();
        ring.acquire_next(&mut device).unwrap();
        assert_eq!(ring.current_index(), 0);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_slots_rotate_round_robin() {
        let mut device = SoftwareDevice::default();
        let mut ring = FrameResourceRing::new(&mut device, 3, &PoolConfig::default()).unwrap();

        let mut order = Vec::new();
        for _ in 0..7 {
            ring.acquire_next(&mut device).unwrap();
            order.push(ring.current_index());
            submit(&mut ring, &mut device);
        }
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(device.fence_waits().is_empty());
    }

    #[test]
    fn test_acquire_blocks_only_when_gpu_is_behind() {
        // Deterministic pseudo-random GPU progress; the GPU thread only steps
        // in once the CPU is actually blocked.
        let mut device = SoftwareDevice::new(SubmissionMode::Manual);
        let mut ring = FrameResourceRing::new(&mut device, 3, &PoolConfig::default()).unwrap();
        let gpu = device.fence();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..60 {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            let last = device.last_signaled();
            let completed = gpu.completed();
            if last > completed {
                gpu.complete(completed + (seed >> 33) % (last - completed + 1));
            }

            let next = (ring.current_index() + 1) % ring.len();
            let slot_fence = ring.slot(next).unwrap().fence();
            let expect_block = slot_fence != 0 && gpu.completed() < slot_fence;

            let waits_before = device.fence_waits().len();
            let helper = expect_block.then(|| {
                let gpu = gpu.clone();
                thread::spawn(move || {
                    while gpu.waiters() == 0 {
                        thread::yield_now();
                    }
                    gpu.complete(slot_fence);
                })
            });

            ring.acquire_next(&mut device).unwrap();
            if let Some(helper) = helper {
                helper.join().unwrap();
            }

            let blocked = device.fence_waits().len() > waits_before;
            assert_eq!(blocked, expect_block);
            assert!(gpu.completed() >= ring.current().fence());

            submit(&mut ring, &mut device);
        }
    }

    #[test]
    fn test_ensure_capacity_doubles_and_never_shrinks() {
        let mut device = SoftwareDevice::default();
        let pools = PoolConfig {
            object: 10,
            ..PoolConfig::default()
        };
        let mut ring = FrameResourceRing::new(&mut device, 2, &pools).unwrap();
        ring.acquire_next(&mut device).unwrap();

        assert!(!ring.ensure_capacity(&mut device, BufferKind::Object, 10).unwrap());
        assert!(ring.ensure_capacity(&mut device, BufferKind::Object, 11).unwrap());
        assert_eq!(ring.current().capacity(BufferKind::Object), 22);
        assert!(!ring.ensure_capacity(&mut device, BufferKind::Object, 3).unwrap());
        assert_eq!(ring.current().capacity(BufferKind::Object), 22);

        // Only the current slot grows.
        assert_eq!(ring.slot(1).unwrap().capacity(BufferKind::Object), 10);
    }

    #[test]
    fn test_growth_from_10_to_25_uses_fresh_addresses() {
        let mut device = SoftwareDevice::default();
        let pools = PoolConfig {
            object: 10,
            ..PoolConfig::default()
        };
        let mut ring = FrameResourceRing::new(&mut device, 3, &pools).unwrap();
        ring.acquire_next(&mut device).unwrap();

        let old_buffer = ring.current().objects().buffer_id().unwrap();
        let old_addresses: Vec<_> = (0..10).map(|i| ring.current().gpu_address(BufferKind::Object, i)).collect();

        assert!(ring.ensure_capacity(&mut device, BufferKind::Object, 25).unwrap());

        let slot = ring.current();
        assert!(slot.capacity(BufferKind::Object) >= 25);
        assert!(!device.is_live(old_buffer));
        for index in 0..slot.capacity(BufferKind::Object) {
            assert!(!old_addresses.contains(&slot.gpu_address(BufferKind::Object, index)));
        }
    }

    #[test]
    fn test_growth_out_of_memory_is_an_error() {
        let mut device = SoftwareDevice::default();
        let mut ring = FrameResourceRing::new(&mut device, 1, &PoolConfig::default()).unwrap();
        let budget = device.allocated_bytes() + 1024;
        let mut device = device.with_memory_budget(budget);

        ring.acquire_next(&mut device).unwrap();
        assert!(ring.ensure_capacity(&mut device, BufferKind::Object, 1000).is_err());
    }

    #[test]
    fn test_flush_waits_for_newest_fence() {
        let mut device = SoftwareDevice::new(SubmissionMode::Manual);
        let mut ring = FrameResourceRing::new(&mut device, 2, &PoolConfig::default()).unwrap();
        ring.acquire_next(&mut device).unwrap();
        submit(&mut ring, &mut device);

        let gpu = device.fence();
        let helper = thread::spawn(move || {
            while gpu.waiters() == 0 {
                thread::yield_now();
            }
            gpu.complete(1);
        });

        ring.flush(&mut device).unwrap();
        helper.join().unwrap();
        assert_eq!(device.fence_waits(), &[1]);

        ring.release(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
