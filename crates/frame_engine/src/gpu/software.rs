//! In-process GPU device
//!
//! Upload buffers are plain byte vectors, fences are a [`FenceTimeline`], and
//! submitted frames are recorded as [`DrawCall`] lists. Used by the demo and
//! by tests that need to inspect what the frame loop wrote and when it waited.

use std::collections::HashMap;

use super::{
    BufferAllocation, BufferId, CommandAllocatorId, FenceTimeline, GpuAddress, GpuCommandSink,
    GpuDevice, GpuError, GpuResult, RootSlot, E_FAIL, E_INVALIDARG, E_OUTOFMEMORY,
};
use crate::assets::{MaterialHandle, MeshHandle};
use crate::gpu_error;

/// Required alignment of buffer placements
const PLACEMENT_ALIGNMENT: u64 = 256;

/// First address handed out; zero stays an invalid address
const BASE_ADDRESS: u64 = 0x1_0000;

/// When submitted work completes on the simulated GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// Every fence completes as soon as it is signaled
    Immediate,
    /// Fences complete only through [`FenceTimeline::complete`]
    Manual,
}

/// One recorded draw with the constants bound at the time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    /// Mesh drawn
    pub mesh: MeshHandle,
    /// Material used
    pub material: MaterialHandle,
    /// Number of indices
    pub index_count: u32,
    /// Bound per-object constants
    pub object_address: Option<GpuAddress>,
    /// Bound per-pass constants
    pub pass_address: Option<GpuAddress>,
}

#[derive(Debug)]
struct SoftBuffer {
    bytes: Vec<u8>,
    gpu_address: GpuAddress,
}

#[derive(Debug, Default)]
struct RecordingState {
    allocator: Option<CommandAllocatorId>,
    bound: [Option<GpuAddress>; RootSlot::COUNT],
    draws: Vec<DrawCall>,
}

/// Software implementation of [`GpuDevice`]
#[derive(Debug)]
pub struct SoftwareDevice {
    mode: SubmissionMode,
    fence: FenceTimeline,
    last_signaled: u64,

    buffers: HashMap<BufferId, SoftBuffer>,
    next_buffer_id: u64,
    next_address: u64,
    memory_budget: Option<u64>,
    allocated_bytes: u64,
    stale_destroys: usize,

    // Fence value that must complete before each allocator may be reset.
    allocator_fences: Vec<u64>,
    pending_allocator: Option<CommandAllocatorId>,

    recording: Option<RecordingState>,
    submitted: Option<Vec<DrawCall>>,
    last_frame: Vec<DrawCall>,
    presented_frames: u64,
    fence_waits: Vec<u64>,
}

impl SoftwareDevice {
    /// Create a device with the given submission mode
    pub fn new(mode: SubmissionMode) -> Self {
        log::info!("Created software GPU device ({mode:?} submission)");
        Self {
            mode,
            fence: FenceTimeline::new(),
            last_signaled: 0,
            buffers: HashMap::new(),
            next_buffer_id: 1,
            next_address: BASE_ADDRESS,
            memory_budget: None,
            allocated_bytes: 0,
            allocator_fences: Vec::new(),
            pending_allocator: None,
            recording: None,
            submitted: None,
            last_frame: Vec::new(),
            presented_frames: 0,
            fence_waits: Vec::new(),
            stale_destroys: 0,
        }
    }

    /// Limit the total bytes of live buffers
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Shared handle to the fence timeline, for completing work from tests
    pub fn fence(&self) -> FenceTimeline {
        self.fence.clone()
    }

    /// Complete every fence signaled so far
    pub fn complete_all(&self) {
        self.fence.complete(self.last_signaled);
    }

    /// Most recently signaled fence value
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    /// Fence values the CPU actually had to block on, in order
    pub fn fence_waits(&self) -> &[u64] {
        &self.fence_waits
    }

    /// Contents of a live buffer
    pub fn read_buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|buffer| buffer.bytes.as_slice())
    }

    /// Whether `id` is still allocated
    pub fn is_live(&self, id: BufferId) -> bool {
        self.buffers.contains_key(&id)
    }

    /// Number of live buffers
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of `destroy_buffer` calls on ids that were not live
    pub fn stale_destroy_count(&self) -> usize {
        self.stale_destroys
    }

    /// Total bytes in live buffers
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Draws recorded in the last presented frame
    pub fn last_frame_draws(&self) -> &[DrawCall] {
        &self.last_frame
    }

    /// Number of presented frames
    pub fn presented_frames(&self) -> u64 {
        self.presented_frames
    }

    fn recording_mut(&mut self, call: &'static str) -> GpuResult<&mut RecordingState> {
        self.recording.as_mut().ok_or_else(|| gpu_error!(call, E_FAIL))
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(SubmissionMode::Immediate)
    }
}

impl GpuCommandSink for SoftwareDevice {
    fn begin_frame(&mut self, allocator: CommandAllocatorId) -> GpuResult<()> {
        if self.recording.is_some() {
            return Err(GpuError::InvalidOperation {
                reason: "begin_frame called while a frame is already recording".to_string(),
            });
        }
        if allocator.0 as usize >= self.allocator_fences.len() {
            return Err(gpu_error!("begin_frame", E_INVALIDARG));
        }

        self.recording = Some(RecordingState {
            allocator: Some(allocator),
            ..RecordingState::default()
        });
        Ok(())
    }

    fn bind_constant_buffer(&mut self, slot: RootSlot, address: GpuAddress) {
        match self.recording.as_mut() {
            Some(recording) => recording.bound[slot as usize] = Some(address),
            None => log::warn!("bind_constant_buffer({slot:?}) outside of a frame ignored"),
        }
    }

    fn draw_indexed(&mut self, mesh: MeshHandle, material: MaterialHandle, index_count: u32) {
        match self.recording.as_mut() {
            Some(recording) => {
                let draw = DrawCall {
                    mesh,
                    material,
                    index_count,
                    object_address: recording.bound[RootSlot::Object as usize],
                    pass_address: recording.bound[RootSlot::Pass as usize],
                };
                recording.draws.push(draw);
            }
            None => log::warn!("draw_indexed outside of a frame ignored"),
        }
    }

    fn end_frame(&mut self) -> GpuResult<()> {
        let recording = self.recording_mut("end_frame")?;
        let draws = std::mem::take(&mut recording.draws);
        let allocator = recording.allocator;
        self.recording = None;

        self.pending_allocator = allocator;
        self.submitted = Some(draws);
        Ok(())
    }

    fn present(&mut self) -> GpuResult<()> {
        let draws = self.submitted.take().ok_or_else(|| gpu_error!("present", E_FAIL))?;
        self.last_frame = draws;
        self.presented_frames += 1;
        Ok(())
    }
}

impl GpuDevice for SoftwareDevice {
    fn create_upload_buffer(&mut self, byte_size: u64) -> GpuResult<BufferAllocation> {
        if byte_size == 0 {
            return Err(GpuError::InvalidOperation {
                reason: "zero-sized buffer".to_string(),
            });
        }
        if let Some(budget) = self.memory_budget {
            if self.allocated_bytes + byte_size > budget {
                log::warn!(
                    "Allocation of {byte_size} bytes exceeds budget ({} of {budget} in use)",
                    self.allocated_bytes
                );
                return Err(gpu_error!("create_upload_buffer", E_OUTOFMEMORY));
            }
        }
        let len = usize::try_from(byte_size).map_err(|_| gpu_error!("create_upload_buffer", E_OUTOFMEMORY))?;

        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;

        let gpu_address = GpuAddress(self.next_address);
        let span = byte_size.div_ceil(PLACEMENT_ALIGNMENT) * PLACEMENT_ALIGNMENT;
        self.next_address += span;

        self.buffers.insert(id, SoftBuffer { bytes: vec![0; len], gpu_address });
        self.allocated_bytes += byte_size;

        Ok(BufferAllocation { id, gpu_address, byte_size })
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            self.allocated_bytes -= buffer.bytes.len() as u64;
            log::trace!("Destroyed buffer {:?} at {}", id, buffer.gpu_address);
        } else {
            log::warn!("Destroy of buffer {id:?}, which is not live");
            self.stale_destroys += 1;
        }
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> GpuResult<()> {
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| gpu_error!("write_buffer", E_INVALIDARG))?;

        let start = usize::try_from(offset).map_err(|_| gpu_error!("write_buffer", E_INVALIDARG))?;
        let end = start + data.len();
        if end > buffer.bytes.len() {
            return Err(GpuError::InvalidOperation {
                reason: format!(
                    "write of {} bytes at offset {} overflows buffer of {} bytes",
                    data.len(),
                    offset,
                    buffer.bytes.len()
                ),
            });
        }

        buffer.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_command_allocator(&mut self) -> GpuResult<CommandAllocatorId> {
        let id = u32::try_from(self.allocator_fences.len())
            .map_err(|_| gpu_error!("create_command_allocator", E_FAIL))?;
        self.allocator_fences.push(0);
        Ok(CommandAllocatorId(id))
    }

    fn reset_command_allocator(&mut self, allocator: CommandAllocatorId) -> GpuResult<()> {
        let required = *self
            .allocator_fences
            .get(allocator.0 as usize)
            .ok_or_else(|| gpu_error!("reset_command_allocator", E_INVALIDARG))?;

        // Resetting memory the GPU may still be executing from is a device error.
        if self.fence.completed() < required {
            return Err(gpu_error!("reset_command_allocator", E_FAIL));
        }
        Ok(())
    }

    fn signal_fence(&mut self) -> GpuResult<u64> {
        self.last_signaled += 1;
        let value = self.last_signaled;

        if let Some(allocator) = self.pending_allocator.take() {
            self.allocator_fences[allocator.0 as usize] = value;
        }
        if self.mode == SubmissionMode::Immediate {
            self.fence.complete(value);
        }
        Ok(value)
    }

    fn completed_fence_value(&self) -> u64 {
        self.fence.completed()
    }

    fn wait_for_fence(&mut self, value: u64) -> GpuResult<()> {
        if value > self.last_signaled {
            // Nothing will ever complete this value.
            return Err(GpuError::InvalidOperation {
                reason: format!("wait on fence {value} which was never signaled (last {})", self.last_signaled),
            });
        }
        if self.fence.completed() < value {
            self.fence_waits.push(value);
            self.fence.wait_for(value);
        }
        Ok(())
    }
}
