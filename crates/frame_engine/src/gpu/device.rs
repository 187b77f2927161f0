//! Device and command sink traits

use std::fmt;

use super::GpuResult;
use crate::assets::{MaterialHandle, MeshHandle};

/// Opaque identifier of a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Opaque identifier of a command allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandAllocatorId(pub u32);

/// GPU virtual address of buffer memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuAddress(pub u64);

impl GpuAddress {
    /// Address of no buffer
    pub const NULL: Self = Self(0);

    /// Address `bytes` past this one
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Display for GpuAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Result of a buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAllocation {
    /// Buffer identifier
    pub id: BufferId,
    /// Address of the first byte
    pub gpu_address: GpuAddress,
    /// Size in bytes
    pub byte_size: u64,
}

/// Root-signature slot a constant buffer is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootSlot {
    /// Per-object constants
    Object = 0,
    /// Per-pass constants
    Pass = 1,
    /// Per-material constants
    Material = 2,
    /// Light constants
    Light = 3,
    /// Screen-space widget constants
    Widget = 4,
    /// Particle emitter constants
    Particle = 5,
}

impl RootSlot {
    /// Number of root slots
    pub const COUNT: usize = 6;
}

/// Recording surface for one frame of GPU work
///
/// The engine only ever records in the order `begin_frame`, any number of
/// binds and draws, `end_frame`, `present`.
pub trait GpuCommandSink {
    /// Start recording into `allocator`
    fn begin_frame(&mut self, allocator: CommandAllocatorId) -> GpuResult<()>;

    /// Bind a constant buffer view at `address` to `slot`
    fn bind_constant_buffer(&mut self, slot: RootSlot, address: GpuAddress);

    /// Issue an indexed draw with the currently bound constants
    fn draw_indexed(&mut self, mesh: MeshHandle, material: MaterialHandle, index_count: u32);

    /// Close the command list and submit it to the queue
    fn end_frame(&mut self) -> GpuResult<()>;

    /// Present the back buffer
    fn present(&mut self) -> GpuResult<()>;
}

/// Memory, allocator and fence management on top of a command sink
pub trait GpuDevice: GpuCommandSink {
    /// Allocate a CPU-writable, GPU-readable buffer
    fn create_upload_buffer(&mut self, byte_size: u64) -> GpuResult<BufferAllocation>;

    /// Release a buffer. Its address range is never handed out again.
    fn destroy_buffer(&mut self, id: BufferId);

    /// Copy `data` into mapped buffer memory at `offset`
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> GpuResult<()>;

    /// Create a command allocator
    fn create_command_allocator(&mut self) -> GpuResult<CommandAllocatorId>;

    /// Reset an allocator; the GPU must have finished with its previous commands
    fn reset_command_allocator(&mut self, allocator: CommandAllocatorId) -> GpuResult<()>;

    /// Enqueue a fence signal after all submitted work and return its value
    fn signal_fence(&mut self) -> GpuResult<u64>;

    /// Highest fence value the GPU has completed
    fn completed_fence_value(&self) -> u64;

    /// Block the calling thread until the GPU completes `value`
    ///
    /// The wait is unbounded; a hung device hangs the caller.
    fn wait_for_fence(&mut self, value: u64) -> GpuResult<()>;
}
