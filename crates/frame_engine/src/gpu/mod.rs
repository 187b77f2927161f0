//! GPU abstraction
//!
//! The engine never talks to a graphics API directly. It records work through
//! [`GpuCommandSink`] and manages memory and fences through [`GpuDevice`].
//! [`SoftwareDevice`] implements both in-process so the frame loop can run
//! (and be tested) without a GPU.

mod device;
mod error;
mod fence;
mod software;

pub use device::{
    BufferAllocation, BufferId, CommandAllocatorId, GpuAddress, GpuCommandSink, GpuDevice, RootSlot,
};
pub use error::{GpuError, GpuResult, StatusCode, E_FAIL, E_INVALIDARG, E_OUTOFMEMORY};
pub use fence::FenceTimeline;
pub use software::{DrawCall, SoftwareDevice, SubmissionMode};
