//! # Per-frame GPU resources
//!
//! Constant-buffer payloads, the typed upload pool that holds them, and the
//! ring of frame slots that bounds how far the CPU may run ahead of the GPU.
//!
//! ```text
//! FrameResourceRing (N slots, round robin)
//!         └── FrameSlot
//!               ├── command allocator + fence value
//!               └── BufferMemoryPool<T> per BufferKind
//!                     (object, pass, light, material, widget, particle)
//! ```

mod buffer_pool;
mod constants;
mod frame_resource;

pub use buffer_pool::{constant_buffer_byte_size, BufferMemoryPool, CONSTANT_BUFFER_ALIGNMENT};
pub use constants::{
    LightConstants, MaterialConstants, ObjectConstants, ParticleConstants, PassConstants,
    WidgetConstants,
};
pub use frame_resource::{BufferKind, FrameResourceRing, FrameSlot, PoolConfig};
