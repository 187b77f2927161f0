//! GPU error taxonomy
//!
//! Every variant here is fatal for the frame loop: callers propagate with `?`
//! and the process boundary reports the diagnostic.

/// Raw status code returned by a failing device call
pub type StatusCode = i32;

/// Status code for allocation failures
pub const E_OUTOFMEMORY: StatusCode = 0x8007_000E_u32 as i32;

/// Generic failure status code
pub const E_FAIL: StatusCode = 0x8000_4005_u32 as i32;

/// Status code for use of a destroyed or unknown object
pub const E_INVALIDARG: StatusCode = 0x8007_0057_u32 as i32;

/// Errors raised by GPU device calls
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// A device call failed; carries the call site for diagnostics
    #[error("{call} failed with code {code:#010x} at {file}:{line}")]
    CallFailed {
        /// Name of the failing call
        call: &'static str,
        /// Raw status code
        code: StatusCode,
        /// Source file of the call site
        file: &'static str,
        /// Source line of the call site
        line: u32,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

impl GpuError {
    /// Status code of a failed device call
    pub const fn code(&self) -> Option<StatusCode> {
        match self {
            Self::CallFailed { code, .. } => Some(*code),
            Self::InvalidOperation { .. } => None,
        }
    }

    /// Whether the device ran out of memory
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.code(), Some(E_OUTOFMEMORY))
    }
}

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Build a [`GpuError::CallFailed`] tagged with the current file and line
///
/// ```
/// use frame_engine::gpu_error;
/// use frame_engine::gpu::{GpuError, E_INVALIDARG};
///
/// let err = gpu_error!("write_buffer", E_INVALIDARG);
/// assert!(matches!(err, GpuError::CallFailed { call: "write_buffer", .. }));
/// ```
#[macro_export]
macro_rules! gpu_error {
    ($call:expr, $code:expr) => {
        $crate::gpu::GpuError::CallFailed {
            call: $call,
            code: $code,
            file: file!(),
            line: line!(),
        }
    };
}
