//! Error types for packed-sgemm.
//!
//! The GEMM hot path never reports errors: it runs under preconditions
//! established once per call. Errors come from the checked entry points in
//! [`crate::api`], from buffer allocation and from building a [`Context`].
//!
//! [`Context`]: crate::Context

use std::fmt;

use crate::arch::KernelVariant;

/// Errors that can occur while preparing or validating a GEMM call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GemmError {
    /// A packed panel or workspace could not be allocated.
    AllocationError {
        /// Number of `f32` elements requested.
        requested_floats: usize,
        /// Human-readable error message.
        message: String,
    },
    /// Operand shapes, strides, ranges or buffer sizes do not agree.
    ShapeError {
        /// Human-readable error message.
        message: String,
    },
    /// A packed A built for one tile shape was handed to a context running
    /// another.
    VariantMismatch {
        packed: KernelVariant,
        context: KernelVariant,
    },
    /// The worker pool could not be created.
    ThreadPoolError {
        /// Requested number of worker threads.
        threads: usize,
        /// Human-readable error message.
        message: String,
    },
}

impl fmt::Display for GemmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GemmError::AllocationError {
                requested_floats,
                message,
            } => write!(
                f,
                "Allocation of {} floats failed: {}",
                requested_floats, message
            ),
            GemmError::ShapeError { message } => write!(f, "Shape error: {}", message),
            GemmError::VariantMismatch { packed, context } => write!(
                f,
                "A was packed for {} but the context runs {}",
                packed, context
            ),
            GemmError::ThreadPoolError { threads, message } => {
                write!(f, "Thread pool error: {} ({} threads)", message, threads)
            }
        }
    }
}

impl std::error::Error for GemmError {}

/// Result type alias for packed-sgemm operations.
pub type Result<T> = std::result::Result<T, GemmError>;

pub fn allocation_error(requested_floats: usize, message: impl Into<String>) -> GemmError {
    GemmError::AllocationError {
        requested_floats,
        message: message.into(),
    }
}

pub fn shape_error(message: impl Into<String>) -> GemmError {
    GemmError::ShapeError {
        message: message.into(),
    }
}

pub fn thread_pool_error(threads: usize, message: impl Into<String>) -> GemmError {
    GemmError::ThreadPoolError {
        threads,
        message: message.into(),
    }
}
