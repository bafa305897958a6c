//! Errors from the Vulkan layer.

use thiserror::Error;
use toybox_core::FatalError;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("vulkan call failed: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader library could not be opened.
    #[error("vulkan loader: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("gpu memory: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("surface: {0}")]
    SurfaceError(String),

    /// A handle or argument that breaks a wrapper's contract, such as an
    /// out-of-range buffer write.
    #[error("invalid use: {0}")]
    InvalidHandle(String),

    #[error("pipeline: {0}")]
    PipelineError(String),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl RhiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RhiError::Fatal(_))
    }

    /// Reports a non-fatal error as fatal under `condition`; fatal errors
    /// pass through untouched. For failures with no recovery path, such as
    /// a swapchain that could not be rebuilt.
    #[track_caller]
    pub fn into_fatal(self, condition: &str) -> FatalError {
        match self {
            RhiError::Fatal(fatal) => fatal,
            other => {
                let caller = std::panic::Location::caller();
                FatalError::reported(
                    toybox_core::Location::new(caller.file(), caller.line()),
                    condition,
                    other.to_string(),
                )
            }
        }
    }
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
