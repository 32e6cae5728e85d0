//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU satisfies the feature and queue requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Swapchain creation or recreation error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Buffer misuse (zero size, out-of-range write, unmapped memory)
    #[error("Buffer error: {0}")]
    BufferError(String),
}

impl RhiError {
    /// Returns the native Vulkan result code, if this error carries one.
    pub fn vk_result(&self) -> Option<ash::vk::Result> {
        match self {
            RhiError::VulkanError(result) => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
