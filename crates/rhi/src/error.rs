//! RHI error types.
//!
//! Only fatal conditions live here. Out-of-date swapchains, suboptimal
//! presents and unavailable timestamp queries are reported through ordinary
//! return values by the types that produce them.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call returned a non-success code outside the expected
    /// transient set.
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Buffer or texture creation was asked for something invalid, such as a
    /// zero-sized image.
    #[error("Resource error: {0}")]
    ResourceError(String),

    /// The ImGui overlay renderer failed to build or record.
    #[error("Overlay error: {0}")]
    OverlayError(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Turns a raw result code into an error unless it is `SUCCESS`.
///
/// `ash` already does this for most entry points; this covers the few calls
/// that hand back a bare `vk::Result`.
pub fn check(result: vk::Result) -> RhiResult<()> {
    match result {
        vk::Result::SUCCESS => Ok(()),
        other => Err(RhiError::VulkanError(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_success_through() {
        assert!(check(vk::Result::SUCCESS).is_ok());
    }

    #[test]
    fn check_wraps_failure_codes() {
        let err = check(vk::Result::ERROR_DEVICE_LOST).unwrap_err();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
