//! Vulkan wrapper layer.
//!
//! Thin, owning wrappers over `ash` handles. Every wrapper destroys its
//! handle exactly once in `Drop`, and every wrapper holds an `Arc<Device>`
//! so the logical device outlives everything created from it.
//!
//! - [`instance`] / [`physical_device`] / [`device`]: the device context
//! - [`swapchain`]: presentable images and their recreation
//! - [`sync`] / [`command`] / [`query`]: per-frame recording primitives
//! - [`pipeline`] / [`shader`] / [`descriptor`]: draw configuration
//! - [`buffer`] / [`texture`]: single-allocation GPU resources
//! - [`vertex`]: the shared vertex layout
//! - [`rendering`]: dynamic-rendering attachment descriptions

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod query;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult, check};

pub use ash::vk;
