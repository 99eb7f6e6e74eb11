//! Frame scheduling on top of the Vulkan wrappers.
//!
//! [`Renderer`] drives one [`Demo`] through init, prepare, update, render
//! and destroy against a [`FrameBackend`]. [`VulkanBackend`] is the real
//! backend; tests substitute an allocation-tracking double.

pub mod attachments;
pub mod backend;
pub mod demo;
pub mod frame;
pub mod frame_manager;
pub mod overlay;
pub mod renderer;
pub mod stats;
pub mod targets;
pub mod vulkan;

#[cfg(test)]
mod mock;

pub use backend::FrameBackend;
pub use demo::{Demo, FrameContext, RenderSettings};
pub use overlay::MetricsOverlay;
pub use renderer::{FrameOutcome, Renderer, RendererOptions, ResizeOutcome};
pub use stats::FrameStats;
pub use vulkan::VulkanBackend;

pub use vkframe_rhi::sync::MAX_FRAMES_IN_FLIGHT;
