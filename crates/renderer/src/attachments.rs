//! Per-frame attachment configuration.
//!
//! Attachments are never cached. Each frame derives them from the current
//! sample count, formats and target views, so toggling MSAA at runtime can
//! never leave a stale resolve target behind.

use ash::vk;
use vkframe_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};

/// Format and sampling state the attachments depend on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttachmentState {
    pub extent: vk::Extent2D,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub clear_color: [f32; 4],
}

impl AttachmentState {
    #[inline]
    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }
}

/// Views backing one frame's attachments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentViews {
    /// The acquired swapchain image.
    pub swapchain: vk::ImageView,
    /// Multisample color target. Present only while rendering with more
    /// than one sample.
    pub msaa: Option<vk::ImageView>,
    pub depth: Option<vk::ImageView>,
}

/// Scene pass: clears color and depth.
///
/// With multisampling the scene renders into the MSAA target and resolves
/// into the swapchain view; the multisampled contents are not kept.
pub fn scene_attachments(state: &AttachmentState, views: &AttachmentViews) -> RenderingConfig {
    let color = match views.msaa {
        Some(msaa) if state.is_multisampled() => ColorAttachment::new(msaa, state.color_format)
            .dont_store()
            .resolve_to(views.swapchain),
        _ => ColorAttachment::new(views.swapchain, state.color_format),
    }
    .with_clear_color(state.clear_color);

    let config = RenderingConfig::new(state.extent).with_color_attachment(color);
    match views.depth {
        Some(depth) => config.with_depth_attachment(DepthAttachment::new(depth, state.depth_format)),
        None => config,
    }
}

/// Overlay pass: loads the resolved swapchain image and draws on top.
pub fn overlay_attachments(state: &AttachmentState, views: &AttachmentViews) -> RenderingConfig {
    RenderingConfig::new(state.extent)
        .with_color_attachment(ColorAttachment::new(views.swapchain, state.color_format).load())
}
