//! Dynamic rendering attachment descriptions.
//!
//! An attachment is a (view, format, load op, store op, clear value,
//! optional resolve target) tuple. These values are cheap and meant to be
//! rebuilt every frame from current state, then turned into a
//! [`RenderingInfoBundle`] that owns the `vk::RenderingAttachmentInfo`
//! array the `vk::RenderingInfo` points into.
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::command::CommandBuffer;
//! use vkframe_rhi::rendering::{ColorAttachment, RenderingConfig};
//!
//! # fn example(view: vk::ImageView, cmd: &CommandBuffer) {
//! let config = RenderingConfig::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color_attachment(
//!         ColorAttachment::new(view, vk::Format::B8G8R8A8_SRGB).with_clear_color([0.1, 0.1, 0.1, 1.0]),
//!     );
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle.info());
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

use crate::command::aspect_for_format;

/// Where a multisampled color attachment resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveTarget {
    pub view: vk::ImageView,
    pub mode: vk::ResolveModeFlags,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
    pub resolve: Option<ResolveTarget>,
}

impl ColorAttachment {
    /// Clear-and-store attachment, cleared to opaque black.
    pub fn new(view: vk::ImageView, format: vk::Format) -> Self {
        Self {
            view,
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            resolve: None,
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Keeps the existing contents instead of clearing.
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    pub fn dont_store(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::DONT_CARE;
        self
    }

    /// Resolves into `view` by averaging samples.
    pub fn resolve_to(mut self, view: vk::ImageView) -> Self {
        self.resolve = Some(ResolveTarget {
            view,
            mode: vk::ResolveModeFlags::AVERAGE,
        });
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let mut info = vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });

        if let Some(resolve) = self.resolve {
            info = info
                .resolve_image_view(resolve.view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .resolve_mode(resolve.mode);
        }
        info
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachment {
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

impl DepthAttachment {
    /// Cleared to depth 1.0 and stencil 0; contents are not kept.
    pub fn new(view: vk::ImageView, format: vk::Format) -> Self {
        Self {
            view,
            format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }

    pub fn has_stencil(&self) -> bool {
        aspect_for_format(self.format).contains(vk::ImageAspectFlags::STENCIL)
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: self.clear_stencil,
                },
            })
    }
}

/// Everything one dynamic-rendering scope needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderingConfig {
    pub extent: vk::Extent2D,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    pub fn color_formats(&self) -> Vec<vk::Format> {
        self.color_attachments.iter().map(|a| a.format).collect()
    }

    pub fn build(&self) -> RenderingInfoBundle {
        let depth = self
            .depth_attachment
            .as_ref()
            .map(|d| d.to_rendering_attachment_info());
        let stencil = self
            .depth_attachment
            .as_ref()
            .filter(|d| d.has_stencil())
            .map(|d| d.to_rendering_attachment_info());

        RenderingInfoBundle {
            render_area: vk::Rect2D::default().extent(self.extent),
            color_attachments: self
                .color_attachments
                .iter()
                .map(|a| a.to_rendering_attachment_info())
                .collect(),
            depth_attachment: depth,
            stencil_attachment: stencil,
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` borrows.
pub struct RenderingInfoBundle {
    render_area: vk::Rect2D,
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        if let Some(depth) = &self.depth_attachment {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = &self.stencil_attachment {
            info = info.stencil_attachment(stencil);
        }
        info
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn color_defaults_clear_and_store() {
        let a = ColorAttachment::new(view(1), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert!(a.resolve.is_none());
        assert_eq!(a.load().load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn resolve_averages_into_target() {
        let info = ColorAttachment::new(view(1), vk::Format::B8G8R8A8_SRGB)
            .resolve_to(view(2))
            .to_rendering_attachment_info();
        assert_eq!(info.resolve_image_view, view(2));
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::AVERAGE);
        assert_eq!(
            info.resolve_image_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn clear_color_reaches_info() {
        let info = ColorAttachment::new(view(1), vk::Format::B8G8R8A8_SRGB)
            .with_clear_color([0.2, 0.3, 0.4, 1.0])
            .to_rendering_attachment_info();
        let color = unsafe { info.clear_value.color.float32 };
        assert_eq!(color, [0.2, 0.3, 0.4, 1.0]);
    }

    #[test]
    fn stencil_formats_bind_stencil_attachment() {
        let extent = vk::Extent2D {
            width: 64,
            height: 32,
        };
        let with_stencil = RenderingConfig::new(extent)
            .with_color_attachment(ColorAttachment::new(view(1), vk::Format::B8G8R8A8_SRGB))
            .with_depth_attachment(DepthAttachment::new(
                view(3),
                vk::Format::D32_SFLOAT_S8_UINT,
            ))
            .build();
        let info = with_stencil.info();
        assert_eq!(info.color_attachment_count, 1);
        assert!(!info.p_depth_attachment.is_null());
        assert!(!info.p_stencil_attachment.is_null());
        assert_eq!(info.render_area.extent, extent);

        let depth_only = RenderingConfig::new(extent)
            .with_depth_attachment(DepthAttachment::new(view(3), vk::Format::D32_SFLOAT))
            .build();
        assert!(depth_only.info().p_stencil_attachment.is_null());
    }

    #[test]
    fn color_formats_in_order() {
        let config = RenderingConfig::new(vk::Extent2D::default())
            .with_color_attachment(ColorAttachment::new(view(1), vk::Format::B8G8R8A8_SRGB))
            .with_color_attachment(ColorAttachment::new(view(2), vk::Format::R16G16B16A16_SFLOAT));
        assert_eq!(
            config.color_formats(),
            [vk::Format::B8G8R8A8_SRGB, vk::Format::R16G16B16A16_SFLOAT]
        );
    }
}
