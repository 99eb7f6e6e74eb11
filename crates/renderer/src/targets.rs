//! Extent-dependent render targets.
//!
//! The depth target and, when multisampling, the MSAA color target are
//! sized to the swapchain and rebuilt wholesale on every resize or sample
//! count change. Both are moved into their attachment layout once at
//! creation and stay there.

use std::sync::Arc;

use ash::vk;
use tracing::debug;
use vkframe_rhi::command::aspect_for_format;
use vkframe_rhi::device::Device;
use vkframe_rhi::texture::{Texture, TextureDesc};
use vkframe_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
];

/// First candidate `supports` accepts.
pub fn pick_depth_format(
    candidates: &[vk::Format],
    supports: impl Fn(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| supports(format))
}

/// The preferred depth format usable as an optimally tiled attachment.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .ok_or_else(|| RhiError::ResourceError("no supported depth format".to_string()))
}

pub fn depth_target_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> TextureDesc {
    TextureDesc::new(
        extent,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        aspect_for_format(format),
    )
    .with_samples(samples)
}

/// Multisampled color is resolved every frame and never read back.
pub fn msaa_target_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> TextureDesc {
    TextureDesc::new(
        extent,
        format,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
        vk::ImageAspectFlags::COLOR,
    )
    .with_samples(samples)
}

pub struct RenderTargets {
    depth: Texture,
    msaa: Option<Texture>,
    samples: vk::SampleCountFlags,
}

impl RenderTargets {
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let depth = Texture::render_target(
            device.clone(),
            depth_target_desc(extent, depth_format, samples),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        let msaa = if samples != vk::SampleCountFlags::TYPE_1 {
            Some(Texture::render_target(
                device,
                msaa_target_desc(extent, color_format, samples),
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )?)
        } else {
            None
        };

        debug!(
            "Render targets created: {}x{}, {:?}, msaa: {}",
            extent.width,
            extent.height,
            samples,
            msaa.is_some()
        );
        Ok(Self {
            depth,
            msaa,
            samples,
        })
    }

    #[inline]
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view()
    }

    pub fn msaa_view(&self) -> Option<vk::ImageView> {
        self.msaa.as_ref().map(Texture::view)
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn prefers_packed_depth_stencil() {
        assert_eq!(
            pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| true),
            Some(vk::Format::D32_SFLOAT_S8_UINT)
        );
        assert_eq!(
            pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| f == vk::Format::D32_SFLOAT),
            Some(vk::Format::D32_SFLOAT)
        );
        assert_eq!(pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| false), None);
    }

    #[test]
    fn depth_desc_covers_depth_and_stencil() {
        let desc = depth_target_desc(
            EXTENT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(
            desc.aspect,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
    }

    #[test]
    fn msaa_desc_is_transient_color() {
        let desc = msaa_target_desc(EXTENT, vk::Format::B8G8R8A8_SRGB, vk::SampleCountFlags::TYPE_8);
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
        assert_eq!(desc.extent, EXTENT);
    }
}
