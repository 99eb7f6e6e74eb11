//! Images with one allocation, one view and an optional sampler.
//!
//! Render targets (depth, multisample color, offscreen color) and sampled
//! textures share [`Texture`]. Sampled textures are uploaded from RGBA8
//! pixels through a staging buffer, then the mip chain is generated on the
//! GPU with successive linear blits.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Format of textures uploaded with [`Texture::from_rgba8`].
pub const RGBA8_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub samples: vk::SampleCountFlags,
}

impl TextureDesc {
    /// Single-mip, single-sample target.
    pub fn new(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            extent,
            mip_levels: 1,
            format,
            usage,
            aspect,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

/// Sampler parameters kept so the sampler can be rebuilt with a new LOD.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub address_mode: vk::SamplerAddressMode,
    pub min_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::REPEAT,
            min_lod: 0.0,
        }
    }
}

pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    sampler: vk::Sampler,
    sampler_desc: SamplerDesc,
    desc: TextureDesc,
}

impl Texture {
    /// Creates the image, binds fresh device-local memory and creates a view
    /// covering every mip level. The image starts in `UNDEFINED`.
    pub fn allocate(device: Arc<Device>, desc: TextureDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::ResourceError(format!(
                "cannot allocate a {}x{} image",
                desc.extent.width, desc.extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        // From here on Drop releases whatever was created.
        let mut texture = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            sampler: vk::Sampler::null(),
            sampler_desc: SamplerDesc::default(),
            desc,
        };

        if let Some(allocation) = &texture.allocation {
            unsafe {
                texture.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(desc.aspect)
                    .level_count(desc.mip_levels)
                    .layer_count(1),
            );
        texture.view = unsafe { texture.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Allocated {:?} image {}x{} ({} mips, {:?})",
            desc.format, desc.extent.width, desc.extent.height, desc.mip_levels, desc.samples
        );
        Ok(texture)
    }

    /// Allocates a render target and moves it into `layout` with a one-shot
    /// command buffer, so frames never see it in `UNDEFINED`.
    pub fn render_target(
        device: Arc<Device>,
        desc: TextureDesc,
        layout: vk::ImageLayout,
    ) -> RhiResult<Self> {
        let texture = Self::allocate(device.clone(), desc)?;
        device.one_shot(|cmd| {
            cmd.transition_image_layout(
                texture.image,
                desc.format,
                vk::ImageLayout::UNDEFINED,
                layout,
                0,
                desc.mip_levels,
            )
        })?;
        Ok(texture)
    }

    /// Uploads tightly packed RGBA8 pixels, generates the full mip chain and
    /// creates a sampler.
    pub fn from_rgba8(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
        sampler: SamplerDesc,
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::ResourceError(format!(
                "{}x{} RGBA8 image needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let extent = vk::Extent2D { width, height };
        let desc = TextureDesc::new(
            extent,
            RGBA8_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )
        .with_mip_levels(mip_levels_for(extent));

        let mut texture = Self::allocate(device.clone(), desc)?;
        let staging = Buffer::with_data(device.clone(), BufferUsage::Staging, pixels)?;

        device.one_shot(|cmd| {
            cmd.transition_image_layout(
                texture.image,
                desc.format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                0,
                desc.mip_levels,
            )?;
            cmd.copy_buffer_to_image(staging.handle(), texture.image, extent);
            texture.record_mip_chain(cmd)
        })?;

        texture.create_sampler(sampler)?;
        debug!("Uploaded {}x{} texture with {} mips", width, height, desc.mip_levels);
        Ok(texture)
    }

    /// Blits level `i - 1` into level `i` for every level, leaving the whole
    /// image in `SHADER_READ_ONLY_OPTIMAL`.
    fn record_mip_chain(&self, cmd: &CommandBuffer) -> RhiResult<()> {
        let format = self.desc.format;
        let mut src_extent = self.desc.extent;

        for level in 1..self.desc.mip_levels {
            let dst_extent = mip_extent(self.desc.extent, level);
            cmd.transition_image_layout(
                self.image,
                format,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                level - 1,
                1,
            )?;
            cmd.blit_mip(self.image, level - 1, src_extent, dst_extent);
            cmd.transition_image_layout(
                self.image,
                format,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                level - 1,
                1,
            )?;
            src_extent = dst_extent;
        }

        cmd.transition_image_layout(
            self.image,
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            self.desc.mip_levels - 1,
            1,
        )
    }

    /// Creates the sampler: linear filtering on all axes, anisotropy at the
    /// device maximum when enabled, `min_lod` clamped to the mip range.
    pub fn create_sampler(&mut self, desc: SamplerDesc) -> RhiResult<()> {
        let anisotropy = self.device.anisotropy_enabled();
        let max_anisotropy = self.device.info().properties.limits.max_sampler_anisotropy;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { max_anisotropy } else { 1.0 })
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(clamp_min_lod(desc.min_lod, self.desc.mip_levels))
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe { self.device.handle().create_sampler(&sampler_info, None)? };
        self.destroy_sampler();
        self.sampler = sampler;
        self.sampler_desc = desc;
        Ok(())
    }

    /// Rebuilds the sampler with a new minimum LOD.
    ///
    /// The old sampler is destroyed immediately; the caller must have waited
    /// for the device to go idle.
    pub fn recreate_sampler(&mut self, min_lod: f32) -> RhiResult<()> {
        let desc = SamplerDesc {
            min_lod,
            ..self.sampler_desc
        };
        self.create_sampler(desc)
    }

    fn destroy_sampler(&mut self) {
        if self.sampler != vk::Sampler::null() {
            unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
            self.sampler = vk::Sampler::null();
        }
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Null until a sampler has been created.
    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    pub fn min_lod(&self) -> f32 {
        clamp_min_lod(self.sampler_desc.min_lod, self.desc.mip_levels)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy_sampler();
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
        }
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            error!("Failed to free texture allocation: {}", e);
        }
        unsafe { self.device.handle().destroy_image(self.image, None) };
    }
}

/// `floor(log2(max(width, height))) + 1`.
pub fn mip_levels_for(extent: vk::Extent2D) -> u32 {
    let largest = extent.width.max(extent.height).max(1);
    largest.ilog2() + 1
}

/// Extent of mip `level`, never smaller than 1x1.
pub fn mip_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (base.width >> level).max(1),
        height: (base.height >> level).max(1),
    }
}

/// Clamps a requested minimum LOD into `[0, mip_levels]`.
pub fn clamp_min_lod(min_lod: f32, mip_levels: u32) -> f32 {
    if min_lod.is_nan() {
        return 0.0;
    }
    min_lod.clamp(0.0, mip_levels as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn mip_count_follows_largest_side() {
        assert_eq!(mip_levels_for(extent(1, 1)), 1);
        assert_eq!(mip_levels_for(extent(256, 256)), 9);
        assert_eq!(mip_levels_for(extent(512, 300)), 10);
        assert_eq!(mip_levels_for(extent(300, 1024)), 11);
        assert_eq!(mip_levels_for(extent(255, 1)), 8);
    }

    #[test]
    fn mip_extent_halves_down_to_one() {
        let base = extent(512, 128);
        assert_eq!(mip_extent(base, 0), base);
        assert_eq!(mip_extent(base, 1), extent(256, 64));
        assert_eq!(mip_extent(base, 7), extent(4, 1));
        assert_eq!(mip_extent(base, 9), extent(1, 1));
    }

    #[test]
    fn min_lod_is_clamped_to_mip_range() {
        assert_eq!(clamp_min_lod(-2.0, 9), 0.0);
        assert_eq!(clamp_min_lod(3.5, 9), 3.5);
        assert_eq!(clamp_min_lod(12.0, 9), 9.0);
        assert_eq!(clamp_min_lod(f32::NAN, 9), 0.0);
    }

    #[test]
    fn desc_defaults_to_single_sample() {
        let desc = TextureDesc::new(
            extent(4, 4),
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        );
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(
            desc.with_samples(vk::SampleCountFlags::TYPE_8).samples,
            vk::SampleCountFlags::TYPE_8
        );
    }

    #[test]
    fn sampler_defaults_to_repeat() {
        let desc = SamplerDesc::default();
        assert_eq!(desc.address_mode, vk::SamplerAddressMode::REPEAT);
        assert_eq!(desc.min_lod, 0.0);
    }
}
