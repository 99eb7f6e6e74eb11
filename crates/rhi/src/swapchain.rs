//! Swapchain manager.
//!
//! Owns the presentable images and one view per image. The swapchain is
//! never patched in place: [`Swapchain::recreate`] rebuilds images and views
//! wholesale, keeping the negotiated format, present mode and image count
//! and changing only the extent.
//!
//! Out-of-date and suboptimal results are not errors here. Acquire reports
//! [`AcquiredImage::OutOfDate`] and present reports a [`PresentStatus`]; the
//! frame scheduler turns both into a resize.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::sync::MAX_FRAMES_IN_FLIGHT;

/// Fewer images than this let the present engine stall the frame loop.
pub const PREFERRED_MIN_IMAGES: u32 = 3;

/// What the caller asks of a new swapchain.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    /// Window size, used only when the surface leaves its extent undefined.
    pub extent: vk::Extent2D,
    /// Preferred present mode. FIFO is used when the surface lacks it.
    pub present_mode: vk::PresentModeKHR,
}

/// Result of acquiring the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquiredImage {
    Ready { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface. Nothing was signalled.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}

/// Surface properties queried for one physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    min_image_count: u32,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Negotiates format, present mode and image count with `surface` and
    /// builds the swapchain plus one view per image.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        desc: SwapchainDesc,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support = SwapchainSupport::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let mut swapchain = Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, desc.present_mode),
            min_image_count: determine_image_count(&support.capabilities),
            extent: choose_extent(&support.capabilities, desc.extent),
        };
        swapchain.build(swapchain.extent)?;
        Ok(swapchain)
    }

    /// The extent the surface currently wants, or `fallback` clamped to the
    /// surface limits when the surface leaves it to the application.
    ///
    /// A minimized window reports `0x0`.
    pub fn surface_extent(&self, fallback: vk::Extent2D) -> RhiResult<vk::Extent2D> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(
                    self.device.physical_device(),
                    self.surface,
                )?
        };
        Ok(choose_extent(&capabilities, fallback))
    }

    /// Rebuilds every image and view.
    ///
    /// Format, present mode and image count are preserved; the extent changes
    /// only when `extent` is given. The caller must have waited for the
    /// device to go idle. A zero extent is an error: callers check
    /// [`Swapchain::surface_extent`] first and defer.
    pub fn recreate(&mut self, extent: Option<vk::Extent2D>) -> RhiResult<()> {
        let extent = extent.unwrap_or(self.extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "cannot recreate swapchain at {}x{}",
                extent.width, extent.height
            )));
        }

        self.destroy_image_views();
        self.build(extent)?;
        info!(
            "Swapchain recreated: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(())
    }

    /// Creates the swapchain at `extent`, retiring the current handle if any.
    fn build(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(
                    self.device.physical_device(),
                    self.surface,
                )?
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(self.min_image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        check_image_count(self.images.len() as u32)?;
        self.image_views = create_image_views(&self.device, &self.images, self.surface_format.format)?;
        self.extent = extent;

        debug!(
            "Swapchain built: {}x{}, {:?}/{:?}, {:?}, {} images",
            extent.width,
            extent.height,
            self.surface_format.format,
            self.surface_format.color_space,
            self.present_mode,
            self.images.len()
        );
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore` once it is usable.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquiredImage> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` fires.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.surface_format.color_space
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None)
            };
            debug!("Swapchain destroyed");
        }
    }
}

/// Prefers `B8G8R8A8_SRGB` in the sRGB non-linear space, then
/// `B8G8R8A8_UNORM`, then whatever the surface lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("B8G8R8A8_SRGB unavailable, falling back to B8G8R8A8_UNORM");
        return format;
    }

    let first = formats.first().copied().unwrap_or(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    });
    warn!("Using first listed surface format {:?}", first.format);
    first
}

/// Uses `preferred` when the surface offers it. FIFO is always available.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        if preferred != vk::PresentModeKHR::FIFO {
            warn!("Present mode {:?} unavailable, using FIFO", preferred);
        }
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or `requested` clamped to the surface
/// limits when the current extent is the `u32::MAX` sentinel.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `max(min_image_count, 2) + 1`, capped by `max_image_count` when the
/// surface bounds it (a max of 0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count.max(2) + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Every frame slot must be able to hold its own image, so fewer images
/// than [`MAX_FRAMES_IN_FLIGHT`] is an error. Fewer than
/// [`PREFERRED_MIN_IMAGES`] only warns.
pub fn check_image_count(count: u32) -> RhiResult<()> {
    if (count as usize) < MAX_FRAMES_IN_FLIGHT {
        return Err(RhiError::SwapchainError(format!(
            "{} swapchain images cannot back {} frames in flight",
            count, MAX_FRAMES_IN_FLIGHT
        )));
    }
    if count < PREFERRED_MIN_IMAGES {
        warn!(
            "Only {} swapchain images, expected at least {}",
            count, PREFERRED_MIN_IMAGES
        );
    }
    Ok(())
}

/// Creates one single-mip color view per swapchain image.
pub(crate) fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    images
        .iter()
        .map(|&image| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            unsafe { device.handle().create_image_view(&create_info, None) }
                .map_err(RhiError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn prefers_srgb_format() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn format_falls_back_to_unorm_then_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );

        let formats = [surface_format(vk::Format::R16G16B16A16_SFLOAT)];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn present_mode_honors_available_preference() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_when_defined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(1920, 1080));
    }

    #[test]
    fn minimized_surface_reports_zero_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(0, 0),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(0, 0));
    }

    #[test]
    fn undefined_extent_clamps_request() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, extent(3000, 50)), extent(2000, 100));
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn image_count_prefers_three() {
        let count = |min, max| {
            determine_image_count(&vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            })
        };
        assert_eq!(count(1, 0), 3);
        assert_eq!(count(2, 8), 3);
        assert_eq!(count(3, 0), 4);
        // A bounded surface wins over the preference.
        assert_eq!(count(2, 2), 2);
    }

    #[test]
    fn image_count_must_cover_frames_in_flight() {
        assert!(matches!(
            check_image_count(1),
            Err(RhiError::SwapchainError(_))
        ));
        assert!(matches!(
            check_image_count(0),
            Err(RhiError::SwapchainError(_))
        ));
        // Two images still work, with a warning.
        assert!(check_image_count(MAX_FRAMES_IN_FLIGHT as u32).is_ok());
        assert!(check_image_count(PREFERRED_MIN_IMAGES).is_ok());
    }

    #[test]
    fn present_status_recreate_flag() {
        assert!(!PresentStatus::Optimal.needs_recreate());
        assert!(PresentStatus::Suboptimal.needs_recreate());
        assert!(PresentStatus::OutOfDate.needs_recreate());
    }

    #[test]
    fn support_requires_formats_and_modes() {
        let support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![surface_format(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![],
        };
        assert!(!support.is_adequate());
    }
}
