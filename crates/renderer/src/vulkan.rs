//! Vulkan implementation of [`FrameBackend`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};
use vkframe_core::{GraphicsConfig, PresentMode};
use vkframe_platform::{Surface, Window};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::query::GpuTimestamps;
use vkframe_rhi::rendering::RenderingConfig;
use vkframe_rhi::swapchain::{AcquiredImage, PresentStatus, Swapchain, SwapchainDesc};
use vkframe_rhi::{RhiError, RhiResult};

use crate::attachments::AttachmentViews;
use crate::backend::FrameBackend;
use crate::frame_manager::FrameManager;
use crate::targets::{RenderTargets, find_depth_format};

pub fn present_mode_for(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Owns the device context, the swapchain, the frame slots and the render
/// targets.
///
/// # Resource Destruction
///
/// Slots and targets go first, then the swapchain, the device, the surface
/// and finally the instance.
pub struct VulkanBackend {
    frames: FrameManager,
    targets: Option<RenderTargets>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
    depth_format: vk::Format,
    window_extent: vk::Extent2D,
}

impl VulkanBackend {
    pub fn new(window: &Window, app_name: &str, config: &GraphicsConfig) -> RhiResult<Self> {
        let window_extent = vk::Extent2D {
            width: window.width(),
            height: window.height(),
        };
        info!(
            "Initializing Vulkan backend ({}x{})",
            window_extent.width, window_extent.height
        );

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(app_name, &surface_extensions, config.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            SwapchainDesc {
                extent: window_extent,
                present_mode: present_mode_for(config.present_mode),
            },
        )?;
        let depth_format = find_depth_format(instance.handle(), device.physical_device())?;
        let frames = FrameManager::new(device.clone())?;

        info!(
            "Vulkan backend ready: {} images, {:?}, depth {:?}, max {:?}",
            swapchain.image_count(),
            swapchain.format(),
            depth_format,
            physical_device.max_usable_sample_count()
        );

        Ok(Self {
            frames,
            targets: None,
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            depth_format,
            window_extent,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Records the window size used when the surface leaves its extent to
    /// the application.
    pub fn set_window_extent(&mut self, width: u32, height: u32) {
        self.window_extent = vk::Extent2D { width, height };
    }

    fn swapchain_image(&self, image_index: u32) -> RhiResult<vk::Image> {
        self.swapchain.image(image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("no swapchain image {}", image_index))
        })
    }

    fn command_buffer(&self, slot: usize) -> &CommandBuffer {
        self.frames.frame(slot).command_buffer()
    }
}

impl FrameBackend for VulkanBackend {
    type Recorder = CommandBuffer;

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    fn max_samples(&self) -> vk::SampleCountFlags {
        self.device.info().max_usable_sample_count()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.frames.frame(slot).sync().in_flight().wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage> {
        let semaphore = self.frames.frame(slot).sync().image_available();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.frames.frame(slot).sync().in_flight().reset()
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frames.frame(slot);
        let cmd = frame.command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        frame.timestamps().begin(cmd);
        Ok(())
    }

    fn transition_image(
        &mut self,
        slot: usize,
        image_index: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        let image = self.swapchain_image(image_index)?;
        self.command_buffer(slot).transition_image_layout(
            image,
            self.swapchain.format(),
            old_layout,
            new_layout,
            0,
            1,
        )
    }

    fn attachment_views(&self, image_index: u32) -> RhiResult<AttachmentViews> {
        let swapchain = self.swapchain.image_view(image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("no swapchain view {}", image_index))
        })?;
        Ok(AttachmentViews {
            swapchain,
            msaa: self.targets.as_ref().and_then(RenderTargets::msaa_view),
            depth: self.targets.as_ref().map(RenderTargets::depth_view),
        })
    }

    fn recorder(&self, slot: usize) -> &CommandBuffer {
        self.command_buffer(slot)
    }

    fn begin_rendering(&mut self, slot: usize, config: &RenderingConfig) {
        let bundle = config.build();
        self.command_buffer(slot).begin_rendering(&bundle.info());
    }

    fn end_rendering(&mut self, slot: usize) {
        self.command_buffer(slot).end_rendering();
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frames.frame(slot);
        frame.timestamps().end(frame.command_buffer());
        frame.command_buffer().end()
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.frames.frame(slot);
        self.device.submit_frame(
            frame.command_buffer().handle(),
            frame.sync().image_available(),
            frame.sync().render_finished(),
            frame.sync().in_flight().handle(),
        )
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus> {
        let render_finished = self.frames.frame(slot).sync().render_finished();
        self.swapchain
            .present(self.device.queue(), image_index, render_finished)
    }

    fn read_gpu_time(&mut self, slot: usize) -> RhiResult<GpuTimestamps> {
        self.frames.frame(slot).timestamps().read()
    }

    fn surface_extent(&self) -> RhiResult<vk::Extent2D> {
        self.swapchain.surface_extent(self.window_extent)
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.swapchain.recreate(Some(extent))
    }

    fn create_targets(&mut self, samples: vk::SampleCountFlags) -> RhiResult<()> {
        // Old targets go before the new ones are allocated.
        self.targets = None;
        self.targets = Some(RenderTargets::new(
            Arc::clone(&*self.device),
            self.swapchain.extent(),
            self.swapchain.format(),
            self.depth_format,
            samples,
        )?);
        Ok(())
    }

    fn destroy_targets(&mut self) {
        if self.targets.take().is_some() {
            debug!("Render targets destroyed");
        }
    }

    fn destroy(&mut self) {
        self.frames.release();
        debug!("Frame slots released");
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during drop: {}", e);
        }

        self.frames.release();
        self.targets = None;

        if Arc::strong_count(&*self.device) > 2 {
            warn!(
                "{} device references still alive at backend teardown",
                Arc::strong_count(&*self.device) - 2
            );
        }

        // SAFETY: each field is dropped exactly once, here, in dependency
        // order. The swapchain holds the last other device reference.
        unsafe {
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
        info!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_modes_map_one_to_one() {
        assert_eq!(present_mode_for(PresentMode::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            present_mode_for(PresentMode::FifoRelaxed),
            vk::PresentModeKHR::FIFO_RELAXED
        );
        assert_eq!(
            present_mode_for(PresentMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode_for(PresentMode::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }
}
