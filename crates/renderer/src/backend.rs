//! The GPU operations the frame scheduler drives.
//!
//! [`Renderer`](crate::Renderer) owns the ordering of a frame; a backend owns
//! the objects. Every method that takes a `slot` acts on that frame slot's
//! command buffer, semaphores, fence and timestamp queries.

use ash::vk;
use vkframe_rhi::RhiResult;
use vkframe_rhi::query::GpuTimestamps;
use vkframe_rhi::rendering::RenderingConfig;
use vkframe_rhi::swapchain::{AcquiredImage, PresentStatus};

use crate::attachments::AttachmentViews;

pub trait FrameBackend {
    /// Recording handle handed to demo callbacks.
    type Recorder;

    fn image_count(&self) -> u32;
    fn extent(&self) -> vk::Extent2D;
    fn color_format(&self) -> vk::Format;
    fn depth_format(&self) -> vk::Format;
    /// Highest sample count usable for both color and depth targets.
    fn max_samples(&self) -> vk::SampleCountFlags;

    /// Blocks until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquiredImage>;
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Resets and begins the slot's command buffer and writes the start
    /// timestamp.
    fn begin_commands(&mut self, slot: usize) -> RhiResult<()>;
    fn transition_image(
        &mut self,
        slot: usize,
        image_index: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()>;
    fn attachment_views(&self, image_index: u32) -> RhiResult<AttachmentViews>;
    fn recorder(&self, slot: usize) -> &Self::Recorder;
    fn begin_rendering(&mut self, slot: usize, config: &RenderingConfig);
    fn end_rendering(&mut self, slot: usize);
    /// Writes the end timestamp and ends the command buffer.
    fn end_commands(&mut self, slot: usize) -> RhiResult<()>;

    fn submit(&mut self, slot: usize) -> RhiResult<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentStatus>;
    fn read_gpu_time(&mut self, slot: usize) -> RhiResult<GpuTimestamps>;

    /// Extent the surface wants right now. `0x0` while minimized.
    fn surface_extent(&self) -> RhiResult<vk::Extent2D>;
    fn wait_idle(&mut self) -> RhiResult<()>;
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    /// (Re)creates the extent-dependent targets: depth, plus a multisample
    /// color target when `samples` is above one. Replaces existing ones.
    fn create_targets(&mut self, samples: vk::SampleCountFlags) -> RhiResult<()>;
    fn destroy_targets(&mut self);

    /// Releases every object the backend created for the frame loop. Called
    /// once, after a device-idle wait.
    fn destroy(&mut self);
}
