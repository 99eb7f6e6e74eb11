//! Hooks a demo implements to plug into the frame loop.

use ash::vk;
use vkframe_rhi::RhiResult;
use vkframe_rhi::rendering::RenderingConfig;

use crate::backend::FrameBackend;
use crate::stats::FrameStats;

/// Settings a demo or the application may change at runtime.
///
/// Changes are not applied mid-frame. The renderer picks them up on the
/// next update tick, waits for the device to go idle and rebuilds what
/// depends on them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub samples: vk::SampleCountFlags,
    /// Minimum sampler LOD for demos that sample mipmapped textures.
    pub min_lod: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            min_lod: 0.0,
        }
    }
}

/// What a draw callback gets for one frame.
pub struct FrameContext<'a, R> {
    pub recorder: &'a R,
    pub slot: usize,
    pub image_index: u32,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    scene: RenderingConfig,
}

impl<'a, R> FrameContext<'a, R> {
    pub fn new(
        recorder: &'a R,
        slot: usize,
        image_index: u32,
        samples: vk::SampleCountFlags,
        scene: RenderingConfig,
    ) -> Self {
        Self {
            recorder,
            slot,
            image_index,
            extent: scene.extent,
            samples,
            scene,
        }
    }

    /// Attachments for the scene pass: clear color and depth, resolving when
    /// multisampled.
    #[inline]
    pub fn scene_attachments(&self) -> &RenderingConfig {
        &self.scene
    }
}

/// A demo driven by [`Renderer`](crate::Renderer).
///
/// `draw` records into dynamic-rendering scopes it opens and closes itself.
/// It never begins, ends or submits the command buffer.
pub trait Demo<B: FrameBackend> {
    fn name(&self) -> &str;

    /// Runs before any GPU object exists.
    fn on_init(&mut self) {}

    /// Creates the demo's GPU resources.
    fn on_prepare(&mut self, backend: &mut B, settings: &RenderSettings) -> RhiResult<()>;

    /// CPU-side state for the next frame. May request new settings.
    fn on_update(&mut self, _delta_secs: f32, _settings: &mut RenderSettings) {}

    fn draw(&mut self, ctx: &FrameContext<'_, B::Recorder>) -> RhiResult<()>;

    /// Called inside the overlay scope, which loads the frame's color.
    fn draw_ui(
        &mut self,
        _ctx: &FrameContext<'_, B::Recorder>,
        _stats: &FrameStats,
    ) -> RhiResult<()> {
        Ok(())
    }

    fn on_window_resize(&mut self, _backend: &mut B, _extent: vk::Extent2D) -> RhiResult<()> {
        Ok(())
    }

    /// Rebuilds resources sized to the scene viewport.
    fn on_scene_resize(&mut self, _backend: &mut B, _extent: vk::Extent2D) -> RhiResult<()> {
        Ok(())
    }

    /// Pipelines bake the sample count in; rebuild them here.
    fn on_sample_count_changed(
        &mut self,
        _backend: &mut B,
        _samples: vk::SampleCountFlags,
    ) -> RhiResult<()> {
        Ok(())
    }

    fn on_min_lod_changed(&mut self, _backend: &mut B, _min_lod: f32) -> RhiResult<()> {
        Ok(())
    }

    /// Releases the demo's GPU resources. The device is idle.
    fn on_destroy(&mut self, backend: &mut B);
}

impl<B: FrameBackend, D: Demo<B> + ?Sized> Demo<B> for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_init(&mut self) {
        (**self).on_init()
    }

    fn on_prepare(&mut self, backend: &mut B, settings: &RenderSettings) -> RhiResult<()> {
        (**self).on_prepare(backend, settings)
    }

    fn on_update(&mut self, delta_secs: f32, settings: &mut RenderSettings) {
        (**self).on_update(delta_secs, settings)
    }

    fn draw(&mut self, ctx: &FrameContext<'_, B::Recorder>) -> RhiResult<()> {
        (**self).draw(ctx)
    }

    fn draw_ui(&mut self, ctx: &FrameContext<'_, B::Recorder>, stats: &FrameStats) -> RhiResult<()> {
        (**self).draw_ui(ctx, stats)
    }

    fn on_window_resize(&mut self, backend: &mut B, extent: vk::Extent2D) -> RhiResult<()> {
        (**self).on_window_resize(backend, extent)
    }

    fn on_scene_resize(&mut self, backend: &mut B, extent: vk::Extent2D) -> RhiResult<()> {
        (**self).on_scene_resize(backend, extent)
    }

    fn on_sample_count_changed(
        &mut self,
        backend: &mut B,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<()> {
        (**self).on_sample_count_changed(backend, samples)
    }

    fn on_min_lod_changed(&mut self, backend: &mut B, min_lod: f32) -> RhiResult<()> {
        (**self).on_min_lod_changed(backend, min_lod)
    }

    fn on_destroy(&mut self, backend: &mut B) {
        (**self).on_destroy(backend)
    }
}
