//! Frame scheduler.
//!
//! One frame runs through three steps on the current slot:
//!
//! ```text
//! acquire   wait slot fence -> acquire image -> reset slot fence
//!           -> read the slot's previous timestamps
//! record    begin -> UNDEFINED→COLOR_ATTACHMENT -> demo draw
//!           -> overlay scope (load) -> COLOR_ATTACHMENT→PRESENT -> end
//! submit    submit -> present -> next slot
//! ```
//!
//! Resizes are only evaluated at the acquire boundary (before recording),
//! at the present boundary (after submission) and on an update tick that
//! changes the sample count. Anything that replaces
//! the swapchain, a render target or a pipeline waits for the device to go
//! idle first.

use ash::vk;
use tracing::{debug, error, info, warn};
use vkframe_rhi::RhiResult;
use vkframe_rhi::physical_device::sample_count_from_u32;
use vkframe_rhi::swapchain::{AcquiredImage, check_image_count};

use crate::attachments::{AttachmentState, overlay_attachments, scene_attachments};
use crate::backend::FrameBackend;
use crate::demo::{Demo, FrameContext, RenderSettings};
use crate::frame::FrameCursor;
use crate::stats::FrameStats;

/// Result of running the resize protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeOutcome {
    Resized(vk::Extent2D),
    /// The surface has no area (minimized). Nothing changed; retried later.
    Deferred,
}

/// What happened to one call of [`Renderer::render`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image_index: u32 },
    /// No work was recorded or submitted.
    Skipped,
}

#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    pub clear_color: [f32; 4],
    /// Requested sample count. `None` picks the device maximum.
    pub samples: Option<u32>,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            samples: None,
        }
    }
}

/// Caps `requested` at `max`. Both are single-bit sample counts.
pub fn clamp_samples(
    requested: vk::SampleCountFlags,
    max: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    if requested.is_empty() {
        vk::SampleCountFlags::TYPE_1
    } else if requested.as_raw() > max.as_raw() {
        max
    } else {
        requested
    }
}

fn initial_samples(requested: Option<u32>, max: vk::SampleCountFlags) -> vk::SampleCountFlags {
    match requested {
        None => max,
        Some(n) => clamp_samples(
            sample_count_from_u32(n).unwrap_or(vk::SampleCountFlags::TYPE_1),
            max,
        ),
    }
}

pub struct Renderer<B: FrameBackend, D: Demo<B>> {
    // Dropped before the backend that created its resources.
    demo: D,
    backend: B,
    cursor: FrameCursor,
    /// Settings the current GPU objects were built with.
    settings: RenderSettings,
    /// Settings asked for since the last update tick.
    requested: RenderSettings,
    clear_color: [f32; 4],
    resize_requested: bool,
    /// A resize found the surface empty and must be retried before the next
    /// acquire.
    resize_deferred: bool,
    /// Sample count applied by the next successful resize.
    pending_samples: Option<vk::SampleCountFlags>,
    stats: FrameStats,
    destroyed: bool,
}

impl<B: FrameBackend, D: Demo<B>> Renderer<B, D> {
    pub fn new(backend: B, mut demo: D, options: RendererOptions) -> Self {
        let samples = initial_samples(options.samples, backend.max_samples());
        let settings = RenderSettings {
            samples,
            ..RenderSettings::default()
        };

        demo.on_init();
        info!(
            "Renderer created for demo '{}' ({} swapchain images, {:?})",
            demo.name(),
            backend.image_count(),
            samples
        );

        Self {
            demo,
            backend,
            cursor: FrameCursor::new(),
            settings,
            requested: settings,
            clear_color: options.clear_color,
            resize_requested: false,
            resize_deferred: false,
            pending_samples: None,
            stats: FrameStats::new(),
            destroyed: false,
        }
    }

    /// Creates the render targets, then the demo's resources.
    ///
    /// Fails when the swapchain has fewer images than frames in flight.
    pub fn prepare(&mut self) -> RhiResult<()> {
        check_image_count(self.backend.image_count())?;
        self.backend.create_targets(self.settings.samples)?;
        self.demo.on_prepare(&mut self.backend, &self.settings)?;
        info!("Demo '{}' prepared", self.demo.name());
        Ok(())
    }

    /// Runs the demo's CPU update, then applies any settings it or the
    /// application requested.
    pub fn update(&mut self, delta_secs: f32) -> RhiResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.demo.on_update(delta_secs, &mut self.requested);
        self.apply_requested_settings()
    }

    /// Settings to apply on the next update tick.
    pub fn request_settings(&mut self) -> &mut RenderSettings {
        &mut self.requested
    }

    /// Flags a window resize. Handled after the next present.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    fn apply_requested_settings(&mut self) -> RhiResult<()> {
        let samples = clamp_samples(self.requested.samples, self.backend.max_samples());
        if samples != self.requested.samples {
            warn!(
                "Requested {:?} exceeds the device limit, using {:?}",
                self.requested.samples, samples
            );
        }
        self.requested.samples = samples;
        self.requested.min_lod = self.requested.min_lod.max(0.0);

        if self.requested.samples != self.settings.samples {
            if self.pending_samples != Some(self.requested.samples) {
                info!(
                    "Sample count {:?} -> {:?}, rebuilding targets",
                    self.settings.samples, self.requested.samples
                );
            }
            // Applied by the resize protocol. While the surface is empty the
            // change stays pending and render retries it.
            self.pending_samples = Some(self.requested.samples);
            if !self.resize_deferred {
                self.resize()?;
            }
        } else {
            self.pending_samples = None;
        }

        if self.requested.min_lod != self.settings.min_lod {
            debug!(
                "Min LOD {} -> {}, rebuilding samplers",
                self.settings.min_lod, self.requested.min_lod
            );
            self.backend.wait_idle()?;
            self.settings.min_lod = self.requested.min_lod;
            self.demo
                .on_min_lod_changed(&mut self.backend, self.settings.min_lod)?;
        }
        Ok(())
    }

    /// Acquires, records, submits and presents one frame.
    pub fn render(&mut self, delta_secs: f32) -> RhiResult<FrameOutcome> {
        if self.destroyed {
            return Ok(FrameOutcome::Skipped);
        }
        if self.resize_deferred && self.resize()? == ResizeOutcome::Deferred {
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.cursor.slot();
        self.backend.wait_for_slot(slot)?;

        let image_index = match self.backend.acquire_image(slot)? {
            AcquiredImage::Ready { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquired image {} is suboptimal", index);
                }
                index
            }
            AcquiredImage::OutOfDate => {
                debug!("Swapchain out of date on acquire, skipping frame");
                self.resize()?;
                return Ok(FrameOutcome::Skipped);
            }
        };
        self.backend.reset_slot(slot)?;

        // The fence wait retired this slot's last frame, so its queries are
        // complete and are read before recording resets them.
        if self.cursor.has_submitted(slot) {
            match self.backend.read_gpu_time(slot) {
                Ok(timestamps) => self.stats.record_gpu_time(timestamps),
                Err(e) => debug!("GPU timestamp readback failed: {}", e),
            }
        }

        self.stats.record_frame(delta_secs);
        self.record(slot, image_index)?;

        self.backend.submit(slot)?;
        let status = self.backend.present(slot, image_index)?;
        if status.needs_recreate() || self.resize_requested {
            debug!(
                "Resizing after present ({:?}, requested: {})",
                status, self.resize_requested
            );
            self.resize()?;
        }

        self.cursor.advance();
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn attachment_state(&self) -> AttachmentState {
        AttachmentState {
            extent: self.backend.extent(),
            color_format: self.backend.color_format(),
            depth_format: self.backend.depth_format(),
            samples: self.settings.samples,
            clear_color: self.clear_color,
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.backend.begin_commands(slot)?;
        self.backend.transition_image(
            slot,
            image_index,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;

        let state = self.attachment_state();
        let views = self.backend.attachment_views(image_index)?;
        let scene = scene_attachments(&state, &views);
        let overlay = overlay_attachments(&state, &views);

        {
            let ctx = FrameContext::new(
                self.backend.recorder(slot),
                slot,
                image_index,
                state.samples,
                scene.clone(),
            );
            self.demo.draw(&ctx)?;
        }

        self.backend.begin_rendering(slot, &overlay);
        {
            let ctx = FrameContext::new(
                self.backend.recorder(slot),
                slot,
                image_index,
                state.samples,
                scene,
            );
            self.demo.draw_ui(&ctx, &self.stats)?;
        }
        self.backend.end_rendering(slot);

        self.backend.transition_image(
            slot,
            image_index,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        self.backend.end_commands(slot)
    }

    /// Rebuilds the swapchain and every extent-dependent target for the
    /// current surface size, applying a pending sample count change.
    ///
    /// An empty surface defers the resize without touching anything.
    pub fn resize(&mut self) -> RhiResult<ResizeOutcome> {
        if self.destroyed {
            return Ok(ResizeOutcome::Deferred);
        }
        let extent = self.backend.surface_extent()?;
        if extent.width == 0 || extent.height == 0 {
            debug!(
                "Surface is {}x{}, deferring resize",
                extent.width, extent.height
            );
            self.resize_deferred = true;
            return Ok(ResizeOutcome::Deferred);
        }

        self.backend.wait_idle()?;
        self.backend.recreate_swapchain(extent)?;
        check_image_count(self.backend.image_count())?;

        let samples_changed = match self.pending_samples.take() {
            Some(samples) if samples != self.settings.samples => {
                self.settings.samples = samples;
                true
            }
            _ => false,
        };
        self.backend.create_targets(self.settings.samples)?;
        self.resize_requested = false;
        self.resize_deferred = false;

        self.demo.on_window_resize(&mut self.backend, extent)?;
        self.demo.on_scene_resize(&mut self.backend, extent)?;
        if samples_changed {
            self.demo
                .on_sample_count_changed(&mut self.backend, self.settings.samples)?;
        }
        info!(
            "Resized to {}x{} ({:?})",
            extent.width, extent.height, self.settings.samples
        );
        Ok(ResizeOutcome::Resized(extent))
    }

    /// Waits for the GPU, then releases the demo's and the frame loop's
    /// objects. Safe to call more than once.
    pub fn destroy(&mut self) -> RhiResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.backend.wait_idle()?;
        self.demo.on_destroy(&mut self.backend);
        self.backend.destroy_targets();
        self.backend.destroy();
        self.destroyed = true;
        info!(
            "Renderer destroyed after {} frames",
            self.cursor.submitted()
        );
        Ok(())
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn demo(&self) -> &D {
        &self.demo
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.cursor.slot()
    }
}

impl<B: FrameBackend, D: Demo<B>> Drop for Renderer<B, D> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            error!("Renderer teardown failed: {}", e);
        }
    }
}
