//! Frame metrics overlay.
//!
//! A Dear ImGui window drawn inside the renderer's overlay scope. It shows
//! FPS, CPU frame time, GPU render time and plots of both histories. The
//! ImGui pipeline targets the swapchain format with no depth and one sample,
//! matching the overlay scope's single load-op color attachment.

use std::time::Duration;

use imgui::{Condition, Context, WindowFlags};
use imgui_rs_vulkan_renderer::{DynamicRendering, Options, Renderer as ImguiRenderer};
use tracing::info;
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use vkframe_rhi::{RhiError, RhiResult};

use crate::backend::FrameBackend;
use crate::demo::FrameContext;
use crate::stats::FrameStats;
use crate::vulkan::VulkanBackend;

const PLOT_HEIGHT: f32 = 50.0;
const PLOT_WIDTH: f32 = 240.0;
/// ImGui rejects a zero frame delta.
const MIN_DELTA_SECS: f32 = 1.0e-4;

/// Text and plot data for one frame of the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsPanel {
    pub lines: Vec<String>,
    pub fps: Vec<f32>,
    pub gpu_ms: Vec<f32>,
    pub fps_scale: f32,
    pub gpu_scale: f32,
}

impl MetricsPanel {
    pub fn from_stats(demo: &str, stats: &FrameStats) -> Self {
        let render_time = match stats.gpu_time_ms {
            Some(ms) => format!("Render time: {:.3} ms", ms),
            None => "Render time: n/a".to_string(),
        };
        let fps: Vec<f32> = stats.fps_history.iter().collect();
        let gpu_ms: Vec<f32> = stats.gpu_history.iter().collect();

        Self {
            lines: vec![
                format!("Demo: {}", demo),
                format!("FPS: {:.1}", stats.fps),
                format!("Frame time: {:.2} ms", stats.frame_time_ms),
                render_time,
                format!("Time: {:.1} s", stats.app_time),
            ],
            fps_scale: plot_scale(&fps),
            gpu_scale: plot_scale(&gpu_ms),
            fps,
            gpu_ms,
        }
    }
}

/// Upper bound for a plot: the largest sample plus a little headroom.
fn plot_scale(samples: &[f32]) -> f32 {
    let max = samples.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 { max * 1.2 } else { 1.0 }
}

pub struct MetricsOverlay {
    // Dropped before the context whose fonts it uploaded.
    renderer: ImguiRenderer,
    context: Context,
}

impl MetricsOverlay {
    /// Builds the ImGui pipeline for the backend's swapchain format and
    /// uploads the font atlas.
    pub fn new(backend: &VulkanBackend) -> RhiResult<Self> {
        let mut context = Context::create();
        context.set_ini_filename(None);

        let device = backend.device();
        let renderer = ImguiRenderer::with_default_allocator(
            backend.instance().handle(),
            device.physical_device(),
            device.handle().clone(),
            device.queue(),
            device.command_pool(),
            DynamicRendering {
                color_attachment_format: backend.color_format(),
                depth_attachment_format: None,
            },
            &mut context,
            Some(Options {
                in_flight_frames: MAX_FRAMES_IN_FLIGHT,
                ..Default::default()
            }),
        )
        .map_err(|e| RhiError::OverlayError(e.to_string()))?;

        info!("Metrics overlay created for {:?}", backend.color_format());
        Ok(Self { renderer, context })
    }

    /// Records the metrics window into the open overlay scope.
    pub fn draw(
        &mut self,
        ctx: &FrameContext<'_, CommandBuffer>,
        demo: &str,
        stats: &FrameStats,
    ) -> RhiResult<()> {
        let panel = MetricsPanel::from_stats(demo, stats);

        let io = self.context.io_mut();
        io.display_size = [ctx.extent.width as f32, ctx.extent.height as f32];
        io.update_delta_time(Duration::from_secs_f32(
            (stats.frame_time_ms / 1000.0).max(MIN_DELTA_SECS),
        ));

        let ui = self.context.new_frame();
        ui.window("Metrics")
            .position([10.0, 10.0], Condition::FirstUseEver)
            .bg_alpha(0.6)
            .flags(
                WindowFlags::NO_RESIZE
                    | WindowFlags::ALWAYS_AUTO_RESIZE
                    | WindowFlags::NO_SAVED_SETTINGS,
            )
            .build(|| {
                for line in &panel.lines {
                    ui.text(line);
                }
                ui.separator();
                ui.plot_lines("FPS", &panel.fps)
                    .scale_min(0.0)
                    .scale_max(panel.fps_scale)
                    .graph_size([PLOT_WIDTH, PLOT_HEIGHT])
                    .build();
                ui.plot_lines("GPU ms", &panel.gpu_ms)
                    .scale_min(0.0)
                    .scale_max(panel.gpu_scale)
                    .graph_size([PLOT_WIDTH, PLOT_HEIGHT])
                    .build();
            });

        let draw_data = self.context.render();
        self.renderer
            .cmd_draw(ctx.recorder.handle(), draw_data)
            .map_err(|e| RhiError::OverlayError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkframe_rhi::query::GpuTimestamps;

    #[test]
    fn panel_shows_missing_gpu_time_as_unavailable() {
        let mut stats = FrameStats::new();
        stats.record_frame(0.02);
        let panel = MetricsPanel::from_stats("triangle", &stats);
        assert_eq!(panel.lines[0], "Demo: triangle");
        assert_eq!(panel.lines[1], "FPS: 50.0");
        assert_eq!(panel.lines[2], "Frame time: 20.00 ms");
        assert_eq!(panel.lines[3], "Render time: n/a");
        assert!(panel.gpu_ms.is_empty());
        assert_eq!(panel.gpu_scale, 1.0);
    }

    #[test]
    fn panel_plots_both_histories_oldest_first() {
        let mut stats = FrameStats::new();
        stats.record_frame(0.5);
        stats.record_frame(0.25);
        stats.record_gpu_time(GpuTimestamps::Ready(1.5));
        stats.record_gpu_time(GpuTimestamps::Ready(3.0));

        let panel = MetricsPanel::from_stats("texture", &stats);
        assert_eq!(panel.fps, [2.0, 4.0]);
        assert_eq!(panel.gpu_ms, [1.5, 3.0]);
        assert_eq!(panel.lines[3], "Render time: 3.000 ms");
        assert!((panel.fps_scale - 4.8).abs() < 1e-5);
        assert!((panel.gpu_scale - 3.6).abs() < 1e-5);
    }
}
