//! Frame timing statistics shown by the overlay.

use std::collections::VecDeque;

use vkframe_rhi::query::GpuTimestamps;

/// Samples kept per history.
pub const HISTORY_LEN: usize = 100;

/// Fixed-length ring of recent samples, oldest first.
#[derive(Clone, Debug)]
pub struct History {
    samples: VecDeque<f32>,
}

impl History {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    /// CPU time between the last two frames, in milliseconds.
    pub frame_time_ms: f32,
    pub fps: f32,
    /// Seconds since the renderer started.
    pub app_time: f32,
    /// Last GPU time for one frame's command buffer, in milliseconds.
    /// `None` until the first timestamp pair is read back.
    pub gpu_time_ms: Option<f32>,
    pub frames: u64,
    pub fps_history: History,
    pub gpu_history: History,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one CPU frame of `delta_secs` seconds.
    pub fn record_frame(&mut self, delta_secs: f32) {
        self.frames += 1;
        self.app_time += delta_secs;
        self.frame_time_ms = delta_secs * 1000.0;
        if delta_secs > 0.0 {
            self.fps = 1.0 / delta_secs;
        }
        self.fps_history.push(self.fps);
    }

    /// Applies a timestamp readback. A pair that is not ready yet leaves the
    /// previous value in place.
    pub fn record_gpu_time(&mut self, timestamps: GpuTimestamps) {
        if let GpuTimestamps::Ready(ms) = timestamps {
            self.gpu_time_ms = Some(ms);
            self.gpu_history.push(ms);
        }
    }
}
