//! GPU timestamp queries for frame timing.

use std::sync::Arc;

use ash::vk;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;

/// Outcome of reading a start/end timestamp pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GpuTimestamps {
    /// Elapsed GPU time in milliseconds.
    Ready(f32),
    /// The queries have not completed yet. Not an error.
    NotReady,
}

/// Converts raw timestamp ticks to milliseconds using the device's
/// nanoseconds-per-tick period.
pub fn ticks_to_ms(start: u64, end: u64, timestamp_period: f32) -> f32 {
    let ticks = end.saturating_sub(start);
    (ticks as f64 * timestamp_period as f64 / 1_000_000.0) as f32
}

/// A two-entry timestamp pool bracketing one frame's commands.
pub struct TimestampQuery {
    device: Arc<Device>,
    pool: vk::QueryPool,
    period: f32,
}

impl TimestampQuery {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(2);
        let pool = unsafe { device.handle().create_query_pool(&create_info, None)? };
        let period = device.info().timestamp_period();
        Ok(Self {
            device,
            pool,
            period,
        })
    }

    /// Resets both queries and writes the start stamp at top of pipe.
    pub fn begin(&self, cmd: &CommandBuffer) {
        cmd.reset_query_pool(self.pool, 0, 2);
        cmd.write_timestamp(vk::PipelineStageFlags::TOP_OF_PIPE, self.pool, 0);
    }

    /// Writes the end stamp at bottom of pipe.
    pub fn end(&self, cmd: &CommandBuffer) {
        cmd.write_timestamp(vk::PipelineStageFlags::BOTTOM_OF_PIPE, self.pool, 1);
    }

    /// Reads both stamps as 64-bit values without blocking. Call it once the
    /// submission that wrote them has retired.
    ///
    /// `NOT_READY` comes back as [`GpuTimestamps::NotReady`]; other failures
    /// are errors.
    pub fn read(&self) -> RhiResult<GpuTimestamps> {
        let mut stamps = [0u64; 2];
        let result = unsafe {
            self.device.handle().get_query_pool_results(
                self.pool,
                0,
                &mut stamps,
                vk::QueryResultFlags::TYPE_64,
            )
        };

        match result {
            Ok(()) => Ok(GpuTimestamps::Ready(ticks_to_ms(
                stamps[0], stamps[1], self.period,
            ))),
            Err(vk::Result::NOT_READY) => Ok(GpuTimestamps::NotReady),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TimestampQuery {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_query_pool(self.pool, None) };
    }
}
