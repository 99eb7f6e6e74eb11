//! Per-slot Vulkan objects for the frames in flight.
//!
//! Each slot owns a primary command buffer, its [`FrameSync`] and a
//! timestamp query pair. Slots are addressed by the scheduler's slot index,
//! never by swapchain image index.

use std::sync::Arc;

use tracing::{debug, info};
use vkframe_rhi::RhiResult;
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::device::Device;
use vkframe_rhi::query::TimestampQuery;
use vkframe_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};

pub struct FrameData {
    command_buffer: CommandBuffer,
    sync: FrameSync,
    timestamps: TimestampQuery,
}

impl FrameData {
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn timestamps(&self) -> &TimestampQuery {
        &self.timestamps
    }
}

/// Owns the [`MAX_FRAMES_IN_FLIGHT`] frame slots.
///
/// Command buffers come from the device's shared pool and are released
/// with it.
pub struct FrameManager {
    frames: Vec<FrameData>,
}

impl FrameManager {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_buffers = CommandBuffer::allocate(
            device.clone(),
            device.command_pool(),
            MAX_FRAMES_IN_FLIGHT as u32,
        )?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (slot, command_buffer) in command_buffers.into_iter().enumerate() {
            frames.push(FrameData {
                command_buffer,
                // Fences start signaled so the first wait returns at once.
                sync: FrameSync::new(device.clone())?,
                timestamps: TimestampQuery::new(device.clone())?,
            });
            debug!("Created frame slot {}", slot);
        }

        info!("Frame manager created with {} frames in flight", frames.len());
        Ok(Self { frames })
    }

    /// Panics if `slot` is out of range or the slots were released.
    #[inline]
    pub fn frame(&self, slot: usize) -> &FrameData {
        &self.frames[slot]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every slot's sync objects and query pools.
    pub fn release(&mut self) {
        self.frames.clear();
    }
}
