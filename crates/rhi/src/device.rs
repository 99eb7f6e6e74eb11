//! Device context: logical device, queue, allocator, command pool and
//! descriptor pool.
//!
//! One [`Device`] is created at startup and shared through `Arc` with every
//! wrapper that needs it. It is destroyed last, after a full idle wait.
//!
//! # One-shot command buffers
//!
//! Setup and transfer work that must finish before the caller continues
//! goes through [`Device::allocate_command_buffer`] and
//! [`Device::flush_command_buffer`] (or the [`Device::one_shot`] shorthand).
//! Flushing submits, waits for the queue to go idle and frees the buffer, so
//! it never belongs on the per-frame path.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

const DEVICE_EXTENSIONS: &[&std::ffi::CStr] =
    &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Capacity of the shared descriptor pool, per descriptor type and in sets.
pub const DESCRIPTOR_POOL_CAPACITY: u32 = 10;

pub struct Device {
    device: ash::Device,
    info: PhysicalDeviceInfo,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    anisotropy_enabled: bool,
}

impl Device {
    /// Creates the logical device and the process-wide pools.
    ///
    /// Enables dynamic rendering and synchronization2. Sampler anisotropy
    /// and sample-rate shading are enabled only when the GPU has them.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(info.queue_family)
            .queue_priorities(&queue_priorities)];

        let anisotropy_enabled = info.supports_anisotropy();
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(anisotropy_enabled)
            .sample_rate_shading(info.supports_sample_rate_shading());
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };
        let queue = unsafe { device.get_device_queue(info.queue_family, 0) };
        info!(
            "Logical device created (queue family {}, anisotropy: {})",
            info.queue_family, anisotropy_enabled
        );

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(info.queue_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(DESCRIPTOR_POOL_CAPACITY),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(DESCRIPTOR_POOL_CAPACITY),
        ];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(DESCRIPTOR_POOL_CAPACITY)
            .pool_sizes(&pool_sizes);
        let descriptor_pool =
            unsafe { device.create_descriptor_pool(&descriptor_pool_info, None)? };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        debug!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            info: info.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queue,
            command_pool,
            descriptor_pool,
            anisotropy_enabled,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.info.device
    }

    #[inline]
    pub fn info(&self) -> &PhysicalDeviceInfo {
        &self.info
    }

    /// The single queue used for graphics, present and transfers.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.info.queue_family
    }

    #[inline]
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    #[inline]
    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.descriptor_pool
    }

    /// Whether samplers may enable anisotropic filtering.
    #[inline]
    pub fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    /// Locks the memory allocator.
    ///
    /// A poisoned lock only means another thread panicked mid-allocation;
    /// the allocator's own state is still consistent, so it is recovered.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Allocates a primary command buffer from the shared pool, optionally
    /// beginning it for one-time submission.
    pub fn allocate_command_buffer(self: &Arc<Self>, begin: bool) -> RhiResult<CommandBuffer> {
        let mut buffers = CommandBuffer::allocate(self.clone(), self.command_pool, 1)?;
        let cmd = buffers.pop().ok_or_else(|| {
            RhiError::ResourceError("command buffer allocation returned nothing".to_string())
        })?;
        if begin {
            cmd.begin()?;
        }
        Ok(cmd)
    }

    /// Ends, submits and waits for `cmd`, then frees it. The buffer is freed
    /// even when ending or submitting fails.
    pub fn flush_command_buffer(&self, cmd: CommandBuffer) -> RhiResult<()> {
        let result = self.submit_and_wait(&cmd);
        self.free_command_buffer(&cmd);
        result
    }

    fn submit_and_wait(&self, cmd: &CommandBuffer) -> RhiResult<()> {
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())?;
            self.device.queue_wait_idle(self.queue)?;
        }
        Ok(())
    }

    /// Returns `cmd` to the shared pool. It must not be pending.
    pub fn free_command_buffer(&self, cmd: &CommandBuffer) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[cmd.handle()]);
        }
    }

    /// Records with `record` into a fresh command buffer and flushes it.
    ///
    /// A failed `record` frees the buffer without submitting it.
    pub fn one_shot<F>(self: &Arc<Self>, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let cmd = self.allocate_command_buffer(true)?;
        let cmd = record_or_release(cmd, record, |cmd| self.free_command_buffer(&cmd))?;
        self.flush_command_buffer(cmd)
    }

    /// Submits one frame's work on the graphics queue.
    ///
    /// Waits on `wait_semaphore` at the color-attachment-output stage and
    /// signals `signal_semaphore` plus `fence` on completion.
    pub fn submit_frame(
        &self,
        cmd: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        let wait_semaphores = [wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [signal_semaphore];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)?;
        }
        Ok(())
    }
}

/// Runs `record` on `cmd`, handing `cmd` to `release` if recording fails.
fn record_or_release<C, F, R>(cmd: C, record: F, release: R) -> RhiResult<C>
where
    F: FnOnce(&C) -> RhiResult<()>,
    R: FnOnce(C),
{
    match record(&cmd) {
        Ok(()) => Ok(cmd),
        Err(e) => {
            release(cmd);
            Err(e)
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);

            // The allocator releases its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// ash::Device is Send + Sync, the allocator sits behind a Mutex and the
// remaining fields are plain handles.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn swapchain_extension_is_required() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }

    #[test]
    fn device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn failed_recording_releases_the_buffer() {
        let released = Cell::new(None);
        let result = record_or_release(
            7u32,
            |_| Err(RhiError::ResourceError("copy rejected".to_string())),
            |cmd| released.set(Some(cmd)),
        );
        assert!(matches!(result, Err(RhiError::ResourceError(_))));
        assert_eq!(released.get(), Some(7));
    }

    #[test]
    fn successful_recording_keeps_the_buffer() {
        let released = Cell::new(false);
        let cmd = record_or_release(7u32, |_| Ok(()), |_| released.set(true)).unwrap();
        assert_eq!(cmd, 7);
        assert!(!released.get());
    }
}
