//! Descriptor set layouts and sets.
//!
//! Sets are allocated from the device's shared pool and are never freed
//! individually; the pool releases them when the device is destroyed.
//! Layouts are owned objects and destroyed in `Drop`.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Allocates one set with this layout from the device pool.
    pub fn allocate_set(&self) -> RhiResult<vk::DescriptorSet> {
        let layouts = [self.layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.device.descriptor_pool())
            .set_layouts(&layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

/// Single-descriptor layout bindings.
pub mod binding {
    use ash::vk;

    pub fn uniform_buffer(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
    }

    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stages)
    }
}

/// Collects buffer and image writes for one descriptor set and applies them
/// in a single `vkUpdateDescriptorSets` call.
pub struct DescriptorWriter {
    set: vk::DescriptorSet,
    buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorImageInfo)>,
}

impl DescriptorWriter {
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            buffers: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Binds the whole of `buffer` as a uniform buffer.
    pub fn uniform_buffer(mut self, binding: u32, buffer: vk::Buffer) -> Self {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE);
        self.buffers.push((binding, info));
        self
    }

    /// Binds a sampled image in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn combined_image_sampler(
        mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        let info = vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.images.push((binding, info));
        self
    }

    pub fn write_count(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn apply(self, device: &Device) {
        let mut writes = Vec::with_capacity(self.write_count());
        for (binding, info) in &self.buffers {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }
        for (binding, info) in &self.images {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info)),
            );
        }
        if writes.is_empty() {
            return;
        }
        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_buffer_binding() {
        let b = binding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(b.binding, 0);
        assert_eq!(b.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(b.descriptor_count, 1);
        assert_eq!(b.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn image_sampler_binding() {
        let b = binding::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(b.binding, 1);
        assert_eq!(
            b.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn writer_collects_writes() {
        let writer = DescriptorWriter::new(vk::DescriptorSet::null())
            .uniform_buffer(0, vk::Buffer::null())
            .combined_image_sampler(1, vk::ImageView::null(), vk::Sampler::null());
        assert_eq!(writer.write_count(), 2);
        assert_eq!(writer.buffers[0].1.range, vk::WHOLE_SIZE);
        assert_eq!(
            writer.images[0].1.image_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }
}
