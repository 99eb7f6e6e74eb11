//! Graphics pipeline builder and owned pipeline objects.
//!
//! [`GraphicsPipelineBuilder`] starts from an opinionated baseline and lets
//! callers override state field by field before [`build`]:
//!
//! | state          | default                                  |
//! |----------------|------------------------------------------|
//! | topology       | triangle list                            |
//! | rasterization  | fill, back-face cull, clockwise front    |
//! | multisample    | 1 sample, sample shading at 1.0          |
//! | depth          | test + write, `LESS`                     |
//! | blend          | disabled, RGBA write mask                |
//! | dynamic state  | viewport, scissor                        |
//!
//! Sample shading only takes effect when the device enabled
//! `sampleRateShading`; otherwise it is left off.
//!
//! Pipelines are immutable. Changing any input means building a new one and
//! dropping the old one after the device has gone idle.
//!
//! [`build`]: GraphicsPipelineBuilder::build

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None)
        };
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Graphics pipeline destroyed");
    }
}

/// Blend state with blending off and every channel written.
pub fn opaque_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Straight alpha blending.
pub fn alpha_blend() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

pub struct GraphicsPipelineBuilder<'a> {
    stages: Vec<&'a Shader>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,

    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    line_width: f32,

    samples: vk::SampleCountFlags,
    sample_shading: bool,
    min_sample_shading: f32,

    depth_test: bool,
    depth_write: bool,
    depth_compare_op: vk::CompareOp,

    color_formats: Vec<vk::Format>,
    color_blend: Vec<vk::PipelineColorBlendAttachmentState>,
    depth_format: Option<vk::Format>,
    stencil_format: Option<vk::Format>,

    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: true,
            min_sample_shading: 1.0,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            color_formats: Vec::new(),
            color_blend: Vec::new(),
            depth_format: None,
            stencil_format: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    /// Appends a shader stage. Stages are passed to Vulkan in call order.
    pub fn shader(mut self, shader: &'a Shader) -> Self {
        self.stages.push(shader);
        self
    }

    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = bindings.to_vec();
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn sample_shading(mut self, enable: bool, min_sample_shading: f32) -> Self {
        self.sample_shading = enable;
        self.min_sample_shading = min_sample_shading;
        self
    }

    pub fn depth_test(mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = compare_op;
        self
    }

    /// Adds a color attachment with blending off.
    pub fn color_attachment(self, format: vk::Format) -> Self {
        self.color_attachment_with_blend(format, opaque_blend())
    }

    pub fn color_attachment_with_blend(
        mut self,
        format: vk::Format,
        blend: vk::PipelineColorBlendAttachmentState,
    ) -> Self {
        self.color_formats.push(format);
        self.color_blend.push(blend);
        self
    }

    pub fn depth_format(mut self, format: Option<vk::Format>) -> Self {
        self.depth_format = format;
        self
    }

    pub fn stencil_format(mut self, format: Option<vk::Format>) -> Self {
        self.stencil_format = format;
        self
    }

    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        self.dynamic_states = states.to_vec();
        self
    }

    fn validate(&self) -> RhiResult<()> {
        if self.stages.is_empty() {
            return Err(RhiError::PipelineError(
                "at least one shader stage is required".to_string(),
            ));
        }
        if self.color_formats.is_empty() && self.depth_format.is_none() {
            return Err(RhiError::PipelineError(
                "pipeline has no color or depth attachment".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        self.validate()?;

        let stages: Vec<_> = self.stages.iter().map(|s| s.stage_create_info()).collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(self.topology);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(self.line_width);

        let sample_shading =
            self.sample_shading && device.info().supports_sample_rate_shading();
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .sample_shading_enable(sample_shading)
            .min_sample_shading(self.min_sample_shading);

        let has_depth = self.depth_format.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_test)
            .depth_write_enable(has_depth && self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&self.color_blend);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_formats)
            .depth_attachment_format(self.depth_format.unwrap_or(vk::Format::UNDEFINED))
            .stencil_attachment_format(self.stencil_format.unwrap_or(vk::Format::UNDEFINED));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| RhiError::VulkanError(result))?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("driver returned no pipeline".to_string())
        })?;

        debug!(
            "Graphics pipeline created ({} color attachment(s), {:?})",
            self.color_formats.len(),
            self.samples
        );
        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_state() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(builder.samples, vk::SampleCountFlags::TYPE_1);
        assert!(builder.depth_test && builder.depth_write);
        assert_eq!(builder.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(
            builder.dynamic_states,
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn overrides_apply_field_by_field() {
        let builder = GraphicsPipelineBuilder::new()
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .samples(vk::SampleCountFlags::TYPE_4)
            .depth_test(true, false, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(builder.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(builder.samples, vk::SampleCountFlags::TYPE_4);
        assert!(!builder.depth_write);
        // Untouched state keeps its default.
        assert_eq!(builder.polygon_mode, vk::PolygonMode::FILL);
    }

    #[test]
    fn blend_state_tracks_each_color_attachment() {
        let builder = GraphicsPipelineBuilder::new()
            .color_attachment(vk::Format::B8G8R8A8_SRGB)
            .color_attachment_with_blend(vk::Format::R16G16B16A16_SFLOAT, alpha_blend());
        assert_eq!(builder.color_formats.len(), builder.color_blend.len());
        assert_eq!(builder.color_blend[0].blend_enable, vk::FALSE);
        assert_eq!(builder.color_blend[1].blend_enable, vk::TRUE);
        assert_eq!(
            builder.color_blend[0].color_write_mask,
            vk::ColorComponentFlags::RGBA
        );
    }

    #[test]
    fn build_requires_shaders_and_attachments() {
        let no_stages = GraphicsPipelineBuilder::new().color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert!(matches!(
            no_stages.validate(),
            Err(RhiError::PipelineError(_))
        ));
    }
}
