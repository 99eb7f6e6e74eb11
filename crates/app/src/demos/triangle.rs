//! A single vertex-colored triangle.

use std::path::{Path, PathBuf};

use ash::vk;
use tracing::debug;
use vkframe_renderer::{
    Demo, FrameContext, FrameStats, MetricsOverlay, RenderSettings, VulkanBackend,
};
use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::vertex::Vertex;

use super::{SHADER_ENTRY, scene_targets};

const VERTICES: [Vertex; 3] = [
    Vertex::new([0.0, -0.5, 0.0], [0.5, 0.0], [1.0, 0.0, 0.0, 1.0]),
    Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0], [0.0, 1.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [0.0, 1.0], [0.0, 0.0, 1.0, 1.0]),
];

struct Resources {
    // Pipeline before its layout.
    pipeline: Pipeline,
    layout: PipelineLayout,
    vertex_buffer: Buffer,
    overlay: MetricsOverlay,
}

pub struct TriangleDemo {
    shader_dir: PathBuf,
    resources: Option<Resources>,
}

impl TriangleDemo {
    pub fn new(shader_dir: &Path) -> Self {
        Self {
            shader_dir: shader_dir.to_path_buf(),
            resources: None,
        }
    }

    fn build_pipeline(
        &self,
        backend: &VulkanBackend,
        layout: &PipelineLayout,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Pipeline> {
        let device = backend.device().clone();
        let vert = Shader::load(
            device.clone(),
            &self.shader_dir,
            "triangle.vert.spv",
            ShaderStage::Vertex,
            SHADER_ENTRY,
        )?;
        let frag = Shader::load(
            device.clone(),
            &self.shader_dir,
            "triangle.frag.spv",
            ShaderStage::Fragment,
            SHADER_ENTRY,
        )?;

        let builder = GraphicsPipelineBuilder::new()
            .shader(&vert)
            .shader(&frag)
            .vertex_input(
                &[Vertex::binding_description()],
                &Vertex::attribute_descriptions(),
            )
            .cull_mode(vk::CullModeFlags::NONE);
        scene_targets(builder, backend, samples).build(device, layout)
    }
}

impl Demo<VulkanBackend> for TriangleDemo {
    fn name(&self) -> &str {
        "triangle"
    }

    fn on_prepare(&mut self, backend: &mut VulkanBackend, settings: &RenderSettings) -> RhiResult<()> {
        let device = backend.device().clone();
        let vertex_buffer = Buffer::device_local(device.clone(), BufferUsage::Vertex, &VERTICES)?;
        let layout = PipelineLayout::new(device, &[], &[])?;
        let pipeline = self.build_pipeline(backend, &layout, settings.samples)?;
        let overlay = MetricsOverlay::new(backend)?;

        self.resources = Some(Resources {
            pipeline,
            layout,
            vertex_buffer,
            overlay,
        });
        debug!("Triangle demo prepared");
        Ok(())
    }

    fn draw(&mut self, ctx: &FrameContext<'_, CommandBuffer>) -> RhiResult<()> {
        let Some(res) = &self.resources else {
            return Ok(());
        };
        let cmd = ctx.recorder;

        let attachments = ctx.scene_attachments().build();
        cmd.begin_rendering(&attachments.info());
        cmd.bind_graphics_pipeline(res.pipeline.handle());
        cmd.set_viewport(ctx.extent);
        cmd.set_scissor(ctx.extent);
        cmd.bind_vertex_buffer(0, res.vertex_buffer.handle(), 0);
        cmd.draw(VERTICES.len() as u32, 1);
        cmd.end_rendering();
        Ok(())
    }

    fn draw_ui(
        &mut self,
        ctx: &FrameContext<'_, CommandBuffer>,
        stats: &FrameStats,
    ) -> RhiResult<()> {
        match self.resources.as_mut() {
            Some(res) => res.overlay.draw(ctx, "triangle", stats),
            None => Ok(()),
        }
    }

    fn on_sample_count_changed(
        &mut self,
        backend: &mut VulkanBackend,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<()> {
        let Some(res) = self.resources.take() else {
            return Ok(());
        };
        let pipeline = self.build_pipeline(backend, &res.layout, samples)?;
        self.resources = Some(Resources { pipeline, ..res });
        Ok(())
    }

    fn on_destroy(&mut self, _backend: &mut VulkanBackend) {
        if self.resources.take().is_some() {
            debug!("Triangle demo resources released");
        }
    }
}
