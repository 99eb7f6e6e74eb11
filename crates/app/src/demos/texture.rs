//! Two stacked quads sampling a mipmapped checkerboard, spinning under a
//! perspective camera.
//!
//! Each frame slot has its own uniform buffer and descriptor set, so the
//! matrices for one frame are written while the other slot may still be in
//! flight. The texture set is shared and only rewritten after an idle wait.

use std::path::{Path, PathBuf};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::{debug, info};
use vkframe_renderer::{
    Demo, FrameContext, FrameStats, MAX_FRAMES_IN_FLIGHT, MetricsOverlay, RenderSettings,
    VulkanBackend,
};
use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::descriptor::{DescriptorSetLayout, DescriptorWriter, binding};
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::texture::{SamplerDesc, Texture};
use vkframe_rhi::vertex::Vertex;

use super::{SHADER_ENTRY, scene_targets};

const CHECKER_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;

const VERTICES: [Vertex; 8] = [
    Vertex::new([-0.5, -0.5, 0.2], [0.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
    Vertex::new([0.5, -0.5, 0.2], [1.0, 0.0], [0.0, 1.0, 0.0, 1.0]),
    Vertex::new([0.5, 0.5, 0.2], [1.0, 1.0], [0.0, 0.0, 1.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.2], [0.0, 1.0], [1.0, 1.0, 1.0, 1.0]),
    Vertex::new([-0.5, -0.5, 0.0], [0.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
    Vertex::new([0.5, -0.5, 0.0], [1.0, 0.0], [0.0, 1.0, 0.0, 1.0]),
    Vertex::new([0.5, 0.5, 0.0], [1.0, 1.0], [0.0, 0.0, 1.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [0.0, 1.0], [1.0, 1.0, 1.0, 1.0]),
];

const INDICES: [u16; 12] = [0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Transforms {
    model: Mat4,
    view: Mat4,
    proj: Mat4,
}

impl Transforms {
    /// Quarter turn per second about Z, seen from (2, 2, 2).
    fn at(time_secs: f32, extent: vk::Extent2D) -> Self {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down.
        proj.y_axis.y *= -1.0;

        Self {
            model: Mat4::from_rotation_z(time_secs * 90f32.to_radians()),
            view: Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z),
            proj,
        }
    }
}

/// Black and white RGBA8 checkerboard.
fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let v = if (x / cell + y / cell) % 2 == 0 { 255 } else { 30 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

struct Resources {
    pipeline: Pipeline,
    layout: PipelineLayout,
    // Outlive the pipeline layout and the sets allocated from them.
    _set_layouts: [DescriptorSetLayout; 2],
    ubo_sets: Vec<vk::DescriptorSet>,
    uniform_buffers: Vec<Buffer>,
    texture_set: vk::DescriptorSet,
    texture: Texture,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    overlay: MetricsOverlay,
}

pub struct TextureDemo {
    shader_dir: PathBuf,
    elapsed: f32,
    resources: Option<Resources>,
}

impl TextureDemo {
    pub fn new(shader_dir: &Path) -> Self {
        Self {
            shader_dir: shader_dir.to_path_buf(),
            elapsed: 0.0,
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
            "texture.vert.spv",
            ShaderStage::Vertex,
            SHADER_ENTRY,
        )?;
        let frag = Shader::load(
            device.clone(),
            &self.shader_dir,
            "texture.frag.spv",
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
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);
        scene_targets(builder, backend, samples).build(device, layout)
    }
}

impl Demo<VulkanBackend> for TextureDemo {
    fn name(&self) -> &str {
        "texture"
    }

    fn on_prepare(&mut self, backend: &mut VulkanBackend, settings: &RenderSettings) -> RhiResult<()> {
        let device = backend.device().clone();

        let vertex_buffer = Buffer::device_local(device.clone(), BufferUsage::Vertex, &VERTICES)?;
        let index_buffer = Buffer::device_local(device.clone(), BufferUsage::Index, &INDICES)?;

        let pixels = checkerboard(CHECKER_SIZE, CHECKER_CELL);
        let texture = Texture::from_rgba8(
            device.clone(),
            CHECKER_SIZE,
            CHECKER_SIZE,
            &pixels,
            SamplerDesc {
                min_lod: settings.min_lod,
                ..SamplerDesc::default()
            },
        )?;

        let ubo_layout = DescriptorSetLayout::new(
            device.clone(),
            &[binding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
        )?;
        let texture_layout = DescriptorSetLayout::new(
            device.clone(),
            &[binding::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)],
        )?;

        let mut uniform_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut ubo_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let buffer = Buffer::with_data(
                device.clone(),
                BufferUsage::Uniform,
                &[Transforms::zeroed()],
            )?;
            let set = ubo_layout.allocate_set()?;
            DescriptorWriter::new(set)
                .uniform_buffer(0, buffer.handle())
                .apply(&device);
            uniform_buffers.push(buffer);
            ubo_sets.push(set);
        }

        let texture_set = texture_layout.allocate_set()?;
        DescriptorWriter::new(texture_set)
            .combined_image_sampler(0, texture.view(), texture.sampler())
            .apply(&device);

        let layout = PipelineLayout::new(
            device,
            &[ubo_layout.handle(), texture_layout.handle()],
            &[],
        )?;
        let pipeline = self.build_pipeline(backend, &layout, settings.samples)?;
        let overlay = MetricsOverlay::new(backend)?;

        info!(
            "Texture demo prepared: {}x{} checkerboard, {} mips",
            CHECKER_SIZE,
            CHECKER_SIZE,
            texture.desc().mip_levels
        );
        self.resources = Some(Resources {
            pipeline,
            layout,
            _set_layouts: [ubo_layout, texture_layout],
            ubo_sets,
            uniform_buffers,
            texture_set,
            texture,
            vertex_buffer,
            index_buffer,
            overlay,
        });
        Ok(())
    }

    fn on_update(&mut self, delta_secs: f32, _settings: &mut RenderSettings) {
        self.elapsed += delta_secs;
    }

    fn draw(&mut self, ctx: &FrameContext<'_, CommandBuffer>) -> RhiResult<()> {
        let Some(res) = &self.resources else {
            return Ok(());
        };
        // The slot's fence has been waited on, so its buffer is free.
        res.uniform_buffers[ctx.slot].write_pod(&Transforms::at(self.elapsed, ctx.extent))?;

        let cmd = ctx.recorder;
        let attachments = ctx.scene_attachments().build();
        cmd.begin_rendering(&attachments.info());
        cmd.bind_graphics_pipeline(res.pipeline.handle());
        cmd.set_viewport(ctx.extent);
        cmd.set_scissor(ctx.extent);
        cmd.bind_vertex_buffer(0, res.vertex_buffer.handle(), 0);
        cmd.bind_index_buffer(res.index_buffer.handle(), 0, vk::IndexType::UINT16);
        cmd.bind_descriptor_sets(
            res.layout.handle(),
            0,
            &[res.ubo_sets[ctx.slot], res.texture_set],
        );
        cmd.draw_indexed(INDICES.len() as u32, 1);
        cmd.end_rendering();
        Ok(())
    }

    fn draw_ui(
        &mut self,
        ctx: &FrameContext<'_, CommandBuffer>,
        stats: &FrameStats,
    ) -> RhiResult<()> {
        match self.resources.as_mut() {
            Some(res) => res.overlay.draw(ctx, "texture", stats),
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
        debug!("Texture pipeline rebuilt for {:?}", samples);
        Ok(())
    }

    fn on_min_lod_changed(&mut self, backend: &mut VulkanBackend, min_lod: f32) -> RhiResult<()> {
        let Some(res) = self.resources.as_mut() else {
            return Ok(());
        };
        res.texture.recreate_sampler(min_lod)?;
        DescriptorWriter::new(res.texture_set)
            .combined_image_sampler(0, res.texture.view(), res.texture.sampler())
            .apply(backend.device());
        debug!("Sampler rebuilt with min LOD {}", res.texture.min_lod());
        Ok(())
    }

    fn on_destroy(&mut self, _backend: &mut VulkanBackend) {
        if self.resources.take().is_some() {
            debug!("Texture demo resources released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let pixels = checkerboard(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        let at = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
        assert_eq!(at(0, 0), 255);
        assert_eq!(at(2, 0), 30);
        assert_eq!(at(0, 2), 30);
        assert_eq!(at(3, 3), 255);
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let t = Transforms::at(0.0, vk::Extent2D { width: 1280, height: 720 });
        assert!(t.proj.y_axis.y < 0.0);
        assert_eq!(t.model, Mat4::IDENTITY);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let t = Transforms::at(1.0, vk::Extent2D { width: 800, height: 0 });
        assert!(t.proj.x_axis.x.is_finite());
    }

    #[test]
    fn transforms_match_std140_mat4_layout() {
        assert_eq!(std::mem::size_of::<Transforms>(), 3 * 64);
    }
}
