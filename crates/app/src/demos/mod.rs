//! Built-in demos, selected by `[demo] name` in the config.

mod texture;
mod triangle;

use std::path::Path;

use anyhow::{Result, bail};
use ash::vk;
use vkframe_renderer::{Demo, FrameBackend, VulkanBackend};
use vkframe_rhi::command::aspect_for_format;
use vkframe_rhi::pipeline::GraphicsPipelineBuilder;

pub use texture::TextureDemo;
pub use triangle::TriangleDemo;

pub const DEMO_NAMES: [&str; 2] = ["triangle", "texture"];

/// Entry point compiled into every shader blob.
const SHADER_ENTRY: &str = "main";

pub fn create(name: &str, shader_dir: &Path) -> Result<Box<dyn Demo<VulkanBackend>>> {
    match name {
        "triangle" => Ok(Box::new(TriangleDemo::new(shader_dir))),
        "texture" => Ok(Box::new(TextureDemo::new(shader_dir))),
        other => bail!(
            "unknown demo {:?}, expected one of {:?}",
            other,
            DEMO_NAMES
        ),
    }
}

/// Attachment formats and sample count every scene pipeline must match:
/// the swapchain color format, and the depth target with its stencil
/// aspect when the format has one.
fn scene_targets<'a>(
    builder: GraphicsPipelineBuilder<'a>,
    backend: &VulkanBackend,
    samples: vk::SampleCountFlags,
) -> GraphicsPipelineBuilder<'a> {
    let depth_format = backend.depth_format();
    let stencil_format = aspect_for_format(depth_format)
        .contains(vk::ImageAspectFlags::STENCIL)
        .then_some(depth_format);

    builder
        .samples(samples)
        .color_attachment(backend.color_format())
        .depth_format(Some(depth_format))
        .stencil_format(stencil_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_demo_is_rejected() {
        let err = create("shadowmap", Path::new("shaders"))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("unknown demo"));
        assert!(err.contains("triangle"));
    }

    #[test]
    fn known_demos_construct_without_a_device() {
        for name in DEMO_NAMES {
            let demo = create(name, Path::new("shaders")).unwrap();
            assert_eq!((*demo).name(), name);
        }
    }
}
