//! Windowing for the frame core: a winit window, the instance extensions it
//! needs and the Vulkan surface created from it.

mod window;

pub use window::{Surface, Window, is_degenerate};
