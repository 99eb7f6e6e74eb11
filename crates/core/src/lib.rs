//! Foundation shared by the vkframe crates.
//!
//! - [`Error`] and [`Result`] for everything above the Vulkan wrappers
//! - [`init_logging`] to install the tracing subscriber
//! - [`FrameClock`] for frame deltas and application time
//! - [`Config`] loaded from `vkframe.toml`

mod clock;
mod config;
mod error;
mod logging;

pub use clock::{FrameClock, FrameTime};
pub use config::{
    Config, DEFAULT_CONFIG_PATH, DemoConfig, GraphicsConfig, Msaa, MsaaKeyword, PathsConfig,
    PresentMode, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
