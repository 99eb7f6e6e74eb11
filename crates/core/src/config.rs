//! Runtime configuration loaded from `vkframe.toml`.
//!
//! Every field has a default, so a missing file or a missing table is not an
//! error. A malformed file or an out-of-range value is.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "vkframe.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub paths: PathsConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkframe".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Enables the Khronos validation layer and debug messenger.
    pub validation: bool,
    pub present_mode: PresentMode,
    pub msaa: Msaa,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentMode::Fifo,
            msaa: Msaa::MAX,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Fifo,
    FifoRelaxed,
    Mailbox,
    Immediate,
}

/// Requested multisample count.
///
/// `"max"` picks the highest count the device supports for both color and
/// depth targets; an integer requests that count, capped to the device limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Msaa {
    Samples(u32),
    Keyword(MsaaKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsaaKeyword {
    Max,
}

impl Msaa {
    pub const MAX: Msaa = Msaa::Keyword(MsaaKeyword::Max);

    /// Returns the explicit sample count, or `None` for "max".
    pub fn samples(self) -> Option<u32> {
        match self {
            Msaa::Samples(n) => Some(n),
            Msaa::Keyword(MsaaKeyword::Max) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub shader_dir: PathBuf,
    pub resource_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            resource_dir: PathBuf::from("assets"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub name: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            name: "triangle".to_string(),
        }
    }
}

impl Config {
    /// Loads `vkframe.toml` from the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        debug!(?config, "Parsed configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(n) = self.graphics.msaa.samples()
            && !(n.is_power_of_two() && n <= 64)
        {
            return Err(Error::Config(format!(
                "msaa must be \"max\" or a power of two up to 64, got {n}"
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.present_mode, PresentMode::Fifo);
        assert_eq!(config.graphics.msaa, Msaa::MAX);
        assert_eq!(config.paths.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.demo.name, "triangle");
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [window]
            width = 800

            [graphics]
            present_mode = "mailbox"
            msaa = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.present_mode, PresentMode::Mailbox);
        assert_eq!(config.graphics.msaa.samples(), Some(4));
    }

    #[test]
    fn msaa_keyword_parses() {
        let config = Config::from_toml("[graphics]\nmsaa = \"max\"\n").unwrap();
        assert_eq!(config.graphics.msaa.samples(), None);
    }

    #[test]
    fn rejects_non_power_of_two_sample_count() {
        let err = Config::from_toml("[graphics]\nmsaa = 3\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_unknown_present_mode() {
        let err = Config::from_toml("[graphics]\npresent_mode = \"vsync\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_window_size() {
        let err = Config::from_toml("[window]\nheight = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.title, "vkframe");
    }
}
