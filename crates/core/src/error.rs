//! Error types shared by the vkframe crates that sit above the RHI.

use std::path::PathBuf;

use thiserror::Error;

/// Error raised outside the Vulkan wrapper layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("vulkan: {0}")]
    Vulkan(String),

    /// Window or surface creation failed.
    #[error("window: {0}")]
    Window(String),

    #[error("resource: {0}")]
    Resource(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file exists but is malformed, or holds a value
    /// outside its accepted set.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = Error::io(
            "shaders/missing.spv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        let msg = err.to_string();
        assert!(msg.contains("shaders/missing.spv"));
        assert!(msg.contains("no such file"));
    }
}
