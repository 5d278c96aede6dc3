//! Setup-phase failures. Each one is fatal to the feature it guards and is
//! shown to the user as a status line; none is retried.

use crate::tracking::TrackingError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not load point cloud {path}: {source}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("point cloud {0} contains no points")]
    EmptyAsset(PathBuf),

    #[error("could not read shader {path}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader '{label}' failed to compile: {message}")]
    ShaderCompile { label: String, message: String },

    #[error("AR session could not start: {0}")]
    SessionStart(#[from] TrackingError),
}

impl SetupError {
    /// Short text for the status line.
    pub fn status_line(&self) -> String {
        match self {
            SetupError::AssetLoad { .. } | SetupError::EmptyAsset(_) => {
                "The spirit tree could not be loaded.".to_string()
            }
            SetupError::ShaderRead { .. } | SetupError::ShaderCompile { .. } => {
                "This device cannot draw the spirit tree.".to_string()
            }
            SetupError::SessionStart(_) => "AR could not start on this device.".to_string(),
        }
    }
}
