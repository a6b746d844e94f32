//! Error type shared by the simulator and the plot pipeline.

use std::path::PathBuf;

/// Everything that can go wrong outside the integrator itself.
///
/// The integrator is infallible once its inputs are validated, so errors
/// only show up at the edges: parsing a Start command, writing plots, and
/// the CLI's config/export paths.
#[derive(Debug)]
pub enum PendulumError {
    /// A Start field did not parse, was non-finite, or length/mass was zero.
    InvalidParameters(String),
    /// A plot artifact could not be written, re-read, or removed.
    ArtifactIo { path: PathBuf, message: String },
    /// Building or rasterizing the plot SVG failed.
    Render(String),
    /// A configuration file could not be read or parsed.
    Config(String),
    /// Writing the trajectory export failed.
    Export(String),
}

impl std::fmt::Display for PendulumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendulumError::InvalidParameters(msg) => write!(f, "invalid parameters: {}", msg),
            PendulumError::ArtifactIo { path, message } => {
                write!(f, "plot artifact {}: {}", path.display(), message)
            }
            PendulumError::Render(msg) => write!(f, "plot render error: {}", msg),
            PendulumError::Config(msg) => write!(f, "config error: {}", msg),
            PendulumError::Export(msg) => write!(f, "export error: {}", msg),
        }
    }
}

impl std::error::Error for PendulumError {}

impl PendulumError {
    /// Shorthand for wrapping an I/O-ish failure against a concrete file.
    pub fn artifact(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PendulumError::ArtifactIo {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
