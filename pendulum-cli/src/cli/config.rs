//! Simulator configuration loaded from YAML.
//!
//! Every field is optional in the file; anything missing falls back to the
//! defaults the form starts with (1 m, 1 kg, g = 9.81, k = 0.5, 70°).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pendulum::{
    DEFAULT_TIME_STEP, PendulumError, PendulumParameters, PivotPoint, PlotRenderer, StartRequest,
};

/// Top-level config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Arm length in meters
    pub length: f64,
    /// Bob mass in kilograms
    pub mass: f64,
    /// Gravitational acceleration in m/s²
    pub gravity: f64,
    /// Damping coefficient
    pub damping: f64,
    /// Initial angle in degrees
    pub angle_deg: f64,
    /// Initial angular velocity in degrees per second
    pub angular_velocity_deg: f64,
    /// Fixed integrator step in seconds
    pub time_step: f64,
    /// Wall-clock pause between steps in the interactive app
    pub frame_interval_ms: u64,
    /// Display geometry for the animation
    pub pivot: PivotConfig,
    /// Where plot PNGs are written
    pub output_dir: PathBuf,
    /// Keep plot PNGs on disk after they have been read back
    pub retain_plots: bool,
}

/// Pivot geometry in display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    pub arm_length: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for PivotConfig {
    fn default() -> Self {
        let pivot = PivotPoint::default();
        Self {
            arm_length: pivot.arm_length,
            x: pivot.x,
            y: pivot.y,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        let params = PendulumParameters::default();
        Self {
            length: params.length,
            mass: params.mass,
            gravity: params.gravity,
            damping: params.damping,
            angle_deg: 70.0,
            angular_velocity_deg: 0.0,
            time_step: DEFAULT_TIME_STEP,
            frame_interval_ms: 10,
            pivot: PivotConfig::default(),
            output_dir: PathBuf::from("plots"),
            retain_plots: true,
        }
    }
}

impl SimConfig {
    /// Load a config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PendulumError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PendulumError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PendulumError> {
        serde_yaml::from_str(content)
            .map_err(|e| PendulumError::Config(format!("failed to parse config YAML: {}", e)))
    }

    pub fn params(&self) -> PendulumParameters {
        PendulumParameters::new(self.length, self.mass, self.damping, self.gravity)
    }

    pub fn start_request(&self) -> Result<StartRequest, PendulumError> {
        StartRequest::new(self.params(), self.angle_deg, self.angular_velocity_deg, self.time_step)
    }

    pub fn pivot(&self) -> PivotPoint {
        PivotPoint::new(self.pivot.arm_length, self.pivot.x, self.pivot.y)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn renderer(&self) -> PlotRenderer {
        PlotRenderer::new(&self.output_dir, self.retain_plots)
    }

    /// Initial text for the six form fields, in `StartRequest::parse` order.
    pub fn form_fields(&self) -> [String; 6] {
        [
            self.length.to_string(),
            self.mass.to_string(),
            self.gravity.to_string(),
            self.damping.to_string(),
            self.angle_deg.to_string(),
            self.angular_velocity_deg.to_string(),
        ]
    }
}
