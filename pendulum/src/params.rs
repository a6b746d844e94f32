//! Physical parameters and the validated Start command.

use std::f64::consts::PI;

use crate::error::PendulumError;
use crate::integrator::PendulumState;

/// Default fixed time step in seconds.
pub const DEFAULT_TIME_STEP: f64 = 0.01;

/// Physical constants for one run. Never mutated once a run starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumParameters {
    /// Arm length `l` in meters (non-zero).
    pub length: f64,
    /// Bob mass `m` in kilograms (non-zero).
    pub mass: f64,
    /// Damping coefficient `k` (expected >= 0, not enforced).
    pub damping: f64,
    /// Gravitational acceleration `g` in m/s².
    pub gravity: f64,
}

impl PendulumParameters {
    pub fn new(length: f64, mass: f64, damping: f64, gravity: f64) -> Self {
        Self { length, mass, damping, gravity }
    }

    /// Reject what the integrator would divide by zero on, plus NaN/inf.
    pub fn validate(&self) -> Result<(), PendulumError> {
        let fields = [
            ("length", self.length),
            ("mass", self.mass),
            ("damping", self.damping),
            ("gravity", self.gravity),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PendulumError::InvalidParameters(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if self.length == 0.0 {
            return Err(PendulumError::InvalidParameters("length must be non-zero".into()));
        }
        if self.mass == 0.0 {
            return Err(PendulumError::InvalidParameters("mass must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for PendulumParameters {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.5, 9.81)
    }
}

/// Convert degrees to radians.
#[inline]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Convert radians to degrees.
#[inline]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// A fully validated Start command.
///
/// Angles arrive in degrees from the user and are stored in radians; the
/// core never sees degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartRequest {
    pub params: PendulumParameters,
    /// Initial angle in radians.
    pub angle: f64,
    /// Initial angular velocity in rad/s.
    pub angular_velocity: f64,
    /// Fixed time step in seconds.
    pub time_step: f64,
}

impl StartRequest {
    /// Build a request from numeric inputs, validating everything.
    pub fn new(
        params: PendulumParameters,
        angle_deg: f64,
        angular_velocity_deg_s: f64,
        time_step: f64,
    ) -> Result<Self, PendulumError> {
        params.validate()?;
        if !angle_deg.is_finite() || !angular_velocity_deg_s.is_finite() {
            return Err(PendulumError::InvalidParameters(
                "initial angle and angular velocity must be finite".into(),
            ));
        }
        if !(time_step.is_finite() && time_step > 0.0) {
            return Err(PendulumError::InvalidParameters(format!(
                "time step must be positive, got {}",
                time_step
            )));
        }
        Ok(Self {
            params,
            angle: deg_to_rad(angle_deg),
            angular_velocity: deg_to_rad(angular_velocity_deg_s),
            time_step,
        })
    }

    /// Parse the six text fields of a Start command, in the order
    /// length, mass, gravity, damping, angle (°), angular velocity (°/s).
    pub fn parse(fields: [&str; 6], time_step: f64) -> Result<Self, PendulumError> {
        let names = ["length", "mass", "gravity", "damping", "angle", "angular velocity"];
        let mut values = [0.0_f64; 6];
        for (i, (text, name)) in fields.iter().zip(names).enumerate() {
            values[i] = parse_field(text, name)?;
        }
        let [length, mass, gravity, damping, angle, angular_velocity] = values;
        Self::new(
            PendulumParameters::new(length, mass, damping, gravity),
            angle,
            angular_velocity,
            time_step,
        )
    }

    /// The state the integrator starts from.
    pub fn initial_state(&self) -> PendulumState {
        PendulumState::from_initial(self.angle, self.angular_velocity, self.time_step)
    }
}

fn parse_field(text: &str, name: &str) -> Result<f64, PendulumError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| PendulumError::InvalidParameters(format!("{}: '{}' is not a number", name, text)))?;
    if !value.is_finite() {
        return Err(PendulumError::InvalidParameters(format!("{} must be finite", name)));
    }
    Ok(value)
}
