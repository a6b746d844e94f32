//! Values published to the display once per step.

use crate::geometry::Point;
use crate::integrator::PendulumState;
use crate::params::rad_to_deg;

/// What the presentation layer needs to refresh its labels and the bob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayUpdate {
    /// Simulated seconds.
    pub elapsed: f64,
    /// Angle in degrees, normalized into (-180, 180].
    pub angle_deg: f64,
    /// Angular velocity in degrees per second.
    pub angular_velocity_deg: f64,
    /// Projected bob position.
    pub position: Point,
}

impl DisplayUpdate {
    pub fn from_state(state: &PendulumState, position: Point) -> Self {
        Self {
            elapsed: state.elapsed,
            angle_deg: normalize_degrees(rad_to_deg(state.angle)),
            angular_velocity_deg: rad_to_deg(state.angular_velocity()),
            position,
        }
    }

    pub fn time_label(&self) -> String {
        format!("Time: {:.2} s", self.elapsed)
    }

    pub fn angle_label(&self) -> String {
        format!("Angle: {:.2}°", self.angle_deg)
    }

    pub fn angular_velocity_label(&self) -> String {
        format!("Angular velocity: {:.0} deg/s", self.angular_velocity_deg)
    }
}

/// Wrap any angle in degrees into the half-open interval (-180, 180].
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg % 360.0;
    if wrapped > 180.0 {
        wrapped - 360.0
    } else if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
