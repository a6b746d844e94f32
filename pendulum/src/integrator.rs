//! Fixed-step, history-based pendulum integrator.
//!
//! The scheme keeps two angles (current and one step back) instead of a
//! velocity. Damping uses the *backward* difference `(prev - angle) / dt`,
//! so the velocity estimate lags by a step. That asymmetry is part of the
//! observable behavior and is pinned by `damping_uses_backward_difference`.

use crate::geometry::{PivotPoint, Point, project};
use crate::params::PendulumParameters;

/// Mutable per-run integrator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumState {
    /// Current angle in radians.
    pub angle: f64,
    /// Angle one step back, in radians.
    pub angle_previous: f64,
    /// Simulated seconds since Start.
    pub elapsed: f64,
    /// Fixed time step `dt` in seconds.
    pub time_step: f64,
}

impl PendulumState {
    /// Seed the two-point history from an angle and angular velocity.
    pub fn from_initial(angle: f64, angular_velocity: f64, time_step: f64) -> Self {
        Self {
            angle,
            angle_previous: angle - angular_velocity * time_step,
            elapsed: 0.0,
            time_step,
        }
    }

    /// Backward-difference angular velocity in rad/s.
    #[inline]
    pub fn angular_velocity(&self) -> f64 {
        (self.angle - self.angle_previous) / self.time_step
    }
}

/// Angular acceleration term of the scheme.
#[inline]
pub fn acceleration(params: &PendulumParameters, state: &PendulumState) -> f64 {
    params.gravity / params.length * state.angle.sin()
        - params.damping / params.mass * (state.angle_previous - state.angle) / state.time_step
}

/// Advance one step. Returns the new state and the projected bob position.
pub fn step(params: &PendulumParameters, state: &PendulumState, pivot: PivotPoint) -> (PendulumState, Point) {
    let dt = state.time_step;
    let accel = acceleration(params, state);
    let angle_new = 2.0 * state.angle - state.angle_previous - accel * dt * dt;

    let next = PendulumState {
        angle: angle_new,
        angle_previous: state.angle,
        elapsed: state.elapsed + dt,
        time_step: dt,
    };
    (next, project(next.angle, pivot))
}
