//! # pendulum
//!
//! Damped pendulum simulation core: a fixed-step history integrator, an
//! append-only trajectory log, a cancellable background run loop, and a
//! plot renderer that turns a run into PNG line plots.
//!
//! ## Rust Lesson #7: Modules
//!
//! Every module is declared explicitly with `pub mod`, and the handful of
//! types most callers need are re-exported at the crate root so a binary
//! can `use pendulum::{Simulation, StartRequest}` without knowing the
//! file layout.

pub mod display;
pub mod error;
pub mod geometry;
pub mod integrator;
pub mod params;
pub mod plot;
pub mod simulation;
pub mod trajectory;

// Re-export common types at crate root for convenience.
pub use display::{DisplayUpdate, normalize_degrees};
pub use error::PendulumError;
pub use geometry::{PivotPoint, Point, project};
pub use integrator::{PendulumState, acceleration, step};
pub use params::{DEFAULT_TIME_STEP, PendulumParameters, StartRequest, deg_to_rad, rad_to_deg};
pub use plot::{PlotArtifact, PlotKind, PlotRenderer, PlotSet};
pub use simulation::{
    CancelToken, ExitReason, LoopExit, LoopPhase, Pacer, RealTimePacer, RunEvent, Simulation,
    Unpaced, is_settled,
};
pub use trajectory::{SampleSeries, TrajectoryLog, TrajectorySample};
