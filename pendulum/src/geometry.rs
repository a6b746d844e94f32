//! Display geometry: where the bob sits for a given angle.
//!
//! ## Rust Lesson #3: Structs & Derives
//!
//! `#[derive(Clone, Copy)]` on a small all-`f64` struct means values are
//! copied implicitly, so `PivotPoint` can be passed by value everywhere
//! without borrowing gymnastics.

/// A 2D point in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The fixed suspension point and the drawn arm length.
///
/// This is presentation geometry, not physics: the arm length here is in
/// display units and has nothing to do with `PendulumParameters::length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotPoint {
    pub arm_length: f64,
    pub x: f64,
    pub y: f64,
}

impl PivotPoint {
    #[inline]
    pub fn new(arm_length: f64, x: f64, y: f64) -> Self {
        Self { arm_length, x, y }
    }

    #[inline]
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

impl Default for PivotPoint {
    fn default() -> Self {
        Self::new(170.0, 395.0, 195.0)
    }
}

/// Map an angle (radians, 0 = hanging straight down) to the bob position.
///
/// Screen convention: y grows downwards, so a zero angle puts the bob
/// directly below the pivot.
#[inline]
pub fn project(angle: f64, pivot: PivotPoint) -> Point {
    Point::new(
        pivot.x + pivot.arm_length * angle.sin(),
        pivot.y + pivot.arm_length * angle.cos(),
    )
}
