use crate::core::geo::{LatLng, Point};

/// Values that can be blended linearly
pub trait Interpolatable {
    fn lerp(&self, other: &Self, t: f64) -> Self;
}

pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two f64 values
    pub fn linear(start: f64, end: f64, t: f64) -> f64 {
        start + (end - start) * t
    }

    /// Wraps any angle in degrees into `[0, 360)`
    pub fn normalize_heading(degrees: f64) -> f64 {
        let wrapped = degrees.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360 for tiny negative inputs
        if wrapped >= 360.0 {
            0.0
        } else {
            wrapped
        }
    }

    /// Signed difference `to - from` along the shorter arc, in `(-180, 180]`
    pub fn heading_delta(from: f64, to: f64) -> f64 {
        let delta = (to - from).rem_euclid(360.0);
        if delta > 180.0 {
            delta - 360.0
        } else {
            delta
        }
    }

    /// Interpolates a heading along the shorter arc
    pub fn heading(start: f64, end: f64, t: f64) -> f64 {
        Self::normalize_heading(start + Self::heading_delta(start, end) * t)
    }
}

impl Interpolatable for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Interpolation::linear(*self, *other, t)
    }
}

impl Interpolatable for LatLng {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        LatLng::new(
            Interpolation::linear(self.lat, other.lat, t),
            Interpolation::linear(self.lng, other.lng, t),
        )
    }
}

impl Interpolatable for Point {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Point::new(
            Interpolation::linear(self.x, other.x, t),
            Interpolation::linear(self.y, other.y, t),
        )
    }
}
