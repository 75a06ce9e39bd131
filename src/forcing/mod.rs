//! Forcing: turning pointer and tracked landmarks into splat samples
//!
//! The [`ForcingAdapter`] is the boundary between irregular per-frame input
//! (a pointer that may be idle, persons that come and go, landmarks with
//! varying confidence) and the bounded, dense sample list the forcing pass
//! consumes.

pub mod adapter;
pub mod pointer;
pub mod transform;

pub use adapter::ForcingAdapter;
pub use pointer::{PointerMotion, PointerState};
pub use transform::CoordinateTransform;

use cgmath::{InnerSpace, Vector2};

/// Where a forcing sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForcingSource {
    Pointer,
    Landmark { person: usize, landmark: usize },
}

/// A transient, localized impulse for the current frame only
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcingSample {
    /// Normalized field coordinates, origin top-left.
    pub position: Vector2<f32>,
    /// Field units (widths, heights) per second.
    pub velocity: Vector2<f32>,
    /// Fraction of the field height.
    pub radius: f32,
    pub strength: f32,
    pub source: ForcingSource,
}

impl ForcingSample {
    pub fn person(&self) -> Option<usize> {
        match self.source {
            ForcingSource::Landmark { person, .. } => Some(person),
            ForcingSource::Pointer => None,
        }
    }
}

/// Scale `v` down to `max_speed` when it is faster
pub(crate) fn clamp_speed(v: Vector2<f32>, max_speed: f32) -> Vector2<f32> {
    let speed = v.magnitude();
    if speed > max_speed && speed > 0.0 {
        v * (max_speed / speed)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_speed_keeps_direction() {
        let v = clamp_speed(Vector2::new(3.0, -4.0), 1.0);
        assert!((v.magnitude() - 1.0).abs() < 1e-6);
        assert!((v.x - 0.6).abs() < 1e-6 && (v.y + 0.8).abs() < 1e-6);
        assert_eq!(clamp_speed(Vector2::new(0.1, 0.0), 1.0), Vector2::new(0.1, 0.0));
    }
}
