//! Pointer state fed by the host between frames

use cgmath::{Vector2, Zero};

use super::clamp_speed;

/// Latest pointer position and the position committed last frame
///
/// Positions are normalized field coordinates (the window covers the field).
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    current: Option<Vector2<f32>>,
    committed: Option<Vector2<f32>>,
}

/// What the pointer did since the previous frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerMotion {
    pub position: Vector2<f32>,
    pub delta: Vector2<f32>,
}

impl PointerMotion {
    pub fn is_still(&self) -> bool {
        self.delta.is_zero()
    }

    /// Velocity over `dt`, clamped to `max_speed`
    pub fn velocity(&self, dt: f32, max_speed: f32) -> Vector2<f32> {
        if dt <= 0.0 || self.is_still() {
            return Vector2::zero();
        }
        clamp_speed(self.delta / dt, max_speed)
    }
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a move in window pixels
    pub fn move_to_pixels(&mut self, x: f64, y: f64, width: u32, height: u32) {
        self.move_to(
            (x / width.max(1) as f64) as f32,
            (y / height.max(1) as f64) as f32,
        );
    }

    /// Record a move in normalized coordinates
    pub fn move_to(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.current = Some(Vector2::new(x, y));
        }
    }

    /// Pointer left the surface; no samples until it moves again
    pub fn leave(&mut self) {
        self.current = None;
        self.committed = None;
    }

    pub fn position(&self) -> Option<Vector2<f32>> {
        self.current
    }

    /// Close the frame: report motion since the last commit
    ///
    /// The first commit after the pointer appears reports a zero delta.
    pub fn commit(&mut self) -> Option<PointerMotion> {
        let position = self.current?;
        let delta = self
            .committed
            .map(|previous| position - previous)
            .unwrap_or_else(Vector2::zero);
        self.committed = Some(position);
        Some(PointerMotion { position, delta })
    }
}
