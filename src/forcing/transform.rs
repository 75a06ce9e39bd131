//! Video space to field space mapping
//!
//! Both spaces are normalized to `[0, 1]` with the origin at the top-left.
//! The mapping is a per-axis scale about the centre plus an optional
//! horizontal mirror, derived purely from the two frame sizes.

use cgmath::Vector2;

use crate::config::FitMode;
use crate::video::VideoInfo;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    /// Field-space extent of one video unit along each axis.
    scale: Vector2<f32>,
    mirror: bool,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl CoordinateTransform {
    pub fn identity() -> Self {
        Self {
            scale: Vector2::new(1.0, 1.0),
            mirror: false,
        }
    }

    /// Build the transform for a field of `field` cells showing `video`
    ///
    /// An empty video (no feed attached) places video space over the whole
    /// field.
    pub fn new(field: (u32, u32), video: VideoInfo, fit: FitMode, mirror: bool) -> Self {
        let field_aspect = field.0.max(1) as f32 / field.1.max(1) as f32;
        let Some(video_aspect) = video.aspect() else {
            return Self {
                scale: Vector2::new(1.0, 1.0),
                mirror,
            };
        };

        let wider = video_aspect > field_aspect;
        let ratio = video_aspect / field_aspect;
        let scale = match fit {
            FitMode::Stretch => Vector2::new(1.0, 1.0),
            FitMode::Cover if wider => Vector2::new(ratio, 1.0),
            FitMode::Cover => Vector2::new(1.0, 1.0 / ratio),
            FitMode::Contain if wider => Vector2::new(1.0, 1.0 / ratio),
            FitMode::Contain => Vector2::new(ratio, 1.0),
        };
        Self { scale, mirror }
    }

    pub fn scale(&self) -> Vector2<f32> {
        self.scale
    }

    pub fn mirrored(&self) -> bool {
        self.mirror
    }

    /// Map a video-space point into the field, or `None` if it lands outside
    pub fn video_to_field(&self, point: Vector2<f32>) -> Option<Vector2<f32>> {
        let x = if self.mirror { 1.0 - point.x } else { point.x };
        let field = Vector2::new(
            0.5 + (x - 0.5) * self.scale.x,
            0.5 + (point.y - 0.5) * self.scale.y,
        );
        let inside = (0.0..=1.0).contains(&field.x) && (0.0..=1.0).contains(&field.y);
        inside.then_some(field)
    }

    /// Inverse of [`video_to_field`](Self::video_to_field), unclipped
    pub fn field_to_video(&self, point: Vector2<f32>) -> Vector2<f32> {
        let x = 0.5 + (point.x - 0.5) / self.scale.x;
        let y = 0.5 + (point.y - 0.5) / self.scale.y;
        Vector2::new(if self.mirror { 1.0 - x } else { x }, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn close(a: Vector2<f32>, b: Vector2<f32>) -> bool {
        (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS
    }

    #[test]
    fn test_cover_crops_wide_video() {
        let t = CoordinateTransform::new((100, 100), VideoInfo::new(1600, 900), FitMode::Cover, false);
        assert!(close(t.scale(), Vector2::new(16.0 / 9.0, 1.0)));
        assert_eq!(
            t.video_to_field(Vector2::new(0.5, 0.5)),
            Some(Vector2::new(0.5, 0.5))
        );
        // Cropped away on the left.
        assert_eq!(t.video_to_field(Vector2::new(0.1, 0.5)), None);
    }

    #[test]
    fn test_contain_letterboxes() {
        let t = CoordinateTransform::new((100, 100), VideoInfo::new(1600, 900), FitMode::Contain, false);
        let top = t.video_to_field(Vector2::new(0.5, 0.0)).unwrap();
        assert!((top.y - (0.5 - 0.5 * 9.0 / 16.0)).abs() < EPS);
    }

    #[test]
    fn test_mirror_flips_x_only() {
        let t = CoordinateTransform::new((64, 64), VideoInfo::new(64, 64), FitMode::Cover, true);
        let p = t.video_to_field(Vector2::new(0.25, 0.1)).unwrap();
        assert!(close(p, Vector2::new(0.75, 0.1)));
    }

    #[test]
    fn test_round_trip_through_field() {
        let t = CoordinateTransform::new((320, 180), VideoInfo::new(480, 640), FitMode::Cover, true);
        let v = Vector2::new(0.4, 0.55);
        let f = t.video_to_field(v).unwrap();
        assert!(close(t.field_to_video(f), v));
    }

    #[test]
    fn test_recomputed_on_resize() {
        let video = VideoInfo::new(1280, 720);
        let wide = CoordinateTransform::new((1280, 720), video, FitMode::Cover, false);
        let tall = CoordinateTransform::new((720, 1280), video, FitMode::Cover, false);
        assert!(close(wide.scale(), Vector2::new(1.0, 1.0)));
        assert_ne!(wide, tall);
    }

    #[test]
    fn test_empty_video_is_identity() {
        let t = CoordinateTransform::new((10, 30), VideoInfo::default(), FitMode::Cover, false);
        assert_eq!(t, CoordinateTransform::identity());
    }
}
