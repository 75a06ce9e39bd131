//! Final blend of dye and velocity over the video
//!
//! The compositor is presentational only. A missing or rejected video frame
//! degrades the output to the simulation alone; it never fails a frame.

use crate::config::OverlaySettings;
use crate::error::{SimError, SimResult};
use crate::forcing::CoordinateTransform;
use crate::simulation::program::{
    CompositeUniforms, COMPOSITE_FLAG_MIRROR, COMPOSITE_FLAG_VIDEO,
};
use crate::simulation::{Backend, SimulationGraph};
use crate::video::VideoFrame;

pub struct Compositor {
    overlay: OverlaySettings,
    video_visible: bool,
    /// True once a frame has been accepted by the backend.
    has_video: bool,
    /// Set after an upload failure until the next accepted frame, so the
    /// warning is logged once per outage.
    degraded: bool,
    transform: CoordinateTransform,
}

impl Compositor {
    pub fn new(overlay: &OverlaySettings, transform: CoordinateTransform) -> Self {
        Self {
            overlay: *overlay,
            video_visible: overlay.video_visible,
            has_video: false,
            degraded: false,
            transform,
        }
    }

    /// Replace palette and gain settings; the visibility toggle is kept
    pub fn configure(&mut self, overlay: &OverlaySettings) {
        self.overlay = *overlay;
    }

    /// Video placement, shared with the forcing adapter
    pub fn set_transform(&mut self, transform: CoordinateTransform) {
        self.transform = transform;
    }

    pub fn set_video_visible(&mut self, visible: bool) {
        if self.video_visible != visible {
            log::info!("Compositor: video overlay {}", if visible { "on" } else { "off" });
        }
        self.video_visible = visible;
    }

    /// Flip the overlay and return the new state
    pub fn toggle_video(&mut self) -> bool {
        self.set_video_visible(!self.video_visible);
        self.video_visible
    }

    pub fn is_video_visible(&self) -> bool {
        self.video_visible
    }

    /// Opacity the video is drawn with right now
    pub fn video_opacity(&self) -> f32 {
        if self.video_visible && self.has_video {
            self.overlay.video_opacity
        } else {
            0.0
        }
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    /// Hand the latest video frame to the backend
    ///
    /// A rejected frame is logged and dropped; the next composite shows the
    /// simulation alone.
    pub fn upload_video<B: Backend>(&mut self, backend: &mut B, frame: Option<&VideoFrame>) {
        match backend.set_video_frame(frame) {
            Ok(()) => {
                self.has_video = frame.is_some();
                if self.degraded && self.has_video {
                    log::info!("Compositor: video restored");
                }
                self.degraded = false;
            }
            Err(err) => {
                if !self.degraded {
                    log::warn!("Compositor: {}; showing simulation only", err);
                }
                self.degraded = true;
                self.has_video = false;
                let _ = backend.set_video_frame(None);
            }
        }
    }

    /// Uniform block for a target of `width` x `height` pixels
    pub fn uniforms(&self, width: u32, height: u32) -> CompositeUniforms {
        let mut flags = 0;
        if self.video_opacity() > 0.0 {
            flags |= COMPOSITE_FLAG_VIDEO;
        }
        if self.transform.mirrored() {
            flags |= COMPOSITE_FLAG_MIRROR;
        }
        let scale = self.transform.scale();
        CompositeUniforms {
            resolution: [width.max(1) as f32, height.max(1) as f32],
            video_scale: [scale.x, scale.y],
            palette_slow: self.overlay.palette_slow,
            palette_fast: self.overlay.palette_fast,
            video_opacity: self.video_opacity(),
            dye_gain: self.overlay.dye_gain,
            velocity_scale: self.overlay.velocity_scale,
            flags,
        }
    }

    /// Render the graph's dye and velocity into `target`
    ///
    /// # Errors
    /// `SimError::Halted` when the graph currently holds no fields.
    pub fn present<B: Backend>(
        &self,
        backend: &mut B,
        graph: &SimulationGraph<B>,
        target: &mut B::Target,
        size: (u32, u32),
    ) -> SimResult<()> {
        let (Some(dye), Some(velocity)) = (graph.dye(), graph.velocity()) else {
            return Err(SimError::Halted);
        };
        let uniforms = self.uniforms(size.0, size.1);
        backend.composite(&uniforms, dye, velocity, target)
    }

    /// Drop the backend's video texture
    pub fn release<B: Backend>(&mut self, backend: &mut B) {
        let _ = backend.set_video_frame(None);
        self.has_video = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FitMode, SimulationParameters};
    use crate::forcing::{ForcingSample, ForcingSource};
    use crate::simulation::{CpuBackend, CpuImage};
    use cgmath::Vector2;

    fn setup() -> (CpuBackend, SimulationGraph<CpuBackend>) {
        let mut backend = CpuBackend::new();
        let params = SimulationParameters::default()
            .with_seed(3)
            .with_noise_strength(0.0);
        let graph = SimulationGraph::new(&mut backend, params, 16, 16).unwrap();
        (backend, graph)
    }

    fn splat() -> ForcingSample {
        ForcingSample {
            position: Vector2::new(0.5, 0.5),
            velocity: Vector2::new(0.5, 0.0),
            radius: 0.2,
            strength: 1.0,
            source: ForcingSource::Pointer,
        }
    }

    #[test]
    fn test_video_hidden_by_default() {
        let (mut backend, graph) = setup();
        let mut compositor =
            Compositor::new(&OverlaySettings::default(), CoordinateTransform::identity());
        compositor.upload_video(&mut backend, Some(&VideoFrame::solid(8, 8, [255; 4])));
        assert!(compositor.has_video());
        assert_eq!(compositor.video_opacity(), 0.0);

        let mut image = CpuImage::new(8, 8);
        compositor
            .present(&mut backend, &graph, &mut image, (8, 8))
            .unwrap();
        assert_eq!(image.pixel(4, 4), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_visible_video_uses_overlay_opacity() {
        let (mut backend, graph) = setup();
        let mut compositor =
            Compositor::new(&OverlaySettings::default(), CoordinateTransform::identity());
        compositor.upload_video(&mut backend, Some(&VideoFrame::solid(8, 8, [255; 4])));
        assert!(compositor.toggle_video());

        let mut image = CpuImage::new(8, 8);
        compositor
            .present(&mut backend, &graph, &mut image, (8, 8))
            .unwrap();
        let p = image.pixel(2, 2);
        assert!((p[0] - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_rejected_frame_degrades_to_simulation_only() {
        let (mut backend, graph) = setup();
        let mut compositor =
            Compositor::new(&OverlaySettings::default(), CoordinateTransform::identity());
        compositor.set_video_visible(true);
        let broken = VideoFrame {
            width: 4,
            height: 4,
            pixels: vec![0; 7],
        };
        compositor.upload_video(&mut backend, Some(&broken));
        assert!(!compositor.has_video());

        let uniforms = compositor.uniforms(8, 8);
        assert!(!uniforms.has_video());
        let mut image = CpuImage::new(8, 8);
        assert!(compositor
            .present(&mut backend, &graph, &mut image, (8, 8))
            .is_ok());
    }

    #[test]
    fn test_dye_shows_over_black() {
        let (mut backend, mut graph) = setup();
        graph.step(&mut backend, 1.0 / 60.0, &[splat()]).unwrap();
        let compositor =
            Compositor::new(&OverlaySettings::default(), CoordinateTransform::identity());

        let mut image = CpuImage::new(16, 16);
        compositor
            .present(&mut backend, &graph, &mut image, (16, 16))
            .unwrap();
        let centre = image.pixel(8, 8);
        assert!(centre[..3].iter().any(|&c| c > 0.0));
        assert_eq!(image.pixel(0, 0)[..3], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mirror_flag_follows_transform() {
        let video = crate::video::VideoInfo::new(16, 9);
        let mirrored = CoordinateTransform::new((16, 9), video, FitMode::Cover, true);
        let compositor = Compositor::new(&OverlaySettings::default(), mirrored);
        assert!(compositor.uniforms(16, 9).mirrored());
    }

    #[test]
    fn test_present_after_destroy_is_halted() {
        let (mut backend, mut graph) = setup();
        graph.destroy(&mut backend);
        let compositor =
            Compositor::new(&OverlaySettings::default(), CoordinateTransform::identity());
        let mut image = CpuImage::new(4, 4);
        assert!(matches!(
            compositor.present(&mut backend, &graph, &mut image, (4, 4)),
            Err(SimError::Halted)
        ));
    }
}
