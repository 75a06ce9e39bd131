//! Pointer and recorded-landmark forcing over a procedural backdrop
//!
//! Move the mouse to stir the field. A recorded pair of waving wrists stands
//! in for a live tracker. Press `V` to show the backdrop, `Escape` to quit.
//!
//! Run with `RUST_LOG=flowveil=debug cargo run --example pointer_fluid`.

use flowveil::prelude::*;

const VIDEO_WIDTH: u32 = 640;
const VIDEO_HEIGHT: u32 = 360;

/// Two wrists tracing slow figure-eights, one person, looping
fn waving_wrists(frames: usize) -> Vec<Vec<LandmarkSet>> {
    (0..frames)
        .map(|i| {
            let t = i as f32 / frames as f32 * std::f32::consts::TAU;
            let left = Landmark::new(0.35 + 0.12 * t.sin(), 0.5 + 0.1 * (2.0 * t).sin(), 0.9);
            let right = Landmark::new(0.65 - 0.12 * t.sin(), 0.5 - 0.1 * (2.0 * t).sin(), 0.9);
            vec![LandmarkSet::with_points(
                0,
                &[(pose::LEFT_WRIST, left), (pose::RIGHT_WRIST, right)],
            )]
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let params = SimulationParameters::default()
        .with_resolution_scale(0.35)
        .with_pressure_iterations(30)
        .with_noise_strength(20.0);

    EffectApp::new(params)?
        .with_title("flowveil: pointer fluid")
        .with_video(Box::new(StaticVideo::new(VideoFrame::gradient(
            VIDEO_WIDTH,
            VIDEO_HEIGHT,
        ))))
        .with_tracker(Box::new(RecordedTracker::new(waving_wrists(240))))
        .run()
}
