//! # flowveil prelude
//!
//! ```no_run
//! use flowveil::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     EffectApp::new(SimulationParameters::default())?
//!         .with_video(Box::new(StaticVideo::new(VideoFrame::gradient(640, 360))))
//!         .run()
//! }
//! ```

// Application and session
pub use crate::app::EffectApp;
pub use crate::session::{ArSession, InitError, InitStage};

// Configuration and errors
pub use crate::config::{
    BoundaryMode, FitMode, LandmarkSettings, NoiseKind, NoiseSettings, OverlaySettings,
    PointerSettings, SimulationParameters,
};
pub use crate::error::{ConfigError, SimError, SimResult};

// Simulation
pub use crate::simulation::{
    Backend, CpuBackend, CpuImage, FieldData, GpuBackend, GraphState, SimulationGraph,
};

// Collaborators
pub use crate::forcing::{ForcingAdapter, ForcingSample, ForcingSource, PointerState};
pub use crate::gfx::GpuContext;
pub use crate::output::Compositor;
pub use crate::tracking::{pose, Landmark, LandmarkSet, NullTracker, RecordedTracker, Tracker};
pub use crate::video::{NoVideo, StaticVideo, VideoFrame, VideoInfo, VideoSource};

// Re-export common external dependencies
pub use cgmath::Vector2;
