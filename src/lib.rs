// src/lib.rs
//! flowveil
//!
//! A GPU-resident fluid velocity field pushed around by a pointer and by
//! tracked body landmarks, composited over the passthrough video. Built on
//! wgpu and winit.
//!
//! The simulation runs on a [`simulation::Backend`]: [`simulation::GpuBackend`]
//! for real use, [`simulation::CpuBackend`] as the deterministic reference the
//! tests run against.

pub mod app;
pub mod config;
pub mod error;
pub mod forcing;
pub mod gfx;
pub mod output;
pub mod prelude;
pub mod session;
pub mod simulation;
pub mod tracking;
pub mod video;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::EffectApp;
pub use config::SimulationParameters;
pub use error::{ConfigError, SimError, SimResult};
pub use session::{ArSession, InitError, InitStage};
