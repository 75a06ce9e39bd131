//! Presentation of the simulated fields over the passthrough video

pub mod compositor;

pub use compositor::Compositor;
