//! Graphics plumbing: the explicit GPU context and texture helpers

pub mod context;
pub mod texture;

pub use context::GpuContext;
pub use texture::VideoTexture;
