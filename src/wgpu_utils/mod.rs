// src/wgpu_utils/mod.rs
//! WGPU utility functions and helpers
//!
//! Builders for bind groups and typed uniform buffers shared by the field
//! programs and the compositor.

pub mod binding_builder;
pub mod binding_types;
pub mod uniform_buffer;

// Re-export main types
pub use binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc};
pub use uniform_buffer::UniformBuffer;
