// src/simulation/mod.rs
//! Simulation pipeline
//!
//! Fields live behind a [`Backend`]; the [`SimulationGraph`] owns their
//! ping-pong buffers and runs the fixed pass order each frame.

pub mod backend;
pub mod cpu;
pub mod field;
pub mod field_buffer;
pub mod gpu;
pub mod graph;
pub mod passes;
pub mod program;

pub use backend::{Backend, FieldHandle};
pub use cpu::{CpuBackend, CpuField, CpuImage};
pub use field::{FieldData, FieldDesc, FieldKind};
pub use field_buffer::FieldBuffer;
pub use gpu::{GpuBackend, GpuField};
pub use graph::{GraphState, SimulationGraph};
pub use program::{Program, ProgramKind, MAX_FORCING_SAMPLES};
