//! Error types for the flowveil engine
//!
//! Configuration problems are fatal and reported before any GPU resource is
//! allocated. Resource exhaustion is recoverable: the simulation halts and the
//! host decides whether to retry. Missing tracker output or an idle pointer are
//! not errors at all and never show up here.

use thiserror::Error;

use crate::simulation::program::ProgramKind;

/// Invalid construction-time configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("field resolution {width}x{height} is invalid (each side must be 1..={max})")]
    InvalidResolution { width: u32, height: u32, max: u32 },

    #[error("parameter `{name}` must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: f32,
    },

    #[error("dt bounds are inverted: dt_min {min} > dt_max {max}")]
    InvertedDtBounds { min: f32, max: f32 },

    #[error("boundary band of {thickness} cells leaves no interior in a {width}x{height} field")]
    BoundaryTooThick {
        thickness: u32,
        width: u32,
        height: u32,
    },

    #[error("landmark forcing subset is empty")]
    EmptyLandmarkSubset,
}

/// Errors raised by the simulation pipeline and its backends
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shader `{label}` failed to compile: {message}")]
    ShaderCompile { label: String, message: String },

    #[error("GPU allocation failed for `{label}`: {message}")]
    ResourceExhausted { label: String, message: String },

    #[error("program `{program:?}` writes a {expected_width}x{expected_height} field but an input is {found_width}x{found_height}")]
    ResolutionMismatch {
        program: ProgramKind,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("program `{program:?}` expects {expected} input field(s), got {found}")]
    InputCount {
        program: ProgramKind,
        expected: usize,
        found: usize,
    },

    #[error("no pipeline registered for program `{0:?}`")]
    MissingPipeline(ProgramKind),

    #[error("simulation halted after a failed allocation; resize again to recover")]
    Halted,

    #[error("simulation has been destroyed")]
    Destroyed,

    #[error("field readback failed: {0}")]
    Readback(String),

    #[error("video frame upload failed: {0}")]
    VideoUpload(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),
}

pub type SimResult<T> = Result<T, SimError>;
