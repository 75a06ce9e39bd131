//! Pipeline stages
//!
//! Each stage is an independent type implementing [`Pass`]. A pass owns only
//! its own parameters; the fields it reads and writes are lent to it by the
//! graph for the duration of one `execute` call, and the graph decides when
//! the target buffer is swapped.

pub mod advection;
pub mod diffusion;
pub mod forcing;
pub mod noise;
pub mod projection;

pub use advection::AdvectionPass;
pub use diffusion::DiffusionPass;
pub use forcing::{ForcingPass, ForcingTarget};
pub use noise::NoisePass;
pub use projection::{DivergencePass, GradientPass, PressurePass};

use crate::error::SimResult;
use crate::simulation::backend::Backend;
use crate::simulation::program::{Program, StageUniforms};

/// One stage of the simulation graph
pub trait Pass {
    /// Typed parameter bag accepted by [`Pass::configure`]
    type Params: ?Sized;

    fn label(&self) -> &'static str;

    /// Replace the stage parameters; only called between frames
    fn configure(&mut self, params: &Self::Params);

    /// Build the program for this frame from the shared stage header
    fn program(&self, stage: StageUniforms) -> Program;

    /// Run the stage once into `output`, leaving the buffer unswapped
    ///
    /// # Arguments
    /// * `backend` - Backend owning the fields
    /// * `stage` - Resolution, dt, time and boundary band for this call
    /// * `inputs` - Read-only fields in the program's input order
    /// * `output` - Write half of the target field buffer
    fn execute<B: Backend>(
        &self,
        backend: &mut B,
        stage: StageUniforms,
        inputs: &[&B::Field],
        output: &mut B::Field,
    ) -> SimResult<()> {
        log::trace!("{}: executing {}", backend.name(), self.label());
        backend.execute(&self.program(stage), inputs, output)
    }
}
