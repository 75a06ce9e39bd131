//! Implicit viscous diffusion

use super::Pass;
use crate::simulation::program::{DiffuseUniforms, Program, StageUniforms};

/// One Jacobi sweep of `(I - nu dt laplacian) x = x0`
///
/// Inputs are `[x0, x_k]`; the output is `x_{k+1}`. Every sweep is a convex
/// combination of its inputs, so the solve cannot blow up whatever the
/// viscosity or dt.
#[derive(Debug, Clone)]
pub struct DiffusionPass {
    viscosity: f32,
    iterations: u32,
}

impl DiffusionPass {
    pub fn new(viscosity: f32, iterations: u32) -> Self {
        Self {
            viscosity,
            iterations,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Zero viscosity or zero iterations skip the stage entirely
    pub fn is_active(&self) -> bool {
        self.viscosity > 0.0 && self.iterations > 0
    }
}

impl Pass for DiffusionPass {
    /// `(viscosity, iterations)`
    type Params = (f32, u32);

    fn label(&self) -> &'static str {
        "diffuse"
    }

    fn configure(&mut self, &(viscosity, iterations): &(f32, u32)) {
        self.viscosity = viscosity;
        self.iterations = iterations;
    }

    fn program(&self, stage: StageUniforms) -> Program {
        Program::Diffuse(DiffuseUniforms {
            stage,
            alpha: self.viscosity * stage.dt,
            _padding: [0.0; 3],
        })
    }
}
