//! Pressure projection: divergence, Jacobi pressure solve, gradient subtraction

use super::Pass;
use crate::simulation::program::{Program, StageUniforms};

/// Central-difference divergence of the velocity field
#[derive(Debug, Clone, Default)]
pub struct DivergencePass;

impl Pass for DivergencePass {
    type Params = ();

    fn label(&self) -> &'static str {
        "divergence"
    }

    fn configure(&mut self, _: &()) {}

    fn program(&self, stage: StageUniforms) -> Program {
        Program::Divergence(stage)
    }
}

/// Fixed-count Jacobi relaxation of `laplacian(p) = div`
///
/// Inputs are `[pressure, divergence]`. Reads clamp at the edge, which is a
/// zero-gradient (Neumann) pressure boundary.
#[derive(Debug, Clone)]
pub struct PressurePass {
    iterations: u32,
}

impl PressurePass {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Same count every frame so frame time stays bounded
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Pass for PressurePass {
    type Params = u32;

    fn label(&self) -> &'static str {
        "pressure"
    }

    fn configure(&mut self, iterations: &u32) {
        self.iterations = *iterations;
    }

    fn program(&self, stage: StageUniforms) -> Program {
        Program::Jacobi(stage)
    }
}

/// Subtracts the pressure gradient from velocity
///
/// Inputs are `[pressure, velocity]`.
#[derive(Debug, Clone, Default)]
pub struct GradientPass;

impl Pass for GradientPass {
    type Params = ();

    fn label(&self) -> &'static str {
        "gradient"
    }

    fn configure(&mut self, _: &()) {}

    fn program(&self, stage: StageUniforms) -> Program {
        Program::Gradient(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::backend::Backend;
    use crate::simulation::cpu::CpuBackend;
    use crate::simulation::field::FieldDesc;
    use crate::simulation::field_buffer::FieldBuffer;

    #[test]
    fn test_projection_reduces_divergence() {
        let mut backend = CpuBackend::new();
        let (w, h) = (32, 32);
        let vdesc = FieldDesc::vector(w, h);
        let sdesc = FieldDesc::scalar(w, h);

        // Radial outflow from the centre is all divergence.
        let mut velocity = backend.create_field(&vdesc, "velocity").unwrap();
        backend.write_cells(&mut velocity, |x, y| {
            let dx = x as f32 - 15.5;
            let dy = y as f32 - 15.5;
            let fall = (-(dx * dx + dy * dy) / 40.0).exp();
            [dx * fall, dy * fall]
        });
        let mut divergence = backend.create_field(&sdesc, "divergence").unwrap();
        let mut pressure = FieldBuffer::allocate(&mut backend, sdesc, "pressure").unwrap();
        let mut corrected = backend.create_field(&vdesc, "corrected").unwrap();
        let stage = StageUniforms::new(&vdesc, 1.0 / 60.0, 0.0, 0);

        DivergencePass
            .execute(&mut backend, stage, &[&velocity], &mut divergence)
            .unwrap();
        let before = backend.read_field(&divergence).unwrap().max_magnitude();

        let solver = PressurePass::new(80);
        for _ in 0..solver.iterations() {
            let (current, next) = pressure.read_write();
            solver
                .execute(&mut backend, stage, &[current, &divergence], next)
                .unwrap();
            pressure.swap();
        }
        GradientPass
            .execute(&mut backend, stage, &[pressure.read(), &velocity], &mut corrected)
            .unwrap();

        DivergencePass
            .execute(&mut backend, stage, &[&corrected], &mut divergence)
            .unwrap();
        let after = backend.read_field(&divergence).unwrap().max_magnitude();
        assert!(after < 0.5 * before, "divergence {before} -> {after}");
    }
}
