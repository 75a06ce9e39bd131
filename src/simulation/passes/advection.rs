//! Semi-Lagrangian advection

use super::Pass;
use crate::simulation::program::{AdvectUniforms, Program, StageUniforms};

/// Carries a field along the velocity by tracing each cell backwards
///
/// Inputs are `[velocity, source]`. The result decays as
/// `q / (1 + dissipation * dt)`, which stays bounded for any dt.
#[derive(Debug, Clone)]
pub struct AdvectionPass {
    label: &'static str,
    dissipation: f32,
}

impl AdvectionPass {
    pub fn new(label: &'static str, dissipation: f32) -> Self {
        Self { label, dissipation }
    }

    pub fn dissipation(&self) -> f32 {
        self.dissipation
    }
}

impl Pass for AdvectionPass {
    type Params = f32;

    fn label(&self) -> &'static str {
        self.label
    }

    fn configure(&mut self, dissipation: &f32) {
        self.dissipation = *dissipation;
    }

    fn program(&self, stage: StageUniforms) -> Program {
        Program::Advect(AdvectUniforms {
            stage,
            dissipation: self.dissipation,
            _padding: [0.0; 3],
        })
    }
}
