//! Forcing injection stage

use bytemuck::Zeroable;

use super::Pass;
use crate::forcing::ForcingSample;
use crate::simulation::program::{
    Program, SplatSample, SplatUniforms, StageUniforms, MAX_FORCING_SAMPLES, SPLAT_TARGET_DYE,
    SPLAT_TARGET_VELOCITY,
};

/// Which field a [`ForcingPass`] splats into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcingTarget {
    /// Velocity impulses plus the noise acceleration.
    Velocity,
    /// Dye deposited at each sample.
    Dye,
}

/// Additively splats this frame's forcing samples into one field
#[derive(Debug, Clone)]
pub struct ForcingPass {
    target: ForcingTarget,
    dye_amount: f32,
    samples: Vec<ForcingSample>,
}

impl ForcingPass {
    pub fn new(target: ForcingTarget, dye_amount: f32) -> Self {
        Self {
            target,
            dye_amount,
            samples: Vec::with_capacity(MAX_FORCING_SAMPLES),
        }
    }

    pub fn set_dye_amount(&mut self, dye_amount: f32) {
        self.dye_amount = dye_amount;
    }

    pub fn samples(&self) -> &[ForcingSample] {
        &self.samples
    }

    fn to_cells(&self, sample: &ForcingSample, resolution: [f32; 2]) -> SplatSample {
        SplatSample {
            center: [
                sample.position.x * resolution[0],
                sample.position.y * resolution[1],
            ],
            velocity: [
                sample.velocity.x * resolution[0],
                sample.velocity.y * resolution[1],
            ],
            radius: sample.radius * resolution[1],
            strength: sample.strength,
            dye: self.dye_amount * sample.strength,
            _padding: 0.0,
        }
    }
}

impl Pass for ForcingPass {
    type Params = [ForcingSample];

    fn label(&self) -> &'static str {
        match self.target {
            ForcingTarget::Velocity => "forcing.velocity",
            ForcingTarget::Dye => "forcing.dye",
        }
    }

    /// Take this frame's samples; anything past the per-pass cap is dropped
    fn configure(&mut self, samples: &[ForcingSample]) {
        if samples.len() > MAX_FORCING_SAMPLES {
            log::debug!(
                "{}: {} forcing samples, keeping the first {}",
                self.label(),
                samples.len(),
                MAX_FORCING_SAMPLES
            );
        }
        self.samples.clear();
        self.samples
            .extend(samples.iter().take(MAX_FORCING_SAMPLES).cloned());
    }

    fn program(&self, stage: StageUniforms) -> Program {
        let mut uniforms = SplatUniforms::zeroed();
        uniforms.stage = stage;
        uniforms.count = self.samples.len() as u32;
        match self.target {
            ForcingTarget::Velocity => {
                uniforms.target = SPLAT_TARGET_VELOCITY;
                uniforms.noise_weight = stage.dt;
            }
            ForcingTarget::Dye => uniforms.target = SPLAT_TARGET_DYE,
        }
        for (slot, sample) in uniforms.samples.iter_mut().zip(&self.samples) {
            *slot = self.to_cells(sample, stage.resolution);
        }
        Program::Splat(Box::new(uniforms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forcing::ForcingSource;
    use crate::simulation::backend::Backend;
    use crate::simulation::cpu::CpuBackend;
    use crate::simulation::field::FieldDesc;
    use cgmath::Vector2;

    fn sample(x: f32, y: f32, strength: f32) -> ForcingSample {
        ForcingSample {
            position: Vector2::new(x, y),
            velocity: Vector2::new(1.0, 0.0),
            radius: 0.25,
            strength,
            source: ForcingSource::Pointer,
        }
    }

    #[test]
    fn test_samples_are_scaled_to_cells() {
        let mut pass = ForcingPass::new(ForcingTarget::Dye, 0.5);
        pass.configure(&[sample(0.5, 0.25, 2.0)]);
        let stage = StageUniforms::new(&FieldDesc::scalar(200, 100), 0.02, 0.0, 0);
        let Program::Splat(u) = pass.program(stage) else {
            panic!("expected a splat program");
        };
        assert_eq!(u.count, 1);
        assert_eq!(u.target, SPLAT_TARGET_DYE);
        assert_eq!(u.samples[0].center, [100.0, 25.0]);
        assert_eq!(u.samples[0].velocity, [200.0, 0.0]);
        assert_eq!(u.samples[0].radius, 25.0);
        assert_eq!(u.samples[0].dye, 1.0);
    }

    #[test]
    fn test_configure_truncates_to_cap() {
        let mut pass = ForcingPass::new(ForcingTarget::Velocity, 1.0);
        let many: Vec<_> = (0..40).map(|i| sample(i as f32 / 40.0, 0.5, 1.0)).collect();
        pass.configure(&many);
        assert_eq!(pass.samples().len(), MAX_FORCING_SAMPLES);
        assert_eq!(pass.samples()[0], many[0]);
    }

    #[test]
    fn test_falloff_is_monotonic_and_compact() {
        let mut backend = CpuBackend::new();
        let desc = FieldDesc::vector(128, 128);
        let velocity = backend.create_field(&desc, "velocity").unwrap();
        let noise = backend.create_field(&desc, "noise").unwrap();
        let mut out = backend.create_field(&desc, "out").unwrap();

        let mut pass = ForcingPass::new(ForcingTarget::Velocity, 1.0);
        pass.configure(&[sample(0.5, 0.5, 3.0)]);
        let stage = StageUniforms::new(&desc, 1.0 / 60.0, 0.0, 1);
        pass.execute(&mut backend, stage, &[&velocity, &noise], &mut out)
            .unwrap();
        let data = backend.read_field(&out).unwrap();

        // Walk right from the centre along row 64; radius is 32 cells.
        let profile: Vec<f32> = (64..128).map(|x| data.magnitude(x, 64)).collect();
        assert!(profile[0] > 0.0);
        for pair in profile.windows(2).take(32) {
            assert!(pair[1] <= pair[0], "profile increases: {:?}", pair);
        }
        assert!(profile[32..].iter().all(|&m| m == 0.0));
        assert!((profile[0] - 3.0 * 128.0).abs() / (3.0 * 128.0) < 0.01);
    }
}
