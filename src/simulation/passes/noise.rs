//! Procedural turbulence stage

use bytemuck::Zeroable;

use super::Pass;
use crate::config::{NoiseKind, NoiseSettings};
use crate::simulation::program::{NoiseUniforms, Program, StageUniforms};

/// Writes a curl or divergent noise field that drifts over time
///
/// Reads no simulation state. The pass keeps its own time accumulator, which
/// only moves forward through [`NoisePass::advance`].
#[derive(Debug, Clone)]
pub struct NoisePass {
    kind: NoiseKind,
    strength: f32,
    scale: f32,
    speed: f32,
    seed: u32,
    time: f32,
}

impl NoisePass {
    /// # Arguments
    /// * `settings` - Noise shape and strength
    /// * `seed` - Resolved seed; `settings.seed` is ignored here
    pub fn new(settings: &NoiseSettings, seed: u32) -> Self {
        Self {
            kind: settings.kind,
            strength: settings.strength,
            scale: settings.scale,
            speed: settings.speed,
            seed,
            time: 0.0,
        }
    }

    /// `u_time += dt`
    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }
}

impl Pass for NoisePass {
    type Params = NoiseSettings;

    fn label(&self) -> &'static str {
        "noise"
    }

    /// An explicit seed in `settings` replaces the current one; `None` keeps it
    fn configure(&mut self, settings: &NoiseSettings) {
        self.kind = settings.kind;
        self.strength = settings.strength;
        self.scale = settings.scale;
        self.speed = settings.speed;
        if let Some(seed) = settings.seed {
            self.seed = seed;
        }
    }

    fn program(&self, stage: StageUniforms) -> Program {
        let mut uniforms = NoiseUniforms::zeroed();
        uniforms.stage = StageUniforms {
            time: self.time,
            ..stage
        };
        uniforms.strength = self.strength;
        uniforms.scale = self.scale;
        uniforms.speed = self.speed;
        uniforms.seed = self.seed;
        uniforms.kind = self.kind.as_u32();
        Program::Noise(uniforms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::field::FieldDesc;

    #[test]
    fn test_time_accumulates_into_uniforms() {
        let mut pass = NoisePass::new(&NoiseSettings::default(), 11);
        pass.advance(0.25);
        pass.advance(0.5);
        let stage = StageUniforms::new(&FieldDesc::vector(8, 8), 0.5, 99.0, 0);
        match pass.program(stage) {
            Program::Noise(u) => {
                assert_eq!(u.stage.time, 0.75);
                assert_eq!(u.stage.dt, 0.5);
                assert_eq!(u.seed, 11);
            }
            other => panic!("unexpected program {other:?}"),
        }
    }

    #[test]
    fn test_configure_keeps_resolved_seed() {
        let mut pass = NoisePass::new(&NoiseSettings::default(), 5);
        pass.configure(&NoiseSettings {
            strength: 3.0,
            ..NoiseSettings::default()
        });
        assert_eq!(pass.seed(), 5);
        assert_eq!(pass.strength(), 3.0);

        pass.configure(&NoiseSettings {
            seed: Some(9),
            ..NoiseSettings::default()
        });
        assert_eq!(pass.seed(), 9);
    }
}
