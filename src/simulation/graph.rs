//! The per-frame pass schedule
//!
//! [`SimulationGraph`] owns every field buffer and runs the stages in a fixed
//! order each `step`:
//!
//! 1. noise
//! 2. forcing into velocity (plus the noise acceleration), then into dye
//! 3. velocity self-advection
//! 4. viscous diffusion (skipped when inactive)
//! 5. divergence, fixed-count pressure Jacobi, gradient subtraction
//! 6. dye advection along the corrected velocity
//!
//! The graph is either running or destroyed. A failed (re)allocation halts it
//! until the next successful [`SimulationGraph::resize`].

use super::backend::Backend;
use super::field::{FieldData, FieldDesc};
use super::field_buffer::FieldBuffer;
use super::passes::{
    AdvectionPass, DiffusionPass, DivergencePass, ForcingPass, ForcingTarget, GradientPass,
    NoisePass, Pass, PressurePass,
};
use super::program::StageUniforms;
use crate::config::SimulationParameters;
use crate::error::{ConfigError, SimError, SimResult};
use crate::forcing::ForcingSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Running,
    Destroyed,
}

/// Allocate `N` resources in order, releasing the ones already made if any
/// allocation fails
fn allocate_all<B, T, const N: usize>(
    backend: &mut B,
    specs: [(FieldDesc, &str); N],
    allocate: impl Fn(&mut B, FieldDesc, &str) -> SimResult<T>,
    release: impl Fn(&mut B, T),
) -> SimResult<[T; N]> {
    let mut done = Vec::with_capacity(N);
    for (desc, label) in specs {
        match allocate(backend, desc, label) {
            Ok(item) => done.push(item),
            Err(err) => {
                for item in done {
                    release(backend, item);
                }
                return Err(err);
            }
        }
    }
    done.try_into().map_err(|_| SimError::ResourceExhausted {
        label: "field set".to_string(),
        message: "incomplete allocation".to_string(),
    })
}

struct FieldSet<F> {
    velocity: FieldBuffer<F>,
    /// Scratch pair for the viscous solve; swapped with `velocity` after it.
    viscous: FieldBuffer<F>,
    pressure: FieldBuffer<F>,
    dye: FieldBuffer<F>,
    divergence: F,
    noise: F,
    extent: (u32, u32),
}

impl<F> FieldSet<F> {
    fn allocate<B: Backend<Field = F>>(backend: &mut B, width: u32, height: u32) -> SimResult<Self> {
        let vector = FieldDesc::vector(width, height);
        let scalar = FieldDesc::scalar(width, height);

        let [velocity, viscous, pressure, dye] = allocate_all(
            backend,
            [
                (vector, "velocity"),
                (vector, "velocity.scratch"),
                (scalar, "pressure"),
                (scalar, "dye"),
            ],
            |b: &mut B, desc, label| FieldBuffer::allocate(b, desc, label),
            |b: &mut B, buffer: FieldBuffer<F>| buffer.release(b),
        )?;

        let singles = allocate_all(
            backend,
            [(scalar, "divergence"), (vector, "noise")],
            |b: &mut B, desc: FieldDesc, label: &str| b.create_field(&desc, label),
            |b: &mut B, field: F| b.release_field(field),
        );
        let [divergence, noise] = match singles {
            Ok(fields) => fields,
            Err(err) => {
                for buffer in [velocity, viscous, pressure, dye] {
                    buffer.release(backend);
                }
                return Err(err);
            }
        };

        Ok(Self {
            velocity,
            viscous,
            pressure,
            dye,
            divergence,
            noise,
            extent: (width, height),
        })
    }

    /// Zero every field in place
    fn clear<B: Backend<Field = F>>(&mut self, backend: &mut B) {
        for buffer in [
            &mut self.velocity,
            &mut self.viscous,
            &mut self.pressure,
            &mut self.dye,
        ] {
            buffer.for_each_mut(|field| backend.clear_field(field));
        }
        backend.clear_field(&mut self.divergence);
        backend.clear_field(&mut self.noise);
    }

    fn release<B: Backend<Field = F>>(self, backend: &mut B) {
        for buffer in [self.velocity, self.viscous, self.pressure, self.dye] {
            buffer.release(backend);
        }
        backend.release_field(self.divergence);
        backend.release_field(self.noise);
    }
}

struct Passes {
    noise: NoisePass,
    force_velocity: ForcingPass,
    force_dye: ForcingPass,
    advect_velocity: AdvectionPass,
    diffuse: DiffusionPass,
    divergence: DivergencePass,
    pressure: PressurePass,
    gradient: GradientPass,
    advect_dye: AdvectionPass,
}

impl Passes {
    fn new(params: &SimulationParameters, seed: u32) -> Self {
        Self {
            noise: NoisePass::new(&params.noise, seed),
            force_velocity: ForcingPass::new(ForcingTarget::Velocity, params.dye_amount),
            force_dye: ForcingPass::new(ForcingTarget::Dye, params.dye_amount),
            advect_velocity: AdvectionPass::new("advect.velocity", params.velocity_dissipation),
            diffuse: DiffusionPass::new(params.viscosity, params.viscous_iterations),
            divergence: DivergencePass,
            pressure: PressurePass::new(params.pressure_iterations),
            gradient: GradientPass,
            advect_dye: AdvectionPass::new("advect.dye", params.dye_dissipation),
        }
    }

    fn configure(&mut self, params: &SimulationParameters) {
        self.noise.configure(&params.noise);
        self.force_velocity.set_dye_amount(params.dye_amount);
        self.force_dye.set_dye_amount(params.dye_amount);
        self.advect_velocity.configure(&params.velocity_dissipation);
        self.diffuse
            .configure(&(params.viscosity, params.viscous_iterations));
        self.pressure.configure(&params.pressure_iterations);
        self.advect_dye.configure(&params.dye_dissipation);
    }

    fn run_frame<B: Backend>(
        &mut self,
        backend: &mut B,
        fields: &mut FieldSet<B::Field>,
        vector_stage: StageUniforms,
        forcing: &[ForcingSample],
    ) -> SimResult<()> {
        // Scalar fields carry no band; pressure clamps at the edge.
        let scalar_stage = vector_stage.with_boundary(0);

        self.noise.advance(vector_stage.dt);
        self.noise
            .execute(backend, vector_stage, &[], &mut fields.noise)?;

        self.force_velocity.configure(forcing);
        let (velocity, next) = fields.velocity.read_write();
        self.force_velocity
            .execute(backend, vector_stage, &[velocity, &fields.noise], next)?;
        fields.velocity.swap();

        self.force_dye.configure(forcing);
        let (dye, next) = fields.dye.read_write();
        self.force_dye
            .execute(backend, scalar_stage, &[dye], next)?;
        fields.dye.swap();

        let (velocity, next) = fields.velocity.read_write();
        self.advect_velocity
            .execute(backend, vector_stage, &[velocity, velocity], next)?;
        fields.velocity.swap();

        if self.diffuse.is_active() {
            for i in 0..self.diffuse.iterations() {
                let x0 = fields.velocity.read();
                if i == 0 {
                    let next = fields.viscous.write();
                    self.diffuse.execute(backend, vector_stage, &[x0, x0], next)?;
                } else {
                    let (xk, next) = fields.viscous.read_write();
                    self.diffuse.execute(backend, vector_stage, &[x0, xk], next)?;
                }
                fields.viscous.swap();
            }
            std::mem::swap(&mut fields.velocity, &mut fields.viscous);
        }

        self.divergence.execute(
            backend,
            scalar_stage,
            &[fields.velocity.read()],
            &mut fields.divergence,
        )?;

        // Warm-started from last frame's pressure.
        for _ in 0..self.pressure.iterations() {
            let (pressure, next) = fields.pressure.read_write();
            self.pressure
                .execute(backend, scalar_stage, &[pressure, &fields.divergence], next)?;
            fields.pressure.swap();
        }

        let (velocity, next) = fields.velocity.read_write();
        self.gradient.execute(
            backend,
            vector_stage,
            &[fields.pressure.read(), velocity],
            next,
        )?;
        fields.velocity.swap();

        let (dye, next) = fields.dye.read_write();
        self.advect_dye.execute(
            backend,
            scalar_stage,
            &[fields.velocity.read(), dye],
            next,
        )?;
        fields.dye.swap();
        Ok(())
    }
}

/// Owner of all simulation fields and the fixed pass schedule
pub struct SimulationGraph<B: Backend> {
    params: SimulationParameters,
    passes: Passes,
    fields: Option<FieldSet<B::Field>>,
    extent: (u32, u32),
    state: GraphState,
    time: f32,
    frames: u64,
}

impl<B: Backend> SimulationGraph<B> {
    /// Validate `params`, then allocate every field at `width` x `height`
    ///
    /// # Errors
    /// `SimError::Config` before anything is allocated, or
    /// `SimError::ResourceExhausted` if the backend cannot hold the fields.
    pub fn new(
        backend: &mut B,
        params: SimulationParameters,
        width: u32,
        height: u32,
    ) -> SimResult<Self> {
        params.validate()?;
        params.validate_extent(width, height)?;

        let seed = params.noise.seed.unwrap_or_else(rand::random);
        let fields = FieldSet::allocate(backend, width, height)?;
        log::info!(
            "Simulation graph on {} backend: {}x{} field, {} pressure iterations, seed {}",
            backend.name(),
            width,
            height,
            params.pressure_iterations,
            seed
        );

        Ok(Self {
            passes: Passes::new(&params, seed),
            params,
            fields: Some(fields),
            extent: (width, height),
            state: GraphState::Running,
            time: 0.0,
            frames: 0,
        })
    }

    /// Advance the simulation by one frame
    ///
    /// `dt` is clamped to the configured bounds. The forcing slice is read
    /// for this call only.
    ///
    /// # Panics
    /// In debug builds when called after [`destroy`](Self::destroy); release
    /// builds log and ignore the call.
    pub fn step(&mut self, backend: &mut B, dt: f32, forcing: &[ForcingSample]) -> SimResult<()> {
        if self.state == GraphState::Destroyed {
            debug_assert!(false, "SimulationGraph::step called after destroy");
            log::warn!("SimulationGraph::step called after destroy; ignored");
            return Ok(());
        }
        let Some(fields) = self.fields.as_mut() else {
            return Err(SimError::Halted);
        };

        let dt = self.params.clamp_dt(dt);
        let desc = FieldDesc::vector(fields.extent.0, fields.extent.1);
        let stage = StageUniforms::new(&desc, dt, self.time, self.params.boundary.thickness());

        backend.begin_frame();
        let result = self.passes.run_frame(backend, fields, stage, forcing);
        backend.end_frame();

        match result {
            Ok(()) => {
                self.time += dt;
                self.frames += 1;
                Ok(())
            }
            Err(err) => {
                log::error!("Simulation frame {} failed: {}; halting", self.frames, err);
                if let Some(fields) = self.fields.take() {
                    fields.release(backend);
                }
                Err(err)
            }
        }
    }

    /// Recreate every field at the new extent, zero-filled
    ///
    /// Prior field content is discarded. An unchanged extent clears the
    /// existing fields in place. On allocation failure the graph is left
    /// halted with no fields and the error is returned.
    pub fn resize(&mut self, backend: &mut B, width: u32, height: u32) -> SimResult<()> {
        if self.state == GraphState::Destroyed {
            return Err(SimError::Destroyed);
        }
        self.params.validate_extent(width, height)?;

        if let Some(fields) = self.fields.as_mut().filter(|f| f.extent == (width, height)) {
            fields.clear(backend);
            log::info!("Simulation fields cleared at {}x{}", width, height);
            return Ok(());
        }

        if let Some(old) = self.fields.take() {
            old.release(backend);
        }
        self.extent = (width, height);
        match FieldSet::allocate(backend, width, height) {
            Ok(fields) => {
                self.fields = Some(fields);
                log::info!("Simulation fields recreated at {}x{}", width, height);
                Ok(())
            }
            Err(err) => {
                log::error!("Resize to {}x{} failed: {}", width, height, err);
                Err(err)
            }
        }
    }

    /// Swap in new parameters between frames
    pub fn set_parameters(&mut self, params: SimulationParameters) -> Result<(), ConfigError> {
        params.validate()?;
        params.validate_extent(self.extent.0, self.extent.1)?;
        self.passes.configure(&params);
        self.params = params;
        Ok(())
    }

    /// Release every field; further calls are no-ops
    pub fn destroy(&mut self, backend: &mut B) {
        if self.state == GraphState::Destroyed {
            return;
        }
        if let Some(fields) = self.fields.take() {
            fields.release(backend);
        }
        self.state = GraphState::Destroyed;
        log::info!("Simulation graph destroyed after {} frames", self.frames);
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// False while halted after a failed allocation
    pub fn has_fields(&self) -> bool {
        self.fields.is_some()
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn seed(&self) -> u32 {
        self.passes.noise.seed()
    }

    pub fn velocity(&self) -> Option<&B::Field> {
        self.fields.as_ref().map(|f| f.velocity.read())
    }

    pub fn dye(&self) -> Option<&B::Field> {
        self.fields.as_ref().map(|f| f.dye.read())
    }

    pub fn pressure(&self) -> Option<&B::Field> {
        self.fields.as_ref().map(|f| f.pressure.read())
    }

    pub fn read_velocity(&self, backend: &mut B) -> SimResult<FieldData> {
        backend.read_field(self.velocity().ok_or(SimError::Halted)?)
    }

    pub fn read_dye(&self, backend: &mut B) -> SimResult<FieldData> {
        backend.read_field(self.dye().ok_or(SimError::Halted)?)
    }

    pub fn read_pressure(&self, backend: &mut B) -> SimResult<FieldData> {
        backend.read_field(self.pressure().ok_or(SimError::Halted)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryMode;
    use crate::forcing::ForcingSource;
    use crate::simulation::cpu::CpuBackend;
    use crate::simulation::program::ProgramKind;
    use cgmath::Vector2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params() -> SimulationParameters {
        SimulationParameters::default()
            .with_seed(1234)
            .with_viscosity(0.5, 4)
            .with_pressure_iterations(12)
    }

    fn jittered_inputs(frames: usize) -> Vec<(f32, Vec<ForcingSample>)> {
        let mut rng = StdRng::seed_from_u64(42);
        (0..frames)
            .map(|_| {
                let dt = rng.random_range(1.0 / 144.0..1.0 / 20.0);
                let samples = (0..rng.random_range(0..4))
                    .map(|_| ForcingSample {
                        position: Vector2::new(
                            rng.random_range(0.2..0.8),
                            rng.random_range(0.2..0.8),
                        ),
                        velocity: Vector2::new(
                            rng.random_range(-2.0..2.0),
                            rng.random_range(-2.0..2.0),
                        ),
                        radius: 0.1,
                        strength: 1.0,
                        source: ForcingSource::Pointer,
                    })
                    .collect();
                (dt, samples)
            })
            .collect()
    }

    fn run(inputs: &[(f32, Vec<ForcingSample>)]) -> (FieldData, FieldData) {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 48, 32).unwrap();
        for (dt, samples) in inputs {
            graph.step(&mut backend, *dt, samples).unwrap();
        }
        (
            graph.read_velocity(&mut backend).unwrap(),
            graph.read_dye(&mut backend).unwrap(),
        )
    }

    #[test]
    fn test_runs_are_bit_identical() {
        let inputs = jittered_inputs(12);
        let (v1, d1) = run(&inputs);
        let (v2, d2) = run(&inputs);
        assert_eq!(v1, v2);
        assert_eq!(d1, d2);
        assert!(v1.max_magnitude() > 0.0);
        assert!(d1.max_magnitude() > 0.0);
    }

    #[test]
    fn test_pass_order() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        graph.step(&mut backend, 1.0 / 60.0, &[]).unwrap();

        let mut expected = vec![
            ProgramKind::Noise,
            ProgramKind::Splat,
            ProgramKind::Splat,
            ProgramKind::Advect,
        ];
        expected.extend(std::iter::repeat(ProgramKind::Diffuse).take(4));
        expected.push(ProgramKind::Divergence);
        expected.extend(std::iter::repeat(ProgramKind::Jacobi).take(12));
        expected.push(ProgramKind::Gradient);
        expected.push(ProgramKind::Advect);
        assert_eq!(backend.executed(), expected.as_slice());
    }

    #[test]
    fn test_diffusion_skipped_without_viscosity() {
        let mut backend = CpuBackend::new();
        let params = params().with_viscosity(0.0, 8);
        let mut graph = SimulationGraph::new(&mut backend, params, 16, 16).unwrap();
        graph.step(&mut backend, 1.0 / 60.0, &[]).unwrap();
        assert!(!backend.executed().contains(&ProgramKind::Diffuse));
    }

    fn assert_band_contained(width: u32, height: u32, steps: usize, pressure_iterations: u32) {
        let mut backend = CpuBackend::new();
        let params = SimulationParameters::default()
            .with_seed(3)
            .with_noise_strength(0.0)
            .with_viscosity(1.0, 2)
            .with_pressure_iterations(pressure_iterations)
            .with_boundary(BoundaryMode::NoSlip { thickness: 2 });
        let mut graph = SimulationGraph::new(&mut backend, params, width, height).unwrap();
        for _ in 0..steps {
            graph.step(&mut backend, 1.0 / 60.0, &[]).unwrap();
        }
        let velocity = graph.read_velocity(&mut backend).unwrap();
        assert!(velocity.is_finite());
        assert!(velocity.max_band_magnitude(2) <= 1e-6);
    }

    #[test]
    fn test_boundary_band_stays_still_64() {
        assert_band_contained(64, 64, 8, 20);
    }

    #[test]
    fn test_boundary_band_stays_still_256() {
        assert_band_contained(256, 256, 3, 8);
    }

    #[test]
    fn test_boundary_band_stays_still_1080p() {
        assert_band_contained(1920, 1080, 1, 2);
    }

    #[test]
    fn test_band_stays_still_under_forcing() {
        let mut backend = CpuBackend::new();
        let params = params().with_boundary(BoundaryMode::NoSlip { thickness: 1 });
        let mut graph = SimulationGraph::new(&mut backend, params, 40, 40).unwrap();
        // Strong push straight at the left wall.
        let push = ForcingSample {
            position: Vector2::new(0.1, 0.5),
            velocity: Vector2::new(-3.0, 0.0),
            radius: 0.2,
            strength: 2.0,
            source: ForcingSource::Pointer,
        };
        for _ in 0..10 {
            graph.step(&mut backend, 1.0 / 30.0, &[push]).unwrap();
        }
        let velocity = graph.read_velocity(&mut backend).unwrap();
        assert!(velocity.max_magnitude() > 0.0);
        assert_eq!(velocity.max_band_magnitude(1), 0.0);
    }

    #[test]
    fn test_huge_forcing_velocity_does_not_panic() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 64, 64).unwrap();
        let fling = ForcingSample {
            position: Vector2::new(0.5, 0.5),
            velocity: Vector2::new(-1e12, 0.0),
            radius: 0.1,
            strength: 1.0,
            source: ForcingSource::Pointer,
        };
        graph.step(&mut backend, 1.0 / 30.0, &[fling]).unwrap();
        graph.step(&mut backend, 1.0 / 30.0, &[]).unwrap();
        assert!(graph.has_fields());
    }

    #[test]
    fn test_resize_recreates_zeroed_fields() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 32, 32).unwrap();
        for (dt, samples) in jittered_inputs(5) {
            graph.step(&mut backend, dt, &samples).unwrap();
        }
        let live = backend.live_fields();

        graph.resize(&mut backend, 50, 20).unwrap();
        assert_eq!(backend.live_fields(), live);
        let velocity = graph.read_velocity(&mut backend).unwrap();
        assert_eq!((velocity.desc.width, velocity.desc.height), (50, 20));
        assert_eq!(velocity.max_magnitude(), 0.0);

        graph.step(&mut backend, 1.0 / 60.0, &[]).unwrap();
        let dye = graph.read_dye(&mut backend).unwrap();
        assert_eq!((dye.desc.width, dye.desc.height), (50, 20));
        assert!(dye.is_finite());
        assert!(graph.read_velocity(&mut backend).unwrap().is_finite());
    }

    #[test]
    fn test_resize_to_same_extent_clears_in_place() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 24, 24).unwrap();
        for (dt, samples) in jittered_inputs(6) {
            graph.step(&mut backend, dt, &samples).unwrap();
        }
        assert_eq!(backend.frames(), graph.frames());
        let live = backend.live_fields();

        graph.resize(&mut backend, 24, 24).unwrap();
        assert_eq!(backend.live_fields(), live);
        assert_eq!(graph.read_velocity(&mut backend).unwrap().max_magnitude(), 0.0);
        assert_eq!(graph.read_dye(&mut backend).unwrap().max_magnitude(), 0.0);
        assert_eq!(graph.read_pressure(&mut backend).unwrap().max_magnitude(), 0.0);

        graph.step(&mut backend, 1.0 / 60.0, &[]).unwrap();
        assert_eq!(backend.frames(), graph.frames());
    }

    #[test]
    fn test_failed_resize_halts_then_recovers() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();

        // Enough for one 16x16 set (10 fields), not for 64x64.
        backend.set_cell_budget(Some(16 * 16 * 10));
        let err = graph.resize(&mut backend, 64, 64).unwrap_err();
        assert!(matches!(err, SimError::ResourceExhausted { .. }));
        assert_eq!(backend.live_fields(), 0);
        assert!(!graph.has_fields());
        assert!(matches!(
            graph.step(&mut backend, 0.01, &[]),
            Err(SimError::Halted)
        ));

        graph.resize(&mut backend, 16, 16).unwrap();
        graph.step(&mut backend, 0.01, &[]).unwrap();
    }

    #[test]
    fn test_invalid_resize_keeps_fields() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        assert!(matches!(
            graph.resize(&mut backend, 0, 16),
            Err(SimError::Config(ConfigError::InvalidResolution { .. }))
        ));
        assert!(graph.has_fields());
        graph.step(&mut backend, 0.01, &[]).unwrap();
    }

    #[test]
    fn test_invalid_config_allocates_nothing() {
        let mut backend = CpuBackend::new();
        let params = params().with_dt_bounds(0.5, 0.1);
        assert!(SimulationGraph::new(&mut backend, params, 16, 16).is_err());
        assert!(SimulationGraph::new(&mut backend, SimulationParameters::default(), 0, 16).is_err());
        assert_eq!(backend.live_fields(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        assert_eq!(backend.live_fields(), 10);
        graph.destroy(&mut backend);
        graph.destroy(&mut backend);
        assert_eq!(backend.live_fields(), 0);
        assert_eq!(graph.state(), GraphState::Destroyed);
        assert!(graph.dye().is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "step called after destroy")]
    fn test_step_after_destroy_fails_loudly() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        graph.destroy(&mut backend);
        let _ = graph.step(&mut backend, 0.01, &[]);
    }

    #[test]
    fn test_set_parameters_validates() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        let bad = params().with_boundary(BoundaryMode::NoSlip { thickness: 8 });
        assert!(graph.set_parameters(bad).is_err());
        graph
            .set_parameters(params().with_pressure_iterations(3))
            .unwrap();
        graph.step(&mut backend, 0.01, &[]).unwrap();
        let jacobi = backend
            .executed()
            .iter()
            .filter(|k| **k == ProgramKind::Jacobi)
            .count();
        assert_eq!(jacobi, 3);
    }

    #[test]
    fn test_nan_dt_is_clamped() {
        let mut backend = CpuBackend::new();
        let mut graph = SimulationGraph::new(&mut backend, params(), 16, 16).unwrap();
        graph.step(&mut backend, f32::NAN, &[]).unwrap();
        graph.step(&mut backend, 10.0, &[]).unwrap();
        assert!(graph.read_velocity(&mut backend).unwrap().is_finite());
        let p = graph.params();
        assert!((graph.time() - (p.dt_min + p.dt_max)).abs() < 1e-6);
    }
}
