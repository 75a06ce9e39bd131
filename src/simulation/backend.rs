//! Execution seam between the simulation graph and field storage
//!
//! The graph only ever talks to a [`Backend`]. The GPU backend runs the
//! programs as full-screen render passes; the CPU backend runs the same
//! programs on host grids and is what the pipeline tests exercise.

use crate::error::{SimError, SimResult};
use crate::simulation::field::{FieldData, FieldDesc};
use crate::simulation::program::{CompositeUniforms, Program};
use crate::video::VideoFrame;

/// Anything that knows its own shape
pub trait FieldHandle {
    fn desc(&self) -> &FieldDesc;
}

/// Storage and execution for simulation fields
pub trait Backend {
    type Field: FieldHandle;
    /// Where [`Backend::composite`] renders to.
    type Target;

    fn name(&self) -> &'static str;

    /// Allocate a zero-initialised field
    ///
    /// # Errors
    /// `SimError::ResourceExhausted` when the allocation fails.
    fn create_field(&mut self, desc: &FieldDesc, label: &str) -> SimResult<Self::Field>;

    /// Reset every cell to zero
    fn clear_field(&mut self, field: &mut Self::Field);

    fn release_field(&mut self, field: Self::Field);

    /// Run one program, reading `inputs` and writing every cell of `output`
    ///
    /// # Arguments
    /// * `program` - Stage and uniforms to execute
    /// * `inputs` - Read-only fields, in the order documented on [`Program`]
    /// * `output` - The write half of the target field buffer
    fn execute(
        &mut self,
        program: &Program,
        inputs: &[&Self::Field],
        output: &mut Self::Field,
    ) -> SimResult<()>;

    /// Replace (or drop, with `None`) the passthrough video frame
    fn set_video_frame(&mut self, frame: Option<&VideoFrame>) -> SimResult<()>;

    /// Blend dye and velocity over the current video frame into `target`
    fn composite(
        &mut self,
        uniforms: &CompositeUniforms,
        dye: &Self::Field,
        velocity: &Self::Field,
        target: &mut Self::Target,
    ) -> SimResult<()>;

    /// Copy a field back to host memory
    fn read_field(&mut self, field: &Self::Field) -> SimResult<FieldData>;

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}

    /// Number of fields created and not yet released
    fn live_fields(&self) -> usize;
}

/// Shared precondition check for [`Backend::execute`]
///
/// Every input must share the output's resolution and the input count must
/// match what the program reads.
pub fn validate_execution<F: FieldHandle>(
    program: &Program,
    inputs: &[&F],
    output: &F,
) -> SimResult<()> {
    let kind = program.kind();
    if inputs.len() != program.input_count() {
        return Err(SimError::InputCount {
            program: kind,
            expected: program.input_count(),
            found: inputs.len(),
        });
    }

    let out = output.desc();
    if let Some(mismatch) = inputs.iter().map(|f| f.desc()).find(|d| !d.same_extent(out)) {
        return Err(SimError::ResolutionMismatch {
            program: kind,
            expected_width: out.width,
            expected_height: out.height,
            found_width: mismatch.width,
            found_height: mismatch.height,
        });
    }

    let stage = program.stage();
    if stage.width() != out.width || stage.height() != out.height {
        return Err(SimError::ResolutionMismatch {
            program: kind,
            expected_width: out.width,
            expected_height: out.height,
            found_width: stage.width(),
            found_height: stage.height(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::program::StageUniforms;

    struct Shape(FieldDesc);

    impl FieldHandle for Shape {
        fn desc(&self) -> &FieldDesc {
            &self.0
        }
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let out = Shape(FieldDesc::scalar(32, 32));
        let velocity = Shape(FieldDesc::vector(16, 32));
        let program = Program::Divergence(StageUniforms::new(out.desc(), 0.01, 0.0, 0));

        let result = validate_execution(&program, &[&velocity], &out);
        assert!(matches!(
            result,
            Err(SimError::ResolutionMismatch { found_width: 16, .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_input_count() {
        let out = Shape(FieldDesc::scalar(8, 8));
        let program = Program::Jacobi(StageUniforms::new(out.desc(), 0.01, 0.0, 0));
        let result = validate_execution(&program, &[&out], &out);
        assert!(matches!(
            result,
            Err(SimError::InputCount {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_stale_stage_resolution() {
        let out = Shape(FieldDesc::vector(8, 8));
        let velocity = Shape(FieldDesc::vector(8, 8));
        let stale = StageUniforms::new(&FieldDesc::vector(4, 4), 0.01, 0.0, 0);
        let result = validate_execution(&Program::Divergence(stale), &[&velocity], &out);
        assert!(result.is_err());
    }
}
