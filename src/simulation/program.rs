//! Strongly typed shader programs and their uniform blocks
//!
//! Every stage of the pipeline is one [`Program`] variant carrying the exact
//! `#[repr(C)]` uniform struct its shader expects. Both backends execute the
//! same `Program` values, so the CPU reference and the GPU pipeline can never
//! drift apart in what parameters they see.
//!
//! Units throughout are field cells: positions are cell coordinates with cell
//! `(i, j)` centred at `(i + 0.5, j + 0.5)` and row 0 at the top, velocities
//! are cells per second.

use bytemuck::{Pod, Zeroable};

use super::field::{FieldDesc, FieldKind};

/// Upper bound on forcing samples splatted in one pass
pub const MAX_FORCING_SAMPLES: usize = 32;

/// Header shared by every field program
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct StageUniforms {
    pub resolution: [f32; 2],
    /// `px`: one over the resolution.
    pub texel_size: [f32; 2],
    pub dt: f32,
    /// Accumulated simulation time.
    pub time: f32,
    /// Thickness in cells of the band forced to zero; 0 disables it.
    pub boundary: u32,
    pub _padding: u32,
}

impl StageUniforms {
    pub fn new(desc: &FieldDesc, dt: f32, time: f32, boundary: u32) -> Self {
        Self {
            resolution: desc.resolution(),
            texel_size: desc.texel_size(),
            dt,
            time,
            boundary,
            _padding: 0,
        }
    }

    pub fn with_boundary(mut self, boundary: u32) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn width(&self) -> u32 {
        self.resolution[0] as u32
    }

    pub fn height(&self) -> u32 {
        self.resolution[1] as u32
    }

    /// Whether cell `(x, y)` lies inside the zeroed edge band
    pub fn in_band(&self, x: u32, y: u32) -> bool {
        let b = self.boundary;
        b > 0
            && (x < b
                || y < b
                || x + b >= self.width()
                || y + b >= self.height())
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct NoiseUniforms {
    pub stage: StageUniforms,
    pub strength: f32,
    /// Noise cells per field height.
    pub scale: f32,
    pub speed: f32,
    pub seed: u32,
    /// 0 = curl, 1 = divergent.
    pub kind: u32,
    pub _padding: [u32; 3],
}

/// One forcing impulse in cell units
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SplatSample {
    pub center: [f32; 2],
    /// Cells per second.
    pub velocity: [f32; 2],
    /// Cells.
    pub radius: f32,
    pub strength: f32,
    /// Dye deposited at the centre.
    pub dye: f32,
    pub _padding: f32,
}

pub const SPLAT_TARGET_VELOCITY: u32 = 0;
pub const SPLAT_TARGET_DYE: u32 = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SplatUniforms {
    pub stage: StageUniforms,
    pub count: u32,
    /// [`SPLAT_TARGET_VELOCITY`] or [`SPLAT_TARGET_DYE`].
    pub target: u32,
    /// Weight of the noise field added to velocity (usually dt).
    pub noise_weight: f32,
    pub _padding: u32,
    pub samples: [SplatSample; MAX_FORCING_SAMPLES],
}

impl SplatUniforms {
    pub fn active_samples(&self) -> &[SplatSample] {
        let count = (self.count as usize).min(MAX_FORCING_SAMPLES);
        &self.samples[..count]
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct AdvectUniforms {
    pub stage: StageUniforms,
    /// Decay rate `k` in `q / (1 + k dt)`.
    pub dissipation: f32,
    pub _padding: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DiffuseUniforms {
    pub stage: StageUniforms,
    /// `viscosity * dt`.
    pub alpha: f32,
    pub _padding: [f32; 3],
}

pub const COMPOSITE_FLAG_VIDEO: u32 = 1;
pub const COMPOSITE_FLAG_MIRROR: u32 = 2;

/// Uniforms for the final blend over the passthrough video
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub resolution: [f32; 2],
    /// Per-axis scale mapping video space into field space.
    pub video_scale: [f32; 2],
    pub palette_slow: [f32; 4],
    pub palette_fast: [f32; 4],
    pub video_opacity: f32,
    pub dye_gain: f32,
    /// Field heights per second that saturate the palette.
    pub velocity_scale: f32,
    pub flags: u32,
}

impl CompositeUniforms {
    pub fn has_video(&self) -> bool {
        self.flags & COMPOSITE_FLAG_VIDEO != 0
    }

    pub fn mirrored(&self) -> bool {
        self.flags & COMPOSITE_FLAG_MIRROR != 0
    }
}

/// Tag of a [`Program`], used as the pipeline registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Noise,
    Splat,
    Advect,
    Diffuse,
    Divergence,
    Jacobi,
    Gradient,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 7] = [
        ProgramKind::Noise,
        ProgramKind::Splat,
        ProgramKind::Advect,
        ProgramKind::Diffuse,
        ProgramKind::Divergence,
        ProgramKind::Jacobi,
        ProgramKind::Gradient,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Noise => "noise",
            ProgramKind::Splat => "splat",
            ProgramKind::Advect => "advect",
            ProgramKind::Diffuse => "diffuse",
            ProgramKind::Divergence => "divergence",
            ProgramKind::Jacobi => "jacobi",
            ProgramKind::Gradient => "gradient",
        }
    }

    /// Field kinds this program may write
    pub fn output_kinds(self) -> &'static [FieldKind] {
        match self {
            ProgramKind::Noise | ProgramKind::Diffuse | ProgramKind::Gradient => {
                &[FieldKind::Vector]
            }
            ProgramKind::Divergence | ProgramKind::Jacobi => &[FieldKind::Scalar],
            ProgramKind::Splat | ProgramKind::Advect => &[FieldKind::Vector, FieldKind::Scalar],
        }
    }
}

/// A stage ready to run: program tag plus its uniform block
///
/// Input order per program:
/// - `Noise`: none
/// - `Splat`: target field, then the noise field when targeting velocity
/// - `Advect`: velocity, source
/// - `Diffuse`: initial velocity `x0`, current iterate
/// - `Divergence`: velocity
/// - `Jacobi`: pressure, divergence
/// - `Gradient`: pressure, velocity
#[derive(Debug, Clone, PartialEq)]
pub enum Program {
    Noise(NoiseUniforms),
    Splat(Box<SplatUniforms>),
    Advect(AdvectUniforms),
    Diffuse(DiffuseUniforms),
    Divergence(StageUniforms),
    Jacobi(StageUniforms),
    Gradient(StageUniforms),
}

impl Program {
    pub fn kind(&self) -> ProgramKind {
        match self {
            Program::Noise(_) => ProgramKind::Noise,
            Program::Splat(_) => ProgramKind::Splat,
            Program::Advect(_) => ProgramKind::Advect,
            Program::Diffuse(_) => ProgramKind::Diffuse,
            Program::Divergence(_) => ProgramKind::Divergence,
            Program::Jacobi(_) => ProgramKind::Jacobi,
            Program::Gradient(_) => ProgramKind::Gradient,
        }
    }

    pub fn stage(&self) -> &StageUniforms {
        match self {
            Program::Noise(u) => &u.stage,
            Program::Splat(u) => &u.stage,
            Program::Advect(u) => &u.stage,
            Program::Diffuse(u) => &u.stage,
            Program::Divergence(s) | Program::Jacobi(s) | Program::Gradient(s) => s,
        }
    }

    /// Raw uniform bytes as uploaded to the GPU
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Program::Noise(u) => bytemuck::bytes_of(u),
            Program::Splat(u) => bytemuck::bytes_of(u.as_ref()),
            Program::Advect(u) => bytemuck::bytes_of(u),
            Program::Diffuse(u) => bytemuck::bytes_of(u),
            Program::Divergence(s) | Program::Jacobi(s) | Program::Gradient(s) => {
                bytemuck::bytes_of(s)
            }
        }
    }

    pub fn input_count(&self) -> usize {
        match self {
            Program::Noise(_) => 0,
            Program::Splat(u) if u.target == SPLAT_TARGET_VELOCITY => 2,
            Program::Splat(_) => 1,
            Program::Divergence(_) => 1,
            Program::Advect(_) | Program::Diffuse(_) | Program::Jacobi(_) | Program::Gradient(_) => {
                2
            }
        }
    }

    /// Largest uniform block any program uploads
    pub fn max_uniform_size() -> usize {
        std::mem::size_of::<SplatUniforms>()
            .max(std::mem::size_of::<NoiseUniforms>())
            .max(std::mem::size_of::<AdvectUniforms>())
            .max(std::mem::size_of::<DiffuseUniforms>())
            .max(std::mem::size_of::<StageUniforms>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<StageUniforms>(), 32);
        assert_eq!(std::mem::size_of::<NoiseUniforms>(), 64);
        assert_eq!(std::mem::size_of::<SplatSample>(), 32);
        assert_eq!(std::mem::size_of::<SplatUniforms>(), 48 + 32 * MAX_FORCING_SAMPLES);
        assert_eq!(std::mem::size_of::<AdvectUniforms>(), 48);
        assert_eq!(std::mem::size_of::<DiffuseUniforms>(), 48);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 64);
        assert_eq!(Program::max_uniform_size(), std::mem::size_of::<SplatUniforms>());
    }

    #[test]
    fn test_band_membership() {
        let stage = StageUniforms::new(&FieldDesc::vector(10, 6), 0.01, 0.0, 2);
        assert!(stage.in_band(0, 3));
        assert!(stage.in_band(1, 3));
        assert!(!stage.in_band(2, 3));
        assert!(!stage.in_band(7, 3));
        assert!(stage.in_band(8, 3));
        assert!(stage.in_band(5, 4));
        assert!(!stage.in_band(5, 3));
        assert!(!stage.with_boundary(0).in_band(0, 0));
    }

    #[test]
    fn test_splat_input_count_depends_on_target() {
        let mut splat = SplatUniforms::zeroed();
        splat.target = SPLAT_TARGET_VELOCITY;
        assert_eq!(Program::Splat(Box::new(splat)).input_count(), 2);
        splat.target = SPLAT_TARGET_DYE;
        assert_eq!(Program::Splat(Box::new(splat)).input_count(), 1);
    }
}
