//! Simulation configuration
//!
//! All tunables live in [`SimulationParameters`]. The struct is supplied at
//! construction, validated before any GPU allocation, and may be swapped
//! between frames through `SimulationGraph::set_parameters`.

use crate::error::ConfigError;

/// Largest field side accepted by either backend.
///
/// Matches the `max_texture_dimension_2d` limit requested from the adapter.
pub const MAX_FIELD_DIMENSION: u32 = 4096;

/// How finite-difference stages treat the domain edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    /// Stencils clamp their reads to the edge texel; nothing is zeroed.
    ClampToEdge,
    /// Velocity is forced to zero inside a band of `thickness` cells on all
    /// four edges.
    NoSlip { thickness: u32 },
}

impl BoundaryMode {
    /// Band thickness in cells (zero for clamp-to-edge)
    pub fn thickness(&self) -> u32 {
        match self {
            BoundaryMode::ClampToEdge => 0,
            BoundaryMode::NoSlip { thickness } => *thickness,
        }
    }
}

/// Shape of the procedural turbulence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    /// Curl of a scalar potential; divergence free.
    Curl,
    /// Gradient of a scalar potential; pushes outward from noise peaks.
    Divergent,
}

impl NoiseKind {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            NoiseKind::Curl => 0,
            NoiseKind::Divergent => 1,
        }
    }
}

/// How the video frame is placed over the field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Scale to cover the whole field, cropping the overflowing axis.
    Cover,
    /// Scale to fit inside the field, letterboxing the short axis.
    Contain,
    /// Ignore aspect ratios.
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    pub kind: NoiseKind,
    /// Acceleration scale in cells / s².
    pub strength: f32,
    /// Spatial frequency in noise cells per field height.
    pub scale: f32,
    /// Rate at which the noise pattern drifts.
    pub speed: f32,
    /// `None` picks a random seed when the session starts.
    pub seed: Option<u32>,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            kind: NoiseKind::Curl,
            strength: 40.0,
            scale: 3.0,
            speed: 0.25,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSettings {
    /// Splat radius as a fraction of the field height.
    pub radius: f32,
    pub strength: f32,
    /// Upper bound on pointer velocity, in field units per second.
    pub max_speed: f32,
}

impl Default for PointerSettings {
    fn default() -> Self {
        Self {
            radius: 0.08,
            strength: 1.0,
            max_speed: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSettings {
    /// Landmark indices that produce forcing samples.
    pub indices: Vec<usize>,
    /// Landmarks below this visibility are gated out for the frame.
    pub min_visibility: f32,
    pub radius: f32,
    pub strength: f32,
    pub max_speed: f32,
    /// Concurrent persons considered in multi-person mode.
    pub max_persons: usize,
    /// Single-person mode caps tracking at one person.
    pub multi_person: bool,
    /// Mirror the video horizontally (selfie camera).
    pub mirror: bool,
    pub fit: FitMode,
}

impl Default for LandmarkSettings {
    fn default() -> Self {
        use crate::tracking::pose;
        Self {
            indices: vec![
                pose::LEFT_WRIST,
                pose::RIGHT_WRIST,
                pose::LEFT_INDEX,
                pose::RIGHT_INDEX,
            ],
            min_visibility: 0.5,
            radius: 0.06,
            strength: 1.0,
            max_speed: 4.0,
            max_persons: 4,
            multi_person: true,
            mirror: true,
            fit: FitMode::Cover,
        }
    }
}

impl LandmarkSettings {
    /// Number of persons the adapter will consider this frame
    pub fn person_cap(&self) -> usize {
        if self.multi_person {
            self.max_persons
        } else {
            self.max_persons.min(1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlaySettings {
    /// Video opacity while the overlay is visible.
    pub video_opacity: f32,
    /// Whether the passthrough video starts visible.
    pub video_visible: bool,
    pub dye_gain: f32,
    /// Speed (field heights per second) that saturates the palette.
    pub velocity_scale: f32,
    pub palette_slow: [f32; 4],
    pub palette_fast: [f32; 4],
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            video_opacity: 0.3,
            video_visible: false,
            dye_gain: 1.0,
            velocity_scale: 1.5,
            palette_slow: [0.15, 0.35, 0.95, 1.0],
            palette_fast: [1.0, 0.35, 0.6, 1.0],
        }
    }
}

/// Full parameter set for one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    /// Field resolution relative to the display resolution.
    pub resolution_scale: f32,
    /// Kinematic viscosity in cells² / s; zero disables diffusion.
    pub viscosity: f32,
    pub viscous_iterations: u32,
    pub pressure_iterations: u32,
    pub velocity_dissipation: f32,
    pub dye_dissipation: f32,
    /// Dye deposited per unit forcing strength.
    pub dye_amount: f32,
    pub dt_min: f32,
    pub dt_max: f32,
    pub boundary: BoundaryMode,
    pub noise: NoiseSettings,
    pub pointer: PointerSettings,
    pub landmarks: LandmarkSettings,
    pub overlay: OverlaySettings,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            resolution_scale: 0.5,
            viscosity: 1.0,
            viscous_iterations: 8,
            pressure_iterations: 24,
            velocity_dissipation: 0.2,
            dye_dissipation: 0.8,
            dye_amount: 1.0,
            dt_min: 1.0 / 240.0,
            dt_max: 1.0 / 30.0,
            boundary: BoundaryMode::NoSlip { thickness: 1 },
            noise: NoiseSettings::default(),
            pointer: PointerSettings::default(),
            landmarks: LandmarkSettings::default(),
            overlay: OverlaySettings::default(),
        }
    }
}

fn check_range(
    name: &'static str,
    value: f32,
    expected: &'static str,
    ok: impl Fn(f32) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            expected,
            value,
        })
    }
}

impl SimulationParameters {
    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn with_viscosity(mut self, viscosity: f32, iterations: u32) -> Self {
        self.viscosity = viscosity;
        self.viscous_iterations = iterations;
        self
    }

    pub fn with_pressure_iterations(mut self, iterations: u32) -> Self {
        self.pressure_iterations = iterations;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_noise(mut self, noise: NoiseSettings) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_noise_strength(mut self, strength: f32) -> Self {
        self.noise.strength = strength;
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.noise.seed = Some(seed);
        self
    }

    pub fn with_dt_bounds(mut self, min: f32, max: f32) -> Self {
        self.dt_min = min;
        self.dt_max = max;
        self
    }

    pub fn with_pointer(mut self, pointer: PointerSettings) -> Self {
        self.pointer = pointer;
        self
    }

    pub fn with_landmarks(mut self, landmarks: LandmarkSettings) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlaySettings) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_multi_person(mut self, multi_person: bool) -> Self {
        self.landmarks.multi_person = multi_person;
        self
    }

    /// Clamp a frame time into the configured bounds
    ///
    /// Non-finite or negative frame times resolve to `dt_min`.
    pub fn clamp_dt(&self, dt: f32) -> f32 {
        if !dt.is_finite() || dt < 0.0 {
            return self.dt_min;
        }
        dt.clamp(self.dt_min, self.dt_max)
    }

    /// Field extent for a display of the given pixel size
    pub fn field_extent(&self, display_width: u32, display_height: u32) -> (u32, u32) {
        let scale = |side: u32| {
            ((side as f32 * self.resolution_scale).round() as u32).clamp(1, MAX_FIELD_DIMENSION)
        };
        (scale(display_width), scale(display_height))
    }

    /// Check every parameter, independent of field size
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("resolution_scale", self.resolution_scale, "in (0, 1]", |v| {
            v > 0.0 && v <= 1.0
        })?;
        check_range("viscosity", self.viscosity, ">= 0", |v| v >= 0.0)?;
        check_range("velocity_dissipation", self.velocity_dissipation, ">= 0", |v| {
            v >= 0.0
        })?;
        check_range("dye_dissipation", self.dye_dissipation, ">= 0", |v| v >= 0.0)?;
        check_range("dye_amount", self.dye_amount, ">= 0", |v| v >= 0.0)?;
        check_range("dt_min", self.dt_min, "> 0", |v| v > 0.0)?;
        check_range("dt_max", self.dt_max, "> 0", |v| v > 0.0)?;
        if self.dt_min > self.dt_max {
            return Err(ConfigError::InvertedDtBounds {
                min: self.dt_min,
                max: self.dt_max,
            });
        }
        if self.pressure_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                name: "pressure_iterations",
                expected: ">= 1",
                value: 0.0,
            });
        }

        check_range("noise.strength", self.noise.strength, ">= 0", |v| v >= 0.0)?;
        check_range("noise.scale", self.noise.scale, "> 0", |v| v > 0.0)?;
        check_range("noise.speed", self.noise.speed, ">= 0", |v| v >= 0.0)?;

        check_range("pointer.radius", self.pointer.radius, "> 0", |v| v > 0.0)?;
        check_range("pointer.strength", self.pointer.strength, ">= 0", |v| v >= 0.0)?;
        check_range("pointer.max_speed", self.pointer.max_speed, "> 0", |v| v > 0.0)?;

        let landmarks = &self.landmarks;
        if landmarks.indices.is_empty() {
            return Err(ConfigError::EmptyLandmarkSubset);
        }
        check_range(
            "landmarks.min_visibility",
            landmarks.min_visibility,
            "in [0, 1]",
            |v| (0.0..=1.0).contains(&v),
        )?;
        check_range("landmarks.radius", landmarks.radius, "> 0", |v| v > 0.0)?;
        check_range("landmarks.strength", landmarks.strength, ">= 0", |v| v >= 0.0)?;
        check_range("landmarks.max_speed", landmarks.max_speed, "> 0", |v| v > 0.0)?;

        check_range(
            "overlay.video_opacity",
            self.overlay.video_opacity,
            "in [0, 1]",
            |v| (0.0..=1.0).contains(&v),
        )?;
        check_range("overlay.dye_gain", self.overlay.dye_gain, ">= 0", |v| v >= 0.0)?;
        check_range(
            "overlay.velocity_scale",
            self.overlay.velocity_scale,
            "> 0",
            |v| v > 0.0,
        )?;
        Ok(())
    }

    /// Check a concrete field extent against these parameters
    pub fn validate_extent(&self, width: u32, height: u32) -> Result<(), ConfigError> {
        let valid = |side: u32| (1..=MAX_FIELD_DIMENSION).contains(&side);
        if !valid(width) || !valid(height) {
            return Err(ConfigError::InvalidResolution {
                width,
                height,
                max: MAX_FIELD_DIMENSION,
            });
        }
        let thickness = self.boundary.thickness();
        if thickness > 0 && (2 * thickness >= width || 2 * thickness >= height) {
            return Err(ConfigError::BoundaryTooThick {
                thickness,
                width,
                height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationParameters::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let params = SimulationParameters::default();
        assert!(matches!(
            params.validate_extent(0, 64),
            Err(ConfigError::InvalidResolution { .. })
        ));
        assert!(params.validate_extent(MAX_FIELD_DIMENSION + 1, 64).is_err());
        assert!(params.validate_extent(64, 64).is_ok());
    }

    #[test]
    fn test_rejects_nan_and_negative_values() {
        let params = SimulationParameters::default().with_viscosity(f32::NAN, 4);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::OutOfRange { name: "viscosity", .. })
        ));

        let params = SimulationParameters::default().with_noise_strength(-1.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_dt_bounds() {
        let params = SimulationParameters::default().with_dt_bounds(0.1, 0.01);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvertedDtBounds { .. })
        ));
    }

    #[test]
    fn test_boundary_must_leave_interior() {
        let params =
            SimulationParameters::default().with_boundary(BoundaryMode::NoSlip { thickness: 4 });
        assert!(params.validate_extent(8, 64).is_err());
        assert!(params.validate_extent(9, 64).is_ok());
    }

    #[test]
    fn test_clamp_dt() {
        let params = SimulationParameters::default().with_dt_bounds(0.01, 0.05);
        assert_eq!(params.clamp_dt(0.001), 0.01);
        assert_eq!(params.clamp_dt(0.02), 0.02);
        assert_eq!(params.clamp_dt(1.0), 0.05);
        assert_eq!(params.clamp_dt(f32::NAN), 0.01);
        assert_eq!(params.clamp_dt(-3.0), 0.01);
    }

    #[test]
    fn test_field_extent_follows_scale() {
        let params = SimulationParameters::default().with_resolution_scale(0.25);
        assert_eq!(params.field_extent(1920, 1080), (480, 270));
        assert_eq!(params.field_extent(1, 1), (1, 1));
    }

    #[test]
    fn test_single_person_caps_at_one() {
        let params = SimulationParameters::default().with_multi_person(false);
        assert_eq!(params.landmarks.person_cap(), 1);
        let params = SimulationParameters::default();
        assert_eq!(params.landmarks.person_cap(), 4);
    }
}
