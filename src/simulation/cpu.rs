//! CPU reference backend
//!
//! Runs every [`Program`] on host grids, cell by cell, in a fixed order. It is
//! slow but bit-for-bit deterministic, which makes it the backend the pipeline
//! properties are tested against. The GPU shaders implement the same kernels.

use super::backend::{validate_execution, Backend, FieldHandle};
use super::field::{FieldData, FieldDesc, FieldKind};
use super::program::{
    AdvectUniforms, CompositeUniforms, DiffuseUniforms, NoiseUniforms, Program, ProgramKind,
    SplatUniforms, StageUniforms, SPLAT_TARGET_VELOCITY,
};
use crate::error::{SimError, SimResult};
use crate::video::VideoFrame;

/// A field stored as one `[f32; 2]` per cell, row-major, row 0 at the top
#[derive(Debug, Clone, PartialEq)]
pub struct CpuField {
    desc: FieldDesc,
    data: Vec<[f32; 2]>,
}

impl FieldHandle for CpuField {
    fn desc(&self) -> &FieldDesc {
        &self.desc
    }
}

impl CpuField {
    fn new(desc: FieldDesc) -> Self {
        Self {
            desc,
            data: vec![[0.0; 2]; desc.cell_count()],
        }
    }

    /// Cell value with clamp-to-edge addressing
    pub fn fetch(&self, x: i32, y: i32) -> [f32; 2] {
        let x = x.clamp(0, self.desc.width as i32 - 1) as usize;
        let y = y.clamp(0, self.desc.height as i32 - 1) as usize;
        self.data[y * self.desc.width as usize + x]
    }

    /// Bilinear sample at a position in cell coordinates
    ///
    /// Positions beyond the edge band are pinned first; clamp-to-edge
    /// addressing makes that lossless.
    pub fn sample(&self, px: f32, py: f32) -> [f32; 2] {
        let gx = (px - 0.5).clamp(-1.0, self.desc.width as f32);
        let gy = (py - 0.5).clamp(-1.0, self.desc.height as f32);
        let x0 = gx.floor();
        let y0 = gy.floor();
        let fx = gx - x0;
        let fy = gy - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);
        let lerp = |p: f32, q: f32, t: f32| p + (q - p) * t;
        [
            lerp(lerp(a[0], b[0], fx), lerp(c[0], d[0], fx), fy),
            lerp(lerp(a[1], b[1], fx), lerp(c[1], d[1], fx), fy),
        ]
    }
}

/// Render target of the CPU compositor
#[derive(Debug, Clone, PartialEq)]
pub struct CpuImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

impl CpuImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Compact smooth falloff `(1 - (d/r)^2)^3`, zero at and beyond `r`
pub fn splat_weight(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 || distance >= radius {
        return 0.0;
    }
    let q = 1.0 - (distance / radius).powi(2);
    q * q * q
}

fn hash(ix: i32, iy: i32, seed: u32) -> f32 {
    let mut h = (ix as u32).wrapping_mul(0x8da6_b343)
        ^ (iy as u32).wrapping_mul(0xd816_3841)
        ^ seed.wrapping_mul(0xcb1a_b31f);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    (h >> 8) as f32 / 16_777_216.0
}

fn value_noise(x: f32, y: f32, seed: u32) -> f32 {
    let (ix, iy) = (x.floor(), y.floor());
    let (fx, fy) = (x - ix, y - iy);
    let (ix, iy) = (ix as i32, iy as i32);
    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);

    let a = hash(ix, iy, seed);
    let b = hash(ix + 1, iy, seed);
    let c = hash(ix, iy + 1, seed);
    let d = hash(ix + 1, iy + 1, seed);
    let top = a + (b - a) * ux;
    let bottom = c + (d - c) * ux;
    top + (bottom - top) * uy
}

/// Scalar potential the noise stage differentiates, at cell position `(x, y)`
fn potential(u: &NoiseUniforms, x: f32, y: f32) -> f32 {
    let height = u.stage.resolution[1];
    let drift = u.stage.time * u.speed;
    value_noise(
        x / height * u.scale + drift,
        y / height * u.scale - 0.7 * drift,
        u.seed,
    )
}

fn noise_kernel(u: &NoiseUniforms, x: u32, y: u32) -> [f32; 2] {
    let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
    // One cell expressed in noise units.
    let step = u.scale / u.stage.resolution[1];
    let dx = (potential(u, cx + 1.0, cy) - potential(u, cx - 1.0, cy)) / (2.0 * step);
    let dy = (potential(u, cx, cy + 1.0) - potential(u, cx, cy - 1.0)) / (2.0 * step);
    match u.kind {
        0 => [dy * u.strength, -dx * u.strength],
        _ => [dx * u.strength, dy * u.strength],
    }
}

fn splat_kernel(u: &SplatUniforms, inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let (xi, yi) = (x as i32, y as i32);
    let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
    let mut value = inputs[0].fetch(xi, yi);

    if u.target == SPLAT_TARGET_VELOCITY {
        let noise = inputs[1].fetch(xi, yi);
        value[0] += noise[0] * u.noise_weight;
        value[1] += noise[1] * u.noise_weight;
        for s in u.active_samples() {
            let w = splat_weight((cx - s.center[0]).hypot(cy - s.center[1]), s.radius);
            value[0] += s.velocity[0] * s.strength * w;
            value[1] += s.velocity[1] * s.strength * w;
        }
    } else {
        for s in u.active_samples() {
            let w = splat_weight((cx - s.center[0]).hypot(cy - s.center[1]), s.radius);
            value[0] += s.dye * w;
        }
    }
    value
}

fn advect_kernel(u: &AdvectUniforms, inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let v = inputs[0].fetch(x as i32, y as i32);
    let dt = u.stage.dt;
    let q = inputs[1].sample(x as f32 + 0.5 - dt * v[0], y as f32 + 0.5 - dt * v[1]);
    let decay = 1.0 / (1.0 + u.dissipation * dt);
    [q[0] * decay, q[1] * decay]
}

fn neighbours(field: &CpuField, x: i32, y: i32) -> [[f32; 2]; 4] {
    [
        field.fetch(x - 1, y),
        field.fetch(x + 1, y),
        field.fetch(x, y - 1),
        field.fetch(x, y + 1),
    ]
}

fn diffuse_kernel(u: &DiffuseUniforms, inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let (xi, yi) = (x as i32, y as i32);
    let x0 = inputs[0].fetch(xi, yi);
    let [l, r, b, t] = neighbours(inputs[1], xi, yi);
    let denom = 1.0 + 4.0 * u.alpha;
    [
        (x0[0] + u.alpha * (l[0] + r[0] + b[0] + t[0])) / denom,
        (x0[1] + u.alpha * (l[1] + r[1] + b[1] + t[1])) / denom,
    ]
}

fn divergence_kernel(inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let [l, r, b, t] = neighbours(inputs[0], x as i32, y as i32);
    [0.5 * ((r[0] - l[0]) + (t[1] - b[1])), 0.0]
}

fn jacobi_kernel(inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let (xi, yi) = (x as i32, y as i32);
    let [l, r, b, t] = neighbours(inputs[0], xi, yi);
    let div = inputs[1].fetch(xi, yi)[0];
    [(l[0] + r[0] + b[0] + t[0] - div) * 0.25, 0.0]
}

fn gradient_kernel(inputs: &[&CpuField], x: u32, y: u32) -> [f32; 2] {
    let (xi, yi) = (x as i32, y as i32);
    let [l, r, b, t] = neighbours(inputs[0], xi, yi);
    let v = inputs[1].fetch(xi, yi);
    [v[0] - 0.5 * (r[0] - l[0]), v[1] - 0.5 * (t[0] - b[0])]
}

/// Host-side backend running the reference kernels
pub struct CpuBackend {
    live_fields: usize,
    live_cells: usize,
    cell_budget: Option<usize>,
    video: Option<VideoFrame>,
    executed: Vec<ProgramKind>,
    frames: u64,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            live_fields: 0,
            live_cells: 0,
            cell_budget: None,
            video: None,
            executed: Vec::new(),
            frames: 0,
        }
    }

    /// Limit the total number of live cells; allocations past it fail
    /// with `ResourceExhausted` the way a GPU out-of-memory would
    pub fn with_cell_budget(mut self, cells: usize) -> Self {
        self.cell_budget = Some(cells);
        self
    }

    pub fn set_cell_budget(&mut self, cells: Option<usize>) {
        self.cell_budget = cells;
    }

    /// Overwrite every cell of `field` from a host function of `(x, y)`
    pub fn write_cells(&mut self, field: &mut CpuField, f: impl Fn(u32, u32) -> [f32; 2]) {
        let width = field.desc.width;
        for (i, cell) in field.data.iter_mut().enumerate() {
            let i = i as u32;
            *cell = f(i % width, i / width);
        }
    }

    /// Programs executed since the last `begin_frame`, in order
    pub fn executed(&self) -> &[ProgramKind] {
        &self.executed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn run(program: &Program, inputs: &[&CpuField], output: &mut CpuField) {
        let stage: StageUniforms = *program.stage();
        let (width, height) = (output.desc.width, output.desc.height);
        let scalar = output.desc.kind == FieldKind::Scalar;

        for y in 0..height {
            for x in 0..width {
                let mut value = if stage.in_band(x, y) {
                    [0.0; 2]
                } else {
                    match program {
                        Program::Noise(u) => noise_kernel(u, x, y),
                        Program::Splat(u) => splat_kernel(u, inputs, x, y),
                        Program::Advect(u) => advect_kernel(u, inputs, x, y),
                        Program::Diffuse(u) => diffuse_kernel(u, inputs, x, y),
                        Program::Divergence(_) => divergence_kernel(inputs, x, y),
                        Program::Jacobi(_) => jacobi_kernel(inputs, x, y),
                        Program::Gradient(_) => gradient_kernel(inputs, x, y),
                    }
                };
                if scalar {
                    value[1] = 0.0;
                }
                output.data[(y * width + x) as usize] = value;
            }
        }
    }

    fn video_texel(&self, u: &CompositeUniforms, uv: [f32; 2]) -> [f32; 3] {
        let Some(frame) = self.video.as_ref().filter(|_| u.has_video()) else {
            return [0.0; 3];
        };
        let mut vx = 0.5 + (uv[0] - 0.5) / u.video_scale[0];
        let vy = 0.5 + (uv[1] - 0.5) / u.video_scale[1];
        if u.mirrored() {
            vx = 1.0 - vx;
        }
        if !(0.0..=1.0).contains(&vx) || !(0.0..=1.0).contains(&vy) {
            return [0.0; 3];
        }
        let px = ((vx * frame.width as f32) as u32).min(frame.width - 1);
        let py = ((vy * frame.height as f32) as u32).min(frame.height - 1);
        let t = frame.texel(px, py);
        [t[0], t[1], t[2]]
    }
}

impl Backend for CpuBackend {
    type Field = CpuField;
    type Target = CpuImage;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_field(&mut self, desc: &FieldDesc, label: &str) -> SimResult<CpuField> {
        let cells = desc.cell_count();
        if let Some(budget) = self.cell_budget {
            if self.live_cells + cells > budget {
                return Err(SimError::ResourceExhausted {
                    label: label.to_string(),
                    message: format!(
                        "{} cells requested, {} of {} in use",
                        cells, self.live_cells, budget
                    ),
                });
            }
        }
        self.live_fields += 1;
        self.live_cells += cells;
        log::trace!("cpu: created `{}` {}x{}", label, desc.width, desc.height);
        Ok(CpuField::new(*desc))
    }

    fn clear_field(&mut self, field: &mut CpuField) {
        field.data.fill([0.0; 2]);
    }

    fn release_field(&mut self, field: CpuField) {
        self.live_fields = self.live_fields.saturating_sub(1);
        self.live_cells = self.live_cells.saturating_sub(field.desc.cell_count());
    }

    fn execute(
        &mut self,
        program: &Program,
        inputs: &[&CpuField],
        output: &mut CpuField,
    ) -> SimResult<()> {
        validate_execution(program, inputs, output)?;
        Self::run(program, inputs, output);
        self.executed.push(program.kind());
        Ok(())
    }

    fn set_video_frame(&mut self, frame: Option<&VideoFrame>) -> SimResult<()> {
        match frame {
            Some(frame) => {
                let expected = frame.width as usize * frame.height as usize * 4;
                if expected == 0 || frame.pixels.len() != expected {
                    self.video = None;
                    return Err(SimError::VideoUpload(format!(
                        "{}x{} frame carries {} bytes",
                        frame.width,
                        frame.height,
                        frame.pixels.len()
                    )));
                }
                self.video = Some(frame.clone());
            }
            None => self.video = None,
        }
        Ok(())
    }

    fn composite(
        &mut self,
        uniforms: &CompositeUniforms,
        dye: &CpuField,
        velocity: &CpuField,
        target: &mut CpuImage,
    ) -> SimResult<()> {
        let res = dye.desc.resolution();
        for y in 0..target.height {
            for x in 0..target.width {
                let uv = [
                    (x as f32 + 0.5) / target.width as f32,
                    (y as f32 + 0.5) / target.height as f32,
                ];
                let (fx, fy) = (uv[0] * res[0], uv[1] * res[1]);
                let density = dye.sample(fx, fy)[0];
                let v = velocity.sample(fx, fy);
                let speed = v[0].hypot(v[1]) / (uniforms.velocity_scale * res[1]);
                let t = speed.clamp(0.0, 1.0);
                let alpha = (density * uniforms.dye_gain).clamp(0.0, 1.0);
                let video = self.video_texel(uniforms, uv);

                let mut out = [0.0, 0.0, 0.0, 1.0];
                for c in 0..3 {
                    let tint = uniforms.palette_slow[c]
                        + (uniforms.palette_fast[c] - uniforms.palette_slow[c]) * t;
                    out[c] = tint * alpha + video[c] * uniforms.video_opacity * (1.0 - alpha);
                }
                target.pixels[(y * target.width + x) as usize] = out;
            }
        }
        Ok(())
    }

    fn read_field(&mut self, field: &CpuField) -> SimResult<FieldData> {
        Ok(FieldData {
            desc: field.desc,
            values: field.data.clone(),
        })
    }

    fn begin_frame(&mut self) {
        self.executed.clear();
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn live_fields(&self) -> usize {
        self.live_fields
    }
}
