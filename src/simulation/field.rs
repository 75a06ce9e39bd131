//! Field shapes and host-side field snapshots

/// Number of components stored per cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Pressure, divergence, dye.
    Scalar,
    /// Velocity, noise.
    Vector,
}

impl FieldKind {
    pub fn channels(self) -> u32 {
        match self {
            FieldKind::Scalar => 1,
            FieldKind::Vector => 2,
        }
    }

    /// Texture format backing this kind on the GPU
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            FieldKind::Scalar => wgpu::TextureFormat::R32Float,
            FieldKind::Vector => wgpu::TextureFormat::Rg32Float,
        }
    }
}

/// Immutable shape of a field: resolution and component count
///
/// Every pass reading or writing a field must agree on its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    pub width: u32,
    pub height: u32,
    pub kind: FieldKind,
}

impl FieldDesc {
    pub fn new(width: u32, height: u32, kind: FieldKind) -> Self {
        Self {
            width,
            height,
            kind,
        }
    }

    pub fn scalar(width: u32, height: u32) -> Self {
        Self::new(width, height, FieldKind::Scalar)
    }

    pub fn vector(width: u32, height: u32) -> Self {
        Self::new(width, height, FieldKind::Vector)
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn resolution(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }

    /// Texel size `px` used by the finite-difference stencils
    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }

    pub fn same_extent(&self, other: &FieldDesc) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Host copy of a field's contents, row-major with row 0 at the top
///
/// Scalar fields only use the first component of each cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldData {
    pub desc: FieldDesc,
    pub values: Vec<[f32; 2]>,
}

impl FieldData {
    pub fn zeroed(desc: FieldDesc) -> Self {
        Self {
            desc,
            values: vec![[0.0; 2]; desc.cell_count()],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 2] {
        self.values[(y * self.desc.width + x) as usize]
    }

    pub fn magnitude(&self, x: u32, y: u32) -> f32 {
        let [a, b] = self.get(x, y);
        match self.desc.kind {
            FieldKind::Scalar => a.abs(),
            FieldKind::Vector => (a * a + b * b).sqrt(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.values
            .iter()
            .all(|v| v[0].is_finite() && v[1].is_finite())
    }

    pub fn max_magnitude(&self) -> f32 {
        (0..self.desc.height)
            .flat_map(|y| (0..self.desc.width).map(move |x| (x, y)))
            .map(|(x, y)| self.magnitude(x, y))
            .fold(0.0, f32::max)
    }

    /// Largest magnitude found inside the edge band of `thickness` cells
    pub fn max_band_magnitude(&self, thickness: u32) -> f32 {
        let (w, h) = (self.desc.width, self.desc.height);
        let mut max = 0.0f32;
        for y in 0..h {
            for x in 0..w {
                let in_band = x < thickness
                    || y < thickness
                    || x >= w.saturating_sub(thickness)
                    || y >= h.saturating_sub(thickness);
                if in_band {
                    max = max.max(self.magnitude(x, y));
                }
            }
        }
        max
    }

    /// Largest component-wise difference between two snapshots
    pub fn max_abs_diff(&self, other: &FieldData) -> f32 {
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a[0] - b[0]).abs().max((a[1] - b[1]).abs()))
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_size() {
        let desc = FieldDesc::vector(64, 32);
        assert_eq!(desc.texel_size(), [1.0 / 64.0, 1.0 / 32.0]);
        assert_eq!(desc.cell_count(), 2048);
    }

    #[test]
    fn test_band_magnitude_ignores_interior() {
        let desc = FieldDesc::vector(8, 8);
        let mut data = FieldData::zeroed(desc);
        data.values[(4 * 8 + 4) as usize] = [3.0, 4.0];
        assert_eq!(data.max_band_magnitude(2), 0.0);
        assert_eq!(data.max_magnitude(), 5.0);

        data.values[7] = [0.0, 1.0];
        assert_eq!(data.max_band_magnitude(1), 1.0);
    }
}
