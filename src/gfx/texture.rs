//! Texture helpers for field storage and the passthrough video

use crate::video::VideoFrame;

/// Sampled RGBA8 texture holding the latest video frame
pub struct VideoTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl VideoTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Creates an empty video texture
    ///
    /// # Arguments
    /// * `device` - WGPU device for creating resources
    /// * `width` - Width of the frame in pixels
    /// * `height` - Height of the frame in pixels
    /// * `label` - Debug label for the texture
    pub fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Creates a texture and uploads `frame` into it
    pub fn from_frame(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &VideoFrame,
        label: &str,
    ) -> Self {
        let texture = Self::new(device, frame.width, frame.height, label);
        texture.upload(queue, frame);
        texture
    }

    pub fn matches(&self, frame: &VideoFrame) -> bool {
        self.width == frame.width && self.height == frame.height
    }

    /// Overwrites the texture with `frame`, which must match its size
    pub fn upload(&self, queue: &wgpu::Queue, frame: &VideoFrame) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * frame.width),
                rows_per_image: Some(frame.height),
            },
            extent(frame.width, frame.height),
        );
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

pub fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

/// Clamp-to-edge sampler used for the video frame
///
/// Nearest filtering keeps the GPU composite in step with the CPU one.
pub fn video_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Video Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Bytes per padded row when copying `width` texels of `bytes_per_texel`
pub fn padded_bytes_per_row(width: u32, bytes_per_texel: u32) -> u32 {
    let unpadded = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
        assert_eq!(padded_bytes_per_row(1920, 8), 15360);
    }
}
