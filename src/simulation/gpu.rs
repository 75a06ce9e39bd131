//! wgpu backend
//!
//! Fields are float render targets; every program is a full-screen triangle
//! pair drawn into the output field with its inputs bound as textures. Passes
//! of one frame are recorded into a single command encoder, each reading its
//! uniforms from its own slot of a dynamic-offset uniform buffer, and the
//! encoder is submitted at the end of the frame (or when the slots run out).

use std::collections::HashMap;
use std::num::NonZeroU64;

use futures::channel::oneshot;

use super::backend::{validate_execution, Backend, FieldHandle};
use super::field::{FieldData, FieldDesc, FieldKind};
use super::program::{CompositeUniforms, Program, ProgramKind, COMPOSITE_FLAG_VIDEO};
use crate::error::{SimError, SimResult};
use crate::gfx::texture::{extent, padded_bytes_per_row, video_sampler, VideoTexture};
use crate::gfx::GpuContext;
use crate::video::VideoFrame;
use crate::wgpu_utils::{
    binding_types, BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc,
    UniformBuffer,
};

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const COMPOSITE_WGSL: &str = include_str!("shaders/composite.wgsl");

/// Uniform slots recorded before the frame encoder is flushed early
const UNIFORM_SLOTS: u64 = 64;

fn kernel_source(kind: ProgramKind) -> &'static str {
    match kind {
        ProgramKind::Noise => include_str!("shaders/noise.wgsl"),
        ProgramKind::Splat => include_str!("shaders/splat.wgsl"),
        ProgramKind::Advect => include_str!("shaders/advect.wgsl"),
        ProgramKind::Diffuse => include_str!("shaders/diffuse.wgsl"),
        ProgramKind::Divergence => include_str!("shaders/divergence.wgsl"),
        ProgramKind::Jacobi => include_str!("shaders/jacobi.wgsl"),
        ProgramKind::Gradient => include_str!("shaders/gradient.wgsl"),
    }
}

/// A field stored in a float texture
pub struct GpuField {
    desc: FieldDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl FieldHandle for GpuField {
    fn desc(&self) -> &FieldDesc {
        &self.desc
    }
}

impl GpuField {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_dimension: u32,

    field_layout: BindGroupLayoutWithDesc,
    pipelines: HashMap<(ProgramKind, FieldKind), wgpu::RenderPipeline>,
    uniforms: wgpu::Buffer,
    uniform_stride: u64,
    uniform_binding_size: NonZeroU64,
    next_slot: u64,
    encoder: Option<wgpu::CommandEncoder>,
    /// Bound to input slots a program does not read.
    placeholder: wgpu::TextureView,

    composite_layout: BindGroupLayoutWithDesc,
    composite_pipeline: wgpu::RenderPipeline,
    composite_uniforms: UniformBuffer<CompositeUniforms>,
    video: Option<VideoTexture>,
    video_placeholder: VideoTexture,
    video_sampler: wgpu::Sampler,

    live_fields: usize,
}

impl GpuBackend {
    /// Compiles every field program and the compositor
    ///
    /// # Arguments
    /// * `context` - Device and queue to build on
    /// * `output_format` - Format of the composite target (usually the surface)
    ///
    /// # Errors
    /// `SimError::Adapter` when float fields cannot be render targets, or
    /// `SimError::ShaderCompile` naming the first program that failed; nothing
    /// is kept in either case.
    pub fn new(context: &GpuContext, output_format: wgpu::TextureFormat) -> SimResult<Self> {
        for kind in [FieldKind::Scalar, FieldKind::Vector] {
            let format = kind.texture_format();
            if !context.supports_render_target(format) {
                return Err(SimError::Adapter(format!(
                    "{:?} fields cannot be rendered on this adapter",
                    format
                )));
            }
        }

        let device = context.device().clone();
        let queue = context.queue().clone();
        let limits = device.limits();

        let uniform_size = Program::max_uniform_size() as u64;
        let align = u64::from(limits.min_uniform_buffer_offset_alignment);
        let uniform_stride = uniform_size.div_ceil(align) * align;
        let uniform_binding_size = NonZeroU64::new(uniform_size).ok_or_else(|| {
            SimError::ShaderCompile {
                label: "uniforms".into(),
                message: "empty uniform block".into(),
            }
        })?;
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Field Program Uniforms"),
            size: uniform_stride * UNIFORM_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let field_layout = BindGroupLayoutBuilder::new()
            .next_binding_fragment(binding_types::uniform_dynamic(uniform_size))
            .next_binding_fragment(binding_types::field_texture_2d())
            .next_binding_fragment(binding_types::field_texture_2d())
            .create(&device, "Field Program Layout");

        let composite_layout = BindGroupLayoutBuilder::new()
            .next_binding_fragment(binding_types::uniform())
            .next_binding_fragment(binding_types::field_texture_2d())
            .next_binding_fragment(binding_types::field_texture_2d())
            .next_binding_fragment(binding_types::texture_2d())
            .next_binding_fragment(binding_types::sampler(
                wgpu::SamplerBindingType::Filtering,
            ))
            .create(&device, "Composite Layout");

        let mut pipelines = HashMap::new();
        for kind in ProgramKind::ALL {
            let source = format!("{}\n{}", COMMON_WGSL, kernel_source(kind));
            for &field_kind in kind.output_kinds() {
                let label = format!("{} ({:?})", kind.label(), field_kind);
                let pipeline = create_pipeline(
                    &device,
                    &label,
                    &source,
                    &field_layout.layout,
                    field_kind.texture_format(),
                )?;
                pipelines.insert((kind, field_kind), pipeline);
            }
        }
        let composite_pipeline = create_pipeline(
            &device,
            "composite",
            COMPOSITE_WGSL,
            &composite_layout.layout,
            output_format,
        )?;
        log::info!(
            "GPU backend: {} field pipelines and composite ({:?}) ready",
            pipelines.len(),
            output_format
        );

        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Field Placeholder"),
                size: extent(1, 1),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FieldKind::Scalar.texture_format(),
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        let video_placeholder = VideoTexture::from_frame(
            &device,
            &queue,
            &VideoFrame::solid(1, 1, [0, 0, 0, 255]),
            "Video Placeholder",
        );

        Ok(Self {
            max_dimension: limits.max_texture_dimension_2d,
            field_layout,
            pipelines,
            uniforms,
            uniform_stride,
            uniform_binding_size,
            next_slot: 0,
            encoder: None,
            placeholder,
            composite_layout,
            composite_pipeline,
            composite_uniforms: UniformBuffer::new(&device),
            video: None,
            video_placeholder,
            video_sampler: video_sampler(&device),
            live_fields: 0,
            device,
            queue,
        })
    }

    /// Submit everything recorded so far
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.next_slot = 0;
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Frame Encoder"),
            })
        })
    }
}

/// Build one full-screen render pipeline inside a validation error scope
fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> SimResult<wgpu::RenderPipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => {
            log::error!("GPU backend: pipeline `{}` failed: {}", label, error);
            Err(SimError::ShaderCompile {
                label: label.to_string(),
                message: error.to_string(),
            })
        }
        None => Ok(pipeline),
    }
}

fn clear_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    label: &str,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

impl Backend for GpuBackend {
    type Field = GpuField;
    type Target = wgpu::TextureView;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_field(&mut self, desc: &FieldDesc, label: &str) -> SimResult<GpuField> {
        if desc.width > self.max_dimension || desc.height > self.max_dimension {
            return Err(SimError::ResourceExhausted {
                label: label.to_string(),
                message: format!(
                    "{}x{} exceeds the device limit of {}",
                    desc.width, desc.height, self.max_dimension
                ),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(desc.width, desc.height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.kind.texture_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            texture.destroy();
            return Err(SimError::ResourceExhausted {
                label: label.to_string(),
                message: error.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.live_fields += 1;
        log::trace!("wgpu: created `{}` {}x{}", label, desc.width, desc.height);
        Ok(GpuField {
            desc: *desc,
            texture,
            view,
        })
    }

    fn clear_field(&mut self, field: &mut GpuField) {
        let encoder = self.encoder();
        clear_pass(encoder, &field.view, "clear field");
    }

    fn release_field(&mut self, field: GpuField) {
        field.texture.destroy();
        self.live_fields = self.live_fields.saturating_sub(1);
    }

    fn execute(
        &mut self,
        program: &Program,
        inputs: &[&GpuField],
        output: &mut GpuField,
    ) -> SimResult<()> {
        validate_execution(program, inputs, output)?;
        let kind = program.kind();
        if self.next_slot == UNIFORM_SLOTS {
            self.flush();
        }
        let Some(pipeline) = self.pipelines.get(&(kind, output.desc.kind)) else {
            return Err(SimError::MissingPipeline(kind));
        };

        let offset = self.next_slot * self.uniform_stride;
        self.next_slot += 1;
        self.queue.write_buffer(&self.uniforms, offset, program.as_bytes());

        let first = inputs.first().map_or(&self.placeholder, |f| &f.view);
        let second = inputs.get(1).map_or(&self.placeholder, |f| &f.view);
        let bind_group = BindGroupBuilder::new(&self.field_layout)
            .resource(wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &self.uniforms,
                offset: 0,
                size: Some(self.uniform_binding_size),
            }))
            .texture(first)
            .texture(second)
            .create(&self.device, kind.label());

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Frame Encoder"),
            })
        });
        let mut pass = clear_pass(encoder, &output.view, kind.label());
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[offset as u32]);
        pass.draw(0..6, 0..1);
        Ok(())
    }

    fn set_video_frame(&mut self, frame: Option<&VideoFrame>) -> SimResult<()> {
        let Some(frame) = frame else {
            if let Some(old) = self.video.take() {
                old.destroy();
            }
            return Ok(());
        };

        let expected = frame.width as usize * frame.height as usize * 4;
        let too_large = frame.width > self.max_dimension || frame.height > self.max_dimension;
        if expected == 0 || frame.pixels.len() != expected || too_large {
            if let Some(old) = self.video.take() {
                old.destroy();
            }
            return Err(SimError::VideoUpload(format!(
                "{}x{} frame carries {} bytes",
                frame.width,
                frame.height,
                frame.pixels.len()
            )));
        }

        match self.video.as_ref() {
            Some(texture) if texture.matches(frame) => texture.upload(&self.queue, frame),
            _ => {
                if let Some(old) = self.video.take() {
                    old.destroy();
                }
                log::debug!("wgpu: video texture {}x{}", frame.width, frame.height);
                self.video = Some(VideoTexture::from_frame(
                    &self.device,
                    &self.queue,
                    frame,
                    "Video Frame",
                ));
            }
        }
        Ok(())
    }

    fn composite(
        &mut self,
        uniforms: &CompositeUniforms,
        dye: &GpuField,
        velocity: &GpuField,
        target: &mut wgpu::TextureView,
    ) -> SimResult<()> {
        let mut uniforms = *uniforms;
        if self.video.is_none() {
            uniforms.flags &= !COMPOSITE_FLAG_VIDEO;
        }
        self.composite_uniforms.update_content(&self.queue, uniforms);

        let video = self.video.as_ref().unwrap_or(&self.video_placeholder);
        let bind_group = BindGroupBuilder::new(&self.composite_layout)
            .resource(self.composite_uniforms.binding_resource())
            .texture(&dye.view)
            .texture(&velocity.view)
            .texture(&video.view)
            .sampler(&self.video_sampler)
            .create(&self.device, "Composite Bind Group");

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Frame Encoder"),
            })
        });
        {
            let mut pass = clear_pass(encoder, target, "composite");
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        self.flush();
        Ok(())
    }

    fn read_field(&mut self, field: &GpuField) -> SimResult<FieldData> {
        self.flush();

        let desc = field.desc;
        let texel_bytes = desc.kind.channels() * 4;
        let padded_row = padded_bytes_per_row(desc.width, texel_bytes);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Field Readback"),
            size: u64::from(padded_row) * u64::from(desc.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Field Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &field.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(desc.width, desc.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| SimError::Readback(e.to_string()))?;
        futures::executor::block_on(rx)
            .map_err(|_| SimError::Readback("map callback dropped".into()))?
            .map_err(|e| SimError::Readback(e.to_string()))?;

        let mut values = Vec::with_capacity(desc.cell_count());
        {
            let bytes = slice.get_mapped_range();
            for row in bytes.chunks_exact(padded_row as usize) {
                for texel in row[..(desc.width * texel_bytes) as usize]
                    .chunks_exact(texel_bytes as usize)
                {
                    let x = f32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
                    let y = match desc.kind {
                        FieldKind::Scalar => 0.0,
                        FieldKind::Vector => {
                            f32::from_le_bytes([texel[4], texel[5], texel[6], texel[7]])
                        }
                    };
                    values.push([x, y]);
                }
            }
        }
        staging.unmap();
        Ok(FieldData { desc, values })
    }

    fn end_frame(&mut self) {
        self.flush();
    }

    fn live_fields(&self) -> usize {
        self.live_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationParameters;
    use crate::forcing::{ForcingSample, ForcingSource};
    use crate::simulation::cpu::CpuBackend;
    use crate::simulation::graph::SimulationGraph;
    use cgmath::Vector2;

    /// `None` when the machine has no usable adapter
    fn backend() -> Option<GpuBackend> {
        let context = pollster::block_on(GpuContext::headless()).ok()?;
        GpuBackend::new(&context, wgpu::TextureFormat::Rgba8Unorm).ok()
    }

    #[test]
    fn test_gpu_frame_tracks_cpu_reference() {
        let Some(mut gpu) = backend() else {
            eprintln!("no GPU adapter; skipping");
            return;
        };
        let mut cpu = CpuBackend::new();
        let params = SimulationParameters::default()
            .with_seed(7)
            .with_pressure_iterations(10);
        let forcing = [ForcingSample {
            position: Vector2::new(0.5, 0.5),
            velocity: Vector2::new(0.4, 0.1),
            radius: 0.1,
            strength: 1.0,
            source: ForcingSource::Pointer,
        }];

        let mut on_gpu = SimulationGraph::new(&mut gpu, params.clone(), 32, 32).unwrap();
        let mut on_cpu = SimulationGraph::new(&mut cpu, params, 32, 32).unwrap();
        for _ in 0..3 {
            on_gpu.step(&mut gpu, 1.0 / 60.0, &forcing).unwrap();
            on_cpu.step(&mut cpu, 1.0 / 60.0, &forcing).unwrap();
        }

        let a = on_gpu.read_velocity(&mut gpu).unwrap();
        let b = on_cpu.read_velocity(&mut cpu).unwrap();
        assert!(a.is_finite());
        let scale = b.max_magnitude().max(1.0);
        assert!(a.max_abs_diff(&b) <= 1e-2 * scale);

        on_gpu.destroy(&mut gpu);
        assert_eq!(gpu.live_fields(), 0);
    }
}
