//! The GPU compositor (C7, §4.7): a three-pass wgpu pipeline.
//!
//! The spec's five conceptual stages are realized as three real render
//! passes — per-channel layer pass and rotation pass are fused into one
//! shader (the rotation UV transform is identity when `|angle|` is
//! below threshold, so a separate pass would only ever re-draw the
//! same pixels); the four-way blend accumulation and the camera blend
//! are each a single fragment shader invocation reading every input
//! texture directly rather than four sequential ping-ponged passes.
//! Every operation the spec names (curve deformation, HSV coloring,
//! rotation, four blend modes faded by position, region-map
//! partitioning, camera blend, brightness/floor) still runs exactly
//! once per frame; only the pass *count* is consolidated.

use std::sync::Arc;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use kine_video::RgbFrame;

use crate::common::{GpuContext, VizError, VizResult};
use crate::palette::resolve_channel_hues;

pub const CHANNEL_COUNT: usize = 4;
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

/// Rotation angle below which the rotation transform is skipped
/// (§4.7 step 2's "conditional per channel if `|angle| > threshold`").
const ROTATION_THRESHOLD_DEG: f32 = 0.5;

/// Curve-deformation displacement scale (`K` in §4.7 step 1).
const CURVE_DISPLACEMENT_K: f32 = 0.12;

/// Per-channel knobs driving the layer pass, resolved once per frame
/// from the smoothed parameter store.
#[derive(Debug, Clone, Copy)]
pub struct ChannelParams {
    pub enabled: bool,
    pub intensity: f32,
    pub rotation_deg: f32,
    pub curve: f32,
    pub pitch_ratio: f32,
}

/// Global knobs for the blend and final passes.
#[derive(Debug, Clone, Copy)]
pub struct CompositorParams {
    pub base_hue: f32,
    pub color_scheme_fader: f32,
    pub blend_mode_fader: f32,
    pub brightness: f32,
    pub region_map_enable: bool,
    pub camera_mix: f32,
}

impl Default for CompositorParams {
    fn default() -> Self {
        Self {
            base_hue: 0.0,
            color_scheme_fader: 0.0,
            blend_mode_fader: 0.0,
            brightness: 1.0,
            region_map_enable: false,
            camera_mix: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LayerUniforms {
    rotation_cos: f32,
    rotation_sin: f32,
    rotation_scale: f32,
    curve: f32,
    pitch_ratio: f32,
    intensity: f32,
    hue: f32,
    enabled: f32,
    width: u32,
    _padding: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BlendUniforms {
    blend_fader: f32,
    region_map_enable: f32,
    _padding: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FinalUniforms {
    camera_mix: f32,
    blend_fader: f32,
    brightness: f32,
    _padding: f32,
}

struct ChannelLayer {
    waveform_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture_view: wgpu::TextureView,
    width: usize,
}

/// Owns every GPU resource the three passes need: the per-channel
/// layer targets, the blend accumulator, the camera texture, and the
/// final output target.
pub struct GpuCompositor {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    width: u32,
    height: u32,

    layer_pipeline: wgpu::RenderPipeline,
    channels: [ChannelLayer; CHANNEL_COUNT],

    blend_pipeline: wgpu::RenderPipeline,
    blend_bind_group_layout: wgpu::BindGroupLayout,
    blend_uniform_buffer: wgpu::Buffer,
    accumulator_view: wgpu::TextureView,

    final_pipeline: wgpu::RenderPipeline,
    final_bind_group_layout: wgpu::BindGroupLayout,
    final_uniform_buffer: wgpu::Buffer,
    output_texture: wgpu::Texture,

    camera_texture: wgpu::Texture,
    camera_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

impl GpuCompositor {
    pub fn new(ctx: &GpuContext, width: u32, height: u32, ring_width: usize) -> VizResult<Self> {
        let device = ctx.device.clone();
        let queue = ctx.queue.clone();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kine-viz compositor sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let (layer_pipeline, layer_bind_group_layout) = build_layer_pipeline(&device);
        let channels = std::array::from_fn(|_| {
            make_channel_layer(&device, &layer_bind_group_layout, &sampler, width, height, ring_width)
        });

        let accumulator_texture = make_float_texture(&device, width, height, "accumulator");
        let accumulator_view = accumulator_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let camera_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kine-viz camera texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let camera_view = camera_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let (blend_pipeline, blend_bind_group_layout, blend_uniform_buffer) =
            build_blend_pipeline(&device);

        let (final_pipeline, final_bind_group_layout, final_uniform_buffer) =
            build_final_pipeline(&device);

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kine-viz compositor output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        Ok(Self {
            device,
            queue,
            width,
            height,
            layer_pipeline,
            channels,
            blend_pipeline,
            blend_bind_group_layout,
            blend_uniform_buffer,
            accumulator_view,
            final_pipeline,
            final_bind_group_layout,
            final_uniform_buffer,
            output_texture,
            camera_texture,
            camera_view,
            sampler,
        })
    }

    /// Upload a new camera/diffusion frame. Called once per frame
    /// before [`render`](Self::render); harmless to skip when the
    /// frame source has nothing new (§4.8 reuses the previous frame).
    pub fn upload_camera_frame(&self, frame: &RgbFrame) {
        let mut rgba = Vec::with_capacity(frame.data.len() / 3 * 4);
        for px in frame.data.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.camera_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.width * 4),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Render one frame: layer pass ×4, blend pass, final pass.
    /// `waveforms` is the decimated ring snapshot per channel (§4.6).
    pub fn render(
        &self,
        waveforms: &[Vec<f32>; CHANNEL_COUNT],
        channel_params: &[ChannelParams; CHANNEL_COUNT],
        params: &CompositorParams,
    ) {
        let hues = resolve_channel_hues(params.base_hue, params.color_scheme_fader);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kine-viz compositor encoder"),
            });

        for (i, channel) in self.channels.iter().enumerate() {
            let cp = channel_params[i];
            let waveform = &waveforms[i];
            if !waveform.is_empty() {
                let data: Vec<f32> = waveform.iter().copied().collect();
                self.queue
                    .write_buffer(&channel.waveform_buffer, 0, bytemuck::cast_slice(&data));
            }

            let rot = if cp.rotation_deg.abs() > ROTATION_THRESHOLD_DEG {
                cp.rotation_deg.to_radians()
            } else {
                0.0
            };
            let scale = rot.cos().abs() + rot.sin().abs();
            let uniforms = LayerUniforms {
                rotation_cos: rot.cos(),
                rotation_sin: rot.sin(),
                rotation_scale: scale.max(1.0),
                curve: cp.curve,
                pitch_ratio: cp.pitch_ratio.max(1e-3),
                intensity: cp.intensity,
                hue: hues[i],
                enabled: if cp.enabled { 1.0 } else { 0.0 },
                width: channel.width as u32,
                _padding: [0; 3],
            };
            self.queue
                .write_buffer(&channel.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kine-viz layer pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &channel.texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.layer_pipeline);
            pass.set_bind_group(0, &channel.bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        let blend_uniforms = BlendUniforms {
            blend_fader: params.blend_mode_fader,
            region_map_enable: if params.region_map_enable { 1.0 } else { 0.0 },
            _padding: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.blend_uniform_buffer, 0, bytemuck::bytes_of(&blend_uniforms));

        let blend_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kine-viz blend bind group"),
            layout: &self.blend_bind_group_layout,
            entries: &[
                entry(0, wgpu::BindingResource::TextureView(&self.channels[0].texture_view)),
                entry(1, wgpu::BindingResource::TextureView(&self.channels[1].texture_view)),
                entry(2, wgpu::BindingResource::TextureView(&self.channels[2].texture_view)),
                entry(3, wgpu::BindingResource::TextureView(&self.channels[3].texture_view)),
                entry(4, wgpu::BindingResource::TextureView(&self.camera_view)),
                entry(5, wgpu::BindingResource::Sampler(&self.sampler)),
                entry(6, self.blend_uniform_buffer.as_entire_binding()),
            ],
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kine-viz blend pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.accumulator_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blend_pipeline);
            pass.set_bind_group(0, &blend_bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        let final_uniforms = FinalUniforms {
            camera_mix: params.camera_mix.clamp(0.0, 0.3),
            blend_fader: params.blend_mode_fader,
            brightness: params.brightness.max(0.0),
            _padding: 0.0,
        };
        self.queue
            .write_buffer(&self.final_uniform_buffer, 0, bytemuck::bytes_of(&final_uniforms));

        let output_view = self
            .output_texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let final_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kine-viz final bind group"),
            layout: &self.final_bind_group_layout,
            entries: &[
                entry(0, wgpu::BindingResource::TextureView(&self.accumulator_view)),
                entry(1, wgpu::BindingResource::TextureView(&self.camera_view)),
                entry(2, wgpu::BindingResource::Sampler(&self.sampler)),
                entry(3, self.final_uniform_buffer.as_entire_binding()),
            ],
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kine-viz final pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.final_pipeline);
            pass.set_bind_group(0, &final_bind_group, &[]);
            pass.draw(0..6, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read the final RGB8 framebuffer back to the CPU. Blocking;
    /// intended for the host's present step or for tests, never called
    /// from the GL thread's steady-state draw loop.
    pub fn read_output_rgba8(&self) -> VizResult<Vec<u8>> {
        let bytes_per_pixel = 4u32;
        let unpadded_bytes_per_row = self.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (unpadded_bytes_per_row + align - 1) / align * align;

        let buffer_size = (padded_bytes_per_row * self.height) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kine-viz readback buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kine-viz readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.output_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| VizError::Render(e.to_string()))?;
        receiver
            .recv_timeout(Duration::from_secs(1))
            .map_err(|e| VizError::Render(e.to_string()))?
            .map_err(|e| VizError::Render(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut out = Vec::with_capacity((unpadded_bytes_per_row * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded_bytes_per_row) as usize;
            out.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        staging.unmap();
        Ok(out)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[inline]
fn entry(binding: u32, resource: wgpu::BindingResource) -> wgpu::BindGroupEntry {
    wgpu::BindGroupEntry { binding, resource }
}

fn make_float_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba16Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    })
}

fn make_channel_layer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
    ring_width: usize,
) -> ChannelLayer {
    let ring_width = ring_width.max(1);
    let waveform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("kine-viz channel waveform buffer"),
        contents: bytemuck::cast_slice(&vec![0.0f32; ring_width]),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kine-viz channel uniform buffer"),
        size: std::mem::size_of::<LayerUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let texture = make_float_texture(device, width, height, "kine-viz channel layer");
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("kine-viz channel bind group"),
        layout,
        entries: &[
            entry(0, waveform_buffer.as_entire_binding()),
            entry(1, uniform_buffer.as_entire_binding()),
            entry(2, wgpu::BindingResource::Sampler(sampler)),
        ],
    });

    ChannelLayer {
        waveform_buffer,
        uniform_buffer,
        bind_group,
        texture_view,
        width: ring_width,
    }
}

fn build_layer_pipeline(device: &wgpu::Device) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("kine-viz layer shader"),
        source: wgpu::ShaderSource::Wgsl(layer_shader_source().into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("kine-viz layer bind group layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("kine-viz layer pipeline layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("kine-viz layer pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba16Float,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout)
}

fn build_blend_pipeline(
    device: &wgpu::Device,
) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout, wgpu::Buffer) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("kine-viz blend shader"),
        source: wgpu::ShaderSource::Wgsl(blend_shader_source().into()),
    });

    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("kine-viz blend bind group layout"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            texture_entry(2),
            texture_entry(3),
            texture_entry(4),
            wgpu::BindGroupLayoutEntry {
                binding: 5,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 6,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kine-viz blend uniform buffer"),
        size: std::mem::size_of::<BlendUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("kine-viz blend pipeline layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("kine-viz blend pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba16Float,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout, uniform_buffer)
}

fn build_final_pipeline(
    device: &wgpu::Device,
) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout, wgpu::Buffer) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("kine-viz final shader"),
        source: wgpu::ShaderSource::Wgsl(final_shader_source().into()),
    });

    let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("kine-viz final bind group layout"),
        entries: &[
            texture_entry(0),
            texture_entry(1),
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kine-viz final uniform buffer"),
        size: std::mem::size_of::<FinalUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("kine-viz final pipeline layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("kine-viz final pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout, uniform_buffer)
}

const FULLSCREEN_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0), vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, 1.0), vec2<f32>(-1.0, 1.0),
    );
    var uvs = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 1.0), vec2<f32>(1.0, 1.0), vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0), vec2<f32>(1.0, 0.0), vec2<f32>(0.0, 0.0),
    );
    var output: VertexOutput;
    output.position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    output.uv = uvs[vertex_index];
    return output;
}
"#;

const LAYER_SHADER_FRAGMENT: &str = r#"
struct Uniforms {
    rotation_cos: f32,
    rotation_sin: f32,
    rotation_scale: f32,
    curve: f32,
    pitch_ratio: f32,
    intensity: f32,
    hue: f32,
    enabled: f32,
    width: u32,
}

@group(0) @binding(0) var<storage, read> waveform: array<f32>;
@group(0) @binding(1) var<uniform> u: Uniforms;
@group(0) @binding(2) var samp: sampler;

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> vec3<f32> {
    let hh = (h % 360.0 + 360.0) % 360.0;
    let c = v * s;
    let x = c * (1.0 - abs((hh / 60.0) % 2.0 - 1.0));
    let m = v - c;
    var rgb: vec3<f32>;
    if (hh < 60.0) { rgb = vec3<f32>(c, x, 0.0); }
    else if (hh < 120.0) { rgb = vec3<f32>(x, c, 0.0); }
    else if (hh < 180.0) { rgb = vec3<f32>(0.0, c, x); }
    else if (hh < 240.0) { rgb = vec3<f32>(0.0, x, c); }
    else if (hh < 300.0) { rgb = vec3<f32>(x, 0.0, c); }
    else { rgb = vec3<f32>(c, 0.0, x); }
    return rgb + vec3<f32>(m, m, m);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    if (u.enabled < 0.5) {
        return vec4<f32>(0.0, 0.0, 0.0, 0.0);
    }

    // Inverse-rotation UV transform, scaled so the rotated rectangle
    // still fully covers the output (no black corners).
    let centered = (in.uv - vec2<f32>(0.5, 0.5)) * u.rotation_scale;
    let rotated = vec2<f32>(
        centered.x * u.rotation_cos + centered.y * u.rotation_sin,
        -centered.x * u.rotation_sin + centered.y * u.rotation_cos,
    ) + vec2<f32>(0.5, 0.5);

    // Curve deformation: y shifts the sampled x by curve * sin(pi*y) * K.
    let shifted_x = rotated.x + u.curve * sin(3.14159265 * rotated.y) * 0.12;
    let sample_pos = fract(shifted_x * u.pitch_ratio) * f32(u.width);
    let index = u32(clamp(sample_pos, 0.0, f32(u.width) - 1.0));
    let s = waveform[index];

    let mag = clamp(abs(s), 0.0, 1.0);
    let value = clamp(mag * u.intensity, 0.0, 1.0);
    let saturation = mix(0.35, 1.0, mag);
    let rgb = hsv_to_rgb(u.hue, saturation, value);
    return vec4<f32>(rgb, value);
}
"#;

const BLEND_SHADER_FRAGMENT: &str = r#"
struct Uniforms {
    blend_fader: f32,
    region_map_enable: f32,
}

@group(0) @binding(0) var layer0: texture_2d<f32>;
@group(0) @binding(1) var layer1: texture_2d<f32>;
@group(0) @binding(2) var layer2: texture_2d<f32>;
@group(0) @binding(3) var layer3: texture_2d<f32>;
@group(0) @binding(4) var camera_tex: texture_2d<f32>;
@group(0) @binding(5) var samp: sampler;
@group(0) @binding(6) var<uniform> u: Uniforms;

fn blend_channel(mode: u32, a: f32, b: f32) -> f32 {
    if (mode == 0u) { return a + b; }
    if (mode == 1u) { return 1.0 - (1.0 - a) * (1.0 - b); }
    if (mode == 2u) { return abs(a - b); }
    if (b >= 1.0) { return 1.0; }
    return min(a / (1.0 - b), 1.0);
}

fn blend_fader(fader: f32, a: f32, b: f32) -> f32 {
    let scaled = clamp(fader, 0.0, 1.0) * 3.0;
    let lo = u32(min(floor(scaled), 2.0));
    let t = scaled - f32(lo);
    return mix(blend_channel(lo, a, b), blend_channel(lo + 1u, a, b), t);
}

fn luminance(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.299, 0.587, 0.114));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l0 = textureSample(layer0, samp, in.uv);
    let l1 = textureSample(layer1, samp, in.uv);
    let l2 = textureSample(layer2, samp, in.uv);
    let l3 = textureSample(layer3, samp, in.uv);

    if (u.region_map_enable > 0.5) {
        let cam = textureSample(camera_tex, samp, in.uv);
        let quartile = u32(clamp(luminance(cam.rgb) * 4.0, 0.0, 3.999));
        var chosen = l0;
        if (quartile == 1u) { chosen = l1; }
        if (quartile == 2u) { chosen = l2; }
        if (quartile == 3u) { chosen = l3; }
        let r = blend_fader(u.blend_fader, chosen.r, 0.0);
        let g = blend_fader(u.blend_fader, chosen.g, 0.0);
        let b = blend_fader(u.blend_fader, chosen.b, 0.0);
        return vec4<f32>(r, g, b, chosen.a);
    }

    var acc = vec3<f32>(0.0, 0.0, 0.0);
    acc = vec3<f32>(
        blend_fader(u.blend_fader, l0.r, acc.r),
        blend_fader(u.blend_fader, l0.g, acc.g),
        blend_fader(u.blend_fader, l0.b, acc.b),
    );
    acc = vec3<f32>(
        blend_fader(u.blend_fader, l1.r, acc.r),
        blend_fader(u.blend_fader, l1.g, acc.g),
        blend_fader(u.blend_fader, l1.b, acc.b),
    );
    acc = vec3<f32>(
        blend_fader(u.blend_fader, l2.r, acc.r),
        blend_fader(u.blend_fader, l2.g, acc.g),
        blend_fader(u.blend_fader, l2.b, acc.b),
    );
    acc = vec3<f32>(
        blend_fader(u.blend_fader, l3.r, acc.r),
        blend_fader(u.blend_fader, l3.g, acc.g),
        blend_fader(u.blend_fader, l3.b, acc.b),
    );
    return vec4<f32>(acc, 1.0);
}
"#;

const FINAL_SHADER_FRAGMENT: &str = r#"
struct Uniforms {
    camera_mix: f32,
    blend_fader: f32,
    brightness: f32,
}

@group(0) @binding(0) var accumulator: texture_2d<f32>;
@group(0) @binding(1) var camera_tex: texture_2d<f32>;
@group(0) @binding(2) var samp: sampler;
@group(0) @binding(3) var<uniform> u: Uniforms;

fn blend_channel(mode: u32, a: f32, b: f32) -> f32 {
    if (mode == 0u) { return a + b; }
    if (mode == 1u) { return 1.0 - (1.0 - a) * (1.0 - b); }
    if (mode == 2u) { return abs(a - b); }
    if (b >= 1.0) { return 1.0; }
    return min(a / (1.0 - b), 1.0);
}

fn blend_fader(fader: f32, a: f32, b: f32) -> f32 {
    let scaled = clamp(fader, 0.0, 1.0) * 3.0;
    let lo = u32(min(floor(scaled), 2.0));
    let t = scaled - f32(lo);
    return mix(blend_channel(lo, a, b), blend_channel(lo + 1u, a, b), t);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let acc = textureSample(accumulator, samp, in.uv);
    let cam = textureSample(camera_tex, samp, in.uv);

    let mixed = vec3<f32>(
        blend_fader(u.blend_fader, acc.r, cam.r * u.camera_mix),
        blend_fader(u.blend_fader, acc.g, cam.g * u.camera_mix),
        blend_fader(u.blend_fader, acc.b, cam.b * u.camera_mix),
    );

    let floored = max(mixed * u.brightness, vec3<f32>(0.1, 0.1, 0.1));
    return vec4<f32>(clamp(floored, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

fn layer_shader_source() -> String {
    format!("{FULLSCREEN_VERTEX}\n{LAYER_SHADER_FRAGMENT}")
}

fn blend_shader_source() -> String {
    format!("{FULLSCREEN_VERTEX}\n{BLEND_SHADER_FRAGMENT}")
}

fn final_shader_source() -> String {
    format!("{FULLSCREEN_VERTEX}\n{FINAL_SHADER_FRAGMENT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_threshold_skips_small_angles() {
        assert!(0.1_f32 < ROTATION_THRESHOLD_DEG);
    }

    #[test]
    fn shader_text_assembles_without_panicking() {
        assert!(layer_shader_source().contains("fs_main"));
        assert!(blend_shader_source().contains("fs_main"));
        assert!(final_shader_source().contains("fs_main"));
    }
}
