//! The Multiverse three-pass pipeline
//!
//! Pass 1 renders each audio channel's waveform field into its own
//! offscreen target; pass 2 rotates each target with scale compensation;
//! pass 3 blends the four layers (optionally filtered by the region map
//! and composited with a camera layer) into the final 1920×1080 frame,
//! which is read back over a staging buffer.
//!
//! A failed pass or readback leaves the previous frame in place; the
//! first frame is zeros. Nothing here panics into the host.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use vav_bus::ParamSnapshot;
use vav_core::{ParamId, Sample};

use crate::context::GpuContext;
use crate::math::rotation_prescale;
use crate::{RenderError, RenderResult, Renderer};

pub const RENDER_WIDTH: u32 = 1920;
pub const RENDER_HEIGHT: u32 = 1080;

// ════════════════════════════════════════════════════════════════════
// Inputs
// ════════════════════════════════════════════════════════════════════

/// Channel-major audio window destined for the 4×W R32F texture.
///
/// The data is laid out `[channel][sample]`, C-contiguous, by
/// construction: `fill_channel` is the only writer, so a transposed view
/// can never reach the texture upload (which would read as diagonal
/// stripes on the GPU).
pub struct AudioWindow {
    width: usize,
    data: Vec<Sample>,
}

impl AudioWindow {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            data: vec![0.0; width * 4],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Linear-resample `samples` (any length) into channel row `ch`.
    pub fn fill_channel(&mut self, ch: usize, samples: &[Sample]) {
        assert!(ch < 4);
        let row = &mut self.data[ch * self.width..(ch + 1) * self.width];
        if samples.is_empty() {
            row.fill(0.0);
            return;
        }
        if samples.len() == 1 {
            row.fill(samples[0]);
            return;
        }
        let scale = (samples.len() - 1) as f32 / (self.width - 1).max(1) as f32;
        for (i, slot) in row.iter_mut().enumerate() {
            let pos = i as f32 * scale;
            let i0 = pos as usize;
            let frac = pos - i0 as f32;
            let i1 = (i0 + 1).min(samples.len() - 1);
            *slot = samples[i0] * (1.0 - frac) + samples[i1] * frac;
        }
    }

    /// Row-major, channel-per-row texel data.
    #[inline]
    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    #[inline]
    pub fn row(&self, ch: usize) -> &[Sample] {
        &self.data[ch * self.width..(ch + 1) * self.width]
    }
}

/// Per-frame renderer parameters, extracted once from the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    pub frequencies: [Sample; 4],
    pub intensities: [Sample; 4],
    pub curves: [Sample; 4],
    pub angles_deg: [Sample; 4],
    pub ratios: [Sample; 4],
    pub enabled: [bool; 4],
    pub blend_mode: Sample,
    pub color_scheme: Sample,
    pub brightness: Sample,
    pub base_hue: Sample,
    pub camera_intensity: Sample,
    pub use_region_map: bool,
}

impl RenderParams {
    pub fn from_snapshot(snap: &ParamSnapshot) -> Self {
        let per = |base: ParamId| -> [Sample; 4] {
            std::array::from_fn(|i| snap.get(ParamId::per_channel(base, i)))
        };
        Self {
            frequencies: per(ParamId::Freq1),
            intensities: per(ParamId::Intensity1),
            curves: per(ParamId::Curve1),
            angles_deg: per(ParamId::Angle1),
            ratios: per(ParamId::Ratio1),
            enabled: std::array::from_fn(|i| {
                snap.get(ParamId::per_channel(ParamId::Enabled1, i)) >= 0.5
            }),
            blend_mode: snap.get(ParamId::BlendMode),
            color_scheme: snap.get(ParamId::ColorScheme),
            brightness: snap.get(ParamId::Brightness),
            base_hue: snap.get(ParamId::BaseHue),
            camera_intensity: snap.get(ParamId::CameraIntensity),
            use_region_map: snap.get_bool(ParamId::UseRegionMap),
        }
    }
}

/// Borrowed region map (R8, one channel id per pixel).
#[derive(Clone, Copy)]
pub struct RegionMapData<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// Borrowed BGR camera frame for the 5th layer.
#[derive(Clone, Copy)]
pub struct CameraImage<'a> {
    pub width: u32,
    pub height: u32,
    pub bgr: &'a [u8],
}

/// Everything one frame needs.
pub struct RenderInputs<'a> {
    pub audio: &'a AudioWindow,
    pub params: RenderParams,
    pub region: Option<RegionMapData<'a>>,
    pub camera: Option<CameraImage<'a>>,
}

// ════════════════════════════════════════════════════════════════════
// Uniform mirrors (must match the WGSL structs)
// ════════════════════════════════════════════════════════════════════

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ChannelUniforms {
    // intensity, curve, ratio, channel index
    a: [f32; 4],
    // frequency, color scheme, base hue, enabled
    b: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct RotateUniforms {
    // cos, sin, scale, unused
    a: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BlendUniforms {
    // blend mode, brightness, camera intensity, use region map
    a: [f32; 4],
    enabled: [f32; 4],
}

// ════════════════════════════════════════════════════════════════════
// GPU renderer
// ════════════════════════════════════════════════════════════════════

pub struct MultiverseRenderer {
    ctx: Arc<GpuContext>,
    width: u32,
    height: u32,
    audio_width: u32,

    audio_tex: wgpu::Texture,
    channel_tex: [wgpu::Texture; 4],
    channel_views: [wgpu::TextureView; 4],
    rotated_tex: [wgpu::Texture; 4],
    rotated_views: [wgpu::TextureView; 4],
    final_tex: wgpu::Texture,
    final_view: wgpu::TextureView,
    region_tex: wgpu::Texture,
    region_size: (u32, u32),
    camera_tex: wgpu::Texture,
    camera_size: (u32, u32),

    channel_pipeline: wgpu::RenderPipeline,
    rotate_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,

    channel_uniforms: [wgpu::Buffer; 4],
    rotate_uniforms: [wgpu::Buffer; 4],
    blend_uniform: wgpu::Buffer,

    channel_bind_groups: [wgpu::BindGroup; 4],
    rotate_bind_groups: [wgpu::BindGroup; 4],
    blend_layout: wgpu::BindGroupLayout,
    blend_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,

    staging: wgpu::Buffer,
    camera_rgba: Vec<u8>,
    frame: Vec<u8>,
}

fn clear_attachment(view: &wgpu::TextureView) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        },
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
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
        format,
        usage,
        view_formats: &[],
    })
}

impl MultiverseRenderer {
    pub fn new(ctx: Arc<GpuContext>, audio_width: u32) -> RenderResult<Self> {
        Self::with_size(ctx, audio_width, RENDER_WIDTH, RENDER_HEIGHT)
    }

    pub fn with_size(
        ctx: Arc<GpuContext>,
        audio_width: u32,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        // Staging rows must be 256-byte aligned for the texture copy.
        if (width * 4) % 256 != 0 {
            return Err(RenderError::Buffer(format!(
                "render width {width} is not copy-aligned"
            )));
        }
        let device = &ctx.device;

        let channel_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Channel Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/channel.wgsl").into()),
        });
        let rotate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Rotate Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/rotate.wgsl").into()),
        });
        let blend_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blend Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blend.wgsl").into()),
        });

        // Textures
        let audio_tex = create_target(
            device,
            "Audio Window",
            audio_width,
            4,
            wgpu::TextureFormat::R32Float,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let layer_usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT;
        let channel_tex: [wgpu::Texture; 4] = std::array::from_fn(|i| {
            create_target(
                device,
                &format!("Channel {i}"),
                width,
                height,
                wgpu::TextureFormat::Rgba8Unorm,
                layer_usage,
            )
        });
        let rotated_tex: [wgpu::Texture; 4] = std::array::from_fn(|i| {
            create_target(
                device,
                &format!("Rotated {i}"),
                width,
                height,
                wgpu::TextureFormat::Rgba8Unorm,
                layer_usage,
            )
        });
        let final_tex = create_target(
            device,
            "Final Frame",
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let region_tex = create_target(
            device,
            "Region Map",
            1,
            1,
            wgpu::TextureFormat::R8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let camera_tex = create_target(
            device,
            "Camera Layer",
            1,
            1,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );

        let channel_views: [wgpu::TextureView; 4] = std::array::from_fn(|i| {
            channel_tex[i].create_view(&wgpu::TextureViewDescriptor::default())
        });
        let rotated_views: [wgpu::TextureView; 4] = std::array::from_fn(|i| {
            rotated_tex[i].create_view(&wgpu::TextureViewDescriptor::default())
        });
        let final_view = final_tex.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Layer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Uniform buffers
        let uniform_usage = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        let channel_uniforms: [wgpu::Buffer; 4] = std::array::from_fn(|i| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Channel Uniforms {i}")),
                size: std::mem::size_of::<ChannelUniforms>() as u64,
                usage: uniform_usage,
                mapped_at_creation: false,
            })
        });
        let rotate_uniforms: [wgpu::Buffer; 4] = std::array::from_fn(|i| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Rotate Uniforms {i}")),
                size: std::mem::size_of::<RotateUniforms>() as u64,
                usage: uniform_usage,
                mapped_at_creation: false,
            })
        });
        let blend_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blend Uniforms"),
            size: std::mem::size_of::<BlendUniforms>() as u64,
            usage: uniform_usage,
            mapped_at_creation: false,
        });

        // Bind group layouts
        let texture_entry = |binding, filterable| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Channel Layout"),
            entries: &[texture_entry(0, false), uniform_entry(1)],
        });
        let rotate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Rotate Layout"),
            entries: &[texture_entry(0, true), sampler_entry(1), uniform_entry(2)],
        });
        let blend_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blend Layout"),
            entries: &[
                texture_entry(0, true),
                texture_entry(1, true),
                texture_entry(2, true),
                texture_entry(3, true),
                texture_entry(4, true),
                texture_entry(5, true),
                sampler_entry(6),
                uniform_entry(7),
            ],
        });

        // Pipelines
        let make_pipeline = |label: &str,
                             layout: &wgpu::BindGroupLayout,
                             shader: &wgpu::ShaderModule|
         -> wgpu::RenderPipeline {
            let pipeline_layout =
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(label),
                    bind_group_layouts: &[layout],
                    push_constant_ranges: &[],
                });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let channel_pipeline = make_pipeline("Channel Pipeline", &channel_layout, &channel_shader);
        let rotate_pipeline = make_pipeline("Rotate Pipeline", &rotate_layout, &rotate_shader);
        let blend_pipeline = make_pipeline("Blend Pipeline", &blend_layout, &blend_shader);

        // Bind groups
        let audio_view = audio_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let channel_bind_groups: [wgpu::BindGroup; 4] = std::array::from_fn(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Channel Bind Group {i}")),
                layout: &channel_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&audio_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: channel_uniforms[i].as_entire_binding(),
                    },
                ],
            })
        });
        let rotate_bind_groups: [wgpu::BindGroup; 4] = std::array::from_fn(|i| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Rotate Bind Group {i}")),
                layout: &rotate_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&channel_views[i]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: rotate_uniforms[i].as_entire_binding(),
                    },
                ],
            })
        });

        let blend_bind_group = Self::make_blend_bind_group(
            device,
            &blend_layout,
            &rotated_views,
            &region_tex,
            &camera_tex,
            &sampler,
            &blend_uniform,
        );

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: (width * height * 4) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            ctx,
            width,
            height,
            audio_width,
            audio_tex,
            channel_tex,
            channel_views,
            rotated_tex,
            rotated_views,
            final_tex,
            final_view,
            region_tex,
            region_size: (1, 1),
            camera_tex,
            camera_size: (1, 1),
            channel_pipeline,
            rotate_pipeline,
            blend_pipeline,
            channel_uniforms,
            rotate_uniforms,
            blend_uniform,
            channel_bind_groups,
            rotate_bind_groups,
            blend_layout,
            blend_bind_group,
            sampler,
            staging,
            camera_rgba: Vec::new(),
            frame: vec![0; (width * height * 3) as usize],
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_blend_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        rotated_views: &[wgpu::TextureView; 4],
        region_tex: &wgpu::Texture,
        camera_tex: &wgpu::Texture,
        sampler: &wgpu::Sampler,
        uniform: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let region_view = region_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let camera_view = camera_tex.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blend Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&rotated_views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&rotated_views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&rotated_views[2]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&rotated_views[3]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&region_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(&camera_view),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: uniform.as_entire_binding(),
                },
            ],
        })
    }

    fn upload_audio(&self, audio: &AudioWindow) {
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.audio_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(audio.data()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                // Row-major, one channel per row. This layout is the
                // contract; a transposed upload renders as diagonal
                // stripes and must never happen.
                bytes_per_row: Some(self.audio_width * 4),
                rows_per_image: Some(4),
            },
            wgpu::Extent3d {
                width: self.audio_width,
                height: 4,
                depth_or_array_layers: 1,
            },
        );
    }

    fn ensure_region(&mut self, region: &RegionMapData<'_>) {
        if self.region_size != (region.width, region.height) {
            self.region_tex = create_target(
                &self.ctx.device,
                "Region Map",
                region.width,
                region.height,
                wgpu::TextureFormat::R8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            self.region_size = (region.width, region.height);
            self.rebuild_blend_bind_group();
        }
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.region_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            region.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn ensure_camera(&mut self, camera: &CameraImage<'_>) {
        if self.camera_size != (camera.width, camera.height) {
            self.camera_tex = create_target(
                &self.ctx.device,
                "Camera Layer",
                camera.width,
                camera.height,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            );
            self.camera_size = (camera.width, camera.height);
            self.rebuild_blend_bind_group();
        }
        let n = (camera.width * camera.height) as usize;
        self.camera_rgba.resize(n * 4, 255);
        for (i, px) in camera.bgr.chunks_exact(3).take(n).enumerate() {
            self.camera_rgba[i * 4] = px[2];
            self.camera_rgba[i * 4 + 1] = px[1];
            self.camera_rgba[i * 4 + 2] = px[0];
            self.camera_rgba[i * 4 + 3] = 255;
        }
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.camera_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.camera_rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(camera.width * 4),
                rows_per_image: Some(camera.height),
            },
            wgpu::Extent3d {
                width: camera.width,
                height: camera.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn rebuild_blend_bind_group(&mut self) {
        self.blend_bind_group = Self::make_blend_bind_group(
            &self.ctx.device,
            &self.blend_layout,
            &self.rotated_views,
            &self.region_tex,
            &self.camera_tex,
            &self.sampler,
            &self.blend_uniform,
        );
    }

    fn update_uniforms(&self, params: &RenderParams) {
        for i in 0..4 {
            let cu = ChannelUniforms {
                a: [
                    params.intensities[i],
                    params.curves[i],
                    params.ratios[i],
                    i as f32,
                ],
                b: [
                    params.frequencies[i],
                    params.color_scheme,
                    params.base_hue,
                    if params.enabled[i] { 1.0 } else { 0.0 },
                ],
            };
            self.ctx
                .queue
                .write_buffer(&self.channel_uniforms[i], 0, bytemuck::bytes_of(&cu));

            let angle = params.angles_deg[i].to_radians();
            let ru = RotateUniforms {
                a: [angle.cos(), angle.sin(), rotation_prescale(angle), 0.0],
            };
            self.ctx
                .queue
                .write_buffer(&self.rotate_uniforms[i], 0, bytemuck::bytes_of(&ru));
        }

        let use_region = params.use_region_map;
        let bu = BlendUniforms {
            a: [
                params.blend_mode,
                params.brightness,
                params.camera_intensity,
                if use_region { 1.0 } else { 0.0 },
            ],
            enabled: std::array::from_fn(|i| if params.enabled[i] { 1.0 } else { 0.0 }),
        };
        self.ctx
            .queue
            .write_buffer(&self.blend_uniform, 0, bytemuck::bytes_of(&bu));
    }

    fn readback(&mut self) -> RenderResult<()> {
        let buffer_slice = self.staging.slice(..);
        let (sender, receiver) = flume::bounded(1);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        let _ = self.ctx.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| RenderError::Render(e.to_string()))?
            .map_err(|e| RenderError::Render(e.to_string()))?;

        {
            let data = buffer_slice.get_mapped_range();
            for (dst, src) in self.frame.chunks_exact_mut(3).zip(data.chunks_exact(4)) {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
            }
        }
        self.staging.unmap();
        Ok(())
    }

    fn render_frame(&mut self, inputs: &RenderInputs<'_>) -> RenderResult<()> {
        if inputs.audio.width() != self.audio_width as usize {
            return Err(RenderError::Render(format!(
                "audio window width {} does not match texture width {}",
                inputs.audio.width(),
                self.audio_width
            )));
        }

        self.upload_audio(inputs.audio);
        self.update_uniforms(&inputs.params);
        if let Some(region) = &inputs.region {
            self.ensure_region(region);
        }
        if let Some(camera) = &inputs.camera {
            self.ensure_camera(camera);
        }

        let mut encoder =
            self.ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Multiverse Encoder"),
                });

        // Pass 1: channel waveform fields
        for i in 0..4 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Channel Pass"),
                color_attachments: &[Some(clear_attachment(&self.channel_views[i]))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.channel_pipeline);
            pass.set_bind_group(0, &self.channel_bind_groups[i], &[]);
            pass.draw(0..3, 0..1);
        }

        // Pass 2: rotation with scale compensation
        for i in 0..4 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Rotate Pass"),
                color_attachments: &[Some(clear_attachment(&self.rotated_views[i]))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.rotate_pipeline);
            pass.set_bind_group(0, &self.rotate_bind_groups[i], &[]);
            pass.draw(0..3, 0..1);
        }

        // Pass 3: blend + region + camera layer
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blend Pass"),
                color_attachments: &[Some(clear_attachment(&self.final_view))],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.blend_pipeline);
            pass.set_bind_group(0, &self.blend_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.final_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.width * 4),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        self.readback()
    }
}

impl Renderer for MultiverseRenderer {
    /// Render one frame. On failure the previous frame is returned
    /// unchanged (zeros before the first success).
    fn render(&mut self, inputs: &RenderInputs<'_>) -> &[u8] {
        if let Err(e) = self.render_frame(inputs) {
            log::warn!("render frame failed, keeping previous: {e}");
        }
        &self.frame
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_window_is_channel_major() {
        let mut win = AudioWindow::new(64);
        win.fill_channel(0, &[1.0; 100]);
        win.fill_channel(1, &[2.0; 100]);
        win.fill_channel(2, &[3.0; 100]);
        win.fill_channel(3, &[4.0; 100]);

        // Row-major layout: each 64-sample run is one channel. Transposed
        // data would interleave 1,2,3,4 every fourth element instead.
        let data = win.data();
        assert_eq!(data.len(), 64 * 4);
        for ch in 0..4 {
            let expected = ch as f32 + 1.0;
            assert!(win.row(ch).iter().all(|&v| (v - expected).abs() < 1e-6));
            assert!(
                data[ch * 64..(ch + 1) * 64]
                    .iter()
                    .all(|&v| (v - expected).abs() < 1e-6)
            );
        }
    }

    #[test]
    fn audio_window_resamples_preserving_endpoints() {
        let mut win = AudioWindow::new(32);
        let src: Vec<f32> = (0..2400).map(|i| i as f32 / 2399.0).collect();
        win.fill_channel(0, &src);
        let row = win.row(0);
        assert!((row[0] - 0.0).abs() < 1e-5);
        assert!((row[31] - 1.0).abs() < 1e-5);
        // Monotonic ramp survives resampling.
        for pair in row.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn render_params_pull_per_channel_values() {
        use vav_bus::ParameterStore;
        let store = ParameterStore::new();
        store.set(ParamId::Freq3, 440.0);
        store.set(ParamId::Angle2, 90.0);
        store.set_bool(ParamId::Enabled4, false);
        let params = RenderParams::from_snapshot(&store.snapshot());
        assert!((params.frequencies[2] - 440.0).abs() < 1e-4);
        assert!((params.angles_deg[1] - 90.0).abs() < 1e-4);
        assert!(!params.enabled[3]);
        assert!(params.enabled[0]);
    }
}
