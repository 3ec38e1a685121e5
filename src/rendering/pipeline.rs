//! wgpu implementation of [`GpuContext`]
//!
//! Quads are collected during a frame and encoded into one render pass by
//! [`WgpuContext::present`]. Textures destroyed mid-frame stay alive until that
//! pass has been submitted, since earlier draws in the same frame may still
//! sample them.

use crate::core::geo::Point;
use crate::prelude::HashMap;
use crate::rendering::camera::transform_point;
use crate::rendering::context::{GpuContext, TextureHandle, ViewportRect};
use crate::rendering::palette::Rgba;
use crate::{MapError, Result};
use nalgebra::Matrix3;
use std::iter;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Device, Queue, RenderPipeline, Sampler, Texture, TextureView};

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Vertex of a textured quad, already in clip space
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Two triangles covering the unit quad mapped by `transform`, in clip space
/// for a surface of `size` pixels.
pub fn quad_vertices(transform: &Matrix3<f64>, size: (u32, u32)) -> [QuadVertex; 6] {
    let (w, h) = (size.0.max(1) as f64, size.1.max(1) as f64);
    let corner = |u: f32, v: f32| {
        let p = transform_point(transform, Point::new(u as f64, v as f64));
        QuadVertex {
            position: [(2.0 * p.x / w - 1.0) as f32, (1.0 - 2.0 * p.y / h) as f32],
            uv: [u, v],
        }
    };
    let (a, b, c, d) = (corner(0.0, 0.0), corner(1.0, 0.0), corner(1.0, 1.0), corner(0.0, 1.0));
    [a, b, c, a, c, d]
}

struct GpuTexture {
    texture: Texture,
    bind_group: BindGroup,
}

enum DrawItem {
    Quad { handle: TextureHandle, first_vertex: u32 },
    Viewport(ViewportRect),
}

/// Renders into an offscreen target owned by the context.
///
/// Hosts with a window can draw into their own surface texture through
/// [`WgpuContext::present_to`].
pub struct WgpuContext {
    device: Device,
    queue: Queue,
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    sampler: Sampler,
    target: Texture,
    size: (u32, u32),
    clear_color: wgpu::Color,

    next_id: u64,
    textures: HashMap<TextureHandle, GpuTexture>,
    items: Vec<DrawItem>,
    vertices: Vec<QuadVertex>,
    /// Destroyed this frame, freed after the next submit
    retired: HashMap<TextureHandle, GpuTexture>,
}

impl WgpuContext {
    /// Opens the default adapter and sets up an offscreen target of `width` x `height`
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| MapError::Render("no suitable graphics adapter".into()))?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("movingmap device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| MapError::Render(format!("failed to create device: {e}")))?;

        Ok(Self::from_device(device, queue, width, height))
    }

    /// Builds the context on a device the host already owns
    pub fn from_device(device: Device, queue: Queue, width: u32, height: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/tile.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[QuadVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            // Mirrored transforms flip the winding
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
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Quad Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let target = Self::create_target(&device, width, height);

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            target,
            size: (width.max(1), height.max(1)),
            clear_color: wgpu::Color::BLACK,
            next_id: 1,
            textures: HashMap::default(),
            items: Vec::new(),
            vertices: Vec::new(),
            retired: HashMap::default(),
        }
    }

    fn create_target(device: &Device, width: u32, height: u32) -> Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Map Target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The offscreen texture [`WgpuContext::present`] draws into
    pub fn target(&self) -> &Texture {
        &self.target
    }

    pub fn set_clear_color(&mut self, color: Rgba) {
        let c = |v: u8| v as f64 / 255.0;
        self.clear_color = wgpu::Color {
            r: c(color[0]),
            g: c(color[1]),
            b: c(color[2]),
            a: c(color[3]),
        };
    }

    /// Recreates the offscreen target. Pending draws are dropped.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.items.clear();
        self.vertices.clear();
        self.target.destroy();
        self.target = Self::create_target(&self.device, width, height);
        self.size = (width.max(1), height.max(1));
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Draws the frame's quads into the offscreen target
    pub fn present(&mut self) {
        let view = self.target.create_view(&wgpu::TextureViewDescriptor::default());
        self.present_to(&view);
    }

    /// Draws the frame's quads into `view`, which must match the context size
    /// and use an sRGB RGBA8 format.
    pub fn present_to(&mut self, view: &TextureView) {
        let items = std::mem::take(&mut self.items);
        let vertices = std::mem::take(&mut self.vertices);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Map Frame Encoder"),
            });

        let vertex_buffer = (!vertices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Quad Vertices"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Map Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(buffer) = &vertex_buffer {
                pass.set_pipeline(&self.pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));

                for item in &items {
                    match item {
                        DrawItem::Viewport(rect) => {
                            let rect = clamp_viewport(*rect, self.size);
                            if rect.width > 0 && rect.height > 0 {
                                pass.set_viewport(
                                    rect.x as f32,
                                    rect.y as f32,
                                    rect.width as f32,
                                    rect.height as f32,
                                    0.0,
                                    1.0,
                                );
                            }
                        }
                        DrawItem::Quad {
                            handle,
                            first_vertex,
                        } => {
                            // Retired textures are still valid until submit
                            let texture = self
                                .textures
                                .get(handle)
                                .or_else(|| self.retired.get(handle));
                            if let Some(texture) = texture {
                                pass.set_bind_group(0, &texture.bind_group, &[]);
                                pass.draw(*first_vertex..*first_vertex + 6, 0..1);
                            }
                        }
                    }
                }
            }
        }

        self.queue.submit(iter::once(encoder.finish()));

        for (_, retired) in self.retired.drain() {
            retired.texture.destroy();
        }
    }
}

fn clamp_viewport(rect: ViewportRect, size: (u32, u32)) -> ViewportRect {
    let x = rect.x.min(size.0);
    let y = rect.y.min(size.1);
    ViewportRect {
        x,
        y,
        width: rect.width.min(size.0 - x),
        height: rect.height.min(size.1 - y),
    }
}

impl GpuContext for WgpuContext {
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureHandle> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(MapError::Render(format!(
                "texture size {width}x{height} outside 1..={max}"
            )));
        }
        if rgba.len() != (width * height * 4) as usize {
            return Err(MapError::Render(format!(
                "expected {} bytes for a {width}x{height} texture, got {}",
                width * height * 4,
                rgba.len()
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Map Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Map Texture Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let handle = TextureHandle::new(self.next_id);
        self.next_id += 1;
        self.textures.insert(handle, GpuTexture { texture, bind_group });
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(&handle) {
            self.retired.insert(handle, texture);
        }
    }

    fn draw_textured_quad(&mut self, handle: TextureHandle, transform: &Matrix3<f64>) {
        if !self.textures.contains_key(&handle) {
            log::trace!("skipping draw of unknown texture {}", handle.id());
            return;
        }
        let first_vertex = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&quad_vertices(transform, self.size));
        self.items.push(DrawItem::Quad {
            handle,
            first_vertex,
        });
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.items.push(DrawItem::Viewport(viewport));
    }

    fn reset_viewport(&mut self) {
        self.items.push(DrawItem::Viewport(ViewportRect::full(self.size)));
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for WgpuContext {
    fn drop(&mut self) {
        for (_, texture) in self.textures.drain() {
            texture.texture.destroy();
        }
        for (_, texture) in self.retired.drain() {
            texture.texture.destroy();
        }
    }
}
