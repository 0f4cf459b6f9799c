//! wgpu pick renderer.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use cadpick_core::{PickCamera, RenderMode, TriangleMesh};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, RenderResult};
use crate::pipeline::DrawItem;
use crate::readback::PendingReadback;
use crate::renderer::PickRenderer;
use crate::target::PixelRect;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Vertex layout of the pick shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PickVertex {
    pub position: [f32; 3],
    pub tree_index: u32,
}

/// Per-draw uniforms of the pick shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub mvp: [[f32; 4]; 4],
    pub base_color: [f32; 4],
}

struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
}

/// GPU data per mesh, shared by every node drawing the same `Arc<TriangleMesh>`.
///
/// Entries hold a `Weak` to their mesh, which keeps the key address from
/// being reused; [`prune`](Self::prune) drops entries whose mesh is gone.
struct MeshCache<B> {
    entries: HashMap<usize, (Weak<TriangleMesh>, B)>,
}

impl<B> MeshCache<B> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn key(mesh: &Arc<TriangleMesh>) -> usize {
        Arc::as_ptr(mesh) as usize
    }

    fn get(&self, mesh: &Arc<TriangleMesh>) -> Option<&B> {
        self.entries.get(&Self::key(mesh)).map(|(_, buffers)| buffers)
    }

    fn contains(&self, mesh: &Arc<TriangleMesh>) -> bool {
        self.entries.contains_key(&Self::key(mesh))
    }

    fn insert(&mut self, mesh: &Arc<TriangleMesh>, buffers: B) {
        self.entries.insert(Self::key(mesh), (Arc::downgrade(mesh), buffers));
    }

    /// Removes entries whose mesh has been dropped. Returns how many were removed.
    fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (mesh, _)| mesh.strong_count() > 0);
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

struct ModePipelines {
    normal: wgpu::RenderPipeline,
    tree_index: wgpu::RenderPipeline,
    depth: wgpu::RenderPipeline,
}

impl ModePipelines {
    fn get(&self, mode: RenderMode) -> &wgpu::RenderPipeline {
        match mode {
            RenderMode::Normal => &self.normal,
            RenderMode::TreeIndex => &self.tree_index,
            RenderMode::Depth => &self.depth,
        }
    }
}

/// Off-screen target of a [`WgpuPickRenderer`].
pub struct WgpuPickTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    staging: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl WgpuPickTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        // Rgba8Unorm for exact values
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pick Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pick Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Staging Buffer"),
            size: u64::from(aligned_bytes_per_row(width)) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            color,
            color_view,
            depth_view,
            staging,
            width,
            height,
        }
    }

    /// Target (width, height).
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Debug for WgpuPickTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuPickTarget")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Calculates bytes per row with proper alignment for wgpu buffer copies.
fn aligned_bytes_per_row(width: u32) -> u32 {
    let bytes_per_pixel = 4u32; // RGBA8
    let unaligned = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Drops the per-row alignment padding of a buffer copy.
fn strip_row_padding(padded: &[u8], rect: PixelRect, bytes_per_row: u32) -> Vec<u8> {
    let row_len = rect.width as usize * 4;
    padded
        .chunks(bytes_per_row as usize)
        .take(rect.height as usize)
        .flat_map(|row| &row[..row_len])
        .copied()
        .collect()
}

fn clear_color(clear: [u8; 4]) -> wgpu::Color {
    let [r, g, b, a] = clear.map(|c| f64::from(c) / 255.0);
    wgpu::Color { r, g, b, a }
}

/// wgpu pick backend: one render pipeline per [`RenderMode`], vertex
/// buffers cached per mesh for as long as the mesh is alive.
pub struct WgpuPickRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: ModePipelines,
    meshes: MeshCache<MeshBuffers>,
}

impl WgpuPickRenderer {
    /// Creates a renderer on a new headless device.
    pub async fn new_headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..wgpu::InstanceDescriptor::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        log::info!("pick adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("cadpick device (headless)"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await?;

        Ok(Self::from_device(device, queue))
    }

    /// Creates a renderer on an existing device, e.g. the viewer's own.
    #[must_use]
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pick Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/pick.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pick Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pick Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines = ModePipelines {
            normal: create_pipeline(&device, &pipeline_layout, &shader, RenderMode::Normal),
            tree_index: create_pipeline(&device, &pipeline_layout, &shader, RenderMode::TreeIndex),
            depth: create_pipeline(&device, &pipeline_layout, &shader, RenderMode::Depth),
        };

        Self {
            device,
            queue,
            bind_group_layout,
            pipelines,
            meshes: MeshCache::new(),
        }
    }

    /// The device this renderer draws with.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Number of meshes with uploaded vertex buffers.
    #[must_use]
    pub fn cached_mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Drops all cached vertex buffers. Buffers of dropped meshes are released
    /// automatically on the next render.
    pub fn clear_mesh_cache(&mut self) {
        self.meshes.clear();
    }

    fn upload_mesh(&mut self, item: &DrawItem) {
        if self.meshes.contains(&item.mesh) {
            return;
        }

        // Expanded per triangle so every corner carries the triangle's tree index.
        let vertices: Vec<PickVertex> = (0..item.mesh.triangle_count())
            .flat_map(|i| {
                let (corners, tree_index) = item.mesh.triangle(i);
                corners.map(|c| PickVertex {
                    position: c.to_array(),
                    tree_index,
                })
            })
            .collect();

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Pick Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        log::trace!("uploaded {} pick vertices for {:?}", vertices.len(), item.node_id);
        self.meshes.insert(
            &item.mesh,
            MeshBuffers {
                vertex_buffer,
                vertex_count: u32::try_from(vertices.len()).unwrap_or(u32::MAX),
            },
        );
    }

    /// Copies `rect` of the color texture into the staging buffer. Returns the
    /// padded bytes per row.
    fn copy_to_staging(&self, target: &WgpuPickTarget, rect: PixelRect) -> u32 {
        let bytes_per_row = aligned_bytes_per_row(rect.width);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pick Readback Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        bytes_per_row
    }
}

impl std::fmt::Debug for WgpuPickRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuPickRenderer")
            .field("cached_meshes", &self.meshes.len())
            .finish_non_exhaustive()
    }
}

fn fragment_entry_point(mode: RenderMode) -> &'static str {
    match mode {
        RenderMode::Normal => "fs_normal",
        RenderMode::TreeIndex => "fs_tree_index",
        RenderMode::Depth => "fs_depth",
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    mode: RenderMode,
) -> wgpu::RenderPipeline {
    let label = format!("{mode} Pick Pipeline");
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<PickVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Uint32,
                        offset: 12,
                        shader_location: 1,
                    },
                ],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry_point(mode)),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: None, // No blending for pick buffer
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..wgpu::PrimitiveState::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl PickRenderer for WgpuPickRenderer {
    type Target = WgpuPickTarget;

    fn create_target(&mut self, width: u32, height: u32) -> RenderResult<Self::Target> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        Ok(WgpuPickTarget::new(&self.device, width, height))
    }

    fn resize_target(&mut self, target: &mut Self::Target, width: u32, height: u32) -> RenderResult<()> {
        if target.size() != (width, height) {
            *target = self.create_target(width, height)?;
        }
        Ok(())
    }

    fn render(
        &mut self,
        draws: &[DrawItem],
        camera: &PickCamera,
        target: &mut Self::Target,
        clear: [u8; 4],
    ) -> RenderResult<()> {
        let released = self.meshes.prune();
        if released > 0 {
            log::debug!("released vertex buffers of {released} dropped mesh(es)");
        }
        for item in draws {
            self.upload_mesh(item);
        }

        let view_projection = camera.view_projection_matrix();
        let bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|item| {
                let uniforms = DrawUniforms {
                    mvp: (view_projection * item.model).to_cols_array_2d(),
                    base_color: item.base_color.extend(1.0).to_array(),
                };
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Pick Draw Uniforms"),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Pick Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pick Render Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Pick Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(clear)),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for (item, bind_group) in draws.iter().zip(&bind_groups) {
                let Some(mesh) = self.meshes.get(&item.mesh) else {
                    continue;
                };
                pass.set_pipeline(self.pipelines.get(item.mode));
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.draw(0..mesh.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, target: &Self::Target, rect: PixelRect, out: &mut [u8]) -> RenderResult<()> {
        if out.len() != rect.byte_len() {
            return Err(RenderError::SizeMismatch {
                expected: rect.byte_len(),
                actual: out.len(),
            });
        }
        let pending = self.read_pixels_deferred(target, rect)?;
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        out.copy_from_slice(&pending.wait()?);
        Ok(())
    }

    fn read_pixels_deferred(&mut self, target: &Self::Target, rect: PixelRect) -> RenderResult<PendingReadback> {
        rect.check_fits(target.width, target.height)?;
        let bytes_per_row = self.copy_to_staging(target, rect);
        let padded_len = u64::from(bytes_per_row) * u64::from(rect.height);

        let staging = target.staging.clone();
        let cancel_staging = target.staging.clone();
        let (pending, signal) = PendingReadback::new(move || {
            let bytes = {
                let mapped = staging.slice(..padded_len).get_mapped_range();
                strip_row_padding(&mapped, rect, bytes_per_row)
            };
            staging.unmap();
            Ok(bytes)
        });

        target
            .staging
            .slice(..padded_len)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = signal.send(result.map_err(RenderError::from));
            });

        let device = self.device.clone();
        Ok(pending
            .with_pump(move || {
                if let Err(err) = device.poll(wgpu::PollType::Poll) {
                    log::warn!("device poll failed during pick readback: {err}");
                }
            })
            // Unmapping also aborts a map that is still pending, so the next
            // copy into the staging buffer is valid.
            .with_cancel(move || cancel_staging.unmap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadpick_core::Vec3;

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn test_strip_row_padding() {
        let rect = PixelRect::full(2, 2);
        let mut padded = vec![0u8; 512];
        padded[..8].copy_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2]);
        padded[256..264].copy_from_slice(&[3, 3, 3, 3, 4, 4, 4, 4]);
        let bytes = strip_row_padding(&padded, rect, 256);
        assert_eq!(bytes, vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn test_clear_color() {
        let color = clear_color([0, 0, 0, 0]);
        assert_eq!((color.r, color.a), (0.0, 0.0));
        assert_eq!(clear_color([255, 0, 0, 255]).r, 1.0);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<PickVertex>(), 16);
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 80);
    }

    #[test]
    fn test_mesh_cache_shares_and_prunes() {
        let mesh = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::ONE, 1).unwrap());
        let shared = Arc::clone(&mesh);
        let other = Arc::new(TriangleMesh::cuboid(Vec3::ZERO, Vec3::ONE, 2).unwrap());

        let mut cache = MeshCache::new();
        cache.insert(&mesh, 1u32);
        cache.insert(&other, 2u32);
        assert_eq!(cache.get(&shared), Some(&1));
        assert_eq!(cache.prune(), 0);

        drop(other);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);

        // Still referenced through `shared`.
        drop(mesh);
        assert_eq!(cache.prune(), 0);
        drop(shared);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 0);
    }
}
