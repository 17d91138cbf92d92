use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wgpu::{Adapter, Device, Extent3d, Instance, Queue, TextureDescriptor, TextureUsages};

use prism_core::{PrismError, PrismResult};

/// Handle to a GPU resource owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// Texture formats the bundled pipelines allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Depth32Float,
    Rgba8Unorm,
    Rgba16Float,
}

impl TargetFormat {
    pub fn bytes_per_pixel(self) -> u64 {
        match self {
            TargetFormat::Depth32Float | TargetFormat::Rgba8Unorm => 4,
            TargetFormat::Rgba16Float => 8,
        }
    }

    fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Description of a resource to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDesc {
    Texture {
        label: String,
        width: u32,
        height: u32,
        format: TargetFormat,
    },
    Buffer {
        label: String,
        size: u64,
    },
}

impl ResourceDesc {
    pub fn texture(label: impl Into<String>, width: u32, height: u32, format: TargetFormat) -> Self {
        ResourceDesc::Texture {
            label: label.into(),
            width: width.max(1),
            height: height.max(1),
            format,
        }
    }

    pub fn buffer(label: impl Into<String>, size: u64) -> Self {
        ResourceDesc::Buffer {
            label: label.into(),
            size: size.max(4),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ResourceDesc::Texture { label, .. } | ResourceDesc::Buffer { label, .. } => label,
        }
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            ResourceDesc::Texture {
                width,
                height,
                format,
                ..
            } => *width as u64 * *height as u64 * format.bytes_per_pixel(),
            ResourceDesc::Buffer { size, .. } => *size,
        }
    }
}

/// What a recorded pass touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassKind {
    Render {
        color: Vec<ResourceId>,
        depth: Option<ResourceId>,
    },
    Compute {
        buffers: Vec<ResourceId>,
    },
}

/// One pass of a frame, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDesc {
    pub label: String,
    pub kind: PassKind,
}

impl PassDesc {
    pub fn render(label: impl Into<String>, color: Vec<ResourceId>, depth: Option<ResourceId>) -> Self {
        Self {
            label: label.into(),
            kind: PassKind::Render { color, depth },
        }
    }

    pub fn compute(label: impl Into<String>, buffers: Vec<ResourceId>) -> Self {
        Self {
            label: label.into(),
            kind: PassKind::Compute { buffers },
        }
    }

    pub fn resources(&self) -> Vec<ResourceId> {
        match &self.kind {
            PassKind::Render { color, depth } => {
                color.iter().copied().chain(depth.iter().copied()).collect()
            }
            PassKind::Compute { buffers } => buffers.clone(),
        }
    }
}

/// The device-side operations pipelines need.
///
/// Implementations are shared between pipelines behind an `Arc` and use
/// interior mutability.
pub trait GpuBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_resource(&self, desc: &ResourceDesc) -> PrismResult<ResourceId>;

    fn destroy_resource(&self, id: ResourceId) -> PrismResult<()>;

    /// Record and submit the given passes as one command buffer.
    fn submit(&self, passes: &[PassDesc]) -> PrismResult<()>;

    /// Block until every submitted command buffer has finished executing.
    fn wait_idle(&self) -> PrismResult<()>;

    /// Number of resources currently allocated.
    fn live_resources(&self) -> usize;
}

/// Resources owned by one pipeline instance.
///
/// Released in reverse allocation order by [`ResourceSet::release_all`].
/// Dropping a non-empty set drains the queue and releases what is left,
/// so a pipeline that fails halfway through construction does not leak.
pub struct ResourceSet {
    backend: Arc<dyn GpuBackend>,
    owned: Vec<(ResourceId, String)>,
}

impl ResourceSet {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            owned: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    pub fn allocate(&mut self, desc: ResourceDesc) -> PrismResult<ResourceId> {
        let id = self.backend.create_resource(&desc)?;
        tracing::debug!(
            "Allocated {} ({} bytes) as {:?} on {}",
            desc.label(),
            desc.byte_size(),
            id,
            self.backend.name()
        );
        self.owned.push((id, desc.label().to_string()));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Release every owned resource. Returns the first failure, after
    /// attempting all of them.
    pub fn release_all(&mut self) -> PrismResult<()> {
        let mut first_err = None;
        while let Some((id, label)) = self.owned.pop() {
            match self.backend.destroy_resource(id) {
                Ok(()) => tracing::debug!("Released {} ({:?})", label, id),
                Err(e) => {
                    tracing::warn!("Failed to release {} ({:?}): {}", label, id, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ResourceSet {
    fn drop(&mut self) {
        if self.owned.is_empty() {
            return;
        }
        tracing::warn!(
            "Dropping {} unreleased GPU resources; releasing them now",
            self.owned.len()
        );
        if let Err(e) = self.backend.wait_idle() {
            tracing::warn!("wait_idle failed during drop: {}", e);
        }
        let _ = self.release_all();
    }
}

/// The wgpu device a [`WgpuBackend`] allocates on.
///
/// Pipelines only render to offscreen targets, so no surface is requested.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl GpuContext {
    pub fn init() -> Result<Self> {
        let instance = Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("No wgpu adapter available for offscreen rendering")?;

        // Viewport-sized targets can exceed the downlevel texture size limit.
        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("prism device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
            },
            None,
        ))
        .context("Failed to open prism device")?;

        let info = adapter.get_info();
        tracing::info!("Rendering on {} ({:?})", info.name, info.backend);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// Map the result of a blocking poll to the backend's contract: after a
/// wait, no submission may still be queued.
fn drained(result: wgpu::MaintainResult) -> PrismResult<()> {
    if result.is_queue_empty() {
        Ok(())
    } else {
        Err(PrismError::gpu("submissions still queued after wait_idle"))
    }
}

enum WgpuResource {
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    Buffer(wgpu::Buffer),
}

/// [`GpuBackend`] on a real wgpu device.
///
/// Passes are recorded as clears of their attachments (render) or buffers
/// (compute); the shading work itself belongs to the pipeline implementations.
pub struct WgpuBackend {
    ctx: GpuContext,
    resources: Mutex<HashMap<ResourceId, WgpuResource>>,
    next_id: AtomicU64,
}

impl WgpuBackend {
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            resources: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn init() -> Result<Self> {
        Ok(Self::new(GpuContext::init()?))
    }
}

fn texture_view(
    resources: &HashMap<ResourceId, WgpuResource>,
    id: ResourceId,
) -> PrismResult<&wgpu::TextureView> {
    match resources.get(&id) {
        Some(WgpuResource::Texture { view, .. }) => Ok(view),
        Some(WgpuResource::Buffer(_)) => Err(PrismError::gpu(format!("{:?} is not a texture", id))),
        None => Err(PrismError::gpu(format!("unknown resource {:?}", id))),
    }
}

fn buffer(resources: &HashMap<ResourceId, WgpuResource>, id: ResourceId) -> PrismResult<&wgpu::Buffer> {
    match resources.get(&id) {
        Some(WgpuResource::Buffer(buffer)) => Ok(buffer),
        Some(WgpuResource::Texture { .. }) => Err(PrismError::gpu(format!("{:?} is not a buffer", id))),
        None => Err(PrismError::gpu(format!("unknown resource {:?}", id))),
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_resource(&self, desc: &ResourceDesc) -> PrismResult<ResourceId> {
        let resource = match desc {
            ResourceDesc::Texture {
                label,
                width,
                height,
                format,
            } => {
                let texture = self.ctx.device.create_texture(&TextureDescriptor {
                    label: Some(label.as_str()),
                    size: Extent3d {
                        width: *width,
                        height: *height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: format.to_wgpu(),
                    usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                WgpuResource::Texture { texture, view }
            }
            ResourceDesc::Buffer { label, size } => {
                WgpuResource::Buffer(self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label.as_str()),
                    size: *size,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }))
            }
        };

        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.resources.lock().insert(id, resource);
        Ok(id)
    }

    fn destroy_resource(&self, id: ResourceId) -> PrismResult<()> {
        match self.resources.lock().remove(&id) {
            Some(WgpuResource::Texture { texture, view }) => {
                drop(view);
                texture.destroy();
                Ok(())
            }
            Some(WgpuResource::Buffer(buffer)) => {
                buffer.destroy();
                Ok(())
            }
            None => Err(PrismError::gpu(format!("unknown resource {:?}", id))),
        }
    }

    fn submit(&self, passes: &[PassDesc]) -> PrismResult<()> {
        let resources = self.resources.lock();
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("prism_frame_encoder"),
            });

        for pass in passes {
            match &pass.kind {
                PassKind::Render { color, depth } => {
                    let color_views = color
                        .iter()
                        .map(|id| texture_view(&resources, *id))
                        .collect::<PrismResult<Vec<_>>>()?;
                    let depth_view = depth.map(|id| texture_view(&resources, id)).transpose()?;

                    let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> =
                        color_views
                            .iter()
                            .map(|view| {
                                Some(wgpu::RenderPassColorAttachment {
                                    view,
                                    resolve_target: None,
                                    ops: wgpu::Operations {
                                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                        store: wgpu::StoreOp::Store,
                                    },
                                })
                            })
                            .collect();

                    let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(pass.label.as_str()),
                        color_attachments: &color_attachments,
                        depth_stencil_attachment: depth_view.map(|view| {
                            wgpu::RenderPassDepthStencilAttachment {
                                view,
                                depth_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(1.0),
                                    store: wgpu::StoreOp::Store,
                                }),
                                stencil_ops: None,
                            }
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                }
                PassKind::Compute { buffers } => {
                    for id in buffers {
                        encoder.clear_buffer(buffer(&resources, *id)?, 0, None);
                    }
                }
            }
        }

        self.ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn wait_idle(&self) -> PrismResult<()> {
        drained(self.ctx.device.poll(wgpu::Maintain::Wait))
    }

    fn live_resources(&self) -> usize {
        self.resources.lock().len()
    }
}
