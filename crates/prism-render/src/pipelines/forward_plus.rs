use std::sync::Arc;

use prism_core::{Mode, PrismResult, SceneContext};

use crate::gpu::{GpuBackend, PassDesc, ResourceDesc, ResourceId, TargetFormat};
use crate::pipeline::{FrameReport, Pipeline, PipelineBase};
use crate::pipelines::ClusterGrid;

/// Forward shading with lights binned into view-space clusters.
pub struct ForwardPlusPipeline {
    base: PipelineBase,
    color: ResourceId,
    depth: ResourceId,
    clusters: ResourceId,
}

impl ForwardPlusPipeline {
    pub fn new(scene: Arc<SceneContext>, backend: Arc<dyn GpuBackend>) -> PrismResult<Self> {
        Self::with_grid(scene, backend, ClusterGrid::DEFAULT)
    }

    pub fn with_grid(
        scene: Arc<SceneContext>,
        backend: Arc<dyn GpuBackend>,
        grid: ClusterGrid,
    ) -> PrismResult<Self> {
        let viewport = scene.viewport;
        let mut base = PipelineBase::new(Mode::ForwardPlus, scene, backend);

        let color = base.allocate(ResourceDesc::texture(
            "forward+ color",
            viewport.width,
            viewport.height,
            TargetFormat::Rgba8Unorm,
        ))?;
        let depth = base.allocate(ResourceDesc::texture(
            "forward+ depth",
            viewport.width,
            viewport.height,
            TargetFormat::Depth32Float,
        ))?;
        let clusters = base.allocate(ResourceDesc::buffer("forward+ clusters", grid.buffer_size()))?;

        tracing::info!(
            "Started forward+ pipeline ({}x{}, {} clusters, {} resources)",
            viewport.width,
            viewport.height,
            grid.cluster_count(),
            base.resource_count()
        );
        Ok(Self {
            base,
            color,
            depth,
            clusters,
        })
    }
}

impl Pipeline for ForwardPlusPipeline {
    fn mode(&self) -> Mode {
        Mode::ForwardPlus
    }

    fn render_frame(&mut self) -> PrismResult<FrameReport> {
        let passes = vec![
            PassDesc::render("depth prepass", vec![], Some(self.depth)),
            PassDesc::compute("light clustering", vec![self.clusters]),
            PassDesc::render("forward+ shading", vec![self.color], Some(self.depth)),
        ];
        self.base.submit_frame(passes)
    }

    fn stop(&mut self) -> PrismResult<()> {
        self.base.stop()
    }
}
