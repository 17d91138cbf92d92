use std::sync::Arc;

use prism_core::{Mode, PrismResult, SceneContext};

use crate::gpu::{GpuBackend, PassDesc, ResourceDesc, ResourceId, TargetFormat};
use crate::pipeline::{FrameReport, Pipeline, PipelineBase, ToonShading};
use crate::pipelines::ClusterGrid;

/// G-buffer pass followed by a fullscreen clustered shading pass.
///
/// The only bundled pipeline with a toon-shading variant.
pub struct ClusteredDeferredPipeline {
    base: PipelineBase,
    color: ResourceId,
    depth: ResourceId,
    albedo: ResourceId,
    normal: ResourceId,
    clusters: ResourceId,
    toon: bool,
}

impl ClusteredDeferredPipeline {
    pub fn new(scene: Arc<SceneContext>, backend: Arc<dyn GpuBackend>) -> PrismResult<Self> {
        Self::with_grid(scene, backend, ClusterGrid::DEFAULT)
    }

    pub fn with_grid(
        scene: Arc<SceneContext>,
        backend: Arc<dyn GpuBackend>,
        grid: ClusterGrid,
    ) -> PrismResult<Self> {
        let viewport = scene.viewport;
        let (w, h) = (viewport.width, viewport.height);
        let mut base = PipelineBase::new(Mode::ClusteredDeferred, scene, backend);

        let color = base.allocate(ResourceDesc::texture("deferred color", w, h, TargetFormat::Rgba8Unorm))?;
        let depth = base.allocate(ResourceDesc::texture("deferred depth", w, h, TargetFormat::Depth32Float))?;
        let albedo = base.allocate(ResourceDesc::texture("g-buffer albedo", w, h, TargetFormat::Rgba8Unorm))?;
        let normal = base.allocate(ResourceDesc::texture("g-buffer normal", w, h, TargetFormat::Rgba16Float))?;
        let clusters = base.allocate(ResourceDesc::buffer("deferred clusters", grid.buffer_size()))?;

        tracing::info!(
            "Started clustered deferred pipeline ({}x{}, {} clusters, {} resources)",
            w,
            h,
            grid.cluster_count(),
            base.resource_count()
        );
        Ok(Self {
            base,
            color,
            depth,
            albedo,
            normal,
            clusters,
            toon: false,
        })
    }
}

impl ToonShading for ClusteredDeferredPipeline {
    fn set_toon_shading(&mut self, enabled: bool) {
        if self.toon != enabled {
            tracing::debug!("Clustered deferred toon shading -> {}", enabled);
        }
        self.toon = enabled;
    }

    fn toon_shading_enabled(&self) -> bool {
        self.toon
    }
}

impl Pipeline for ClusteredDeferredPipeline {
    fn mode(&self) -> Mode {
        Mode::ClusteredDeferred
    }

    fn render_frame(&mut self) -> PrismResult<FrameReport> {
        let shading = if self.toon_shading_enabled() {
            "deferred toon shading"
        } else {
            "deferred shading"
        };
        let passes = vec![
            PassDesc::compute("light clustering", vec![self.clusters]),
            PassDesc::render("g-buffer", vec![self.albedo, self.normal], Some(self.depth)),
            PassDesc::render(shading, vec![self.color], None),
        ];
        self.base.submit_frame(passes)
    }

    fn stop(&mut self) -> PrismResult<()> {
        self.base.stop()
    }

    fn toon_shading(&mut self) -> Option<&mut dyn ToonShading> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use prism_core::Capability;

    fn pipeline(backend: &Arc<HeadlessBackend>) -> ClusteredDeferredPipeline {
        ClusteredDeferredPipeline::new(Arc::new(SceneContext::default()), backend.clone()).unwrap()
    }

    #[test]
    fn test_declares_toon_shading() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut pipeline = pipeline(&backend);
        assert!(pipeline.capabilities().contains(Capability::ToonShading));
        assert_eq!(backend.live_resources(), 5);
    }

    #[test]
    fn test_toon_changes_shading_pass() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut pipeline = pipeline(&backend);

        let plain = pipeline.render_frame().unwrap();
        assert_eq!(plain.passes[2], "deferred shading");

        assert!(!pipeline.toon_shading_enabled());
        pipeline.toon_shading().unwrap().set_toon_shading(true);
        assert!(pipeline.toon_shading_enabled());
        let toon = pipeline.render_frame().unwrap();
        assert_eq!(toon.passes[2], "deferred toon shading");
        assert_eq!(toon.frame_index, 1);

        pipeline.stop().unwrap();
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_partial_construction_releases_resources() {
        let backend = Arc::new(HeadlessBackend::with_budget(3));
        let result = ClusteredDeferredPipeline::new(Arc::new(SceneContext::default()), backend.clone());
        assert!(result.is_err());
        assert_eq!(backend.live_resources(), 0);
    }
}
