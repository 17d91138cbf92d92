use std::sync::Arc;

use prism_core::{Mode, PrismResult, SceneContext};

use crate::gpu::{GpuBackend, PassDesc, ResourceDesc, ResourceId, TargetFormat};
use crate::pipeline::{FrameReport, Pipeline, PipelineBase};

/// Forward shading: every fragment is lit by every light.
pub struct NaivePipeline {
    base: PipelineBase,
    color: ResourceId,
    depth: ResourceId,
}

impl NaivePipeline {
    pub fn new(scene: Arc<SceneContext>, backend: Arc<dyn GpuBackend>) -> PrismResult<Self> {
        let viewport = scene.viewport;
        let mut base = PipelineBase::new(Mode::Naive, scene, backend);

        let color = base.allocate(ResourceDesc::texture(
            "naive color",
            viewport.width,
            viewport.height,
            TargetFormat::Rgba8Unorm,
        ))?;
        let depth = base.allocate(ResourceDesc::texture(
            "naive depth",
            viewport.width,
            viewport.height,
            TargetFormat::Depth32Float,
        ))?;

        tracing::info!(
            "Started naive pipeline ({}x{}, {} resources)",
            viewport.width,
            viewport.height,
            base.resource_count()
        );
        Ok(Self { base, color, depth })
    }
}

impl Pipeline for NaivePipeline {
    fn mode(&self) -> Mode {
        Mode::Naive
    }

    fn render_frame(&mut self) -> PrismResult<FrameReport> {
        let passes = vec![PassDesc::render("forward", vec![self.color], Some(self.depth))];
        self.base.submit_frame(passes)
    }

    fn stop(&mut self) -> PrismResult<()> {
        self.base.stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;

    #[test]
    fn test_naive_lifecycle() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut pipeline =
            NaivePipeline::new(Arc::new(SceneContext::default()), backend.clone()).unwrap();
        assert_eq!(backend.live_resources(), 2);
        assert!(pipeline.capabilities().is_empty());

        let report = pipeline.render_frame().unwrap();
        assert_eq!(report.mode, Mode::Naive);
        assert_eq!(report.passes, vec!["forward".to_string()]);

        pipeline.stop().unwrap();
        assert_eq!(backend.live_resources(), 0);
    }
}
