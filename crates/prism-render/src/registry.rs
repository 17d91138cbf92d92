use std::sync::Arc;

use prism_core::{Mode, PrismError, PrismResult, SceneContext};

use crate::gpu::GpuBackend;
use crate::pipeline::Pipeline;
use crate::pipelines::{ClusteredDeferredPipeline, ForwardPlusPipeline, NaivePipeline};

/// Constructs a pipeline against the shared scene and GPU backend.
pub type PipelineFactory = Box<
    dyn Fn(&Arc<SceneContext>, &Arc<dyn GpuBackend>) -> PrismResult<Box<dyn Pipeline>> + Send + Sync,
>;

fn build_naive(
    scene: &Arc<SceneContext>,
    backend: &Arc<dyn GpuBackend>,
) -> PrismResult<Box<dyn Pipeline>> {
    Ok(Box::new(NaivePipeline::new(scene.clone(), backend.clone())?))
}

fn build_forward_plus(
    scene: &Arc<SceneContext>,
    backend: &Arc<dyn GpuBackend>,
) -> PrismResult<Box<dyn Pipeline>> {
    Ok(Box::new(ForwardPlusPipeline::new(scene.clone(), backend.clone())?))
}

fn build_clustered_deferred(
    scene: &Arc<SceneContext>,
    backend: &Arc<dyn GpuBackend>,
) -> PrismResult<Box<dyn Pipeline>> {
    Ok(Box::new(ClusteredDeferredPipeline::new(scene.clone(), backend.clone())?))
}

/// One factory per [`Mode`].
///
/// Having a field per mode keeps the registry total: adding a mode without
/// a factory does not compile.
pub struct PipelineFactories {
    pub naive: PipelineFactory,
    pub forward_plus: PipelineFactory,
    pub clustered_deferred: PipelineFactory,
}

/// Maps each [`Mode`] to its pipeline factory.
pub struct PipelineRegistry {
    factories: PipelineFactories,
}

impl PipelineRegistry {
    pub fn new(factories: PipelineFactories) -> Self {
        Self { factories }
    }

    /// Registry of the bundled pipelines.
    pub fn builtin() -> Self {
        Self::new(PipelineFactories {
            naive: Box::new(build_naive),
            forward_plus: Box::new(build_forward_plus),
            clustered_deferred: Box::new(build_clustered_deferred),
        })
    }

    /// Replace the factory for one mode.
    pub fn with_factory(mut self, mode: Mode, factory: PipelineFactory) -> Self {
        *self.slot(mode) = factory;
        self
    }

    fn slot(&mut self, mode: Mode) -> &mut PipelineFactory {
        match mode {
            Mode::Naive => &mut self.factories.naive,
            Mode::ForwardPlus => &mut self.factories.forward_plus,
            Mode::ClusteredDeferred => &mut self.factories.clustered_deferred,
        }
    }

    pub fn get(&self, mode: Mode) -> &PipelineFactory {
        match mode {
            Mode::Naive => &self.factories.naive,
            Mode::ForwardPlus => &self.factories.forward_plus,
            Mode::ClusteredDeferred => &self.factories.clustered_deferred,
        }
    }

    /// Construct a pipeline for `mode`.
    ///
    /// Any failure is reported as [`PrismError::PipelineConstruction`], and a
    /// factory that returns a pipeline of the wrong mode is rejected.
    pub fn construct(
        &self,
        mode: Mode,
        scene: &Arc<SceneContext>,
        backend: &Arc<dyn GpuBackend>,
    ) -> PrismResult<Box<dyn Pipeline>> {
        let mut pipeline = (self.get(mode))(scene, backend).map_err(|e| match e {
            e @ PrismError::PipelineConstruction { .. } => e,
            other => PrismError::construction(mode, other.to_string()),
        })?;

        if pipeline.mode() != mode {
            let built = pipeline.mode();
            if let Err(e) = pipeline.stop() {
                tracing::warn!("Failed to stop mismatched {} pipeline: {}", built, e);
            }
            return Err(PrismError::construction(
                mode,
                format!("factory produced a {} pipeline", built),
            ));
        }
        Ok(pipeline)
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
