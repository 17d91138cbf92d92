use std::sync::Arc;

use prism_core::{Capability, CapabilitySet, Mode, PrismResult, SceneContext};

use crate::gpu::{GpuBackend, PassDesc, ResourceDesc, ResourceId, ResourceSet};

/// Result of rendering one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Mode of the pipeline that rendered the frame.
    pub mode: Mode,
    /// Index of the frame within its pipeline instance, starting at 0.
    pub frame_index: u64,
    /// Labels of the submitted passes, in order.
    pub passes: Vec<String>,
    /// Lights active when the frame was recorded.
    pub light_count: u32,
}

/// Optional toon-shading control on a pipeline.
pub trait ToonShading {
    fn set_toon_shading(&mut self, enabled: bool);

    fn toon_shading_enabled(&self) -> bool;
}

/// A swappable rendering strategy.
///
/// Constructing a pipeline starts it: construction acquires every GPU
/// resource it needs. `stop` releases them synchronously and must leave no
/// submission in flight. After `stop` the instance is inert; a second
/// `stop` is a no-op.
pub trait Pipeline: Send {
    fn mode(&self) -> Mode;

    fn render_frame(&mut self) -> PrismResult<FrameReport>;

    fn stop(&mut self) -> PrismResult<()>;

    /// The toon-shading capability, if this pipeline has it.
    fn toon_shading(&mut self) -> Option<&mut dyn ToonShading> {
        None
    }

    /// Capabilities this pipeline declares, derived from its typed accessors.
    fn capabilities(&mut self) -> CapabilitySet {
        let mut set = CapabilitySet::empty();
        if self.toon_shading().is_some() {
            set.insert(Capability::ToonShading);
        }
        set
    }
}

/// State shared by the bundled pipelines: scene, owned resources and the
/// frame counter.
pub struct PipelineBase {
    mode: Mode,
    scene: Arc<SceneContext>,
    resources: ResourceSet,
    frame_index: u64,
    stopped: bool,
}

impl PipelineBase {
    pub fn new(mode: Mode, scene: Arc<SceneContext>, backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            mode,
            scene,
            resources: ResourceSet::new(backend),
            frame_index: 0,
            stopped: false,
        }
    }

    pub fn scene(&self) -> &SceneContext {
        &self.scene
    }

    pub fn allocate(&mut self, desc: ResourceDesc) -> PrismResult<ResourceId> {
        self.resources.allocate(desc)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Submit one frame's passes and report it.
    pub fn submit_frame(&mut self, passes: Vec<PassDesc>) -> PrismResult<FrameReport> {
        if self.stopped {
            return Err(prism_core::PrismError::NoActivePipeline);
        }
        self.resources.backend().submit(&passes)?;
        let report = FrameReport {
            mode: self.mode,
            frame_index: self.frame_index,
            passes: passes.into_iter().map(|p| p.label).collect(),
            light_count: self.scene.lights.active(),
        };
        self.frame_index += 1;
        Ok(report)
    }

    /// Drain the queue, then release every owned resource.
    pub fn stop(&mut self) -> PrismResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.resources
            .backend()
            .wait_idle()
            .map_err(|e| prism_core::PrismError::stop(self.mode, e.to_string()))?;
        self.resources
            .release_all()
            .map_err(|e| prism_core::PrismError::stop(self.mode, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TargetFormat;
    use crate::headless::HeadlessBackend;

    struct Plain;

    impl Pipeline for Plain {
        fn mode(&self) -> Mode {
            Mode::Naive
        }
        fn render_frame(&mut self) -> PrismResult<FrameReport> {
            unreachable!()
        }
        fn stop(&mut self) -> PrismResult<()> {
            Ok(())
        }
    }

    struct Toon(bool);

    impl ToonShading for Toon {
        fn set_toon_shading(&mut self, enabled: bool) {
            self.0 = enabled;
        }
        fn toon_shading_enabled(&self) -> bool {
            self.0
        }
    }

    impl Pipeline for Toon {
        fn mode(&self) -> Mode {
            Mode::ClusteredDeferred
        }
        fn render_frame(&mut self) -> PrismResult<FrameReport> {
            unreachable!()
        }
        fn stop(&mut self) -> PrismResult<()> {
            Ok(())
        }
        fn toon_shading(&mut self) -> Option<&mut dyn ToonShading> {
            Some(self)
        }
    }

    #[test]
    fn test_capabilities_follow_accessor() {
        assert!(Plain.capabilities().is_empty());
        assert!(Toon(false).capabilities().contains(Capability::ToonShading));
    }

    #[test]
    fn test_base_stop_releases_and_is_idempotent() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut base = PipelineBase::new(Mode::Naive, Arc::new(SceneContext::default()), backend.clone());
        let depth = base
            .allocate(ResourceDesc::texture("depth", 8, 8, TargetFormat::Depth32Float))
            .unwrap();

        let report = base
            .submit_frame(vec![PassDesc::render("forward", vec![], Some(depth))])
            .unwrap();
        assert_eq!(report.frame_index, 0);
        assert_eq!(report.passes, vec!["forward".to_string()]);

        base.stop().unwrap();
        assert_eq!(backend.live_resources(), 0);
        assert!(base.is_stopped());
        base.stop().unwrap();
        assert!(base.submit_frame(vec![]).is_err());
    }
}
