//! Pipeline lifecycle and capability-gated controls.
//!
//! The [`Orchestrator`] owns at most one live [`Pipeline`]. Switching modes
//! always stops the outgoing pipeline (draining the GPU queue and releasing
//! its resources) before the registry is asked for the replacement, so two
//! pipelines never hold GPU resources at the same time.
//!
//! All mutating operations take `&mut self`; a host that drives the
//! orchestrator from several threads must put it behind a single lock so
//! switches stay serialised.

use std::collections::BTreeMap;
use std::sync::Arc;

use prism_core::{
    Capability, CapabilitySet, ControlEvent, ControlHandle, ControlSpec, ControlSurface,
    ControlValue, Mode, PrismError, PrismResult, SceneContext, StickySettings,
};

use crate::gpu::GpuBackend;
use crate::pipeline::{FrameReport, Pipeline};
use crate::registry::PipelineRegistry;

/// Name of the mode selector control.
pub const MODE_CONTROL: &str = "mode";

/// What [`Orchestrator::handle_event`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Handled,
    /// The event belongs to a control the orchestrator does not own.
    Ignored(ControlEvent),
}

/// Outcome of [`Orchestrator::pump_events`].
#[derive(Debug, Default)]
pub struct EventBatch {
    /// Events addressed to controls the orchestrator does not own.
    pub ignored: Vec<ControlEvent>,
    /// Failures, in event order.
    pub errors: Vec<PrismError>,
}

impl EventBatch {
    /// The ignored events, or the first failure. Ignored events are
    /// discarded when there is a failure.
    pub fn into_result(self) -> PrismResult<Vec<ControlEvent>> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(self.ignored),
        }
    }
}

/// Selects, constructs and tears down pipelines, and keeps the control
/// surface in step with the active pipeline's capabilities.
pub struct Orchestrator<S: ControlSurface> {
    scene: Arc<SceneContext>,
    backend: Arc<dyn GpuBackend>,
    registry: PipelineRegistry,
    settings: StickySettings,
    surface: S,
    selector: Option<ControlHandle>,
    capability_controls: BTreeMap<Capability, ControlHandle>,
    mode: Mode,
    active: Option<Box<dyn Pipeline>>,
    capabilities: CapabilitySet,
    generation: u64,
}

impl<S: ControlSurface> Orchestrator<S> {
    /// Create an idle orchestrator. No pipeline is active until
    /// [`start`](Self::start) or [`select`](Self::select).
    pub fn new(
        scene: Arc<SceneContext>,
        backend: Arc<dyn GpuBackend>,
        registry: PipelineRegistry,
        settings: StickySettings,
        surface: S,
    ) -> Self {
        Self {
            scene,
            backend,
            registry,
            settings,
            surface,
            selector: None,
            capability_controls: BTreeMap::new(),
            mode: Mode::default(),
            active: None,
            capabilities: CapabilitySet::empty(),
            generation: 0,
        }
    }

    /// Add the mode selector, read its value and activate that mode.
    pub fn start(&mut self, initial: Mode) -> PrismResult<()> {
        if self.selector.is_some() {
            return Err(PrismError::Control("orchestrator already started".into()));
        }
        let handle = self
            .surface
            .add_control(ControlSpec::choice(MODE_CONTROL, Mode::labels(), initial.label()));
        self.selector = Some(handle);

        let mode = match self.surface.value(handle) {
            Some(ControlValue::Choice(label)) => label.parse::<Mode>()?,
            _ => initial,
        };
        self.select(mode)
    }

    /// Switch to `mode`.
    ///
    /// Stops the current pipeline, constructs a fresh one for `mode` and
    /// reconciles capability controls. Selecting the active mode performs the
    /// full cycle again. On failure no pipeline is active and capability
    /// controls are removed; there is no rollback to the previous pipeline.
    pub fn select(&mut self, mode: Mode) -> PrismResult<()> {
        if let Err(e) = self.stop_active() {
            self.reconcile_controls();
            return Err(e);
        }

        let pipeline = match self.registry.construct(mode, &self.scene, &self.backend) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::error!("Switch to {} failed: {}", mode, e);
                self.reconcile_controls();
                return Err(e);
            }
        };

        let pipeline = self.active.insert(pipeline);
        self.capabilities = pipeline.capabilities();
        self.mode = mode;
        self.generation += 1;
        tracing::info!(
            "Active pipeline: {} (instance {}, capabilities {:?})",
            mode,
            self.generation,
            self.capabilities.iter().collect::<Vec<_>>()
        );

        for capability in self.capabilities.iter().collect::<Vec<_>>() {
            self.apply_capability(capability);
        }
        self.reconcile_controls();
        Ok(())
    }

    /// Store the sticky toon-shading value and forward it to the active
    /// pipeline if it supports toon shading.
    pub fn set_toon_shading(&mut self, enabled: bool) {
        self.set_capability(Capability::ToonShading, enabled);
    }

    /// Store a sticky capability value, applying it if the active pipeline
    /// declares the capability.
    pub fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.settings.set(capability, enabled);
        if self.capabilities.contains(capability) {
            self.apply_capability(capability);
            tracing::info!("{} -> {}", capability, enabled);
        } else {
            tracing::debug!(
                "{} stored as {} (inactive under {})",
                capability,
                enabled,
                self.mode
            );
        }
    }

    /// Dispatch one control-surface event.
    pub fn handle_event(&mut self, event: ControlEvent) -> PrismResult<EventOutcome> {
        if Some(event.handle) == self.selector {
            let mode = match &event.value {
                ControlValue::Choice(label) => label.parse::<Mode>()?,
                other => {
                    return Err(PrismError::InvalidArgument(format!(
                        "mode selector sent non-choice value '{}'",
                        other
                    )))
                }
            };
            self.select(mode)?;
            return Ok(EventOutcome::Handled);
        }

        if let Some(capability) = self.capability_for(event.handle) {
            match event.value {
                ControlValue::Bool(enabled) => self.set_capability(capability, enabled),
                other => {
                    return Err(PrismError::InvalidArgument(format!(
                        "{} control sent non-boolean value '{}'",
                        capability, other
                    )))
                }
            }
            return Ok(EventOutcome::Handled);
        }

        Ok(EventOutcome::Ignored(event))
    }

    /// Drain the surface's queued events and dispatch every one of them in
    /// order.
    ///
    /// A failing event does not stop the batch: later events are still
    /// dispatched, and events for controls the orchestrator does not own are
    /// collected for the host even when an earlier one failed.
    pub fn pump_events(&mut self) -> EventBatch {
        let mut batch = EventBatch::default();
        for event in self.surface.drain_events() {
            match self.handle_event(event) {
                Ok(EventOutcome::Handled) => {}
                Ok(EventOutcome::Ignored(event)) => batch.ignored.push(event),
                Err(e) => {
                    tracing::warn!("Control event failed: {}", e);
                    batch.errors.push(e);
                }
            }
        }
        batch
    }

    /// Render one frame on the active pipeline.
    pub fn render_frame(&mut self) -> PrismResult<FrameReport> {
        self.active
            .as_mut()
            .ok_or(PrismError::NoActivePipeline)?
            .render_frame()
    }

    /// Stop the active pipeline and remove every control this orchestrator
    /// added.
    pub fn shutdown(&mut self) -> PrismResult<()> {
        let result = self.stop_active();
        self.reconcile_controls();
        if let Some(handle) = self.selector.take() {
            self.surface.remove_control(handle);
        }
        tracing::info!("Orchestrator shut down after {} pipeline instances", self.generation);
        result
    }

    /// Mode of the last successfully activated pipeline.
    pub fn current_mode(&self) -> Mode {
        self.mode
    }

    /// Mode of the live pipeline, if any.
    pub fn active_mode(&self) -> Option<Mode> {
        self.active.as_ref().map(|p| p.mode())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Capabilities of the live pipeline; empty when none is active.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// The sticky toon-shading value.
    pub fn toon_shading(&self) -> bool {
        self.settings.toon_shading()
    }

    /// Number of pipeline instances constructed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selector(&self) -> Option<ControlHandle> {
        self.selector
    }

    /// Handle of the control gating `capability`, if present.
    pub fn capability_control(&self, capability: Capability) -> Option<ControlHandle> {
        self.capability_controls.get(&capability).copied()
    }

    pub fn scene(&self) -> &Arc<SceneContext> {
        &self.scene
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn stop_active(&mut self) -> PrismResult<()> {
        self.capabilities = CapabilitySet::empty();
        let Some(mut outgoing) = self.active.take() else {
            return Ok(());
        };
        let mode = outgoing.mode();
        tracing::info!("Stopping {} pipeline", mode);
        outgoing.stop().map_err(|e| match e {
            e @ PrismError::PipelineStop { .. } => e,
            other => PrismError::stop(mode, other.to_string()),
        })
    }

    fn capability_for(&self, handle: ControlHandle) -> Option<Capability> {
        self.capability_controls
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(c, _)| *c)
    }

    fn apply_capability(&mut self, capability: Capability) {
        let enabled = self.settings.get(capability);
        let Some(pipeline) = self.active.as_mut() else {
            return;
        };
        match capability {
            Capability::ToonShading => {
                if let Some(toon) = pipeline.toon_shading() {
                    toon.set_toon_shading(enabled);
                }
            }
        }
    }

    /// Add a control for each newly declared capability and remove the
    /// control of each capability no longer declared.
    fn reconcile_controls(&mut self) {
        for capability in Capability::ALL {
            let declared = self.capabilities.contains(capability);
            match (declared, self.capability_controls.get(&capability).copied()) {
                (true, None) => {
                    let handle = self.surface.add_control(ControlSpec::toggle(
                        capability.control_name(),
                        self.settings.get(capability),
                    ));
                    self.capability_controls.insert(capability, handle);
                    tracing::debug!("Added '{}' control {}", capability.control_name(), handle);
                }
                (false, Some(handle)) => {
                    self.surface.remove_control(handle);
                    self.capability_controls.remove(&capability);
                    tracing::debug!("Removed '{}' control {}", capability.control_name(), handle);
                }
                _ => {}
            }
        }
    }
}

impl<S: ControlSurface> Drop for Orchestrator<S> {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop_active() {
                tracing::error!("Failed to stop pipeline on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use prism_core::InspectorPanel;

    fn orchestrator(backend: Arc<HeadlessBackend>) -> Orchestrator<InspectorPanel> {
        Orchestrator::new(
            Arc::new(SceneContext::default()),
            backend,
            PipelineRegistry::builtin(),
            StickySettings::new(),
            InspectorPanel::new(),
        )
    }

    fn toon_controls(orch: &Orchestrator<InspectorPanel>) -> usize {
        orch.surface()
            .find(Capability::ToonShading.control_name())
            .len()
    }

    #[test]
    fn test_start_uses_selector_value() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        orch.start(Mode::ForwardPlus).unwrap();
        assert_eq!(orch.active_mode(), Some(Mode::ForwardPlus));
        assert_eq!(orch.surface().find(MODE_CONTROL).len(), 1);
        assert!(orch.start(Mode::Naive).is_err());
    }

    #[test]
    fn test_render_without_pipeline() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        assert!(matches!(
            orch.render_frame(),
            Err(PrismError::NoActivePipeline)
        ));
    }

    #[test]
    fn test_selector_event_switches_mode() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        orch.start(Mode::Naive).unwrap();
        let selector = orch.selector().unwrap();

        orch.surface_mut()
            .user_change(selector, ControlValue::Choice("clustered deferred".into()))
            .unwrap();
        let ignored = orch.pump_events().into_result().unwrap();

        assert!(ignored.is_empty());
        assert_eq!(orch.active_mode(), Some(Mode::ClusteredDeferred));
        assert_eq!(toon_controls(&orch), 1);
    }

    #[test]
    fn test_toon_toggle_event_sets_sticky_value() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        orch.start(Mode::ClusteredDeferred).unwrap();
        let toggle = orch.capability_control(Capability::ToonShading).unwrap();

        orch.surface_mut()
            .user_change(toggle, ControlValue::Bool(true))
            .unwrap();
        orch.pump_events().into_result().unwrap();

        assert!(orch.toon_shading());
        let report = orch.render_frame().unwrap();
        assert!(report.passes.iter().any(|p| p == "deferred toon shading"));
    }

    #[test]
    fn test_foreign_events_are_returned() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        orch.start(Mode::Naive).unwrap();
        let lights = orch
            .surface_mut()
            .add_control(ControlSpec::range("numLights", 1.0, 10.0, 1.0, 5.0));
        orch.surface_mut()
            .user_change(lights, ControlValue::Number(7.0))
            .unwrap();

        let ignored = orch.pump_events().into_result().unwrap();
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].handle, lights);
    }

    #[test]
    fn test_wrong_value_type_for_selector() {
        let mut orch = orchestrator(Arc::new(HeadlessBackend::new()));
        orch.start(Mode::Naive).unwrap();
        let event = ControlEvent {
            handle: orch.selector().unwrap(),
            value: ControlValue::Bool(true),
        };
        assert!(orch.handle_event(event).is_err());
        assert_eq!(orch.active_mode(), Some(Mode::Naive));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut orch = orchestrator(backend.clone());
        orch.start(Mode::ClusteredDeferred).unwrap();
        orch.render_frame().unwrap();

        orch.shutdown().unwrap();
        assert!(!orch.is_active());
        assert!(orch.surface().is_empty());
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_drop_stops_pipeline() {
        let backend = Arc::new(HeadlessBackend::new());
        {
            let mut orch = orchestrator(backend.clone());
            orch.start(Mode::ForwardPlus).unwrap();
            orch.render_frame().unwrap();
            assert!(backend.live_resources() > 0);
        }
        assert_eq!(backend.live_resources(), 0);
    }
}
