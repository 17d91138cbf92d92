//! Terminal-backed control surface.

use prism_core::{
    ControlEvent, ControlHandle, ControlKind, ControlSpec, ControlSurface, ControlValue,
    InspectorPanel, PrismResult,
};

/// An [`InspectorPanel`] that logs every control it gains or loses, so a
/// console user can follow what the inspector would show.
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    panel: InspectorPanel,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change a control as the user would.
    pub fn user_change(&mut self, handle: ControlHandle, value: ControlValue) -> PrismResult<()> {
        self.panel.user_change(handle, value)
    }

    pub fn handle_of(&self, name: &str) -> Option<ControlHandle> {
        self.panel.handle_of(name)
    }

    /// One line per visible control.
    pub fn render_lines(&self) -> Vec<String> {
        self.panel
            .controls()
            .map(|c| match &c.spec.kind {
                ControlKind::Choice { options, .. } => {
                    format!("{} = {} [{}]", c.spec.name, c.value, options.join(" | "))
                }
                ControlKind::Toggle { .. } => format!("{} = {}", c.spec.name, c.value),
                ControlKind::Range { min, max, .. } => {
                    format!("{} = {} ({}..={})", c.spec.name, c.value, min, max)
                }
            })
            .collect()
    }
}

impl ControlSurface for ConsoleSurface {
    fn add_control(&mut self, spec: ControlSpec) -> ControlHandle {
        let name = spec.name.clone();
        let handle = self.panel.add_control(spec);
        tracing::info!("+ control '{}'", name);
        handle
    }

    fn remove_control(&mut self, handle: ControlHandle) {
        if let Some(name) = self
            .panel
            .controls()
            .find(|c| c.handle == handle)
            .map(|c| c.spec.name.clone())
        {
            tracing::info!("- control '{}'", name);
        }
        self.panel.remove_control(handle);
    }

    fn value(&self, handle: ControlHandle) -> Option<ControlValue> {
        self.panel.value(handle)
    }

    fn drain_events(&mut self) -> Vec<ControlEvent> {
        self.panel.drain_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lines() {
        let mut surface = ConsoleSurface::new();
        surface.add_control(ControlSpec::choice(
            "mode",
            vec!["naive".into(), "forward+".into()],
            "naive",
        ));
        let lights = surface.add_control(ControlSpec::range("numLights", 1.0, 10.0, 1.0, 5.0));
        surface.add_control(ControlSpec::toggle("Toon Shading", false));

        assert_eq!(
            surface.render_lines(),
            vec![
                "mode = naive [naive | forward+]".to_string(),
                "numLights = 5 (1..=10)".to_string(),
                "Toon Shading = false".to_string(),
            ]
        );

        surface.remove_control(lights);
        assert_eq!(surface.render_lines().len(), 2);
        assert!(surface.handle_of("numLights").is_none());
    }
}
