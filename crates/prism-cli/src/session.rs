//! A renderer session: scene, backend, orchestrator and the console
//! controls, driven by steps from a script or the interactive prompt.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use prism_core::{
    BackendKind, Camera, Capability, ControlEvent, ControlHandle, ControlSpec, ControlSurface,
    ControlValue, LightSet, Mode, PrismConfig, SceneContext, SceneSummary, StickySettings,
};
use prism_render::{
    FrameDriver, FrameReport, GpuBackend, HeadlessBackend, Orchestrator, PipelineRegistry,
    WgpuBackend,
};

use crate::console::ConsoleSurface;

/// Name of the light-count slider.
pub const LIGHTS_CONTROL: &str = "numLights";

/// One thing a user can do to a session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    Select { mode: Mode },
    Toon { enabled: bool },
    Lights { count: u32 },
    Frames { count: u32 },
    Status,
}

/// A session script, e.g.
///
/// ```toml
/// [[steps]]
/// action = "select"
/// mode = "clustered deferred"
///
/// [[steps]]
/// action = "frames"
/// count = 10
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Script {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid session script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

/// A line typed at the interactive prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Step(Step),
    Help,
    Quit,
}

impl FromStr for Input {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let input = match command {
            "mode" | "select" => Input::Step(Step::Select { mode: arg.parse()? }),
            "toon" => {
                let enabled = match arg {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    other => bail!("expected 'toon on' or 'toon off', got '{}'", other),
                };
                Input::Step(Step::Toon { enabled })
            }
            "lights" => Input::Step(Step::Lights {
                count: arg
                    .parse()
                    .with_context(|| format!("'{}' is not a light count", arg))?,
            }),
            "frames" => Input::Step(Step::Frames {
                count: if arg.is_empty() {
                    1
                } else {
                    arg.parse()
                        .with_context(|| format!("'{}' is not a frame count", arg))?
                },
            }),
            "status" => Input::Step(Step::Status),
            "help" | "?" => Input::Help,
            "quit" | "exit" | "q" => Input::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };
        Ok(input)
    }
}

pub const HELP: &str = "\
commands:
  mode <naive | forward+ | clustered deferred>
  toon on|off
  lights <n>
  frames [n]
  status
  quit";

/// Snapshot of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub mode: Option<Mode>,
    pub capabilities: Vec<String>,
    pub toon_shading: bool,
    pub lights: u32,
    pub max_lights: u32,
    pub instances: u64,
    pub frames: u64,
    pub fps: Option<f64>,
    pub controls: Vec<String>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Some(mode) => writeln!(f, "pipeline: {} (instance {})", mode, self.instances)?,
            None => writeln!(f, "pipeline: none")?,
        }
        if !self.capabilities.is_empty() {
            writeln!(f, "capabilities: {}", self.capabilities.join(", "))?;
        }
        writeln!(f, "toon shading: {}", self.toon_shading)?;
        writeln!(f, "lights: {}/{}", self.lights, self.max_lights)?;
        match self.fps {
            Some(fps) => writeln!(f, "frames: {} ({:.1} fps)", self.frames, fps)?,
            None => writeln!(f, "frames: {}", self.frames)?,
        }
        write!(f, "controls:")?;
        for line in &self.controls {
            write!(f, "\n  {}", line)?;
        }
        Ok(())
    }
}

/// What applying a [`Step`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    Rendered(Option<FrameReport>),
    Status(SessionStatus),
}

pub struct Session {
    orchestrator: Orchestrator<ConsoleSurface>,
    lights_control: ControlHandle,
    driver: FrameDriver,
}

impl Session {
    /// Build the backend named by the config and start a session on it.
    pub fn from_config(config: &PrismConfig) -> Result<Self> {
        let backend: Arc<dyn GpuBackend> = match config.render.backend {
            BackendKind::Headless => Arc::new(HeadlessBackend::new()),
            BackendKind::Wgpu => {
                Arc::new(WgpuBackend::init().context("Failed to initialise wgpu backend")?)
            }
        };
        Self::new(config, backend)
    }

    /// Start a session on `backend` with the config's initial mode.
    pub fn new(config: &PrismConfig, backend: Arc<dyn GpuBackend>) -> Result<Self> {
        tracing::info!("Starting session on {} backend", backend.name());
        let scene = Arc::new(SceneContext::new(
            SceneSummary::default(),
            Camera::default(),
            LightSet::new(config.lights.initial, config.lights.max),
            config.render.viewport(),
        ));

        let mut surface = ConsoleSurface::new();
        let lights = &scene.lights;
        let lights_control = surface.add_control(ControlSpec::range(
            LIGHTS_CONTROL,
            1.0,
            f64::from(lights.max()),
            1.0,
            f64::from(lights.active()),
        ));

        let settings = StickySettings::new().with_toon_shading(config.shading.toon_shading);
        let mut orchestrator = Orchestrator::new(
            scene,
            backend,
            PipelineRegistry::builtin(),
            settings,
            surface,
        );
        orchestrator
            .start(config.render.default_mode)
            .with_context(|| format!("Failed to start {} pipeline", config.render.default_mode))?;

        Ok(Self {
            orchestrator,
            lights_control,
            driver: FrameDriver::new(),
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator<ConsoleSurface> {
        &self.orchestrator
    }

    pub fn apply(&mut self, step: &Step) -> Result<Outcome> {
        match step {
            Step::Select { mode } => {
                let selector = self
                    .orchestrator
                    .selector()
                    .context("Session has no mode selector")?;
                self.change(selector, ControlValue::Choice(mode.label().to_string()))?;
            }
            Step::Toon { enabled } => {
                match self.orchestrator.capability_control(Capability::ToonShading) {
                    Some(toggle) => self.change(toggle, ControlValue::Bool(*enabled))?,
                    None => {
                        tracing::warn!(
                            "{} has no toon shading control; storing {} for later",
                            self.orchestrator.current_mode(),
                            enabled
                        );
                        self.orchestrator.set_toon_shading(*enabled);
                    }
                }
            }
            Step::Lights { count } => {
                self.change(self.lights_control, ControlValue::Number(f64::from(*count)))?;
            }
            Step::Frames { count } => {
                let report = self.driver.run(&mut self.orchestrator, *count)?;
                return Ok(Outcome::Rendered(report));
            }
            Step::Status => return Ok(Outcome::Status(self.status())),
        }
        Ok(Outcome::Applied)
    }

    /// Apply a user change to a control and dispatch the resulting events.
    fn change(&mut self, handle: ControlHandle, value: ControlValue) -> Result<()> {
        self.orchestrator.surface_mut().user_change(handle, value)?;
        let batch = self.orchestrator.pump_events();
        for event in batch.ignored {
            self.route(event);
        }
        match batch.errors.into_iter().next() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Events the orchestrator does not own.
    fn route(&mut self, event: ControlEvent) {
        match (event.handle == self.lights_control, &event.value) {
            (true, ControlValue::Number(n)) => {
                let applied = self.orchestrator.scene().lights.set_active(*n as u32);
                tracing::info!("Active lights -> {}", applied);
            }
            _ => tracing::debug!("Unrouted control event {:?}", event),
        }
    }

    pub fn status(&self) -> SessionStatus {
        let lights = &self.orchestrator.scene().lights;
        let stats = self.driver.stats();
        SessionStatus {
            mode: self.orchestrator.active_mode(),
            capabilities: self
                .orchestrator
                .capabilities()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            toon_shading: self.orchestrator.toon_shading(),
            lights: lights.active(),
            max_lights: lights.max(),
            instances: self.orchestrator.generation(),
            frames: stats.total_frames(),
            fps: stats.fps(),
            controls: self.orchestrator.surface().render_lines(),
        }
    }

    pub fn shutdown(mut self) -> Result<()> {
        self.orchestrator
            .shutdown()
            .context("Failed to stop the active pipeline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(&PrismConfig::default(), Arc::new(HeadlessBackend::new())).unwrap()
    }

    fn toon_visible(session: &Session) -> bool {
        session
            .orchestrator()
            .surface()
            .handle_of(Capability::ToonShading.control_name())
            .is_some()
    }

    #[test]
    fn test_script_parses() {
        let script = Script::from_toml_str(
            r#"
[[steps]]
action = "select"
mode = "forward+"

[[steps]]
action = "toon"
enabled = true

[[steps]]
action = "lights"
count = 1200

[[steps]]
action = "frames"
count = 5

[[steps]]
action = "status"
"#,
        )
        .unwrap();

        assert_eq!(
            script.steps,
            vec![
                Step::Select {
                    mode: Mode::ForwardPlus
                },
                Step::Toon { enabled: true },
                Step::Lights { count: 1200 },
                Step::Frames { count: 5 },
                Step::Status,
            ]
        );
    }

    #[test]
    fn test_script_accepts_mode_aliases() {
        let script = Script::from_toml_str(
            r#"
[[steps]]
action = "select"
mode = "clustered-deferred"
"#,
        )
        .unwrap();
        assert_eq!(
            script.steps,
            vec![Step::Select {
                mode: Mode::ClusteredDeferred
            }]
        );
    }

    #[test]
    fn test_script_rejects_unknown_mode() {
        let result = Script::from_toml_str(
            r#"
[[steps]]
action = "select"
mode = "raytraced"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_input_parsing() {
        assert_eq!(
            "mode clustered deferred".parse::<Input>().unwrap(),
            Input::Step(Step::Select {
                mode: Mode::ClusteredDeferred
            })
        );
        assert_eq!(
            "toon off".parse::<Input>().unwrap(),
            Input::Step(Step::Toon { enabled: false })
        );
        assert_eq!(
            "frames".parse::<Input>().unwrap(),
            Input::Step(Step::Frames { count: 1 })
        );
        assert_eq!("quit".parse::<Input>().unwrap(), Input::Quit);
        assert!("toon maybe".parse::<Input>().is_err());
        assert!("lights many".parse::<Input>().is_err());
        assert!("teleport".parse::<Input>().is_err());
    }

    #[test]
    fn test_session_starts_on_default_mode() {
        let session = session();
        let status = session.status();
        assert_eq!(status.mode, Some(Mode::Naive));
        assert_eq!(status.lights, LightSet::DEFAULT_ACTIVE);
        assert_eq!(status.instances, 1);
        assert!(!toon_visible(&session));
    }

    #[test]
    fn test_toon_control_follows_selection() {
        let mut session = session();
        session
            .apply(&Step::Select {
                mode: Mode::ClusteredDeferred,
            })
            .unwrap();
        assert!(toon_visible(&session));

        session.apply(&Step::Toon { enabled: true }).unwrap();
        match session.apply(&Step::Frames { count: 1 }).unwrap() {
            Outcome::Rendered(Some(report)) => {
                assert!(report.passes.iter().any(|p| p == "deferred toon shading"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        session.apply(&Step::Select { mode: Mode::Naive }).unwrap();
        assert!(!toon_visible(&session));
        assert!(session.status().toon_shading);
    }

    #[test]
    fn test_toon_without_control_is_stored() {
        let mut session = session();
        session.apply(&Step::Toon { enabled: true }).unwrap();
        assert!(session.status().toon_shading);

        session
            .apply(&Step::Select {
                mode: Mode::ClusteredDeferred,
            })
            .unwrap();
        let toggle = session
            .orchestrator()
            .capability_control(Capability::ToonShading)
            .unwrap();
        assert_eq!(
            session.orchestrator().surface().value(toggle),
            Some(ControlValue::Bool(true))
        );
    }

    #[test]
    fn test_lights_are_clamped_and_rendered() {
        let mut session = session();
        session.apply(&Step::Lights { count: 9000 }).unwrap();
        assert_eq!(session.status().lights, LightSet::DEFAULT_MAX);

        session.apply(&Step::Lights { count: 0 }).unwrap();
        assert_eq!(session.status().lights, 1);

        match session.apply(&Step::Frames { count: 3 }).unwrap() {
            Outcome::Rendered(Some(report)) => {
                assert_eq!(report.frame_index, 2);
                assert_eq!(report.light_count, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.status().frames, 3);
    }

    #[test]
    fn test_failed_switch_keeps_session_usable() {
        // Naive fits in two resources; clustered deferred needs five.
        let backend = Arc::new(HeadlessBackend::with_budget(2));
        let mut session = Session::new(&PrismConfig::default(), backend).unwrap();

        let err = session
            .apply(&Step::Select {
                mode: Mode::ClusteredDeferred,
            })
            .unwrap_err();
        assert!(err.to_string().contains("clustered deferred"));
        assert_eq!(session.status().mode, None);
        assert!(!toon_visible(&session));

        session.apply(&Step::Lights { count: 42 }).unwrap();
        assert_eq!(session.status().lights, 42);

        session.apply(&Step::Select { mode: Mode::Naive }).unwrap();
        assert_eq!(session.status().mode, Some(Mode::Naive));
    }

    #[test]
    fn test_shutdown() {
        let backend = Arc::new(HeadlessBackend::new());
        let session = Session::new(&PrismConfig::default(), backend.clone()).unwrap();
        assert!(backend.live_resources() > 0);
        session.shutdown().unwrap();
        assert_eq!(backend.live_resources(), 0);
    }
}
