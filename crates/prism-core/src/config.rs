use serde::{Deserialize, Serialize};

use crate::error::{PrismError, PrismResult};
use crate::mode::Mode;
use crate::scene::{LightSet, Viewport};

/// Which GPU backend a session runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Resource bookkeeping only, no device.
    #[default]
    Headless,
    /// A real wgpu device.
    Wgpu,
}

impl std::str::FromStr for BackendKind {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headless" => Ok(BackendKind::Headless),
            "wgpu" | "gpu" => Ok(BackendKind::Wgpu),
            other => Err(PrismError::InvalidArgument(format!(
                "unknown backend '{}' (expected headless or wgpu)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub default_mode: Mode,
    pub width: u32,
    pub height: u32,
    pub backend: BackendKind,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let viewport = Viewport::default();
        Self {
            default_mode: Mode::Naive,
            width: viewport.width,
            height: viewport.height,
            backend: BackendKind::Headless,
        }
    }
}

impl RenderConfig {
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LightsConfig {
    pub initial: u32,
    pub max: u32,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            initial: LightSet::DEFAULT_ACTIVE,
            max: LightSet::DEFAULT_MAX,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShadingConfig {
    pub toon_shading: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PrismConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub lights: LightsConfig,
    #[serde(default)]
    pub shading: ShadingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PrismConfig {
    pub fn from_toml_str(contents: &str) -> PrismResult<Self> {
        let config: PrismConfig =
            toml::from_str(contents).map_err(|e| PrismError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &std::path::Path) -> PrismResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> PrismResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| PrismError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> PrismResult<()> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(PrismError::Config(format!(
                "viewport must be non-empty, got {}x{}",
                self.render.width, self.render.height
            )));
        }
        if self.lights.max == 0 {
            return Err(PrismError::Config("lights.max must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PrismConfig::from_toml_str("").unwrap();
        assert_eq!(config.render.default_mode, Mode::Naive);
        assert_eq!(config.render.backend, BackendKind::Headless);
        assert_eq!(config.lights.initial, 500);
        assert_eq!(config.lights.max, 5000);
        assert!(!config.shading.toon_shading);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_config() {
        let config = PrismConfig::from_toml_str(
            r#"
            [render]
            default_mode = "clustered deferred"
            width = 640

            [shading]
            toon_shading = true
            "#,
        )
        .unwrap();
        assert_eq!(config.render.default_mode, Mode::ClusteredDeferred);
        assert_eq!(config.render.width, 640);
        assert_eq!(config.render.height, 720);
        assert!(config.shading.toon_shading);
    }

    #[test]
    fn test_mode_aliases_in_config() {
        let config =
            PrismConfig::from_toml_str("[render]\ndefault_mode = \"forward-plus\"").unwrap();
        assert_eq!(config.render.default_mode, Mode::ForwardPlus);
        let config = PrismConfig::from_toml_str("[render]\ndefault_mode = \"Deferred\"").unwrap();
        assert_eq!(config.render.default_mode, Mode::ClusteredDeferred);
    }

    #[test]
    fn test_unknown_mode_is_config_error() {
        let err = PrismConfig::from_toml_str("[render]\ndefault_mode = \"raytraced\"").unwrap_err();
        assert!(matches!(err, PrismError::Config(_)));
    }

    #[test]
    fn test_zero_viewport_rejected() {
        assert!(PrismConfig::from_toml_str("[render]\nwidth = 0").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("prism-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prism.toml");

        let mut config = PrismConfig::default();
        config.render.default_mode = Mode::ForwardPlus;
        config.lights.initial = 42;
        config.save_to_file(&path).unwrap();

        let loaded = PrismConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.render.default_mode, Mode::ForwardPlus);
        assert_eq!(loaded.lights.initial, 42);

        std::fs::remove_dir_all(&dir).ok();
    }
}
