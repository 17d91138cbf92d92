//! The shared, read-only scene context every pipeline renders against.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Size of the render surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Summary of loaded scene geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub name: String,
    pub mesh_count: u32,
    pub triangle_count: u64,
}

impl SceneSummary {
    pub fn new(name: impl Into<String>, mesh_count: u32, triangle_count: u64) -> Self {
        Self {
            name: name.into(),
            mesh_count,
            triangle_count,
        }
    }
}

/// Perspective camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [-15.0, 5.0, 0.0],
            target: [0.0, 5.0, 0.0],
            fov_y: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// The scene's light set.
///
/// The active light count is the one field that changes during a session.
/// It is written by the host (the light-count control) and only read by
/// pipelines, so it is stored atomically.
#[derive(Debug)]
pub struct LightSet {
    max: u32,
    active: AtomicU32,
}

impl LightSet {
    pub const DEFAULT_ACTIVE: u32 = 500;
    pub const DEFAULT_MAX: u32 = 5000;

    pub fn new(active: u32, max: u32) -> Self {
        let max = max.max(1);
        Self {
            max,
            active: AtomicU32::new(active.clamp(1, max)),
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    /// Set the active light count, clamped to `1..=max`. Returns the applied value.
    pub fn set_active(&self, count: u32) -> u32 {
        let applied = count.clamp(1, self.max);
        self.active.store(applied, Ordering::Release);
        applied
    }
}

impl Default for LightSet {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ACTIVE, Self::DEFAULT_MAX)
    }
}

/// Everything a pipeline needs to know about what it renders.
#[derive(Debug, Default)]
pub struct SceneContext {
    pub scene: SceneSummary,
    pub camera: Camera,
    pub lights: LightSet,
    pub viewport: Viewport,
}

impl Default for SceneSummary {
    fn default() -> Self {
        Self::new("empty", 0, 0)
    }
}

impl SceneContext {
    pub fn new(scene: SceneSummary, camera: Camera, lights: LightSet, viewport: Viewport) -> Self {
        Self {
            scene,
            camera,
            lights,
            viewport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_count_clamped() {
        let lights = LightSet::new(10, 100);
        assert_eq!(lights.set_active(0), 1);
        assert_eq!(lights.set_active(250), 100);
        assert_eq!(lights.set_active(42), 42);
        assert_eq!(lights.active(), 42);
    }

    #[test]
    fn test_initial_light_count_clamped() {
        let lights = LightSet::new(9000, 5000);
        assert_eq!(lights.active(), 5000);
    }

    #[test]
    fn test_viewport_aspect() {
        assert_eq!(Viewport::new(200, 100).aspect(), 2.0);
        assert_eq!(Viewport::new(200, 0).aspect(), 1.0);
    }
}
