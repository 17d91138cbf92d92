//! # prism-core
//!
//! Core types for the Prism renderer switcher.
//! This crate holds the vocabulary shared by every Prism crate: render modes,
//! pipeline capabilities and sticky settings, the shared scene context, the
//! control-surface contract, configuration and error types.

pub mod capability;
pub mod config;
pub mod control;
pub mod error;
pub mod mode;
pub mod scene;

pub use config::*;

pub use capability::{Capability, CapabilitySet, StickySettings};
pub use control::{
    ControlEvent, ControlHandle, ControlKind, ControlSpec, ControlSurface, ControlValue,
    InspectorPanel,
};
pub use error::{PrismError, PrismResult};
pub use mode::Mode;
pub use scene::{Camera, LightSet, SceneContext, SceneSummary, Viewport};
