//! # prism-render
//!
//! The Prism rendering layer. Owns the GPU backend abstraction, the
//! [`Pipeline`] contract with the three bundled pipelines, the mode
//! registry, and the [`Orchestrator`] that switches between them at runtime.

pub mod driver;
pub mod gpu;
pub mod headless;
pub mod orchestrator;
pub mod pipeline;
pub mod pipelines;
pub mod registry;

pub use driver::{FrameDriver, FrameStats};
pub use gpu::{GpuBackend, GpuContext, PassDesc, ResourceDesc, ResourceId, WgpuBackend};
pub use headless::{HeadlessBackend, HeadlessStats};
pub use orchestrator::{EventBatch, EventOutcome, Orchestrator, MODE_CONTROL};
pub use pipeline::{FrameReport, Pipeline, ToonShading};
pub use registry::{PipelineFactories, PipelineFactory, PipelineRegistry};
