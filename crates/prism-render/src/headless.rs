//! Device-less GPU backend used by tests and headless sessions.

use parking_lot::Mutex;
use std::collections::HashMap;

use prism_core::{PrismError, PrismResult};

use crate::gpu::{GpuBackend, PassDesc, ResourceDesc, ResourceId};

/// Counters exposed by [`HeadlessBackend::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub live: usize,
    pub peak: usize,
    pub live_bytes: u64,
    pub peak_bytes: u64,
    pub created: u64,
    pub destroyed: u64,
    pub submissions: u64,
    pub passes: u64,
    /// Submissions not yet retired by `wait_idle`.
    pub in_flight: u64,
}

#[derive(Default)]
struct HeadlessState {
    live: HashMap<ResourceId, ResourceDesc>,
    next_id: u64,
    stats: HeadlessStats,
}

/// Bookkeeping-only [`GpuBackend`].
///
/// Tracks live resources and their peak, and models the queue: a submission
/// stays in flight until `wait_idle`, and destroying a resource while any
/// submission is in flight is an error. An optional resource budget makes
/// allocation fail once that many resources are live.
#[derive(Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
    budget: Option<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail allocations beyond `max_live` simultaneously live resources.
    pub fn with_budget(max_live: usize) -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            budget: Some(max_live),
        }
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats
    }

    /// Labels of the currently live resources, sorted.
    pub fn live_labels(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut labels: Vec<String> = state.live.values().map(|d| d.label().to_string()).collect();
        labels.sort();
        labels
    }
}

impl GpuBackend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_resource(&self, desc: &ResourceDesc) -> PrismResult<ResourceId> {
        let mut state = self.state.lock();
        if let Some(budget) = self.budget {
            if state.live.len() >= budget {
                return Err(PrismError::gpu(format!(
                    "out of GPU memory allocating {} ({} of {} resources live)",
                    desc.label(),
                    state.live.len(),
                    budget
                )));
            }
        }

        state.next_id += 1;
        let id = ResourceId(state.next_id);
        state.live.insert(id, desc.clone());

        let stats = &mut state.stats;
        stats.created += 1;
        stats.live += 1;
        stats.live_bytes += desc.byte_size();
        stats.peak = stats.peak.max(stats.live);
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        Ok(id)
    }

    fn destroy_resource(&self, id: ResourceId) -> PrismResult<()> {
        let mut state = self.state.lock();
        if state.stats.in_flight > 0 {
            return Err(PrismError::gpu(format!(
                "{:?} destroyed with {} submissions in flight",
                id, state.stats.in_flight
            )));
        }
        let desc = state
            .live
            .remove(&id)
            .ok_or_else(|| PrismError::gpu(format!("unknown resource {:?}", id)))?;

        let stats = &mut state.stats;
        stats.destroyed += 1;
        stats.live -= 1;
        stats.live_bytes -= desc.byte_size();
        Ok(())
    }

    fn submit(&self, passes: &[PassDesc]) -> PrismResult<()> {
        let mut state = self.state.lock();
        for pass in passes {
            for id in pass.resources() {
                if !state.live.contains_key(&id) {
                    return Err(PrismError::gpu(format!(
                        "pass '{}' uses unknown resource {:?}",
                        pass.label, id
                    )));
                }
            }
        }
        state.stats.submissions += 1;
        state.stats.passes += passes.len() as u64;
        state.stats.in_flight += 1;
        Ok(())
    }

    fn wait_idle(&self) -> PrismResult<()> {
        self.state.lock().stats.in_flight = 0;
        Ok(())
    }

    fn live_resources(&self) -> usize {
        self.state.lock().live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TargetFormat;

    fn depth() -> ResourceDesc {
        ResourceDesc::texture("depth", 4, 4, TargetFormat::Depth32Float)
    }

    #[test]
    fn test_create_and_destroy() {
        let backend = HeadlessBackend::new();
        let a = backend.create_resource(&depth()).unwrap();
        let b = backend.create_resource(&ResourceDesc::buffer("lights", 64)).unwrap();
        assert_eq!(backend.live_resources(), 2);
        assert_eq!(backend.stats().live_bytes, 64 + 64);

        backend.destroy_resource(a).unwrap();
        backend.destroy_resource(b).unwrap();
        let stats = backend.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.peak, 2);
        assert_eq!(stats.live_bytes, 0);
        assert!(backend.destroy_resource(a).is_err());
    }

    #[test]
    fn test_budget_exhaustion() {
        let backend = HeadlessBackend::with_budget(1);
        backend.create_resource(&depth()).unwrap();
        let err = backend.create_resource(&depth()).unwrap_err();
        assert!(err.to_string().contains("out of GPU memory"));
    }

    #[test]
    fn test_destroy_requires_idle_queue() {
        let backend = HeadlessBackend::new();
        let id = backend.create_resource(&depth()).unwrap();
        backend
            .submit(&[PassDesc::render("forward", vec![], Some(id))])
            .unwrap();
        assert!(backend.destroy_resource(id).is_err());

        backend.wait_idle().unwrap();
        backend.destroy_resource(id).unwrap();
    }

    #[test]
    fn test_submit_rejects_unknown_resources() {
        let backend = HeadlessBackend::new();
        let result = backend.submit(&[PassDesc::compute("cluster", vec![ResourceId(99)])]);
        assert!(result.is_err());
        assert_eq!(backend.stats().submissions, 0);
    }
}
