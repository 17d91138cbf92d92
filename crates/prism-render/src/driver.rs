use std::collections::VecDeque;
use std::time::{Duration, Instant};

use prism_core::{ControlSurface, PrismResult};

use crate::orchestrator::Orchestrator;
use crate::pipeline::FrameReport;

/// Rolling frame-time statistics.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: VecDeque<Duration>,
    capacity: usize,
    total_frames: u64,
}

impl FrameStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            total_frames: 0,
        }
    }

    pub fn record(&mut self, frame_time: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(frame_time);
        self.total_frames += 1;
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn mean_frame_time(&self) -> Option<Duration> {
        if self.window.is_empty() {
            return None;
        }
        let total: Duration = self.window.iter().sum();
        Some(total / self.window.len() as u32)
    }

    pub fn fps(&self) -> Option<f64> {
        self.mean_frame_time()
            .filter(|d| !d.is_zero())
            .map(|d| 1.0 / d.as_secs_f64())
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(60)
    }
}

/// Drives per-frame rendering of whatever pipeline is active.
#[derive(Debug, Default)]
pub struct FrameDriver {
    stats: FrameStats,
}

impl FrameDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Render and time one frame.
    pub fn tick<S: ControlSurface>(&mut self, orchestrator: &mut Orchestrator<S>) -> PrismResult<FrameReport> {
        let start = Instant::now();
        let report = orchestrator.render_frame()?;
        self.stats.record(start.elapsed());
        tracing::trace!(
            "Frame {} on {}: {}",
            report.frame_index,
            report.mode,
            report.passes.join(" -> ")
        );
        Ok(report)
    }

    /// Render `frames` frames, returning the last report.
    pub fn run<S: ControlSurface>(
        &mut self,
        orchestrator: &mut Orchestrator<S>,
        frames: u32,
    ) -> PrismResult<Option<FrameReport>> {
        let mut last = None;
        for _ in 0..frames {
            last = Some(self.tick(orchestrator)?);
        }
        if let (Some(report), Some(mean)) = (&last, self.stats.mean_frame_time()) {
            tracing::debug!(
                "{} frames on {}, mean frame time {:?}",
                frames,
                report.mode,
                mean
            );
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::registry::PipelineRegistry;
    use prism_core::{InspectorPanel, Mode, SceneContext, StickySettings};
    use std::sync::Arc;

    #[test]
    fn test_stats_window() {
        let mut stats = FrameStats::new(2);
        assert!(stats.mean_frame_time().is_none());
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(20));
        stats.record(Duration::from_millis(30));
        assert_eq!(stats.total_frames(), 3);
        assert_eq!(stats.mean_frame_time(), Some(Duration::from_millis(25)));
        assert!((stats.fps().unwrap() - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_run_counts_frames_per_instance() {
        let mut orch = Orchestrator::new(
            Arc::new(SceneContext::default()),
            Arc::new(HeadlessBackend::new()),
            PipelineRegistry::builtin(),
            StickySettings::new(),
            InspectorPanel::new(),
        );
        orch.start(Mode::Naive).unwrap();

        let mut driver = FrameDriver::new();
        let last = driver.run(&mut orch, 3).unwrap().unwrap();
        assert_eq!(last.frame_index, 2);

        orch.select(Mode::Naive).unwrap();
        let first = driver.tick(&mut orch).unwrap();
        assert_eq!(first.frame_index, 0);
        assert_eq!(driver.stats().total_frames(), 4);
    }
}
