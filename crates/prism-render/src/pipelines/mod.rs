//! The bundled pipelines.
//!
//! Each pipeline allocates, on construction, the viewport-sized resources its
//! technique needs and records the passes a real implementation would run.
//! The shading itself is out of scope.

pub mod clustered_deferred;
pub mod forward_plus;
pub mod naive;

pub use clustered_deferred::ClusteredDeferredPipeline;
pub use forward_plus::ForwardPlusPipeline;
pub use naive::NaivePipeline;

/// Dimensions of the light-cluster grid shared by the clustered pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterGrid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub max_lights_per_cluster: u32,
}

impl ClusterGrid {
    pub const DEFAULT: ClusterGrid = ClusterGrid {
        x: 16,
        y: 9,
        z: 24,
        max_lights_per_cluster: 128,
    };

    pub fn cluster_count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Bytes for a light count plus a fixed-size index list per cluster.
    pub fn buffer_size(&self) -> u64 {
        self.cluster_count() * (1 + self.max_lights_per_cluster as u64) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_buffer_size() {
        let grid = ClusterGrid {
            x: 2,
            y: 2,
            z: 2,
            max_lights_per_cluster: 3,
        };
        assert_eq!(grid.cluster_count(), 8);
        assert_eq!(grid.buffer_size(), 8 * 4 * 4);
    }
}
