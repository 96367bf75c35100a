//! Output writers.
//!
//! Both writers read a [`Snapshot`]: a copy of every particle taken between
//! steps, so output never observes a half-updated store.

pub mod plotfile;
pub mod vtk;

use crate::core::domain::SpatialDomain;
use crate::core::store::DenseStore;

/// Real components written after the position, in order.
pub const COMPONENT_NAMES: [&str; 6] = ["vx", "vy", "vz", "ax", "ay", "az"];

/// Consistent copy of the particle state after a completed step.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// All particles, sorted by id.
    pub particles: DenseStore,
    pub step: u64,
    pub time: f64,
    pub domain: SpatialDomain,
}

impl Snapshot {
    pub fn num_particles(&self) -> usize {
        self.particles.particles().len()
    }
}

/// `prefix` followed by `step` zero-padded to five digits, e.g. `plt00042`.
pub(crate) fn numbered(prefix: &str, step: u64) -> String {
    format!("{prefix}{step:05}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_are_padded() {
        assert_eq!(numbered("plt", 7), "plt00007");
        assert_eq!(numbered("particles_", 123456), "particles_123456");
    }
}
