use crate::core::domain::SpatialDomain;
use crate::core::neighbor::NeighborList;
use crate::core::particle::{norm, DIM};
use crate::core::store::SubdomainStore;
use crate::error::{Error, Result};
use ordered_float::NotNan;
use rayon::prelude::*;

/// Step counter, simulated time and the most recent step size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationClock {
    pub step: u64,
    pub time: f64,
    pub dt: f64,
}

/// Kick-drift integrator with a CFL-style adaptive step.
///
/// Velocities are kicked with the current acceleration first, then positions
/// drift with the kicked velocity (symplectic Euler, the leapfrog ordering).
#[derive(Debug, Clone)]
pub struct Integrator {
    cutoff: f64,
    dt_max: f64,
    clock: SimulationClock,
}

impl Integrator {
    /// Errors:
    /// - `Error::InvalidParam` if `cutoff` or `dt_max` is not finite and > 0.
    pub fn new(cutoff: f64, dt_max: f64) -> Result<Self> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::InvalidParam("cutoff must be finite and > 0".into()));
        }
        if !dt_max.is_finite() || dt_max <= 0.0 {
            return Err(Error::InvalidParam("dt_max must be finite and > 0".into()));
        }
        Ok(Self {
            cutoff,
            dt_max,
            clock: SimulationClock::default(),
        })
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn dt_max(&self) -> f64 {
        self.dt_max
    }

    /// Largest step such that no particle is predicted to move more than
    /// `cfl * cutoff`, capped at `dt_max`.
    ///
    /// Per particle the kick-drift displacement is bounded by
    /// `(|v| + |a| dt) dt`; this solves that quadratic for `dt`.
    pub fn compute_step_size(&self, store: &SubdomainStore, cfl: f64) -> f64 {
        let s = cfl * self.cutoff;
        store
            .buckets()
            .par_iter()
            .flat_map(|b| b.par_iter())
            .filter_map(|p| {
                let v = norm(&p.v);
                let a = norm(&p.a);
                // 2s / (v + sqrt(v^2 + 4as)) is the positive root, stable as a -> 0.
                let denom = v + (v * v + 4.0 * a * s).sqrt();
                if denom > 0.0 {
                    NotNan::new(2.0 * s / denom).ok()
                } else {
                    None
                }
            })
            .min()
            .map(NotNan::into_inner)
            .unwrap_or(self.dt_max)
            .min(self.dt_max)
    }

    /// Advance every owned particle by `dt` and tick the clock.
    pub fn step(&mut self, store: &mut SubdomainStore, dt: f64) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "step size must be finite and > 0, got {dt}"
            )));
        }
        store.buckets_mut().par_iter_mut().for_each(|bucket| {
            for p in bucket.iter_mut() {
                for k in 0..DIM {
                    p.v[k] += p.a[k] * dt;
                    let dx = p.v[k] * dt;
                    p.r[k] += dx;
                    p.drift[k] += dx;
                }
            }
        });
        self.clock.step += 1;
        self.clock.time += dt;
        self.clock.dt = dt;
        Ok(())
    }

    /// Smallest current separation over listed neighbor pairs (diagnostic).
    pub fn min_distance(
        &self,
        list: &NeighborList,
        store: &SubdomainStore,
        domain: &SpatialDomain,
    ) -> Option<f64> {
        list.parts()
            .par_iter()
            .filter_map(|part| {
                let locals = store.bucket(part.subdomain)?;
                let mut best = f64::INFINITY;
                for (i, pi) in locals.iter().enumerate().take(part.num_particles()) {
                    for nb in part.neighbors(i) {
                        let Some(pj) = store.bucket(nb.subdomain).and_then(|b| b.get(nb.index))
                        else {
                            continue;
                        };
                        let mut d = [0.0; DIM];
                        for k in 0..DIM {
                            d[k] = pi.r[k] - pj.r[k];
                        }
                        best = best.min(norm(&domain.min_image(d)));
                    }
                }
                NotNan::new(best).ok().filter(|b| b.is_finite())
            })
            .min()
            .map(NotNan::into_inner)
    }

    /// Total kinetic energy of the owned particles.
    pub fn kinetic_energy(store: &SubdomainStore) -> f64 {
        store
            .buckets()
            .par_iter()
            .map(|b| b.iter().map(|p| p.kinetic_energy()).sum::<f64>())
            .sum()
    }
}
