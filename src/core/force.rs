//! Pairwise force evaluation over a neighbor list.
//!
//! The evaluator is a pure function of the store's current positions: each
//! worker fills an acceleration buffer for its own subdomain, and the buffers
//! are written back in a second pass. Ghost neighbors are only ever read.

use crate::core::boundary::min_image_separation;
use crate::core::domain::{SpatialDomain, SubdomainId};
use crate::core::neighbor::NeighborList;
use crate::core::particle::DIM;
use crate::core::potential::PairPotential;
use crate::core::store::SubdomainStore;
use crate::error::{Error, Result};
use rayon::prelude::*;
use tracing::warn;

/// Non-fatal diagnostic: some pairs were closer than `min_r` and their force
/// was evaluated at `min_r` instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericWarning {
    pub clamped_pairs: usize,
    pub min_r: f64,
}

/// Outcome of one force pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceReport {
    /// Total potential energy of pairs inside the cutoff.
    pub potential_energy: f64,
    /// List entries whose current separation is within the cutoff.
    pub interactions: usize,
    /// Set when the `min_r` floor engaged for at least one pair.
    pub warning: Option<NumericWarning>,
}

#[derive(Debug, Clone, Copy)]
struct PairTerm {
    /// Force on the first particle, per unit of separation vector.
    coef: f64,
    energy: f64,
    clamped: bool,
}

#[derive(Debug, Default)]
struct Partial {
    acc: Vec<[f64; DIM]>,
    energy: f64,
    interactions: usize,
    clamped: usize,
}

#[derive(Debug, Clone)]
pub struct ForceEvaluator {
    cutoff: f64,
    cutoff_sq: f64,
    min_r: f64,
    potential: PairPotential,
    extent: [f64; DIM],
}

impl ForceEvaluator {
    /// Errors:
    /// - `Error::InvalidParam` unless `0 < min_r < cutoff`.
    pub fn new(
        cutoff: f64,
        min_r: f64,
        potential: PairPotential,
        domain: &SpatialDomain,
    ) -> Result<Self> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::InvalidParam("cutoff must be finite and > 0".into()));
        }
        if !min_r.is_finite() || min_r <= 0.0 || min_r >= cutoff {
            return Err(Error::InvalidParam(
                "min_r must be finite with 0 < min_r < cutoff".into(),
            ));
        }
        Ok(Self {
            cutoff,
            cutoff_sq: cutoff * cutoff,
            min_r,
            potential,
            extent: *domain.extent(),
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn min_r(&self) -> f64 {
        self.min_r
    }

    pub fn potential(&self) -> PairPotential {
        self.potential
    }

    /// Minimum-image separation `ri - rj`.
    #[inline]
    fn separation(&self, ri: &[f64; DIM], rj: &[f64; DIM]) -> [f64; DIM] {
        min_image_separation(
            [ri[0] - rj[0], ri[1] - rj[1], ri[2] - rj[2]],
            &self.extent,
        )
    }

    #[inline]
    fn pair(&self, d: &[f64; DIM]) -> Option<PairTerm> {
        let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
        if r2 > self.cutoff_sq {
            return None;
        }
        let r = r2.sqrt();
        let clamped = r < self.min_r;
        let r_eff = r.max(self.min_r);
        // Coincident particles have no direction to push along.
        let coef = if r > 0.0 {
            self.potential.force(r_eff, self.cutoff) / r
        } else {
            0.0
        };
        Some(PairTerm {
            coef,
            energy: self.potential.energy(r_eff, self.cutoff),
            clamped,
        })
    }

    /// Force vector on a particle at `ri` due to one at `rj`, if within the cutoff.
    pub fn pair_force(&self, ri: &[f64; DIM], rj: &[f64; DIM]) -> Option<[f64; DIM]> {
        let d = self.separation(ri, rj);
        self.pair(&d).map(|t| [t.coef * d[0], t.coef * d[1], t.coef * d[2]])
    }

    fn subdomain_pass(
        &self,
        list: &NeighborList,
        store: &SubdomainStore,
        sd: SubdomainId,
    ) -> Result<Partial> {
        let locals = store.bucket(sd).unwrap_or(&[]);
        let part = list
            .subdomain(sd)
            .ok_or_else(|| Error::Topology(format!("no neighbor list for subdomain {sd}")))?;
        if part.num_particles() != locals.len() {
            return Err(Error::Topology(format!(
                "neighbor list for subdomain {sd} covers {} particles, store holds {}",
                part.num_particles(),
                locals.len()
            )));
        }

        let mut out = Partial {
            acc: vec![[0.0; DIM]; locals.len()],
            ..Default::default()
        };
        for (i, pi) in locals.iter().enumerate() {
            for nb in part.neighbors(i) {
                let pj = if nb.subdomain == sd {
                    locals.get(nb.index)
                } else {
                    store.bucket(nb.subdomain).and_then(|b| b.get(nb.index))
                };
                let pj = pj
                    .ok_or_else(|| Error::Topology(format!("stale neighbor reference {nb:?}")))?;

                let d = self.separation(&pi.r, &pj.r);
                let Some(t) = self.pair(&d) else {
                    continue;
                };
                out.interactions += 1;
                if t.clamped {
                    out.clamped += 1;
                }
                for k in 0..DIM {
                    out.acc[i][k] += t.coef * d[k] / pi.mass;
                }
                if nb.subdomain == sd {
                    for k in 0..DIM {
                        out.acc[nb.index][k] -= t.coef * d[k] / pj.mass;
                    }
                    out.energy += t.energy;
                } else {
                    // Ghosts stay read-only: the owner of `pj` evaluates this
                    // pair again for its own particle and adds the other half.
                    out.energy += 0.5 * t.energy;
                }
            }
        }
        Ok(out)
    }

    /// Recompute every owned particle's acceleration from the current list.
    pub fn evaluate(&self, list: &NeighborList, store: &mut SubdomainStore) -> Result<ForceReport> {
        if list.parts().len() != store.num_subdomains() {
            return Err(Error::Topology(format!(
                "neighbor list has {} subdomains, store has {}",
                list.parts().len(),
                store.num_subdomains()
            )));
        }
        let frozen: &SubdomainStore = &*store;
        let partials = (0..frozen.num_subdomains())
            .into_par_iter()
            .map(|sd| self.subdomain_pass(list, frozen, sd))
            .collect::<Result<Vec<Partial>>>()?;

        let mut report = ForceReport::default();
        let mut clamped = 0usize;
        for p in &partials {
            report.potential_energy += p.energy;
            report.interactions += p.interactions;
            clamped += p.clamped;
        }

        store
            .buckets_mut()
            .par_iter_mut()
            .zip(partials.into_par_iter())
            .for_each(|(bucket, partial)| {
                for (p, a) in bucket.iter_mut().zip(partial.acc) {
                    p.a = a;
                }
            });

        if clamped > 0 {
            warn!(
                clamped_pairs = clamped,
                min_r = self.min_r,
                "pair separation below min_r; force evaluated at min_r"
            );
            report.warning = Some(NumericWarning {
                clamped_pairs: clamped,
                min_r: self.min_r,
            });
        }
        Ok(report)
    }
}
