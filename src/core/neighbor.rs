//! Skin-padded neighbor lists.
//!
//! A list is built with radius `factor * cutoff` and reused until some
//! particle has drifted half the skin `(factor - 1) * cutoff` since the build.
//! Two particles can close at most twice that drift, so no pair that was
//! outside the list radius at build time can be inside the cutoff before the
//! next rebuild.
//!
//! Pair storage:
//! - both particles in the same subdomain: stored once, on the lower id;
//! - particles in different subdomains: stored on both sides, each worker
//!   seeing the other particle as a ghost.

use crate::core::cells::CellGrid;
use crate::core::domain::{SpatialDomain, SubdomainId};
use crate::core::filter::PairFilter;
use crate::core::particle::DIM;
use crate::core::store::{ParticleRef, SubdomainStore};
use crate::error::{Error, Result};
use ordered_float::NotNan;
use rayon::prelude::*;
use tracing::debug;

/// Read-only snapshot of a particle owned by another subdomain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ghost {
    pub id: u64,
    pub src: ParticleRef,
    pub r: [f64; DIM],
}

/// Neighbor entries for the owned particles of one subdomain, in CSR layout.
#[derive(Debug, Clone, Default)]
pub struct SubdomainList {
    pub subdomain: SubdomainId,
    starts: Vec<usize>,
    entries: Vec<ParticleRef>,
    num_ghosts: usize,
}

impl SubdomainList {
    /// Number of owned particles covered by this list.
    pub fn num_particles(&self) -> usize {
        self.starts.len().saturating_sub(1)
    }

    /// Neighbors of the owned particle at `index`, in insertion order.
    pub fn neighbors(&self, index: usize) -> &[ParticleRef] {
        match (self.starts.get(index), self.starts.get(index + 1)) {
            (Some(&a), Some(&b)) => &self.entries[a..b],
            _ => &[],
        }
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Number of ghosts received for this subdomain at build time.
    pub fn num_ghosts(&self) -> usize {
        self.num_ghosts
    }
}

/// Per-subdomain neighbor lists produced by one build.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    parts: Vec<SubdomainList>,
    built_at_step: u64,
}

impl NeighborList {
    pub fn parts(&self) -> &[SubdomainList] {
        &self.parts
    }

    pub fn subdomain(&self, id: SubdomainId) -> Option<&SubdomainList> {
        self.parts.get(id)
    }

    pub fn built_at_step(&self) -> u64 {
        self.built_at_step
    }

    pub fn num_entries(&self) -> usize {
        self.parts.iter().map(SubdomainList::num_entries).sum()
    }

    /// Every `(owned particle, neighbor)` entry.
    pub fn pairs(&self) -> impl Iterator<Item = (ParticleRef, ParticleRef)> + '_ {
        self.parts.iter().flat_map(|part| {
            (0..part.num_particles()).flat_map(move |i| {
                let owner = ParticleRef {
                    subdomain: part.subdomain,
                    index: i,
                };
                part.neighbors(i).iter().map(move |&nb| (owner, nb))
            })
        })
    }
}

/// Owns the current neighbor list and decides when it must be rebuilt.
#[derive(Debug, Clone)]
pub struct NeighborListBuilder {
    filter: PairFilter,
    cutoff: f64,
    list_radius_factor: f64,
    ghost_layers: Option<usize>,
    list: Option<NeighborList>,
    rebuilds: u64,
}

impl NeighborListBuilder {
    /// `ghost_layers` caps how many subdomain layers the ghost exchange may
    /// reach along each axis; `None` derives it from the list radius.
    pub fn new(
        cutoff: f64,
        list_radius_factor: f64,
        ghost_layers: Option<usize>,
        domain: &SpatialDomain,
    ) -> Result<Self> {
        let filter = PairFilter::new(cutoff, list_radius_factor, *domain.extent())?;
        Ok(Self {
            filter,
            cutoff,
            list_radius_factor,
            ghost_layers,
            list: None,
            rebuilds: 0,
        })
    }

    pub fn filter(&self) -> &PairFilter {
        &self.filter
    }

    pub fn list(&self) -> Option<&NeighborList> {
        self.list.as_ref()
    }

    /// Number of builds performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Drop the current list so the next step rebuilds unconditionally.
    pub fn invalidate(&mut self) {
        self.list = None;
    }

    /// Half the skin: `(factor - 1) * cutoff / 2`.
    pub fn rebuild_threshold(&self) -> f64 {
        0.5 * (self.list_radius_factor - 1.0) * self.cutoff
    }

    /// Largest displacement of any particle since the last build.
    pub fn max_drift(store: &SubdomainStore) -> f64 {
        store
            .buckets()
            .par_iter()
            .flat_map(|b| b.par_iter())
            .filter_map(|p| NotNan::new(p.drift_norm()).ok())
            .max()
            .map(NotNan::into_inner)
            .unwrap_or(0.0)
    }

    /// Whether the next force evaluation needs a fresh list.
    pub fn rebuild_due(&self, store: &SubdomainStore) -> bool {
        self.list.is_none() || Self::max_drift(store) >= self.rebuild_threshold()
    }

    /// Ghost-exchange reach per axis, in subdomain layers.
    fn halo_layers(&self, domain: &SpatialDomain) -> Result<[usize; DIM]> {
        let required = domain.required_layers(self.filter.list_radius());
        let Some(g) = self.ghost_layers else {
            return Ok(required);
        };
        let counts = domain.counts();
        for k in 0..DIM {
            let axis_covered = 2 * g + 1 >= counts[k];
            if g < required[k] && !axis_covered {
                return Err(Error::Topology(format!(
                    "list radius {:.6} needs {} ghost layers along axis {} but only {} are exchanged",
                    self.filter.list_radius(),
                    required[k],
                    k,
                    g
                )));
            }
        }
        Ok([g; DIM])
    }

    /// Redistribute particles, exchange ghosts and rebuild every subdomain's list.
    ///
    /// Errors:
    /// - `Error::Topology` if the store layout does not match the domain or the
    ///   ghost exchange cannot reach far enough.
    pub fn build(
        &mut self,
        store: &mut SubdomainStore,
        domain: &SpatialDomain,
        step: u64,
    ) -> Result<&NeighborList> {
        if store.num_subdomains() != domain.num_subdomains() {
            return Err(Error::Topology(format!(
                "store has {} subdomains, domain has {}",
                store.num_subdomains(),
                domain.num_subdomains()
            )));
        }
        let layers = self.halo_layers(domain)?;
        let moved = store.redistribute(domain)?;

        let filter = self.filter;
        let grid = CellGrid::new(*domain.extent(), filter.list_radius());
        let frozen: &SubdomainStore = &*store;
        let parts = (0..domain.num_subdomains())
            .into_par_iter()
            .map(|sd| {
                let halo = domain.halo_with_layers(sd, layers);
                let ghosts = exchange_ghosts(frozen, domain, sd, &halo, filter.list_radius())?;
                Ok(build_subdomain(frozen, sd, &ghosts, &filter, grid.clone()))
            })
            .collect::<Result<Vec<SubdomainList>>>()?;

        store
            .buckets_mut()
            .par_iter_mut()
            .for_each(|b| b.iter_mut().for_each(|p| p.drift = [0.0; DIM]));

        let list = NeighborList {
            parts,
            built_at_step: step,
        };
        self.rebuilds += 1;
        debug!(
            step,
            migrated = moved,
            entries = list.num_entries(),
            ghosts = list.parts.iter().map(|p| p.num_ghosts).sum::<usize>(),
            "rebuilt neighbor list"
        );
        Ok(self.list.insert(list))
    }
}

/// Gather read-only copies of halo particles close enough to subdomain `sd` to matter.
fn exchange_ghosts(
    store: &SubdomainStore,
    domain: &SpatialDomain,
    sd: SubdomainId,
    halo: &[SubdomainId],
    reach: f64,
) -> Result<Vec<Ghost>> {
    let reach_sq = reach * reach;
    let mut ghosts = Vec::new();
    for &h in halo {
        let bucket = store.bucket(h).ok_or_else(|| {
            Error::Topology(format!(
                "ghost exchange for subdomain {sd} cannot reach subdomain {h}"
            ))
        })?;
        for (index, p) in bucket.iter().enumerate() {
            let d2 = domain
                .distance_sq_to_subdomain(sd, &p.r)
                .ok_or_else(|| Error::Topology(format!("subdomain {sd} not in domain")))?;
            if d2 <= reach_sq {
                ghosts.push(Ghost {
                    id: p.id,
                    src: ParticleRef {
                        subdomain: h,
                        index,
                    },
                    r: p.r,
                });
            }
        }
    }
    Ok(ghosts)
}

fn build_subdomain(
    store: &SubdomainStore,
    sd: SubdomainId,
    ghosts: &[Ghost],
    filter: &PairFilter,
    grid: Option<CellGrid>,
) -> SubdomainList {
    let locals = store.bucket(sd).unwrap_or(&[]);
    let n_local = locals.len();

    // Candidates: owned particles first, then ghosts.
    let mut pos: Vec<[f64; DIM]> = Vec::with_capacity(n_local + ghosts.len());
    let mut ids: Vec<u64> = Vec::with_capacity(n_local + ghosts.len());
    for p in locals {
        pos.push(p.r);
        ids.push(p.id);
    }
    for g in ghosts {
        pos.push(g.r);
        ids.push(g.id);
    }
    let to_ref = |c: usize| {
        if c < n_local {
            ParticleRef {
                subdomain: sd,
                index: c,
            }
        } else {
            ghosts[c - n_local].src
        }
    };

    let mut starts = Vec::with_capacity(n_local + 1);
    let mut entries = Vec::new();
    starts.push(0);

    let visit = |i: usize, c: usize, entries: &mut Vec<ParticleRef>| {
        if c == i {
            return;
        }
        // Local pairs go on the lower id only; ghost pairs always go on the owned side.
        if c < n_local && ids[i] >= ids[c] {
            return;
        }
        if filter.is_candidate(&pos[i], &pos[c]) {
            entries.push(to_ref(c));
        }
    };

    match grid {
        Some(mut grid) => {
            grid.bin(&pos);
            for i in 0..n_local {
                grid.for_each_near(&pos[i], |c| visit(i, c, &mut entries));
                starts.push(entries.len());
            }
        }
        None => {
            for i in 0..n_local {
                for c in 0..pos.len() {
                    visit(i, c, &mut entries);
                }
                starts.push(entries.len());
            }
        }
    }

    SubdomainList {
        subdomain: sd,
        starts,
        entries,
        num_ghosts: ghosts.len(),
    }
}
