//! Particle containers.
//!
//! [`ParticleContainer`] is the contract the rest of the engine is written
//! against. Two variants implement it:
//! - [`DenseStore`]: one flat array, used for single-process setups and for
//!   read-only snapshots handed to the output writers.
//! - [`SubdomainStore`]: one bucket per subdomain; each bucket is mutated only
//!   by the worker that owns that subdomain.

use crate::core::domain::{SpatialDomain, SubdomainId};
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Back-reference to a particle: the subdomain bucket and the index within it.
///
/// Valid until the next redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleRef {
    pub subdomain: SubdomainId,
    pub index: usize,
}

/// Common interface over particle collections.
pub trait ParticleContainer {
    /// Total number of owned particles.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a particle, tagging it with the subdomain its position maps to.
    fn insert(&mut self, particle: Particle, domain: &SpatialDomain) -> Result<ParticleRef>;

    /// Visit every owned particle.
    fn for_each_owned<F: FnMut(&Particle)>(&self, f: F);

    /// Visit every owned particle mutably.
    fn for_each_owned_mut<F: FnMut(&mut Particle)>(&mut self, f: F);

    /// Move the particle at `at` to subdomain `target` and return its new location.
    fn migrate(&mut self, at: ParticleRef, target: SubdomainId) -> Result<ParticleRef>;

    /// Look up a particle by reference.
    fn get(&self, at: ParticleRef) -> Option<&Particle>;
}

/// Single flat array of particles.
///
/// Every particle lives at `ParticleRef { subdomain: p.subdomain, index }`;
/// migration only rewrites the tag.
#[derive(Debug, Clone, Default)]
pub struct DenseStore {
    particles: Vec<Particle>,
}

impl DenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of all particles.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn slot(&self, at: ParticleRef) -> Option<usize> {
        match self.particles.get(at.index) {
            Some(p) if p.subdomain == at.subdomain => Some(at.index),
            _ => None,
        }
    }
}

impl ParticleContainer for DenseStore {
    fn len(&self) -> usize {
        self.particles.len()
    }

    fn insert(&mut self, mut particle: Particle, domain: &SpatialDomain) -> Result<ParticleRef> {
        particle.subdomain = domain.subdomain_of(&particle.r);
        let at = ParticleRef {
            subdomain: particle.subdomain,
            index: self.particles.len(),
        };
        self.particles.push(particle);
        Ok(at)
    }

    fn for_each_owned<F: FnMut(&Particle)>(&self, f: F) {
        self.particles.iter().for_each(f);
    }

    fn for_each_owned_mut<F: FnMut(&mut Particle)>(&mut self, f: F) {
        self.particles.iter_mut().for_each(f);
    }

    fn migrate(&mut self, at: ParticleRef, target: SubdomainId) -> Result<ParticleRef> {
        let i = self
            .slot(at)
            .ok_or_else(|| Error::InvalidParam(format!("no particle at {at:?}")))?;
        self.particles[i].subdomain = target;
        Ok(ParticleRef {
            subdomain: target,
            index: i,
        })
    }

    fn get(&self, at: ParticleRef) -> Option<&Particle> {
        self.slot(at).map(|i| &self.particles[i])
    }
}

/// Per-subdomain particle buckets.
#[derive(Debug, Clone)]
pub struct SubdomainStore {
    buckets: Vec<Vec<Particle>>,
}

impl SubdomainStore {
    /// Empty store with one bucket per subdomain of `domain`.
    pub fn new(domain: &SpatialDomain) -> Self {
        Self::with_buckets(domain.num_subdomains())
    }

    /// Empty store with an explicit bucket count.
    pub fn with_buckets(n: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); n],
        }
    }

    /// Build from an iterator of particles, tagging each by position.
    pub fn from_particles<I>(particles: I, domain: &SpatialDomain) -> Result<Self>
    where
        I: IntoIterator<Item = Particle>,
    {
        let mut store = Self::new(domain);
        for p in particles {
            store.insert(p, domain)?;
        }
        Ok(store)
    }

    pub fn num_subdomains(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, id: SubdomainId) -> Option<&[Particle]> {
        self.buckets.get(id).map(|b| b.as_slice())
    }

    pub fn buckets(&self) -> &[Vec<Particle>] {
        &self.buckets
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut [Vec<Particle>] {
        &mut self.buckets
    }

    /// Move every particle whose position maps to a different subdomain than
    /// its tag. Returns the number of particles moved.
    ///
    /// Errors:
    /// - `Error::Topology` if the bucket count does not match the domain.
    pub fn redistribute(&mut self, domain: &SpatialDomain) -> Result<usize> {
        if self.buckets.len() != domain.num_subdomains() {
            return Err(Error::Topology(format!(
                "store holds {} subdomain buckets but the domain has {}",
                self.buckets.len(),
                domain.num_subdomains()
            )));
        }
        // Each worker scans its own bucket; moves are applied afterwards.
        let moves: Vec<Vec<(usize, SubdomainId)>> = self
            .buckets
            .par_iter()
            .map(|bucket| {
                bucket
                    .iter()
                    .enumerate()
                    .filter_map(|(i, p)| {
                        let target = domain.subdomain_of(&p.r);
                        (target != p.subdomain).then_some((i, target))
                    })
                    .collect()
            })
            .collect();

        let mut moved = 0usize;
        for (sd, list) in moves.into_iter().enumerate() {
            // Descending index order keeps swap_remove from disturbing pending moves.
            for &(index, target) in list.iter().rev() {
                self.migrate(ParticleRef { subdomain: sd, index }, target)?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Copy all particles into a dense store sorted by id.
    pub fn snapshot(&self) -> DenseStore {
        let mut particles: Vec<Particle> = self.buckets.iter().flatten().cloned().collect();
        particles.sort_by_key(|p| p.id);
        DenseStore { particles }
    }
}

impl ParticleContainer for SubdomainStore {
    fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    fn insert(&mut self, mut particle: Particle, domain: &SpatialDomain) -> Result<ParticleRef> {
        let sd = domain.subdomain_of(&particle.r);
        let bucket = self.buckets.get_mut(sd).ok_or_else(|| {
            Error::Topology(format!("subdomain {sd} has no bucket in this store"))
        })?;
        particle.subdomain = sd;
        bucket.push(particle);
        Ok(ParticleRef {
            subdomain: sd,
            index: bucket.len() - 1,
        })
    }

    fn for_each_owned<F: FnMut(&Particle)>(&self, f: F) {
        self.buckets.iter().flatten().for_each(f);
    }

    fn for_each_owned_mut<F: FnMut(&mut Particle)>(&mut self, f: F) {
        self.buckets.iter_mut().flatten().for_each(f);
    }

    fn migrate(&mut self, at: ParticleRef, target: SubdomainId) -> Result<ParticleRef> {
        if target >= self.buckets.len() {
            return Err(Error::Topology(format!(
                "cannot migrate into subdomain {target}: store has {} buckets",
                self.buckets.len()
            )));
        }
        let src = self
            .buckets
            .get_mut(at.subdomain)
            .filter(|b| at.index < b.len())
            .ok_or_else(|| Error::InvalidParam(format!("no particle at {at:?}")))?;
        let mut p = src.swap_remove(at.index);
        p.subdomain = target;
        let dst = &mut self.buckets[target];
        dst.push(p);
        Ok(ParticleRef {
            subdomain: target,
            index: dst.len() - 1,
        })
    }

    fn get(&self, at: ParticleRef) -> Option<&Particle> {
        self.buckets.get(at.subdomain)?.get(at.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Result<SpatialDomain> {
        SpatialDomain::new([10.0, 10.0, 10.0], 5.0, 2)
    }

    #[test]
    fn insert_tags_by_position() -> Result<()> {
        let d = domain()?;
        let mut s = SubdomainStore::new(&d);
        let at = s.insert(Particle::new(3, [7.0, 1.0, 1.0], [0.0; 3], 1.0)?, &d)?;
        assert_eq!(at.subdomain, 1);
        assert_eq!(s.get(at).map(|p| p.id), Some(3));
        assert_eq!(s.len(), 1);
        Ok(())
    }

    #[test]
    fn redistribute_moves_only_stale_tags() -> Result<()> {
        let d = domain()?;
        let particles = (0..4u64)
            .map(|i| Particle::new(i, [1.0 + i as f64, 1.0, 1.0], [0.0; 3], 1.0))
            .collect::<Result<Vec<_>>>()?;
        let mut s = SubdomainStore::from_particles(particles, &d)?;
        // Particles 0..=3 sit at x = 1..4, all in subdomain 0. Push two across x = 5.
        s.buckets_mut()[0][1].r[0] = 6.0;
        s.buckets_mut()[0][3].r[0] = 9.0;
        let moved = s.redistribute(&d)?;
        assert_eq!(moved, 2);
        let mut ids0: Vec<u64> = s.buckets()[0].iter().map(|p| p.id).collect();
        ids0.sort();
        assert_eq!(ids0, vec![0, 2]);
        assert!(s.buckets()[1].iter().all(|p| p.subdomain == 1));
        assert_eq!(s.len(), 4);
        Ok(())
    }

    #[test]
    fn redistribute_rejects_mismatched_layout() -> Result<()> {
        let d = domain()?;
        let mut s = SubdomainStore::with_buckets(3);
        assert!(matches!(s.redistribute(&d), Err(Error::Topology(_))));
        Ok(())
    }

    #[test]
    fn dense_migrate_only_retags() -> Result<()> {
        let d = domain()?;
        let mut s = DenseStore::new();
        let at = s.insert(Particle::new(0, [1.0, 1.0, 1.0], [0.0; 3], 1.0)?, &d)?;
        let moved = s.migrate(at, 5)?;
        assert_eq!(moved.index, at.index);
        assert_eq!(s.get(moved).map(|p| p.subdomain), Some(5));
        assert!(s.get(at).is_none());
        Ok(())
    }

    #[test]
    fn snapshot_is_sorted_by_id() -> Result<()> {
        let d = domain()?;
        let s = SubdomainStore::from_particles(
            [
                Particle::new(9, [9.0, 9.0, 9.0], [0.0; 3], 1.0)?,
                Particle::new(2, [1.0, 1.0, 1.0], [0.0; 3], 1.0)?,
                Particle::new(5, [6.0, 1.0, 1.0], [0.0; 3], 1.0)?,
            ],
            &d,
        )?;
        let snap = s.snapshot();
        let ids: Vec<u64> = snap.particles().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        Ok(())
    }
}
