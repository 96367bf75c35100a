//! Periodic simulation box and its decomposition into rectangular subdomains.

use crate::core::boundary::{min_image_separation, wrap_position};
use crate::core::particle::DIM;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use tracing::info;

/// Linear subdomain index (`ix + iy * nx + iz * nx * ny`).
pub type SubdomainId = usize;

/// Upper bound on the number of subdomains a decomposition may produce.
pub const MAX_SUBDOMAINS: usize = 1 << 24;

/// Slab counts and edge lengths per axis for splitting `extent` into pieces
/// no larger than `max_subdomain_size`.
///
/// Errors:
/// - `Error::Config` if an extent or the granularity is non-positive or
///   non-finite, if the granularity exceeds an extent, or if the
///   decomposition would exceed [`MAX_SUBDOMAINS`] pieces.
pub fn decomposition(
    extent: &[f64; DIM],
    max_subdomain_size: f64,
) -> Result<([usize; DIM], [f64; DIM])> {
    if !extent.iter().all(|&l| l.is_finite() && l > 0.0) {
        return Err(Error::Config(
            "domain extent components must be finite and > 0".into(),
        ));
    }
    if !max_subdomain_size.is_finite() || max_subdomain_size <= 0.0 {
        return Err(Error::Config(
            "max_subdomain_size must be finite and > 0".into(),
        ));
    }
    if let Some(k) = (0..DIM).find(|&k| max_subdomain_size > extent[k]) {
        return Err(Error::Config(format!(
            "max_subdomain_size {} exceeds domain extent {} along axis {}; \
             set it equal to the extent for a single-slab decomposition",
            max_subdomain_size, extent[k], k
        )));
    }
    let mut counts = [1usize; DIM];
    let mut edge = [0.0f64; DIM];
    for k in 0..DIM {
        // Shave a relative epsilon so exact multiples do not gain a sliver slab.
        let slabs = (extent[k] / max_subdomain_size * (1.0 - 1e-12)).ceil();
        if slabs > MAX_SUBDOMAINS as f64 {
            return Err(too_many_subdomains(extent, max_subdomain_size));
        }
        counts[k] = (slabs as usize).max(1);
        edge[k] = extent[k] / counts[k] as f64;
    }
    let total = counts
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .filter(|&n| n <= MAX_SUBDOMAINS);
    if total.is_none() {
        return Err(too_many_subdomains(extent, max_subdomain_size));
    }
    Ok((counts, edge))
}

fn too_many_subdomains(extent: &[f64; DIM], max_subdomain_size: f64) -> Error {
    Error::Config(format!(
        "max_subdomain_size {max_subdomain_size} splits extent {extent:?} into more than \
         {MAX_SUBDOMAINS} subdomains"
    ))
}

/// A box-shaped piece of the periodic domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Subdomain {
    /// Linear index.
    pub id: SubdomainId,
    /// Integer grid coordinates of this subdomain.
    pub coords: [usize; DIM],
    /// Lower corner (inclusive).
    pub lo: [f64; DIM],
    /// Upper corner (exclusive).
    pub hi: [f64; DIM],
    /// Worker that owns this subdomain.
    pub owner: usize,
}

impl Subdomain {
    /// Whether `r` lies in `[lo, hi)` along every axis.
    ///
    /// Ownership is decided by [`SpatialDomain::subdomain_of`], which bins by
    /// `floor(r / edge)`; within one ULP of a slab face the two may disagree.
    pub fn contains(&self, r: &[f64; DIM]) -> bool {
        (0..DIM).all(|k| r[k] >= self.lo[k] && r[k] < self.hi[k])
    }
}

/// Fully periodic 3D box split into `counts[0] * counts[1] * counts[2]` equal subdomains.
#[derive(Debug, Clone)]
pub struct SpatialDomain {
    extent: [f64; DIM],
    counts: [usize; DIM],
    edge: [f64; DIM],
    subdomains: Vec<Subdomain>,
    num_workers: usize,
}

impl SpatialDomain {
    /// Decompose a box of edge lengths `extent` into subdomains no larger than
    /// `max_subdomain_size` along any axis, assigned round-robin to `num_workers`.
    ///
    /// A granularity equal to an extent yields a single slab along that axis.
    ///
    /// Errors:
    /// - `Error::Config` if an extent or the granularity is non-positive or
    ///   non-finite, if the granularity exceeds an extent, or if `num_workers == 0`.
    pub fn new(extent: [f64; DIM], max_subdomain_size: f64, num_workers: usize) -> Result<Self> {
        let (counts, edge) = decomposition(&extent, max_subdomain_size)?;
        if num_workers == 0 {
            return Err(Error::Config("num_workers must be >= 1".into()));
        }

        let total = counts[0] * counts[1] * counts[2];
        let mut subdomains = Vec::with_capacity(total);
        for iz in 0..counts[2] {
            for iy in 0..counts[1] {
                for ix in 0..counts[0] {
                    let coords = [ix, iy, iz];
                    let id = ix + iy * counts[0] + iz * counts[0] * counts[1];
                    let mut lo = [0.0; DIM];
                    let mut hi = [0.0; DIM];
                    for k in 0..DIM {
                        lo[k] = coords[k] as f64 * edge[k];
                        // Last slab ends exactly on the box face.
                        hi[k] = if coords[k] + 1 == counts[k] {
                            extent[k]
                        } else {
                            (coords[k] + 1) as f64 * edge[k]
                        };
                    }
                    subdomains.push(Subdomain {
                        id,
                        coords,
                        lo,
                        hi,
                        owner: id % num_workers,
                    });
                }
            }
        }

        info!(
            nx = counts[0],
            ny = counts[1],
            nz = counts[2],
            num_workers,
            "decomposed periodic domain {:?} into {} subdomains",
            extent,
            total
        );

        Ok(Self {
            extent,
            counts,
            edge,
            subdomains,
            num_workers,
        })
    }

    /// Box edge lengths.
    pub fn extent(&self) -> &[f64; DIM] {
        &self.extent
    }

    /// Subdomain counts per axis.
    pub fn counts(&self) -> [usize; DIM] {
        self.counts
    }

    /// Subdomain edge lengths per axis.
    pub fn edge(&self) -> [f64; DIM] {
        self.edge
    }

    /// Smallest subdomain edge over all axes.
    pub fn min_edge(&self) -> f64 {
        self.edge.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn num_subdomains(&self) -> usize {
        self.subdomains.len()
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn subdomains(&self) -> &[Subdomain] {
        &self.subdomains
    }

    pub fn subdomain(&self, id: SubdomainId) -> Option<&Subdomain> {
        self.subdomains.get(id)
    }

    /// Worker owning subdomain `id`.
    pub fn owner_of(&self, id: SubdomainId) -> Option<usize> {
        self.subdomains.get(id).map(|s| s.owner)
    }

    /// The domain is periodic along every axis.
    pub fn is_periodic(&self) -> bool {
        true
    }

    /// Subdomain containing `r` (wrapped into the box first).
    pub fn subdomain_of(&self, r: &[f64; DIM]) -> SubdomainId {
        let w = self.wrap(*r);
        let mut c = [0usize; DIM];
        for k in 0..DIM {
            c[k] = ((w[k] / self.edge[k]).floor() as usize).min(self.counts[k] - 1);
        }
        self.linear_id(c)
    }

    /// Periodic wrap of a position into `[0, L)` per axis.
    pub fn wrap(&self, r: [f64; DIM]) -> [f64; DIM] {
        wrap_position(r, &self.extent)
    }

    /// Nearest periodic image of a separation vector.
    #[inline]
    pub fn min_image(&self, d: [f64; DIM]) -> [f64; DIM] {
        min_image_separation(d, &self.extent)
    }

    /// Squared minimum-image distance from `r` to the box of subdomain `id`.
    pub fn distance_sq_to_subdomain(&self, id: SubdomainId, r: &[f64; DIM]) -> Option<f64> {
        let s = self.subdomains.get(id)?;
        let mut half = [0.0; DIM];
        let mut offset = [0.0; DIM];
        for k in 0..DIM {
            half[k] = 0.5 * (s.hi[k] - s.lo[k]);
            offset[k] = r[k] - (s.lo[k] + half[k]);
        }
        let offset = self.min_image(offset);
        let mut d2 = 0.0;
        for k in 0..DIM {
            let gap = (offset[k].abs() - half[k]).max(0.0);
            d2 += gap * gap;
        }
        Some(d2)
    }

    /// Number of subdomain layers along each axis needed to cover `reach`.
    pub fn required_layers(&self, reach: f64) -> [usize; DIM] {
        let mut layers = [0usize; DIM];
        for k in 0..DIM {
            layers[k] = (reach / self.edge[k]).ceil().max(0.0) as usize;
        }
        layers
    }

    /// Subdomains within `layers` slabs of `id` along each axis (periodic), excluding `id`.
    pub fn halo_with_layers(&self, id: SubdomainId, layers: [usize; DIM]) -> Vec<SubdomainId> {
        let Some(s) = self.subdomains.get(id) else {
            return Vec::new();
        };
        let mut per_axis: [Vec<usize>; DIM] = Default::default();
        for k in 0..DIM {
            let n = self.counts[k];
            per_axis[k] = if 2 * layers[k] + 1 >= n {
                (0..n).collect()
            } else {
                let l = layers[k] as isize;
                (-l..=l)
                    .map(|off| (s.coords[k] as isize + off).rem_euclid(n as isize) as usize)
                    .collect()
            };
        }
        let mut out = BTreeSet::new();
        for &iz in &per_axis[2] {
            for &iy in &per_axis[1] {
                for &ix in &per_axis[0] {
                    let other = self.linear_id([ix, iy, iz]);
                    if other != id {
                        out.insert(other);
                    }
                }
            }
        }
        out.into_iter().collect()
    }

    /// Subdomains whose boxes may lie within `reach` of subdomain `id`.
    pub fn halo(&self, id: SubdomainId, reach: f64) -> Vec<SubdomainId> {
        self.halo_with_layers(id, self.required_layers(reach))
    }

    #[inline]
    fn linear_id(&self, c: [usize; DIM]) -> SubdomainId {
        c[0] + c[1] * self.counts[0] + c[2] * self.counts[0] * self.counts[1]
    }
}
