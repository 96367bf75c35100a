//! Periodic wrap of particle positions back into `[0, L)` along each axis.

use crate::core::domain::SpatialDomain;
use crate::core::particle::DIM;
use crate::core::store::SubdomainStore;
use rayon::prelude::*;

/// Wrap a single coordinate into `[0, extent)`.
///
/// `rem_euclid` can round up to exactly `extent` for tiny negative inputs;
/// that case maps to 0 so the result is always strictly inside the box.
#[inline]
pub fn wrap_coordinate(x: f64, extent: f64) -> f64 {
    let w = x.rem_euclid(extent);
    if w >= extent {
        0.0
    } else {
        w
    }
}

/// Wrap a position into the periodic box.
#[inline]
pub fn wrap_position(r: [f64; DIM], extent: &[f64; DIM]) -> [f64; DIM] {
    let mut out = r;
    for (x, &l) in out.iter_mut().zip(extent.iter()) {
        *x = wrap_coordinate(*x, l);
    }
    out
}

/// Nearest periodic image of the separation `d` in a box of edge lengths `extent`.
#[inline]
pub fn min_image_separation(mut d: [f64; DIM], extent: &[f64; DIM]) -> [f64; DIM] {
    for (dk, &l) in d.iter_mut().zip(extent.iter()) {
        *dk -= l * (*dk / l).round();
    }
    d
}

/// Applies periodic wrap-around to every owned particle after the position update.
///
/// Only positions are touched: velocities, accelerations and the rebuild
/// drift carry over unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryWrap;

impl BoundaryWrap {
    /// Wrap all owned positions, one worker per subdomain. Returns how many particles moved.
    pub fn apply(&self, store: &mut SubdomainStore, domain: &SpatialDomain) -> usize {
        let extent = *domain.extent();
        store
            .buckets_mut()
            .par_iter_mut()
            .map(|bucket| {
                let mut wrapped = 0usize;
                for p in bucket.iter_mut() {
                    let r = wrap_position(p.r, &extent);
                    if r != p.r {
                        p.r = r;
                        wrapped += 1;
                    }
                }
                wrapped
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_positions_are_untouched() {
        let ext = [10.0, 10.0, 10.0];
        let r = [0.0, 3.25, 9.999_999];
        assert_eq!(wrap_position(r, &ext), r);
    }

    #[test]
    fn shifts_by_whole_extents() {
        let ext = [10.0, 4.0, 2.0];
        let r = wrap_position([23.5, -1.0, -4.5], &ext);
        assert!((r[0] - 3.5).abs() < 1e-12);
        assert!((r[1] - 3.0).abs() < 1e-12);
        assert!((r[2] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn tiny_negative_does_not_land_on_upper_edge() {
        let w = wrap_coordinate(-1e-18, 10.0);
        assert!((0.0..10.0).contains(&w), "got {w}");
    }

    #[test]
    fn wrap_is_idempotent() {
        let ext = [10.0, 7.0, 3.0];
        let samples = [
            [-1e-17, 7.0, 3.0],
            [123.456, -77.7, 0.5],
            [10.0, 14.0, -3.0],
            [-0.0, 6.999_999_999, 2.999_999_999_999],
        ];
        for r in samples {
            let once = wrap_position(r, &ext);
            let twice = wrap_position(once, &ext);
            assert_eq!(once, twice, "wrap not idempotent for {r:?}");
            for k in 0..DIM {
                assert!(once[k] >= 0.0 && once[k] < ext[k]);
            }
        }
    }

    #[test]
    fn min_image_picks_the_nearest_copy() {
        let ext = [10.0, 4.0, 2.0];
        let d = min_image_separation([9.0, -3.5, 0.4], &ext);
        assert!((d[0] + 1.0).abs() < 1e-12);
        assert!((d[1] - 0.5).abs() < 1e-12);
        assert!((d[2] - 0.4).abs() < 1e-12);
        for k in 0..DIM {
            assert!(d[k].abs() <= 0.5 * ext[k]);
        }
    }
}
