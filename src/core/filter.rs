use crate::core::boundary::min_image_separation;
use crate::core::particle::{dot, DIM};
use crate::error::{Error, Result};

/// Default ratio between the list-building radius and the physical cutoff.
pub const DEFAULT_LIST_RADIUS_FACTOR: f64 = 5.0;

/// Build-time candidate screen: are two positions within the list radius?
///
/// Distances use the nearest periodic image. This only decides what goes
/// into a neighbor list; whether a force applies is decided again against the
/// physical cutoff at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairFilter {
    extent: [f64; DIM],
    list_radius: f64,
    threshold_sq: f64,
}

impl PairFilter {
    /// Errors:
    /// - `Error::InvalidParam` if `cutoff <= 0` or `list_radius_factor <= 1`.
    pub fn new(cutoff: f64, list_radius_factor: f64, extent: [f64; DIM]) -> Result<Self> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::InvalidParam("cutoff must be finite and > 0".into()));
        }
        if !list_radius_factor.is_finite() || list_radius_factor <= 1.0 {
            return Err(Error::InvalidParam(
                "list_radius_factor must be finite and > 1".into(),
            ));
        }
        let list_radius = list_radius_factor * cutoff;
        Ok(Self {
            extent,
            list_radius,
            threshold_sq: list_radius * list_radius,
        })
    }

    pub fn list_radius(&self) -> f64 {
        self.list_radius
    }

    /// `(factor * cutoff)^2`.
    pub fn threshold_sq(&self) -> f64 {
        self.threshold_sq
    }

    /// Squared minimum-image distance between two positions.
    #[inline]
    pub fn distance_sq(&self, p1: &[f64; DIM], p2: &[f64; DIM]) -> f64 {
        let d = min_image_separation(
            [p1[0] - p2[0], p1[1] - p2[1], p1[2] - p2[2]],
            &self.extent,
        );
        dot(&d, &d)
    }

    #[inline]
    pub fn is_candidate(&self, p1: &[f64; DIM], p2: &[f64; DIM]) -> bool {
        self.distance_sq(p1, p2) <= self.threshold_sq
    }
}
