use crate::core::domain::SubdomainId;
use crate::error::{Error, Result};

/// Fixed spatial dimension (3D).
pub const DIM: usize = 3;

/// A point particle.
///
/// Fields:
/// - `id`: stable identifier, also the total order used to visit each local pair once
/// - `subdomain`: owning subdomain tag, rewritten on redistribution
/// - `r`, `v`, `a`: position, velocity and acceleration
/// - `mass`: particle mass (> 0)
/// - `drift`: displacement accumulated since the last neighbor-list build
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Stable particle identifier.
    pub id: u64,
    /// Owning subdomain.
    pub subdomain: SubdomainId,
    /// Position (x, y, z).
    pub r: [f64; DIM],
    /// Velocity (vx, vy, vz).
    pub v: [f64; DIM],
    /// Acceleration (ax, ay, az).
    pub a: [f64; DIM],
    /// Mass (> 0).
    pub mass: f64,
    /// Displacement since the last list build.
    pub drift: [f64; DIM],
}

impl Particle {
    /// Create a new particle at rest acceleration-wise, validating invariants.
    ///
    /// The subdomain tag starts at 0; stores retag on insertion.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `mass` is non-positive or any component is NaN/inf.
    pub fn new(id: u64, r: [f64; DIM], v: [f64; DIM], mass: f64) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id,
            subdomain: 0,
            r,
            v,
            a: [0.0; DIM],
            mass,
            drift: [0.0; DIM],
        })
    }

    /// Returns the particle's kinetic energy: 1/2 m |v|^2.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * dot(&self.v, &self.v)
    }

    /// Magnitude of the displacement since the last list build.
    #[inline]
    pub fn drift_norm(&self) -> f64 {
        norm(&self.drift)
    }
}

#[inline]
pub(crate) fn dot(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub(crate) fn norm(a: &[f64; DIM]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_particle_ok() -> Result<()> {
        let p = Particle::new(1, [0.0, 1.0, 2.0], [2.0, -3.0, 0.5], 2.0)?;
        assert_eq!(p.id, 1);
        assert_eq!(p.r, [0.0, 1.0, 2.0]);
        assert_eq!(p.v, [2.0, -3.0, 0.5]);
        assert_eq!(p.a, [0.0; DIM]);
        assert_eq!(p.drift, [0.0; DIM]);
        assert_eq!(p.mass, 2.0);
        Ok(())
    }

    #[test]
    fn invalid_mass_rejected() {
        let err = Particle::new(0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0).unwrap_err();
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn non_finite_position_rejected() {
        let err = Particle::new(0, [f64::NAN, 0.0, 0.0], [0.0; DIM], 1.0).unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn kinetic_energy_computed() -> Result<()> {
        // v = (3,4,0), |v|^2 = 25; KE = 0.5 * m * 25
        let p = Particle::new(7, [0.0, 0.0, 0.0], [3.0, 4.0, 0.0], 2.0)?;
        assert!((p.kinetic_energy() - 25.0).abs() < 1e-12);
        Ok(())
    }
}
