use serde::{Deserialize, Serialize};

/// Short-range pair potentials, truncated at the physical cutoff.
///
/// `force` is the radial force magnitude `-dU/dr` (positive = repulsive).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairPotential {
    /// `F(r) = rc/r^2 - 1/r`, repulsive inside the cutoff and zero at it.
    #[default]
    SoftCutoff,
    /// 12-6 Lennard-Jones, shifted so that `U(rc) = 0`.
    LennardJones { epsilon: f64, sigma: f64 },
}

impl PairPotential {
    pub fn force(&self, r: f64, cutoff: f64) -> f64 {
        match *self {
            PairPotential::SoftCutoff => (cutoff / r - 1.0) / r,
            PairPotential::LennardJones { epsilon, sigma } => {
                let s6 = (sigma / r).powi(6);
                24.0 * epsilon * (2.0 * s6 * s6 - s6) / r
            }
        }
    }

    pub fn energy(&self, r: f64, cutoff: f64) -> f64 {
        match *self {
            PairPotential::SoftCutoff => cutoff / r + (r / cutoff).ln() - 1.0,
            PairPotential::LennardJones { epsilon, sigma } => {
                lj_energy(epsilon, sigma, r) - lj_energy(epsilon, sigma, cutoff)
            }
        }
    }
}

#[inline]
fn lj_energy(epsilon: f64, sigma: f64, r: f64) -> f64 {
    let s6 = (sigma / r).powi(6);
    4.0 * epsilon * (s6 * s6 - s6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_force(p: &PairPotential, r: f64, rc: f64) -> f64 {
        let h = 1e-6;
        -(p.energy(r + h, rc) - p.energy(r - h, rc)) / (2.0 * h)
    }

    #[test]
    fn soft_cutoff_vanishes_at_cutoff() {
        let p = PairPotential::SoftCutoff;
        assert!(p.force(1.0, 1.0).abs() < 1e-15);
        assert!(p.energy(1.0, 1.0).abs() < 1e-15);
        assert!(p.force(0.5, 1.0) > 0.0, "should repel inside the cutoff");
    }

    #[test]
    fn force_is_minus_energy_gradient() {
        let lj = PairPotential::LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
        };
        for p in [PairPotential::SoftCutoff, lj] {
            for &r in &[0.3, 0.9, 1.2, 2.0] {
                let rc = 2.5;
                let f = p.force(r, rc);
                let fd = numeric_force(&p, r, rc);
                assert!(
                    (f - fd).abs() <= 1e-5 * f.abs().max(1.0),
                    "{p:?} at r={r}: analytic {f}, numeric {fd}"
                );
            }
        }
    }

    #[test]
    fn lj_minimum_at_two_to_the_sixth() {
        let lj = PairPotential::LennardJones {
            epsilon: 1.0,
            sigma: 1.0,
        };
        let rmin = 2f64.powf(1.0 / 6.0);
        assert!(lj.force(rmin, 3.0).abs() < 1e-12);
    }
}
