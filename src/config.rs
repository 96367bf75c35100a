//! Run configuration.
//!
//! [`SimConfig`] is the raw, serde-deserialised parameter set (every field has
//! a default, so a TOML file only needs to name what it changes).
//! [`SimConfig::validate`] checks it and produces an immutable [`Config`].
//!
//! ```toml
//! extent = [10.0, 10.0, 10.0]
//! max_subdomain_size = 5.0
//! num_particles = 500
//! cutoff = 0.5
//! min_r = 0.01
//! cfl = 0.5
//! max_steps = 200
//! vtk_int = 20
//!
//! [potential]
//! kind = "lennard_jones"
//! epsilon = 1.0
//! sigma = 0.4
//! ```

use crate::core::domain::decomposition;
use crate::core::filter::DEFAULT_LIST_RADIUS_FACTOR;
use crate::core::particle::DIM;
use crate::core::potential::PairPotential;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Box edge lengths.
    pub extent: [f64; DIM],
    /// Largest subdomain edge; the box is split into equal slabs no larger than this.
    pub max_subdomain_size: f64,
    /// Total particle count. Mutually exclusive with `density`.
    pub num_particles: Option<usize>,
    /// Particles per unit volume. Mutually exclusive with `num_particles`.
    pub density: Option<f64>,
    /// Physical interaction cutoff.
    pub cutoff: f64,
    /// Separation floor for force evaluation.
    pub min_r: f64,
    /// Fraction of the cutoff a particle may move in one step.
    pub cfl: f64,
    pub max_steps: u64,
    /// Plotfile cadence in steps (0 disables).
    pub plot_int: u64,
    /// VTK cadence in steps (0 disables).
    pub vtk_int: u64,
    /// List radius over cutoff.
    pub list_radius_factor: f64,
    /// Subdomain layers reached by the ghost exchange; derived when absent.
    pub ghost_layers: Option<usize>,
    pub dt_max: f64,
    pub mass: f64,
    /// Initial velocity components are drawn from `[-initial_speed, initial_speed]`.
    pub initial_speed: f64,
    pub seed: Option<u64>,
    /// Worker threads; 0 uses rayon's default.
    pub num_workers: usize,
    pub potential: PairPotential,
    pub output_dir: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            extent: [10.0, 10.0, 10.0],
            max_subdomain_size: 5.0,
            num_particles: None,
            density: None,
            cutoff: 0.5,
            min_r: 0.01,
            cfl: 0.5,
            max_steps: 100,
            plot_int: 0,
            vtk_int: 0,
            list_radius_factor: DEFAULT_LIST_RADIUS_FACTOR,
            ghost_layers: None,
            dt_max: 0.1,
            mass: 1.0,
            initial_speed: 1.0,
            seed: None,
            num_workers: 0,
            potential: PairPotential::SoftCutoff,
            output_dir: PathBuf::from("."),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every parameter and freeze the result.
    ///
    /// Errors:
    /// - `Error::Config` naming the first offending parameter.
    pub fn validate(self) -> Result<Config> {
        let (_, edge) = decomposition(&self.extent, self.max_subdomain_size)?;
        let min_edge = edge.iter().cloned().fold(f64::INFINITY, f64::min);

        if !self.cutoff.is_finite() || self.cutoff <= 0.0 {
            return Err(Error::Config("cutoff must be finite and > 0".into()));
        }
        if self.cutoff >= 0.5 * min_edge {
            return Err(Error::Config(format!(
                "cutoff {} must be smaller than half the smallest subdomain edge ({})",
                self.cutoff,
                0.5 * min_edge
            )));
        }
        if !self.min_r.is_finite() || self.min_r <= 0.0 || self.min_r >= self.cutoff {
            return Err(Error::Config("min_r must satisfy 0 < min_r < cutoff".into()));
        }
        if !self.cfl.is_finite() || self.cfl <= 0.0 || self.cfl > 1.0 {
            return Err(Error::Config("cfl must lie in (0, 1]".into()));
        }
        if !self.list_radius_factor.is_finite() || self.list_radius_factor <= 1.0 {
            return Err(Error::Config("list_radius_factor must be > 1".into()));
        }
        if !self.dt_max.is_finite() || self.dt_max <= 0.0 {
            return Err(Error::Config("dt_max must be finite and > 0".into()));
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(Error::Config("mass must be finite and > 0".into()));
        }
        if !self.initial_speed.is_finite() || self.initial_speed < 0.0 {
            return Err(Error::Config("initial_speed must be finite and >= 0".into()));
        }
        if let PairPotential::LennardJones { epsilon, sigma } = self.potential {
            if !(epsilon.is_finite() && epsilon > 0.0 && sigma.is_finite() && sigma > 0.0) {
                return Err(Error::Config(
                    "lennard_jones epsilon and sigma must be finite and > 0".into(),
                ));
            }
        }

        let volume: f64 = self.extent.iter().product();
        let num_particles = match (self.num_particles, self.density) {
            (Some(n), None) => n,
            (None, Some(rho)) => {
                if !rho.is_finite() || rho < 0.0 {
                    return Err(Error::Config("density must be finite and >= 0".into()));
                }
                (rho * volume).round() as usize
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "give either num_particles or density, not both".into(),
                ))
            }
            (None, None) => {
                return Err(Error::Config(
                    "one of num_particles or density is required".into(),
                ))
            }
        };

        let num_workers = if self.num_workers == 0 {
            rayon::current_num_threads().max(1)
        } else {
            self.num_workers
        };

        Ok(Config {
            inner: self,
            num_particles,
            num_workers,
        })
    }
}

/// Validated, read-only configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    inner: SimConfig,
    num_particles: usize,
    num_workers: usize,
}

impl Config {
    /// Particle count after resolving `density`.
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    /// Worker count after resolving the default.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn list_radius(&self) -> f64 {
        self.inner.list_radius_factor * self.inner.cutoff
    }

    /// Copy with a different step budget and/or output directory.
    pub fn with_overrides(&self, max_steps: Option<u64>, output_dir: Option<PathBuf>) -> Self {
        let mut out = self.clone();
        if let Some(n) = max_steps {
            out.inner.max_steps = n;
        }
        if let Some(dir) = output_dir {
            out.inner.output_dir = dir;
        }
        out
    }
}

impl Deref for Config {
    type Target = SimConfig;

    fn deref(&self) -> &SimConfig {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SimConfig {
        SimConfig {
            num_particles: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate() -> Result<()> {
        let cfg = base().validate()?;
        assert_eq!(cfg.num_particles(), 10);
        assert!(cfg.num_workers() >= 1);
        assert!((cfg.list_radius() - 2.5).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn parses_toml_with_potential() -> Result<()> {
        let cfg = SimConfig::from_toml_str(
            r#"
            extent = [8.0, 8.0, 8.0]
            max_subdomain_size = 4.0
            density = 0.5
            cutoff = 0.4
            seed = 7

            [potential]
            kind = "lennard_jones"
            epsilon = 1.0
            sigma = 0.3
            "#,
        )?
        .validate()?;
        assert_eq!(cfg.num_particles(), 256);
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(
            cfg.potential,
            PairPotential::LennardJones {
                epsilon: 1.0,
                sigma: 0.3
            }
        );
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SimConfig::from_toml_str("cutof = 1.0").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn cutoff_must_fit_in_subdomain() {
        let cfg = SimConfig {
            cutoff: 2.5,
            ..base()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_inconsistent_values() {
        let cases = [
            SimConfig {
                extent: [10.0, -1.0, 10.0],
                ..base()
            },
            SimConfig {
                max_subdomain_size: 20.0,
                ..base()
            },
            SimConfig {
                extent: [1.0e7; 3],
                max_subdomain_size: 1.0,
                cutoff: 0.4,
                min_r: 0.1,
                ..base()
            },
            SimConfig {
                min_r: 0.6,
                ..base()
            },
            SimConfig {
                cfl: 1.5,
                ..base()
            },
            SimConfig {
                list_radius_factor: 1.0,
                ..base()
            },
            SimConfig {
                num_particles: None,
                density: Some(-1.0),
                ..base()
            },
            SimConfig {
                density: Some(1.0),
                ..base()
            },
            SimConfig {
                num_particles: None,
                ..base()
            },
        ];
        for cfg in cases {
            let shown = format!("{cfg:?}");
            assert!(
                matches!(cfg.validate(), Err(Error::Config(_))),
                "expected config error for {shown}"
            );
        }
    }

    #[test]
    fn overrides_apply() -> Result<()> {
        let cfg = base().validate()?;
        let o = cfg.with_overrides(Some(3), Some(PathBuf::from("out")));
        assert_eq!(o.max_steps, 3);
        assert_eq!(o.output_dir, PathBuf::from("out"));
        Ok(())
    }
}
