//! Short-range pairwise molecular dynamics on a fully periodic 3D box.
//!
//! The box is decomposed into equal subdomains, each processed by one rayon
//! worker. Pairs are found through a skin-padded neighbor list that is reused
//! until some particle has drifted half the skin; forces are evaluated with a
//! separation floor `min_r`, and positions advance with a kick-drift step whose
//! size is bounded by a CFL condition on the cutoff.
//!
//! ```no_run
//! use nlistmd::config::SimConfig;
//! use nlistmd::core::Simulation;
//!
//! # fn main() -> nlistmd::error::Result<()> {
//! let config = SimConfig::from_path("md.toml")?.validate()?;
//! let mut sim = Simulation::new(config)?;
//! let report = sim.step()?;
//! println!("E = {}", report.total_energy());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod io;

#[cfg(feature = "python")]
mod python;
