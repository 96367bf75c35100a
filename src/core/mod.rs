//! Core engine: domain decomposition, particle storage, neighbor lists,
//! force evaluation and time integration.

pub mod boundary;
pub mod cells;
pub mod domain;
pub mod filter;
pub mod force;
pub mod integrator;
pub mod neighbor;
pub mod particle;
pub mod potential;
pub mod sim;
pub mod store;

pub use boundary::BoundaryWrap;
pub use domain::{SpatialDomain, Subdomain, SubdomainId};
pub use filter::PairFilter;
pub use force::{ForceEvaluator, ForceReport, NumericWarning};
pub use integrator::{Integrator, SimulationClock};
pub use neighbor::{NeighborList, NeighborListBuilder};
pub use particle::Particle;
pub use potential::PairPotential;
pub use sim::{RunSummary, Simulation, StepReport};
pub use store::{DenseStore, ParticleContainer, ParticleRef, SubdomainStore};
