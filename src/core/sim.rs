use crate::config::Config;
use crate::core::boundary::{wrap_position, BoundaryWrap};
use crate::core::domain::SpatialDomain;
use crate::core::force::{ForceEvaluator, ForceReport};
use crate::core::integrator::{Integrator, SimulationClock};
use crate::core::neighbor::{NeighborList, NeighborListBuilder};
use crate::core::particle::{Particle, DIM};
use crate::core::store::{ParticleContainer, SubdomainStore};
use crate::error::{Error, Result};
use crate::io::{plotfile, vtk, Snapshot};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Attempts per particle before initial placement gives up.
const MAX_PLACEMENT_ATTEMPTS: usize = 1_000_000;

/// What happened during one call to [`Simulation::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Step number after the advance.
    pub step: u64,
    /// Simulated time after the advance.
    pub time: f64,
    pub dt: f64,
    /// Whether the neighbor list was rebuilt before the force pass.
    pub rebuilt: bool,
    pub forces: ForceReport,
    /// Smallest listed pair separation at force evaluation.
    pub min_distance: Option<f64>,
    /// Kinetic energy after the kick.
    pub kinetic_energy: f64,
    /// Particles that crossed the periodic boundary this step.
    pub wrapped: usize,
}

impl StepReport {
    pub fn potential_energy(&self) -> f64 {
        self.forces.potential_energy
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.forces.potential_energy
    }
}

/// Totals over a call to [`Simulation::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub rebuilds: u64,
    /// Sum of clamped pairs over all steps.
    pub clamped_pairs: usize,
    pub last: Option<StepReport>,
}

/// Short-range MD driver on a periodic, decomposed box.
///
/// Each step runs, in order: rebuild check (migration, ghost exchange, list
/// build), force evaluation, adaptive step size from the fresh accelerations,
/// kick-drift, periodic wrap. All per-subdomain phases run on the
/// simulation's own worker pool.
#[derive(Debug)]
pub struct Simulation {
    config: Config,
    domain: SpatialDomain,
    store: SubdomainStore,
    builder: NeighborListBuilder,
    evaluator: ForceEvaluator,
    integrator: Integrator,
    wrap: BoundaryWrap,
    pool: rayon::ThreadPool,
    last_forces: ForceReport,
    clamped_total: usize,
}

impl Simulation {
    /// Create a simulation with `config.num_particles()` randomly placed particles.
    ///
    /// Positions are sampled uniformly in the box by rejection, keeping every
    /// pair at least `min_r` apart. Velocity components are uniform in
    /// `[-initial_speed, initial_speed]`, then shifted so the total momentum is zero.
    pub fn new(config: Config) -> Result<Self> {
        let domain = SpatialDomain::new(
            config.extent,
            config.max_subdomain_size,
            config.num_workers(),
        )?;
        let mut rng: StdRng = match config.seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        let particles = sample_particles(&config, &domain, &mut rng)?;
        Self::with_domain(config, domain, particles)
    }

    /// Create a simulation from explicit particles. Positions are wrapped into the box.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if two particles share an id.
    pub fn from_particles(config: Config, particles: Vec<Particle>) -> Result<Self> {
        let domain = SpatialDomain::new(
            config.extent,
            config.max_subdomain_size,
            config.num_workers(),
        )?;
        Self::with_domain(config, domain, particles)
    }

    fn with_domain(
        config: Config,
        domain: SpatialDomain,
        mut particles: Vec<Particle>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(particles.len());
        for p in particles.iter_mut() {
            if !seen.insert(p.id) {
                return Err(Error::InvalidParam(format!("duplicate particle id {}", p.id)));
            }
            p.r = domain.wrap(p.r);
        }
        let store = SubdomainStore::from_particles(particles, &domain)?;
        let builder = NeighborListBuilder::new(
            config.cutoff,
            config.list_radius_factor,
            config.ghost_layers,
            &domain,
        )?;
        let evaluator = ForceEvaluator::new(config.cutoff, config.min_r, config.potential, &domain)?;
        let integrator = Integrator::new(config.cutoff, config.dt_max)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers())
            .build()
            .map_err(|e| {
                Error::Config(format!("cannot start {} workers: {e}", config.num_workers()))
            })?;

        info!(
            particles = store.len(),
            subdomains = domain.num_subdomains(),
            workers = config.num_workers(),
            cutoff = config.cutoff,
            list_radius = config.list_radius(),
            "simulation initialised"
        );

        Ok(Self {
            config,
            domain,
            store,
            builder,
            evaluator,
            integrator,
            wrap: BoundaryWrap,
            pool,
            last_forces: ForceReport::default(),
            clamped_total: 0,
        })
    }

    /// Advance one step.
    pub fn step(&mut self) -> Result<StepReport> {
        let Self {
            config,
            domain,
            store,
            builder,
            evaluator,
            integrator,
            wrap,
            pool,
            ..
        } = self;

        let report = pool.install(|| -> Result<StepReport> {
            let step = integrator.clock().step;
            let rebuilt = builder.rebuild_due(store);
            if rebuilt {
                builder.build(store, domain, step)?;
            }
            let list = builder
                .list()
                .ok_or_else(|| Error::Topology("no neighbor list after build".into()))?;

            let forces = evaluator.evaluate(list, store)?;
            let min_distance = integrator.min_distance(list, store, domain);
            let dt = integrator.compute_step_size(store, config.cfl);
            integrator.step(store, dt)?;
            let wrapped = wrap.apply(store, domain);

            let clock = *integrator.clock();
            Ok(StepReport {
                step: clock.step,
                time: clock.time,
                dt: clock.dt,
                rebuilt,
                forces,
                min_distance,
                kinetic_energy: Integrator::kinetic_energy(store),
                wrapped,
            })
        })?;

        self.last_forces = report.forces;
        if let Some(w) = report.forces.warning {
            self.clamped_total += w.clamped_pairs;
        }
        debug!(
            step = report.step,
            dt = report.dt,
            rebuilt = report.rebuilt,
            kinetic = report.kinetic_energy,
            potential = report.potential_energy(),
            "step complete"
        );
        Ok(report)
    }

    /// Advance `max_steps` steps, writing plotfiles and VTK files at the
    /// configured cadence (step 0, every multiple, and the final step).
    pub fn run(&mut self, max_steps: u64) -> Result<RunSummary> {
        let rebuilds_before = self.builder.rebuilds();
        let mut summary = RunSummary::default();
        if self.clock().step == 0 {
            self.write_scheduled(false)?;
        }
        for i in 0..max_steps {
            let report = self.step()?;
            if let Some(w) = report.forces.warning {
                summary.clamped_pairs += w.clamped_pairs;
            }
            summary.steps += 1;
            summary.last = Some(report);
            self.write_scheduled(i + 1 == max_steps)?;
        }
        summary.rebuilds = self.builder.rebuilds() - rebuilds_before;
        info!(
            steps = summary.steps,
            rebuilds = summary.rebuilds,
            clamped_pairs = summary.clamped_pairs,
            time = self.time(),
            "run finished"
        );
        Ok(summary)
    }

    fn write_scheduled(&self, last: bool) -> Result<()> {
        let step = self.clock().step;
        let due = |interval: u64| interval > 0 && (last || step % interval == 0);
        let plot = due(self.config.plot_int);
        let points = due(self.config.vtk_int);
        if !(plot || points) {
            return Ok(());
        }
        let snap = self.snapshot();
        if plot {
            plotfile::write_plotfile(&self.config.output_dir, &snap)?;
        }
        if points {
            vtk::write_vtk_file(&self.config.output_dir, &snap)?;
        }
        Ok(())
    }

    /// Consistent copy of every particle (sorted by id) for the writers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            particles: self.store.snapshot(),
            step: self.clock().step,
            time: self.clock().time,
            domain: self.domain.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn domain(&self) -> &SpatialDomain {
        &self.domain
    }

    pub fn store(&self) -> &SubdomainStore {
        &self.store
    }

    pub fn clock(&self) -> &SimulationClock {
        self.integrator.clock()
    }

    pub fn time(&self) -> f64 {
        self.clock().time
    }

    pub fn num_particles(&self) -> usize {
        self.store.len()
    }

    /// Current list, if one has been built and not invalidated.
    pub fn neighbor_list(&self) -> Option<&NeighborList> {
        self.builder.list()
    }

    pub fn rebuilds(&self) -> u64 {
        self.builder.rebuilds()
    }

    /// Clamped pairs summed over every step so far.
    pub fn clamped_pairs(&self) -> usize {
        self.clamped_total
    }

    pub fn kinetic_energy(&self) -> f64 {
        Integrator::kinetic_energy(&self.store)
    }

    /// Potential energy from the most recent force pass.
    pub fn potential_energy(&self) -> f64 {
        self.last_forces.potential_energy
    }

    /// Particle ids in ascending order; the row order of the getters below.
    pub fn ids(&self) -> Vec<u64> {
        self.sorted_particles().into_iter().map(|p| p.id).collect()
    }

    pub fn positions(&self) -> Vec<[f64; DIM]> {
        self.sorted_particles().into_iter().map(|p| p.r).collect()
    }

    pub fn velocities(&self) -> Vec<[f64; DIM]> {
        self.sorted_particles().into_iter().map(|p| p.v).collect()
    }

    pub fn accelerations(&self) -> Vec<[f64; DIM]> {
        self.sorted_particles().into_iter().map(|p| p.a).collect()
    }

    fn sorted_particles(&self) -> Vec<&Particle> {
        let mut out: Vec<&Particle> = self.store.buckets().iter().flatten().collect();
        out.sort_by_key(|p| p.id);
        out
    }

    /// Overwrite positions, one row per particle in id order. Positions are
    /// wrapped into the box and the neighbor list is discarded.
    pub fn set_positions(&mut self, positions: &[[f64; DIM]]) -> Result<()> {
        let ranks = self.id_ranks(positions.len())?;
        if !positions.iter().flatten().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("positions must be finite".into()));
        }
        let extent = *self.domain.extent();
        self.store.for_each_owned_mut(|p| {
            if let Some(&rank) = ranks.get(&p.id) {
                p.r = wrap_position(positions[rank], &extent);
            }
        });
        self.builder.invalidate();
        Ok(())
    }

    /// Overwrite velocities, one row per particle in id order.
    pub fn set_velocities(&mut self, velocities: &[[f64; DIM]]) -> Result<()> {
        let ranks = self.id_ranks(velocities.len())?;
        if !velocities.iter().flatten().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocities must be finite".into()));
        }
        self.store.for_each_owned_mut(|p| {
            if let Some(&rank) = ranks.get(&p.id) {
                p.v = velocities[rank];
            }
        });
        Ok(())
    }

    fn id_ranks(&self, rows: usize) -> Result<HashMap<u64, usize>> {
        let n = self.num_particles();
        if rows != n {
            return Err(Error::InvalidParam(format!(
                "expected {n} rows, got {rows}"
            )));
        }
        Ok(self
            .ids()
            .into_iter()
            .enumerate()
            .map(|(rank, id)| (id, rank))
            .collect())
    }
}

fn sample_particles(
    config: &Config,
    domain: &SpatialDomain,
    rng: &mut StdRng,
) -> Result<Vec<Particle>> {
    let n = config.num_particles();
    let min_sq = config.min_r * config.min_r;
    let mut positions: Vec<[f64; DIM]> = Vec::with_capacity(n);
    for id in 0..n {
        let mut attempts = 0usize;
        let r = loop {
            if attempts >= MAX_PLACEMENT_ATTEMPTS {
                return Err(Error::Config(format!(
                    "failed to place particle {id} at least min_r apart; try fewer particles"
                )));
            }
            attempts += 1;
            let mut r = [0.0_f64; DIM];
            for (k, r_k) in r.iter_mut().enumerate() {
                *r_k = rng.random_range(0.0..config.extent[k]);
            }
            let clear = positions.iter().all(|q| {
                let mut d = [0.0; DIM];
                for k in 0..DIM {
                    d[k] = r[k] - q[k];
                }
                let d = domain.min_image(d);
                d.iter().map(|x| x * x).sum::<f64>() >= min_sq
            });
            if clear {
                break r;
            }
        };
        positions.push(r);
    }

    let s = config.initial_speed;
    let mut velocities: Vec<[f64; DIM]> = (0..n)
        .map(|_| {
            let mut v = [0.0_f64; DIM];
            v.iter_mut().for_each(|x| *x = rng.random_range(-s..=s));
            v
        })
        .collect();
    if n > 0 {
        let mut mean = [0.0_f64; DIM];
        for v in &velocities {
            for k in 0..DIM {
                mean[k] += v[k] / n as f64;
            }
        }
        for v in velocities.iter_mut() {
            for k in 0..DIM {
                v[k] -= mean[k];
            }
        }
    }

    positions
        .into_iter()
        .zip(velocities)
        .enumerate()
        .map(|(id, (r, v))| Particle::new(id as u64, r, v, config.mass))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn small_config() -> Result<Config> {
        SimConfig {
            extent: [6.0; 3],
            max_subdomain_size: 3.0,
            num_particles: Some(40),
            cutoff: 1.0,
            min_r: 0.1,
            seed: Some(42),
            num_workers: 2,
            ..Default::default()
        }
        .validate()
    }

    #[test]
    fn seeded_init_is_reproducible() -> Result<()> {
        let a = Simulation::new(small_config()?)?;
        let b = Simulation::new(small_config()?)?;
        assert_eq!(a.num_particles(), 40);
        assert_eq!(a.positions(), b.positions());
        assert_eq!(a.velocities(), b.velocities());
        Ok(())
    }

    #[test]
    fn initial_state_is_spread_and_at_rest_overall() -> Result<()> {
        let sim = Simulation::new(small_config()?)?;
        let mut p = [0.0; DIM];
        for v in sim.velocities() {
            for k in 0..DIM {
                p[k] += v[k];
            }
        }
        assert!(p.iter().all(|x| x.abs() < 1e-9), "net momentum {p:?}");
        let pos = sim.positions();
        for (i, a) in pos.iter().enumerate() {
            assert!(a.iter().all(|&x| (0.0..6.0).contains(&x)));
            for b in &pos[i + 1..] {
                let d = sim
                    .domain()
                    .min_image([a[0] - b[0], a[1] - b[1], a[2] - b[2]]);
                assert!(d.iter().map(|x| x * x).sum::<f64>().sqrt() >= 0.1);
            }
        }
        Ok(())
    }

    #[test]
    fn first_step_builds_the_list() -> Result<()> {
        let mut sim = Simulation::new(small_config()?)?;
        let r = sim.step()?;
        assert!(r.rebuilt);
        assert_eq!(r.step, 1);
        assert!(r.dt > 0.0 && r.dt <= sim.config().dt_max);
        assert!(sim.neighbor_list().is_some());
        assert_eq!(sim.num_particles(), 40);
        Ok(())
    }

    #[test]
    fn setters_invalidate_and_validate_shape() -> Result<()> {
        let mut sim = Simulation::new(small_config()?)?;
        sim.step()?;
        let mut pos = sim.positions();
        pos[0] = [-0.5, 6.5, 3.0];
        sim.set_positions(&pos)?;
        assert!(sim.neighbor_list().is_none());
        let p0 = sim.positions()[0];
        assert!((p0[0] - 5.5).abs() < 1e-12 && (p0[1] - 0.5).abs() < 1e-12);
        assert!(sim.set_velocities(&[[0.0; 3]]).is_err());
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> Result<()> {
        let particles = vec![
            Particle::new(7, [1.0, 1.0, 1.0], [0.0; 3], 1.0)?,
            Particle::new(7, [1.5, 1.0, 1.0], [0.0; 3], 1.0)?,
        ];
        let err = Simulation::from_particles(small_config()?, particles);
        assert!(matches!(err, Err(Error::InvalidParam(_))));
        Ok(())
    }
}
