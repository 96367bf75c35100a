use nlistmd::core::boundary::wrap_position;
use nlistmd::core::{
    ForceEvaluator, NeighborListBuilder, PairPotential, Particle, ParticleContainer,
    SpatialDomain, SubdomainStore,
};
use nlistmd::error::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashSet;

fn random_particles(rng: &mut StdRng, n: usize, extent: [f64; 3]) -> Result<Vec<Particle>> {
    (0..n)
        .map(|id| {
            let mut r = [0.0; 3];
            for k in 0..3 {
                r[k] = rng.random_range(0.0..extent[k]);
            }
            Particle::new(id as u64, r, [0.0; 3], 1.0)
        })
        .collect()
}

fn min_image_dist(domain: &SpatialDomain, a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let d = domain.min_image([a[0] - b[0], a[1] - b[1], a[2] - b[2]]);
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}

/// Unordered id pairs present in the builder's current list.
fn listed_pairs(builder: &NeighborListBuilder, store: &SubdomainStore) -> HashSet<(u64, u64)> {
    let mut out = HashSet::new();
    if let Some(list) = builder.list() {
        for (a, b) in list.pairs() {
            let (Some(pa), Some(pb)) = (store.get(a), store.get(b)) else {
                panic!("dangling list entry {a:?} -> {b:?}");
            };
            out.insert((pa.id.min(pb.id), pa.id.max(pb.id)));
        }
    }
    out
}

fn all_particles(store: &SubdomainStore) -> Vec<Particle> {
    let mut out = Vec::new();
    store.for_each_owned(|p| out.push(p.clone()));
    out
}

/// After every redistribution each particle is owned by exactly one
/// subdomain, and it is the subdomain its position maps to.
#[test]
fn redistribution_keeps_an_exact_partition() -> Result<()> {
    let extent = [9.0, 6.0, 12.0];
    let domain = SpatialDomain::new(extent, 3.0, 4)?;
    let mut rng = StdRng::seed_from_u64(11);
    let mut store = SubdomainStore::from_particles(random_particles(&mut rng, 300, extent)?, &domain)?;

    for _round in 0..5 {
        store.for_each_owned_mut(|p| {
            for k in 0..3 {
                p.r[k] += rng.random_range(-2.0..2.0);
            }
            p.r = wrap_position(p.r, &extent);
        });
        store.redistribute(&domain)?;

        let mut seen = HashSet::new();
        for (sd, bucket) in store.buckets().iter().enumerate() {
            for p in bucket {
                assert!(seen.insert(p.id), "particle {} owned twice", p.id);
                assert_eq!(p.subdomain, sd);
                assert_eq!(domain.subdomain_of(&p.r), sd);
            }
        }
        assert_eq!(seen.len(), 300);
    }
    Ok(())
}

/// The vector sum of m * a over the whole system vanishes, including pairs
/// that straddle subdomain boundaries and the periodic seam.
#[test]
fn forces_sum_to_zero() -> Result<()> {
    let extent = [8.0; 3];
    let domain = SpatialDomain::new(extent, 2.0, 3)?;
    let mut rng = StdRng::seed_from_u64(5);
    let mut store = SubdomainStore::from_particles(random_particles(&mut rng, 400, extent)?, &domain)?;

    for potential in [
        PairPotential::SoftCutoff,
        PairPotential::LennardJones {
            epsilon: 1.0,
            sigma: 0.3,
        },
    ] {
        let mut builder = NeighborListBuilder::new(0.6, 2.0, None, &domain)?;
        let eval = ForceEvaluator::new(0.6, 0.05, potential, &domain)?;
        let list = builder.build(&mut store, &domain, 0)?.clone();
        let report = eval.evaluate(&list, &mut store)?;
        assert!(report.interactions > 0);

        let mut total = [0.0; 3];
        let mut scale = 0.0;
        store.for_each_owned(|p| {
            for k in 0..3 {
                total[k] += p.mass * p.a[k];
                scale += (p.mass * p.a[k]).abs();
            }
        });
        for k in 0..3 {
            assert!(
                total[k].abs() <= 1e-10 * scale.max(1.0),
                "{potential:?}: net force {total:?} (scale {scale})"
            );
        }
    }
    Ok(())
}

/// Adversarial drift: every round pushes the largest displacement right up
/// to the rebuild threshold without crossing it. No pair within the cutoff
/// may ever be missing from the list.
#[test]
fn list_never_misses_a_pair_below_the_trigger() -> Result<()> {
    let extent = [10.0; 3];
    let cutoff = 0.8;
    let domain = SpatialDomain::new(extent, 2.5, 4)?;
    let mut rng = StdRng::seed_from_u64(2024);
    let mut store = SubdomainStore::from_particles(random_particles(&mut rng, 250, extent)?, &domain)?;
    let mut builder = NeighborListBuilder::new(cutoff, 2.0, None, &domain)?;
    let threshold = builder.rebuild_threshold();

    for round in 0..20 {
        builder.build(&mut store, &domain, round)?;
        let listed = listed_pairs(&builder, &store);
        let start = all_particles(&store);

        // Move every particle along a random direction toward the threshold in
        // a few sub-steps, checking soundness at each one.
        let dirs: Vec<[f64; 3]> = (0..start.len())
            .map(|_| {
                let v = [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0f64..1.0),
                ];
                let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt().max(1e-12);
                [v[0] / n, v[1] / n, v[2] / n]
            })
            .collect();
        let by_id: std::collections::HashMap<u64, usize> =
            start.iter().enumerate().map(|(i, p)| (p.id, i)).collect();

        for frac in [0.25, 0.5, 0.9, 1.0 - 1e-9] {
            let step = threshold * frac;
            store.for_each_owned_mut(|p| {
                let i = by_id[&p.id];
                for k in 0..3 {
                    let dx = dirs[i][k] * step;
                    p.r[k] = start[i].r[k] + dx;
                    p.drift[k] = dx;
                }
            });
            assert!(!builder.rebuild_due(&store), "round {round}: premature trigger");

            let now = all_particles(&store);
            for (i, a) in now.iter().enumerate() {
                for b in &now[i + 1..] {
                    if min_image_dist(&domain, &a.r, &b.r) <= cutoff {
                        let key = (a.id.min(b.id), a.id.max(b.id));
                        assert!(
                            listed.contains(&key),
                            "round {round}: pair {key:?} within cutoff but not listed"
                        );
                    }
                }
            }
        }

        // Scatter before the next round so each build sees a fresh layout.
        store.for_each_owned_mut(|p| {
            for k in 0..3 {
                p.r[k] += rng.random_range(-1.5..1.5);
            }
            p.r = wrap_position(p.r, &extent);
        });
    }
    Ok(())
}

/// Two particles approaching head-on from exactly the list radius reach the
/// cutoff when each has drifted half the skin; the trigger must fire there.
#[test]
fn trigger_fires_at_exactly_half_the_skin() -> Result<()> {
    let extent = [20.0; 3];
    let cutoff = 1.0;
    let domain = SpatialDomain::new(extent, 10.0, 1)?;
    let a = Particle::new(0, [5.0, 5.0, 5.0], [0.0; 3], 1.0)?;
    let b = Particle::new(1, [10.0, 5.0, 5.0], [0.0; 3], 1.0)?;
    let mut store = SubdomainStore::from_particles([a, b], &domain)?;
    let mut builder = NeighborListBuilder::new(cutoff, 5.0, None, &domain)?;
    builder.build(&mut store, &domain, 0)?;
    assert_eq!(listed_pairs(&builder, &store).len(), 1);

    let half = builder.rebuild_threshold();
    assert_eq!(half, 2.0);
    store.for_each_owned_mut(|p| {
        let dx = if p.id == 0 { half } else { -half };
        p.r[0] += dx;
        p.drift[0] = dx;
    });
    assert!(builder.rebuild_due(&store));
    Ok(())
}

#[test]
fn wrap_is_idempotent() {
    let extent = [10.0, 3.0, 7.5];
    let mut rng = StdRng::seed_from_u64(99);
    let mut samples: Vec<[f64; 3]> = (0..2000)
        .map(|_| {
            [
                rng.random_range(-100.0..100.0),
                rng.random_range(-1e6..1e6),
                rng.random_range(-20.0..20.0),
            ]
        })
        .collect();
    samples.push([-1e-17, -0.0, 7.5]);
    samples.push([10.0, 3.0 - 1e-16, -7.5]);

    for r in samples {
        let once = wrap_position(r, &extent);
        let twice = wrap_position(once, &extent);
        assert_eq!(once, twice, "wrap not idempotent for {r:?}");
        for k in 0..3 {
            assert!(once[k] >= 0.0 && once[k] < extent[k], "{r:?} -> {once:?}");
        }
    }
}

fn pair_acceleration(separation: f64, min_r: f64) -> Result<[f64; 3]> {
    let domain = SpatialDomain::new([10.0; 3], 10.0, 1)?;
    let a = Particle::new(0, [5.0, 5.0, 5.0], [0.0; 3], 1.0)?;
    let b = Particle::new(1, [5.0 + separation, 5.0, 5.0], [0.0; 3], 1.0)?;
    let mut store = SubdomainStore::from_particles([a, b], &domain)?;
    let mut builder = NeighborListBuilder::new(1.0, 5.0, None, &domain)?;
    let eval = ForceEvaluator::new(1.0, min_r, PairPotential::SoftCutoff, &domain)?;
    let list = builder.build(&mut store, &domain, 0)?.clone();
    eval.evaluate(&list, &mut store)?;
    let mut acc = [0.0; 3];
    store.for_each_owned(|p| {
        if p.id == 0 {
            acc = p.a;
        }
    });
    Ok(acc)
}

#[test]
fn clamp_uses_the_force_at_min_r() -> Result<()> {
    let min_r = 0.1;
    let clamped = pair_acceleration(0.5 * min_r, min_r)?;
    let at_floor = pair_acceleration(min_r, min_r)?;
    let norm = |a: [f64; 3]| (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    assert!(
        (norm(clamped) - norm(at_floor)).abs() <= 1e-12 * norm(at_floor),
        "clamped {clamped:?} vs floor {at_floor:?}"
    );
    // Still along the true separation axis, pushing particle 0 away from 1.
    assert!(clamped[0] < 0.0);
    assert_eq!(clamped[1], 0.0);
    assert_eq!(clamped[2], 0.0);
    Ok(())
}
