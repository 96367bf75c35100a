//! Plotfile output: a `pltNNNNN` directory with a grid header and a
//! particle checkpoint underneath.
//!
//! ```text
//! pltNNNNN/
//!   Header                         grid header (no mesh components)
//!   particle0/
//!     Header                       component names, counts, per-subdomain table
//!     Particle_H                   per-subdomain box and particle count
//!     Level_0/DATA_WWWWW           one binary file per worker
//! ```
//!
//! Each particle record in a data file is 80 bytes: nine little-endian `f64`
//! (x y z vx vy vz ax ay az) followed by the `i32` id and the `i32` worker.

use crate::core::domain::SubdomainId;
use crate::core::particle::{Particle, DIM};
use crate::error::{Error, Result};
use crate::io::{numbered, Snapshot, COMPONENT_NAMES};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const PARTICLE_HEADER_VERSION: &str = "Version_Two_Dot_One_double";
pub const GRID_HEADER_VERSION: &str = "HyperCLaw-V1.1";
/// Bytes per particle record in a data file.
pub const RECORD_BYTES: usize = (DIM + COMPONENT_NAMES.len()) * 8 + 2 * 4;

/// Where one subdomain's particles landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridEntry {
    worker: usize,
    count: usize,
    offset: u64,
}

/// Write `dir/pltNNNNN` and return its path.
pub fn write_plotfile(dir: &Path, snap: &Snapshot) -> Result<PathBuf> {
    let root = dir.join(numbered("plt", snap.step));
    let particle_dir = root.join("particle0");
    let level_dir = particle_dir.join("Level_0");
    fs::create_dir_all(&level_dir)?;

    write_grid_header(BufWriter::new(File::create(root.join("Header"))?), snap)?;

    let by_subdomain = group_by_subdomain(snap);
    let entries = write_data_files(&level_dir, snap, &by_subdomain)?;

    write_particle_header(
        BufWriter::new(File::create(particle_dir.join("Header"))?),
        snap,
        &entries,
    )?;
    write_particle_index(
        BufWriter::new(File::create(particle_dir.join("Particle_H"))?),
        snap,
        &entries,
    )?;

    info!(
        step = snap.step,
        particles = snap.num_particles(),
        path = %root.display(),
        "wrote plotfile"
    );
    Ok(root)
}

fn group_by_subdomain(snap: &Snapshot) -> Vec<Vec<&Particle>> {
    let mut out: Vec<Vec<&Particle>> = vec![Vec::new(); snap.domain.num_subdomains()];
    for p in snap.particles.particles() {
        let sd = if p.subdomain < out.len() {
            p.subdomain
        } else {
            snap.domain.subdomain_of(&p.r)
        };
        out[sd].push(p);
    }
    out
}

fn write_data_files(
    level_dir: &Path,
    snap: &Snapshot,
    by_subdomain: &[Vec<&Particle>],
) -> Result<Vec<GridEntry>> {
    let num_workers = snap.domain.num_workers();
    let mut writers = (0..num_workers)
        .map(|w| -> Result<BufWriter<File>> {
            let path = level_dir.join(numbered("DATA_", w as u64));
            Ok(BufWriter::new(File::create(path)?))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut offsets = vec![0u64; num_workers];

    let mut entries = Vec::with_capacity(by_subdomain.len());
    for (sd, particles) in by_subdomain.iter().enumerate() {
        let worker = owner(snap, sd)?;
        let entry = GridEntry {
            worker,
            count: particles.len(),
            offset: offsets[worker],
        };
        for p in particles {
            write_record(&mut writers[worker], p, worker)?;
        }
        offsets[worker] += (particles.len() * RECORD_BYTES) as u64;
        entries.push(entry);
    }
    for w in writers.iter_mut() {
        w.flush()?;
    }
    Ok(entries)
}

fn owner(snap: &Snapshot, sd: SubdomainId) -> Result<usize> {
    snap.domain
        .owner_of(sd)
        .ok_or_else(|| Error::Topology(format!("subdomain {sd} has no owner")))
}

fn write_record<W: Write>(writer: &mut W, p: &Particle, worker: usize) -> Result<()> {
    for x in p.r.iter().chain(p.v.iter()).chain(p.a.iter()) {
        writer.write_all(&x.to_le_bytes())?;
    }
    let id = i32::try_from(p.id)
        .map_err(|_| Error::InvalidParam(format!("particle id {} does not fit in i32", p.id)))?;
    let worker = i32::try_from(worker)
        .map_err(|_| Error::InvalidParam(format!("worker {worker} does not fit in i32")))?;
    writer.write_all(&id.to_le_bytes())?;
    writer.write_all(&worker.to_le_bytes())?;
    Ok(())
}

fn write_grid_header<W: Write>(mut writer: W, snap: &Snapshot) -> Result<()> {
    let extent = snap.domain.extent();
    let counts = snap.domain.counts();
    let edge = snap.domain.edge();
    writeln!(writer, "{GRID_HEADER_VERSION}")?;
    writeln!(writer, "0")?;
    writeln!(writer, "{DIM}")?;
    writeln!(writer, "{}", snap.time)?;
    writeln!(writer, "0")?;
    writeln!(writer, "0 0 0")?;
    writeln!(writer, "{} {} {}", extent[0], extent[1], extent[2])?;
    writeln!(writer)?;
    writeln!(
        writer,
        "((0,0,0) ({},{},{}) (0,0,0))",
        counts[0] - 1,
        counts[1] - 1,
        counts[2] - 1
    )?;
    writeln!(writer, "{}", snap.step)?;
    writeln!(writer, "{} {} {}", edge[0], edge[1], edge[2])?;
    writeln!(writer, "0")?;
    writeln!(writer, "0")?;
    writer.flush()?;
    Ok(())
}

fn write_particle_header<W: Write>(
    mut writer: W,
    snap: &Snapshot,
    entries: &[GridEntry],
) -> Result<()> {
    let next_id = snap
        .particles
        .particles()
        .iter()
        .map(|p| p.id + 1)
        .max()
        .unwrap_or(0);
    writeln!(writer, "{PARTICLE_HEADER_VERSION}")?;
    writeln!(writer, "{DIM}")?;
    writeln!(writer, "{}", COMPONENT_NAMES.len())?;
    for name in COMPONENT_NAMES {
        writeln!(writer, "{name}")?;
    }
    // No extra integer components beyond id and worker.
    writeln!(writer, "0")?;
    // Checkpoint flag.
    writeln!(writer, "1")?;
    writeln!(writer, "{}", snap.num_particles())?;
    writeln!(writer, "{next_id}")?;
    // Finest level, then the grid count of level 0.
    writeln!(writer, "0")?;
    writeln!(writer, "{}", entries.len())?;
    for e in entries {
        writeln!(writer, "{} {} {}", e.worker, e.count, e.offset)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_particle_index<W: Write>(
    mut writer: W,
    snap: &Snapshot,
    entries: &[GridEntry],
) -> Result<()> {
    writeln!(writer, "({} 0", entries.len())?;
    for (sd, e) in entries.iter().enumerate() {
        let coords = snap
            .domain
            .subdomain(sd)
            .map(|s| s.coords)
            .ok_or_else(|| Error::Topology(format!("unknown subdomain {sd}")))?;
        writeln!(
            writer,
            "(({},{},{}) ({},{},{}) (0,0,0)) {}",
            coords[0], coords[1], coords[2], coords[0], coords[1], coords[2], e.count
        )?;
    }
    writeln!(writer, ")")?;
    writer.flush()?;
    Ok(())
}
