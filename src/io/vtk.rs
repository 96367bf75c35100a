//! Legacy-VTK ASCII point clouds (`particles_NNNNN.vtk`).

use crate::error::Result;
use crate::io::{numbered, Snapshot, COMPONENT_NAMES};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `snap` as POLYDATA: one vertex per particle plus the six velocity
/// and acceleration scalars.
pub fn write<W: Write>(mut writer: W, snap: &Snapshot) -> Result<()> {
    let particles = snap.particles.particles();
    let n = particles.len();

    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(writer, "MD particles")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET POLYDATA")?;

    writeln!(writer, "POINTS {n} double")?;
    for p in particles {
        writeln!(writer, "{} {} {}", p.r[0], p.r[1], p.r[2])?;
    }
    writeln!(writer)?;

    writeln!(writer, "VERTICES {} {}", n, 2 * n)?;
    for i in 0..n {
        writeln!(writer, "1 {i}")?;
    }
    writeln!(writer)?;

    writeln!(writer, "POINT_DATA {n}")?;
    for (c, name) in COMPONENT_NAMES.iter().enumerate() {
        writeln!(writer, "SCALARS {name} double 1")?;
        writeln!(writer, "LOOKUP_TABLE default")?;
        for p in particles {
            let value = if c < 3 { p.v[c] } else { p.a[c - 3] };
            writeln!(writer, "{value}")?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `dir/particles_NNNNN.vtk`. Nothing is written for an empty snapshot.
pub fn write_vtk_file(dir: &Path, snap: &Snapshot) -> Result<Option<PathBuf>> {
    if snap.num_particles() == 0 {
        info!(step = snap.step, "no particles; skipping VTK output");
        return Ok(None);
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.vtk", numbered("particles_", snap.step)));
    write(BufWriter::new(File::create(&path)?), snap)?;
    info!(
        step = snap.step,
        particles = snap.num_particles(),
        path = %path.display(),
        "wrote VTK point cloud"
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::SpatialDomain;
    use crate::core::particle::Particle;
    use crate::core::store::SubdomainStore;

    fn snapshot() -> Result<Snapshot> {
        let domain = SpatialDomain::new([4.0; 3], 2.0, 1)?;
        let mut a = Particle::new(0, [0.5, 0.5, 0.5], [1.0, 2.0, 3.0], 1.0)?;
        a.a = [-1.0, 0.0, 0.25];
        let b = Particle::new(1, [3.5, 1.0, 2.0], [0.0; 3], 1.0)?;
        let store = SubdomainStore::from_particles([a, b], &domain)?;
        Ok(Snapshot {
            particles: store.snapshot(),
            step: 3,
            time: 0.1,
            domain,
        })
    }

    #[test]
    fn layout_matches_legacy_polydata() -> Result<()> {
        let mut buf = Vec::new();
        write(&mut buf, &snapshot()?)?;
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# vtk DataFile Version 3.0");
        assert_eq!(lines[3], "DATASET POLYDATA");
        assert_eq!(lines[4], "POINTS 2 double");
        assert_eq!(lines[5], "0.5 0.5 0.5");
        assert_eq!(lines[6], "3.5 1 2");
        assert_eq!(lines[8], "VERTICES 2 4");
        assert_eq!(lines[10], "1 1");
        assert_eq!(lines[12], "POINT_DATA 2");
        assert_eq!(lines[13], "SCALARS vx double 1");
        assert_eq!(lines[15], "1");
        assert!(text.contains("SCALARS az double 1\nLOOKUP_TABLE default\n0.25\n0\n"));
        Ok(())
    }
}
