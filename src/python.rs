//! Python bindings (feature `python`).

use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::PathBuf;

use crate::config::SimConfig;
use crate::core::particle::DIM;
use crate::core::Simulation;
use crate::io::{plotfile, vtk};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn rows_to_array<'py>(py: Python<'py>, rows: &[[f64; DIM]]) -> Py<PyArray2<f64>> {
    let mut arr = Array2::<f64>::zeros((rows.len(), DIM));
    for (i, row) in rows.iter().enumerate() {
        for k in 0..DIM {
            arr[[i, k]] = row[k];
        }
    }
    arr.into_pyarray(py).to_owned().into()
}

fn array_to_rows(arr: PyReadonlyArray2<'_, f64>, what: &str) -> PyResult<Vec<[f64; DIM]>> {
    let view = arr.as_array();
    if view.shape()[1] != DIM {
        return Err(py_err(format!(
            "{what} must have shape (N, {DIM}), got {:?}",
            view.shape()
        )));
    }
    Ok(view
        .rows()
        .into_iter()
        .map(|row| [row[0], row[1], row[2]])
        .collect())
}

/// Python-facing wrapper around the Rust [`Simulation`].
///
/// API:
/// - __new__(num_particles, extent, cutoff=0.5, min_r=0.01, max_subdomain_size=None, cfl=0.5, seed=None, num_workers=0)
/// - from_toml(text) (static)
/// - step() -> dict, run(steps) -> dict
/// - get_positions() / get_velocities() / get_accelerations() -> np.ndarray (N, 3), id order
/// - set_positions(arr) / set_velocities(arr)
#[pyclass]
pub struct MdSim {
    sim: Simulation,
}

#[pymethods]
impl MdSim {
    /// Build a simulation with randomly placed particles.
    ///
    /// `max_subdomain_size` defaults to the largest box edge (one subdomain per axis).
    /// Raises ValueError on an invalid configuration.
    #[new]
    #[pyo3(signature = (num_particles, extent, cutoff=0.5, min_r=0.01, max_subdomain_size=None, cfl=0.5, seed=None, num_workers=0))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_particles: usize,
        extent: Vec<f64>,
        cutoff: f64,
        min_r: f64,
        max_subdomain_size: Option<f64>,
        cfl: f64,
        seed: Option<u64>,
        num_workers: usize,
    ) -> PyResult<Self> {
        let extent: [f64; DIM] = extent
            .try_into()
            .map_err(|_| py_err(format!("extent must have length {DIM}")))?;
        let largest = extent.iter().cloned().fold(0.0, f64::max);
        let config = SimConfig {
            extent,
            max_subdomain_size: max_subdomain_size.unwrap_or(largest),
            num_particles: Some(num_particles),
            cutoff,
            min_r,
            cfl,
            seed,
            num_workers,
            ..Default::default()
        }
        .validate()
        .map_err(py_err)?;
        let sim = Simulation::new(config).map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Build a simulation from a TOML configuration string.
    #[staticmethod]
    fn from_toml(text: &str) -> PyResult<Self> {
        let config = SimConfig::from_toml_str(text)
            .and_then(SimConfig::validate)
            .map_err(py_err)?;
        let sim = Simulation::new(config).map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Advance one step (releases the GIL) and return its report as a dict.
    fn step<'py>(&mut self, py: Python<'py>) -> PyResult<Py<PyDict>> {
        let report = py.detach(|| self.sim.step()).map_err(py_err)?;
        let out = PyDict::new(py);
        out.set_item("step", report.step)?;
        out.set_item("time", report.time)?;
        out.set_item("dt", report.dt)?;
        out.set_item("rebuilt", report.rebuilt)?;
        out.set_item("kinetic_energy", report.kinetic_energy)?;
        out.set_item("potential_energy", report.potential_energy())?;
        out.set_item("interactions", report.forces.interactions)?;
        out.set_item(
            "clamped_pairs",
            report.forces.warning.map_or(0, |w| w.clamped_pairs),
        )?;
        out.set_item("min_distance", report.min_distance)?;
        Ok(out.into())
    }

    /// Advance `steps` steps (releases the GIL), writing output at the configured cadence.
    fn run<'py>(&mut self, py: Python<'py>, steps: u64) -> PyResult<Py<PyDict>> {
        let summary = py.detach(|| self.sim.run(steps)).map_err(py_err)?;
        let out = PyDict::new(py);
        out.set_item("steps", summary.steps)?;
        out.set_item("rebuilds", summary.rebuilds)?;
        out.set_item("clamped_pairs", summary.clamped_pairs)?;
        Ok(out.into())
    }

    #[getter]
    fn time(&self) -> f64 {
        self.sim.time()
    }

    #[getter]
    fn num_particles(&self) -> usize {
        self.sim.num_particles()
    }

    #[getter]
    fn rebuilds(&self) -> u64 {
        self.sim.rebuilds()
    }

    fn kinetic_energy(&self) -> f64 {
        self.sim.kinetic_energy()
    }

    /// Potential energy from the latest force pass.
    fn potential_energy(&self) -> f64 {
        self.sim.potential_energy()
    }

    fn get_ids<'py>(&self, py: Python<'py>) -> Py<PyArray1<u64>> {
        self.sim.ids().into_pyarray(py).to_owned().into()
    }

    fn get_positions<'py>(&self, py: Python<'py>) -> Py<PyArray2<f64>> {
        rows_to_array(py, &self.sim.positions())
    }

    fn get_velocities<'py>(&self, py: Python<'py>) -> Py<PyArray2<f64>> {
        rows_to_array(py, &self.sim.velocities())
    }

    fn get_accelerations<'py>(&self, py: Python<'py>) -> Py<PyArray2<f64>> {
        rows_to_array(py, &self.sim.accelerations())
    }

    /// Set positions (N, 3) in id order. Values are wrapped into the box.
    fn set_positions<'py>(&mut self, positions: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let rows = array_to_rows(positions, "positions")?;
        self.sim.set_positions(&rows).map_err(py_err)
    }

    /// Set velocities (N, 3) in id order.
    fn set_velocities<'py>(&mut self, velocities: PyReadonlyArray2<'py, f64>) -> PyResult<()> {
        let rows = array_to_rows(velocities, "velocities")?;
        self.sim.set_velocities(&rows).map_err(py_err)
    }

    /// Write a plotfile for the current step under `dir`; returns its path.
    fn write_plotfile(&self, dir: PathBuf) -> PyResult<PathBuf> {
        plotfile::write_plotfile(&dir, &self.sim.snapshot()).map_err(py_err)
    }

    /// Write a VTK point cloud for the current step under `dir`.
    fn write_vtk(&self, dir: PathBuf) -> PyResult<Option<PathBuf>> {
        vtk::write_vtk_file(&dir, &self.sim.snapshot()).map_err(py_err)
    }
}

/// The nlistmd Python module entry point.
#[pymodule]
fn nlistmd(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<MdSim>()?;
    Ok(())
}
