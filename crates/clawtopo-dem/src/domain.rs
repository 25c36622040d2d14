//! Simulation domain description.
//!
//! Only the handful of fields needed to size and place the topography file
//! are modelled here: the computational bounding box, the coarsest grid, the
//! refinement hierarchy and the name of the topography file the solver reads.

use crate::{Result, TopoError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Domain parameters that drive the topography download.
///
/// # Example
///
/// ```yaml
/// lower: [-13_059_000.0, 4_413_000.0]
/// upper: [-13_057_000.0, 4_415_000.0]
/// num_cells: [20, 20]
/// amr_levels_max: 3
/// refinement_ratios_x: [2, 4]
/// refinement_ratios_y: [2, 4]
/// topo_file: topo/topo.asc
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Lower-left corner `(x, y)` in the projected CRS.
    pub lower: [f64; 2],
    /// Upper-right corner `(x, y)` in the projected CRS.
    pub upper: [f64; 2],
    /// Cell counts `(nx, ny)` on the coarsest level.
    pub num_cells: [u32; 2],
    /// Number of refinement levels, counting the coarsest one.
    pub amr_levels_max: u32,
    /// Per-level refinement ratios along x.
    #[serde(default)]
    pub refinement_ratios_x: Vec<u32>,
    /// Per-level refinement ratios along y.
    #[serde(default)]
    pub refinement_ratios_y: Vec<u32>,
    /// Topography file the solver reads, relative to the case directory.
    pub topo_file: PathBuf,
}

impl DomainConfig {
    /// Load and validate a domain description from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a domain description from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let domain: DomainConfig = serde_yaml::from_str(text)?;
        domain.validate()?;
        Ok(domain)
    }

    /// Check the invariants the extent resolver relies on.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..2 {
            if !(self.lower[axis].is_finite() && self.upper[axis].is_finite()) {
                return Err(TopoError::InvalidDomain(format!(
                    "non-finite bound on axis {}",
                    axis
                )));
            }
            if self.upper[axis] <= self.lower[axis] {
                return Err(TopoError::InvalidDomain(format!(
                    "upper bound {} is not above lower bound {} on axis {}",
                    self.upper[axis], self.lower[axis], axis
                )));
            }
            if self.num_cells[axis] == 0 {
                return Err(TopoError::InvalidDomain(format!(
                    "zero cells on axis {}",
                    axis
                )));
            }
        }

        if self.amr_levels_max == 0 {
            return Err(TopoError::InvalidDomain(
                "amr_levels_max must be at least 1".to_string(),
            ));
        }

        let needed = (self.amr_levels_max - 1) as usize;
        for (name, ratios) in [
            ("refinement_ratios_x", &self.refinement_ratios_x),
            ("refinement_ratios_y", &self.refinement_ratios_y),
        ] {
            if ratios.len() < needed {
                return Err(TopoError::InvalidDomain(format!(
                    "{} has {} entries but {} levels need {}",
                    name,
                    ratios.len(),
                    self.amr_levels_max,
                    needed
                )));
            }
            if ratios[..needed].contains(&0) {
                return Err(TopoError::InvalidDomain(format!(
                    "{} contains a zero ratio",
                    name
                )));
            }
        }

        if self.topo_file.as_os_str().is_empty() {
            return Err(TopoError::InvalidDomain("topo_file is empty".to_string()));
        }

        self.finest_cells()?;
        Ok(())
    }

    /// Cell counts `(nx, ny)` on the finest refinement level.
    ///
    /// Only the first `amr_levels_max - 1` ratios apply; extra entries are
    /// ignored the same way the solver ignores them. A product that does not
    /// fit in `u64` is rejected with [`TopoError::InvalidDomain`].
    pub fn finest_cells(&self) -> Result<(u64, u64)> {
        let levels = self.amr_levels_max.saturating_sub(1) as usize;
        let refine = |name: &str, base: u32, ratios: &[u32]| {
            ratios
                .iter()
                .take(levels)
                .try_fold(base as u64, |n, &r| n.checked_mul(r as u64))
                .ok_or_else(|| {
                    TopoError::InvalidDomain(format!(
                        "finest cell count along {} overflows",
                        name
                    ))
                })
        };
        Ok((
            refine("x", self.num_cells[0], &self.refinement_ratios_x)?,
            refine("y", self.num_cells[1], &self.refinement_ratios_y)?,
        ))
    }
}
