//! Download extent and resolution derived from a simulation domain.

use crate::{DomainConfig, Result, TopoError};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Rectangular bounding box in the projected CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// West edge.
    pub xmin: f64,
    /// South edge.
    pub ymin: f64,
    /// East edge.
    pub xmax: f64,
    /// North edge.
    pub ymax: f64,
}

/// Pixel grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl Extent {
    /// Create an extent, checking that both spans are positive and finite.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self> {
        let extent = Self {
            xmin,
            ymin,
            xmax,
            ymax,
        };
        extent.check()?;
        Ok(extent)
    }

    fn check(&self) -> Result<()> {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.xmax <= self.xmin || self.ymax <= self.ymin {
            return Err(TopoError::InvalidExtent(format!(
                "{} is not a proper bounding box",
                self
            )));
        }
        Ok(())
    }

    /// Width of the box.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height of the box.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Grow the box by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Self {
        Self {
            xmin: self.xmin - margin,
            ymin: self.ymin - margin,
            xmax: self.xmax + margin,
            ymax: self.ymax + margin,
        }
    }

    /// Number of whole pixels of edge `res` that cover the box.
    ///
    /// Spans are rounded half away from zero, so a span of 99.5 pixels
    /// becomes 100.
    pub fn grid_size(&self, res: f64) -> Result<GridSize> {
        self.check()?;
        if !(res.is_finite() && res > 0.0) {
            return Err(TopoError::InvalidExtent(format!(
                "resolution {} must be positive",
                res
            )));
        }

        let width = (self.width() / res).round();
        let height = (self.height() / res).round();
        if width < 1.0 || height < 1.0 {
            return Err(TopoError::InvalidExtent(format!(
                "{} is smaller than one {} pixel",
                self, res
            )));
        }
        if width > u32::MAX as f64 || height > u32::MAX as f64 {
            return Err(TopoError::InvalidExtent(format!(
                "{} at resolution {} exceeds the maximum raster size",
                self, res
            )));
        }

        Ok(GridSize {
            width: width as u32,
            height: height as u32,
        })
    }

    /// Snap the upper bounds so the box is exactly `size * res` from the lower bounds.
    ///
    /// Snapping an already snapped extent leaves it unchanged.
    pub fn snapped(&self, res: f64) -> Result<(Self, GridSize)> {
        let size = self.grid_size(res)?;
        let snapped = Self {
            xmin: self.xmin,
            ymin: self.ymin,
            xmax: self.xmin + size.width as f64 * res,
            ymax: self.ymin + size.height as f64 * res,
        };
        Ok((snapped, size))
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Everything needed to fetch the topography for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct TopoPlan {
    /// Padded download extent.
    pub extent: Extent,
    /// Pixel edge length, never coarser than the finest simulation cell.
    pub resolution: f64,
    /// Where the converted grid is cached.
    pub cache_path: PathBuf,
}

impl TopoPlan {
    /// Path of the transient raster downloaded next to the cache file.
    pub fn raster_path(&self) -> PathBuf {
        raster_path_for(&self.cache_path)
    }
}

/// Cache location of the topography file for `domain` under `case_dir`.
///
/// Purely lexical, so identical inputs always map to the same path.
pub fn cache_path(domain: &DomainConfig, case_dir: &Path) -> PathBuf {
    normalize(&case_dir.join(&domain.topo_file))
}

/// Case directory assumed for a domain file: the directory holding it, or
/// `.` for a bare file name.
pub fn default_case_dir(domain_file: &Path) -> PathBuf {
    match domain_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<cache_path>.tif`, keeping any extension the cache file already has.
pub fn raster_path_for(cache_path: &Path) -> PathBuf {
    let mut name = cache_path.as_os_str().to_os_string();
    name.push(".tif");
    PathBuf::from(name)
}

/// Derive extent, resolution and cache path from a domain. No I/O.
pub fn resolve(domain: &DomainConfig, case_dir: &Path) -> Result<TopoPlan> {
    domain.validate()?;

    let (nx, ny) = domain.finest_cells()?;
    let extent = Extent::new(
        domain.lower[0],
        domain.lower[1],
        domain.upper[0],
        domain.upper[1],
    )?;

    let dx = extent.width() / nx as f64;
    let dy = extent.height() / ny as f64;
    let resolution = dx.min(dy);

    Ok(TopoPlan {
        extent: extent.padded(resolution),
        resolution,
        cache_path: cache_path(domain, case_dir),
    })
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
