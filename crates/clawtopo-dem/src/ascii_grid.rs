//! ESRI ASCII grid writer.
//!
//! Layout of the file:
//!
//! ```text
//! ncols        4
//! nrows        3
//! xllcorner    -100
//! yllcorner    250
//! cellsize     10
//! NODATA_value -9999
//! 1 2 3 4
//! ...
//! ```
//!
//! Rows are written north to south. Non-square pixels use `dx`/`dy` lines in
//! place of `cellsize`. The spatial reference goes into a `.prj` file next to
//! the grid, written when the grid is finished.

use crate::raster::GeoTransform;
use crate::{Result, TopoError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// ESRI WKT of WGS 84 / Pseudo-Mercator (EPSG:3857).
pub const WEB_MERCATOR_ESRI_WKT: &str = concat!(
    r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere","#,
    r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
    r#"PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],"#,
    r#"PROJECTION["Mercator_Auxiliary_Sphere"],"#,
    r#"PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],"#,
    r#"PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],"#,
    r#"PARAMETER["Auxiliary_Sphere_Type",0.0],UNIT["Meter",1.0]]"#
);

/// Relative tolerance under which dx and dy count as one square cell size.
const SQUARE_TOLERANCE: f64 = 1e-9;

/// Pixel size as it appears in the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellSize {
    /// Square pixels, written as `cellsize`.
    Square(f64),
    /// Rectangular pixels, written as `dx` and `dy`.
    Rect {
        /// Pixel width.
        dx: f64,
        /// Pixel height.
        dy: f64,
    },
}

/// Header of an ASCII grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGridHeader {
    /// Number of columns.
    pub ncols: u32,
    /// Number of rows.
    pub nrows: u32,
    /// X of the lower-left corner.
    pub xllcorner: f64,
    /// Y of the lower-left corner.
    pub yllcorner: f64,
    /// Pixel size.
    pub cell_size: CellSize,
    /// No-data value, omitted from the header when `None`.
    pub no_data_value: Option<f64>,
}

impl AsciiGridHeader {
    /// Derive a header from a north-up geotransform.
    ///
    /// Rotated or south-up transforms cannot be expressed and are rejected.
    pub fn from_transform(
        width: u32,
        height: u32,
        transform: &GeoTransform,
        no_data_value: Option<f64>,
    ) -> Result<Self> {
        let [x0, dx, rot_x, y0, rot_y, neg_dy] = *transform;
        if rot_x != 0.0 || rot_y != 0.0 || dx <= 0.0 || neg_dy >= 0.0 {
            return Err(TopoError::UnsupportedGeoTransform(*transform));
        }

        let dy = -neg_dy;
        let cell_size = if (dx - dy).abs() <= SQUARE_TOLERANCE * dx.max(dy) {
            CellSize::Square(dx)
        } else {
            CellSize::Rect { dx, dy }
        };

        Ok(Self {
            ncols: width,
            nrows: height,
            xllcorner: x0,
            yllcorner: y0 - height as f64 * dy,
            cell_size,
            no_data_value,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "ncols        {}", self.ncols)?;
        writeln!(w, "nrows        {}", self.nrows)?;
        writeln!(w, "xllcorner    {}", self.xllcorner)?;
        writeln!(w, "yllcorner    {}", self.yllcorner)?;
        match self.cell_size {
            CellSize::Square(size) => writeln!(w, "cellsize     {}", size)?,
            CellSize::Rect { dx, dy } => {
                writeln!(w, "dx           {}", dx)?;
                writeln!(w, "dy           {}", dy)?;
            }
        }
        if let Some(no_data) = self.no_data_value {
            writeln!(w, "NODATA_value {}", no_data)?;
        }
        Ok(())
    }
}

/// Streaming writer for one ASCII grid plus its `.prj` sidecar.
#[derive(Debug)]
pub struct AsciiGridWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header: AsciiGridHeader,
    rows_written: u32,
}

impl AsciiGridWriter {
    /// Create (or truncate) `path` and write the header.
    pub fn create<P: AsRef<Path>>(path: P, header: AsciiGridHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        header.write_to(&mut writer)?;
        Ok(Self {
            path,
            writer,
            header,
            rows_written: 0,
        })
    }

    /// Append the next row, north to south.
    ///
    /// Values are written verbatim in their shortest exact decimal form.
    pub fn write_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.header.ncols as usize {
            return Err(TopoError::GridShape {
                expected: self.header.ncols as usize,
                actual: row.len(),
            });
        }
        if self.rows_written >= self.header.nrows {
            return Err(TopoError::GridShape {
                expected: self.header.nrows as usize,
                actual: self.rows_written as usize + 1,
            });
        }

        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                self.writer.write_all(b" ")?;
            }
            write!(self.writer, "{}", value)?;
        }
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    /// Path of the projection sidecar for a grid at `path`.
    pub fn prj_path(path: &Path) -> PathBuf {
        path.with_extension("prj")
    }

    /// Flush the grid to disk, then write the Web Mercator `.prj` sidecar.
    ///
    /// A sidecar failure is reported as [`TopoError::ProjectionSidecar`]; by
    /// then the grid itself is complete and synced.
    pub fn finish(self) -> Result<()> {
        if self.rows_written != self.header.nrows {
            return Err(TopoError::GridShape {
                expected: self.header.nrows as usize,
                actual: self.rows_written as usize,
            });
        }

        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        let prj = Self::prj_path(&self.path);
        std::fs::write(&prj, WEB_MERCATOR_ESRI_WKT)
            .map_err(|source| TopoError::ProjectionSidecar { path: prj, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORTH_UP: GeoTransform = [-100.0, 10.0, 0.0, 280.0, 0.0, -10.0];

    #[test]
    fn test_header_from_transform() {
        let header = AsciiGridHeader::from_transform(4, 3, &NORTH_UP, Some(-9999.0)).unwrap();
        assert_eq!(header.xllcorner, -100.0);
        assert_eq!(header.yllcorner, 250.0);
        assert_eq!(header.cell_size, CellSize::Square(10.0));
    }

    #[test]
    fn test_header_rectangular_cells() {
        let transform = [0.0, 2.0, 0.0, 10.0, 0.0, -1.0];
        let header = AsciiGridHeader::from_transform(5, 10, &transform, None).unwrap();
        assert_eq!(header.cell_size, CellSize::Rect { dx: 2.0, dy: 1.0 });
        assert_eq!(header.yllcorner, 0.0);
    }

    #[test]
    fn test_header_rejects_rotation() {
        let transform = [0.0, 1.0, 0.5, 10.0, 0.0, -1.0];
        assert!(matches!(
            AsciiGridHeader::from_transform(5, 10, &transform, None),
            Err(TopoError::UnsupportedGeoTransform(_))
        ));
    }

    #[test]
    fn test_header_rejects_south_up() {
        let transform = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert!(AsciiGridHeader::from_transform(5, 10, &transform, None).is_err());
    }

    #[test]
    fn test_write_grid_and_prj() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.asc");
        let header = AsciiGridHeader::from_transform(2, 2, &NORTH_UP, Some(-9999.0)).unwrap();

        let mut writer = AsciiGridWriter::create(&path, header).unwrap();
        writer.write_row(&[1.5, -9999.0]).unwrap();
        writer.write_row(&[f32::NAN, 0.1]).unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ncols        2");
        assert_eq!(lines[1], "nrows        2");
        assert_eq!(lines[2], "xllcorner    -100");
        assert_eq!(lines[3], "yllcorner    260");
        assert_eq!(lines[4], "cellsize     10");
        assert_eq!(lines[5], "NODATA_value -9999");
        assert_eq!(lines[6], "1.5 -9999");
        assert_eq!(lines[7], "NaN 0.1");
        assert_eq!(lines.len(), 8);

        let prj = std::fs::read_to_string(dir.path().join("topo.prj")).unwrap();
        assert_eq!(prj, WEB_MERCATOR_ESRI_WKT);
    }

    #[test]
    fn test_rejects_wrong_row_length() {
        let dir = tempfile::tempdir().unwrap();
        let header = AsciiGridHeader::from_transform(2, 1, &NORTH_UP, None).unwrap();
        let mut writer = AsciiGridWriter::create(dir.path().join("g.asc"), header).unwrap();
        assert!(matches!(
            writer.write_row(&[1.0, 2.0, 3.0]),
            Err(TopoError::GridShape { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_finish_rejects_missing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let header = AsciiGridHeader::from_transform(1, 2, &NORTH_UP, None).unwrap();
        let mut writer = AsciiGridWriter::create(dir.path().join("g.asc"), header).unwrap();
        writer.write_row(&[1.0]).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(TopoError::GridShape { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_sidecar_failure_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        // A directory squatting on the sidecar name makes only the .prj write fail.
        std::fs::create_dir(dir.path().join("g.prj")).unwrap();

        let header = AsciiGridHeader::from_transform(1, 1, &NORTH_UP, None).unwrap();
        let mut writer = AsciiGridWriter::create(&path, header).unwrap();
        writer.write_row(&[7.0]).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(TopoError::ProjectionSidecar { .. })
        ));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("7\n"));
    }
}
