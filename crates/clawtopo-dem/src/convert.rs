//! GeoTIFF to ESRI ASCII grid conversion.

use crate::ascii_grid::{AsciiGridHeader, AsciiGridWriter};
use crate::{GeoRaster, Result, TopoError};
use std::path::Path;
use tracing::{info, warn};

/// Convert band 1 of the GeoTIFF at `raster_path` into an ASCII grid at `grid_path`.
///
/// The grid keeps the raster's size, geotransform and no-data value and is
/// tagged as Web Mercator. The source raster is left in place.
///
/// A failure writing the `.prj` sidecar is logged and ignored: the grid is
/// already complete at that point. Every other error is returned.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(raster_path: P, grid_path: Q) -> Result<()> {
    let raster_path = raster_path.as_ref();
    let grid_path = grid_path.as_ref();

    let raster = GeoRaster::from_file(raster_path)?;
    let (width, height) = raster.dimensions();
    if raster.band_count() > 1 {
        warn!(
            path = %raster_path.display(),
            bands = raster.band_count(),
            "Raster has several bands; only band 1 is converted"
        );
    }

    let header = AsciiGridHeader::from_transform(
        width,
        height,
        &raster.transform(),
        raster.no_data_value(),
    )?;

    let mut writer = AsciiGridWriter::create(grid_path, header)?;
    for row in 0..height {
        writer.write_row(raster.row(row))?;
    }

    match writer.finish() {
        Ok(()) => {}
        Err(TopoError::ProjectionSidecar { path, source }) => {
            warn!(
                path = %path.display(),
                error = %source,
                "Could not write projection file; grid is complete"
            );
        }
        Err(e) => return Err(e),
    }

    info!(
        from = %raster_path.display(),
        to = %grid_path.display(),
        width,
        height,
        "Converted raster to ASCII grid"
    );
    Ok(())
}
