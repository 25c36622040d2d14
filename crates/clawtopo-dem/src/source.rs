//! Elevation data sources served through ArcGIS `exportImage` endpoints.

use crate::TopoError;
use std::fmt;
use std::str::FromStr;

/// USGS 3D Elevation Program image service (North America only, no auth).
const NATIONAL_ELEVATION_URL: &str =
    "https://elevation.nationalmap.gov/arcgis/rest/services/3DEPElevation/ImageServer/exportImage";

/// Esri World Elevation terrain service (global, token required).
const WORLD_ELEVATION_URL: &str =
    "https://elevation.arcgis.com/arcgis/rest/services/WorldElevation/Terrain/ImageServer/exportImage";

/// Mosaic rule that puts the most recently acquired imagery on top.
pub const LATEST_ACQUISITION_MOSAIC_RULE: &str =
    r#"{"mosaicMethod":"esriMosaicAttribute","sortField":"AcquisitionDate"}"#;

/// Where elevation rasters are exported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataSource {
    /// USGS 3DEP, selected with the name `3DEP`.
    #[default]
    NationalElevation,
    /// Esri World Elevation, selected with the name `ESRI`.
    CommercialWorldElevation,
}

impl DataSource {
    /// The `exportImage` endpoint for this source.
    pub fn export_url(&self) -> &'static str {
        match self {
            DataSource::NationalElevation => NATIONAL_ELEVATION_URL,
            DataSource::CommercialWorldElevation => WORLD_ELEVATION_URL,
        }
    }

    /// Whether export requests must carry an auth token.
    pub fn requires_token(&self) -> bool {
        matches!(self, DataSource::CommercialWorldElevation)
    }

    /// Short name used on the command line and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            DataSource::NationalElevation => "3DEP",
            DataSource::CommercialWorldElevation => "ESRI",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataSource {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "3DEP" => Ok(DataSource::NationalElevation),
            "ESRI" => Ok(DataSource::CommercialWorldElevation),
            _ => Err(TopoError::InvalidSource(s.to_string())),
        }
    }
}
