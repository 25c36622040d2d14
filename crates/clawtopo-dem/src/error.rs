//! Error types for the topography crate.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while resolving, fetching or converting topography.
#[derive(Debug, Error)]
pub enum TopoError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// HTTP transport error (connection, TLS, body read).
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Domain description could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Unknown elevation source name.
    #[error("Invalid elevation source: {0}")]
    InvalidSource(String),

    /// The chosen source needs an auth token and none was supplied.
    #[error("Elevation source {source_name} requires an auth token")]
    MissingToken {
        /// Name of the source that needs the token.
        source_name: String,
    },

    /// A metadata-producing call (token or export) was rejected by the server.
    #[error("Service error from {url}: {reason}")]
    Service {
        /// Endpoint that was called.
        url: String,
        /// HTTP status or server-side error message.
        reason: String,
    },

    /// The prepared raster never became available within the poll ceiling.
    #[error("Raster at {url} not ready after waiting {}s (last HTTP status {status})", .waited.as_secs())]
    RetrievalTimeout {
        /// Result URL that was polled.
        url: String,
        /// Status of the last response.
        status: u16,
        /// Accumulated wait time.
        waited: Duration,
    },

    /// A JSON response lacked an expected field or was not JSON at all.
    #[error("Malformed response from {url}: missing `{field}`")]
    MalformedResponse {
        /// Endpoint that produced the body.
        url: String,
        /// Field that was expected.
        field: &'static str,
    },

    /// Domain description is inconsistent.
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Extent or resolution cannot describe a pixel grid.
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    /// Invalid GeoTIFF - missing or inconsistent tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// The ASCII grid format has no way to express this geotransform.
    #[error("Unsupported geotransform {0:?}: rotated rasters cannot be written as ASCII grids")]
    UnsupportedGeoTransform([f64; 6]),

    /// A grid was finished or extended with the wrong number of values.
    #[error("Grid shape mismatch: expected {expected}, got {actual}")]
    GridShape {
        /// What the header promised (row length or row count).
        expected: usize,
        /// What was supplied.
        actual: usize,
    },

    /// Writing the projection sidecar failed after the grid itself was written.
    #[error("Failed to write projection file {path}: {source}")]
    ProjectionSidecar {
        /// Sidecar path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}
