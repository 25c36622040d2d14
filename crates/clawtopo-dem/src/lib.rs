//! # clawtopo-dem
//!
//! Download, convert and cache the topography a simulation domain needs.
//!
//! Given a domain description (bounding box, coarse grid, refinement ratios
//! and the name of the topography file), this crate:
//!
//! 1. works out the download extent and a resolution no coarser than the
//!    finest simulation cell, padded by one cell on every side;
//! 2. exports a float GeoTIFF of that extent from an ArcGIS image service,
//!    polling until the server has prepared the file;
//! 3. converts the GeoTIFF to an ESRI ASCII grid tagged as Web Mercator;
//! 4. caches the grid at the domain's topography path, so later runs skip
//!    the download entirely.
//!
//! ## Data Sources
//!
//! - **3DEP** (USGS 3D Elevation Program): North America only, no
//!   authentication. The most recently acquired imagery is mosaicked on top.
//! - **ESRI** (World Elevation Terrain): global, needs a short-lived token
//!   from [`request_token`].
//!
//! ## Example
//!
//! ```no_run
//! use clawtopo_dem::{
//!     request_token, DataSource, DomainConfig, Fetcher, ReqwestClient, TokenRequest,
//!     TopoManager, DEFAULT_TOKEN_PORTAL,
//! };
//! use std::path::Path;
//!
//! let domain = DomainConfig::from_yaml_file("case/domain.yaml")?;
//!
//! // 3DEP needs no token
//! let outcome = clawtopo_dem::ensure_topo(Path::new("case"), &domain)?;
//! println!("{}", outcome.path().display());
//!
//! // ESRI World Elevation
//! let client = ReqwestClient::new()?;
//! let token = request_token(
//!     &client,
//!     &TokenRequest::new(DEFAULT_TOKEN_PORTAL, "user", "password"),
//! )?;
//! let manager = TopoManager::with_fetcher(Fetcher::new(client))
//!     .with_source(DataSource::CommercialWorldElevation, Some(token));
//! manager.ensure_topo(Path::new("case"), &domain)?;
//! # Ok::<(), clawtopo_dem::TopoError>(())
//! ```

pub mod ascii_grid;
mod convert;
mod domain;
mod error;
mod extent;
mod fetch;
pub mod http;
mod manager;
mod raster;
mod source;
mod token;

pub use ascii_grid::{AsciiGridHeader, AsciiGridWriter, CellSize, WEB_MERCATOR_ESRI_WKT};
pub use convert::convert;
pub use domain::DomainConfig;
pub use error::TopoError;
pub use extent::{
    cache_path, default_case_dir, raster_path_for, resolve, Extent, GridSize, TopoPlan,
};
pub use fetch::{
    ExportQuery, FetchReport, Fetcher, MAX_POLL_WAIT, NO_DATA_VALUE, POLL_INTERVAL,
    WEB_MERCATOR_EPSG,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use manager::{ensure_topo, TopoManager, TopoOutcome};
pub use raster::{GeoRaster, GeoTransform};
pub use source::{DataSource, LATEST_ACQUISITION_MOSAIC_RULE};
pub use token::{
    request_token, AuthToken, TokenRequest, DEFAULT_REFERER, DEFAULT_TOKEN_EXPIRATION_MINUTES,
    DEFAULT_TOKEN_PORTAL,
};

/// Result type for topography operations.
pub type Result<T> = std::result::Result<T, TopoError>;
