//! Cached topography for simulation domains.

use crate::extent::{cache_path, raster_path_for, resolve};
use crate::http::{HttpClient, ReqwestClient};
use crate::{convert, AuthToken, DataSource, DomainConfig, FetchReport, Fetcher, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What [`TopoManager::ensure_topo`] had to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TopoOutcome {
    /// The grid was already cached; no network calls were made.
    Cached(PathBuf),
    /// The grid was downloaded and converted.
    Downloaded {
        /// Cached grid.
        path: PathBuf,
        /// Details of the download.
        report: FetchReport,
    },
}

impl TopoOutcome {
    /// Path of the cached grid.
    pub fn path(&self) -> &Path {
        match self {
            TopoOutcome::Cached(path) => path,
            TopoOutcome::Downloaded { path, .. } => path,
        }
    }
}

/// Makes sure each domain has its topography grid on disk.
///
/// The grid is cached at the domain's `topo_file` under the case directory;
/// if that file exists nothing is fetched. Invocations are independent, but
/// two processes working on the same cache path at once may see a partial
/// file.
///
/// # Example
///
/// ```no_run
/// use clawtopo_dem::{DomainConfig, TopoManager};
/// use std::path::Path;
///
/// let domain = DomainConfig::from_yaml_file("case/domain.yaml")?;
/// let manager = TopoManager::new()?;
/// let outcome = manager.ensure_topo(Path::new("case"), &domain)?;
/// println!("Topography at {}", outcome.path().display());
/// # Ok::<(), clawtopo_dem::TopoError>(())
/// ```
#[derive(Debug)]
pub struct TopoManager<C: HttpClient = ReqwestClient> {
    fetcher: Fetcher<C>,
    source: DataSource,
    token: Option<AuthToken>,
}

impl TopoManager<ReqwestClient> {
    /// A manager using the real HTTP client and the National Elevation source.
    pub fn new() -> Result<Self> {
        Ok(Self::with_fetcher(Fetcher::with_default_client()?))
    }
}

impl<C: HttpClient> TopoManager<C> {
    /// A manager using `fetcher` and the National Elevation source.
    pub fn with_fetcher(fetcher: Fetcher<C>) -> Self {
        Self {
            fetcher,
            source: DataSource::default(),
            token: None,
        }
    }

    /// Select the data source and the token it needs, if any.
    pub fn with_source(mut self, source: DataSource, token: Option<AuthToken>) -> Self {
        self.source = source;
        self.token = token;
        self
    }

    /// The configured data source.
    pub fn source(&self) -> DataSource {
        self.source
    }

    /// The fetcher in use.
    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    /// Ensure the topography grid for `domain` exists under `case_dir`.
    ///
    /// On a cache miss the raster is fetched to `<cache>.tif`, converted to
    /// `<cache>`, and the raster removed. If conversion fails, any partial
    /// grid is removed so it is not taken for a cache hit later; the raster
    /// stays behind for inspection.
    pub fn ensure_topo(&self, case_dir: &Path, domain: &DomainConfig) -> Result<TopoOutcome> {
        let cache = cache_path(domain, case_dir);
        if cache.is_file() {
            info!(path = %cache.display(), "Topography already cached");
            return Ok(TopoOutcome::Cached(cache));
        }

        info!(path = %cache.display(), "Topography not found, downloading");
        let plan = resolve(domain, case_dir)?;
        if let Some(parent) = plan.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let raster = raster_path_for(&plan.cache_path);
        let report = self.fetcher.fetch(
            &plan.extent,
            plan.resolution,
            self.source,
            self.token.as_ref(),
            &raster,
        )?;

        if let Err(e) = convert(&raster, &plan.cache_path) {
            if plan.cache_path.exists() {
                if let Err(remove_err) = fs::remove_file(&plan.cache_path) {
                    warn!(
                        path = %plan.cache_path.display(),
                        error = %remove_err,
                        "Could not remove partial grid"
                    );
                }
            }
            warn!(raster = %raster.display(), "Conversion failed; raster left in place");
            return Err(e);
        }

        fs::remove_file(&raster)?;
        info!(path = %plan.cache_path.display(), "Topography ready");

        Ok(TopoOutcome::Downloaded {
            path: plan.cache_path,
            report,
        })
    }
}

/// Ensure the topography for `domain` using the National Elevation source.
pub fn ensure_topo(case_dir: &Path, domain: &DomainConfig) -> Result<TopoOutcome> {
    TopoManager::new()?.ensure_topo(case_dir, domain)
}
