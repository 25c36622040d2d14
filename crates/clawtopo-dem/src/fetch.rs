//! Raster export from an ArcGIS image service.
//!
//! Exporting is a two step exchange. The `exportImage` call returns JSON
//! describing a file the server prepares asynchronously; the file itself is
//! then polled at a fixed interval until it can be downloaded.
//!
//! ## Polling
//!
//! After every unsuccessful poll the fetcher waits [`POLL_INTERVAL`] and adds
//! it to the accumulated wait. Once the accumulated wait exceeds
//! [`MAX_POLL_WAIT`] the fetch fails with [`TopoError::RetrievalTimeout`].
//! Both limits are fixed. The wait is counted in nominal intervals rather
//! than wall-clock time, so request latency does not count against it.

use crate::http::{arcgis_json, string_field, HttpClient, HttpResponse, ReqwestClient};
use crate::{AuthToken, DataSource, Extent, GridSize, Result, TopoError};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Wait between polls of the prepared raster.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Give up once the accumulated poll wait exceeds this.
pub const MAX_POLL_WAIT: Duration = Duration::from_secs(300);

/// No-data sentinel requested from the service.
pub const NO_DATA_VALUE: f32 = -9999.0;

/// EPSG code of the spatial reference used for the query and the output (Web Mercator).
pub const WEB_MERCATOR_EPSG: u32 = 3857;

/// Resampling hint passed to the service.
const INTERPOLATION: &str = "RSP_BilinearInterpolation";

/// Parameters of one `exportImage` request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportQuery {
    /// Snapped extent.
    pub extent: Extent,
    /// Output raster size in pixels.
    pub size: GridSize,
    /// Service to query.
    pub source: DataSource,
}

impl ExportQuery {
    /// Snap `extent` to whole pixels of `resolution` and build the query.
    ///
    /// The upper bounds are always recomputed as `lower + size * resolution`,
    /// even if the caller already snapped them.
    pub fn new(extent: &Extent, resolution: f64, source: DataSource) -> Result<Self> {
        let (extent, size) = extent.snapped(resolution)?;
        Ok(Self {
            extent,
            size,
            source,
        })
    }

    /// Query parameters, in the order they are sent.
    ///
    /// The token is attached for sources that need one; otherwise the
    /// latest-acquisition mosaic rule is requested instead.
    pub fn params(&self, token: Option<&AuthToken>) -> Vec<(&'static str, String)> {
        let e = &self.extent;
        let mut params = vec![
            ("f", "json".to_string()),
            ("bbox", format!("{},{},{},{}", e.xmin, e.ymin, e.xmax, e.ymax)),
            ("size", format!("{},{}", self.size.width, self.size.height)),
            ("imageSR", WEB_MERCATOR_EPSG.to_string()),
            ("bboxSr", WEB_MERCATOR_EPSG.to_string()),
            ("format", "tiff".to_string()),
            ("pixelType", "F32".to_string()),
            ("noData", NO_DATA_VALUE.to_string()),
            ("interpolation", INTERPOLATION.to_string()),
        ];

        match (self.source.requires_token(), token) {
            (true, Some(token)) => params.push(("token", token.as_str().to_string())),
            (true, None) => {}
            (false, _) => params.push((
                "mosaicRule",
                crate::source::LATEST_ACQUISITION_MOSAIC_RULE.to_string(),
            )),
        }

        params
    }
}

/// Outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Extent actually requested, after snapping.
    pub extent: Extent,
    /// Raster size in pixels.
    pub size: GridSize,
    /// URL the raster was downloaded from.
    pub href: String,
    /// Number of polls issued against `href`, including the successful one.
    pub attempts: u32,
    /// Accumulated wait between polls.
    pub waited: Duration,
    /// Size of the raster file written.
    pub bytes: u64,
}

/// Downloads elevation rasters from an export endpoint.
pub struct Fetcher<C: HttpClient = ReqwestClient> {
    client: C,
    sleep: fn(Duration),
}

impl<C: HttpClient> std::fmt::Debug for Fetcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("poll_interval", &POLL_INTERVAL)
            .field("max_poll_wait", &MAX_POLL_WAIT)
            .finish_non_exhaustive()
    }
}

impl Fetcher<ReqwestClient> {
    /// Create a fetcher backed by a real HTTP client.
    pub fn with_default_client() -> Result<Self> {
        Ok(Self::new(ReqwestClient::new()?))
    }
}

impl<C: HttpClient> Fetcher<C> {
    /// Create a fetcher that sleeps the calling thread between polls.
    pub fn new(client: C) -> Self {
        Self {
            client,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the function used to wait between polls.
    ///
    /// The accumulated wait is still counted in [`POLL_INTERVAL`] steps, so a
    /// no-op here simulates the full timeout instantly.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Export the raster for `extent` at `resolution` and write it to `raster_path`.
    ///
    /// Creates or overwrites `raster_path`; its parent directory must exist.
    pub fn fetch(
        &self,
        extent: &Extent,
        resolution: f64,
        source: DataSource,
        token: Option<&AuthToken>,
        raster_path: &Path,
    ) -> Result<FetchReport> {
        if source.requires_token() && token.is_none() {
            return Err(TopoError::MissingToken {
                source_name: source.name().to_string(),
            });
        }

        let query = ExportQuery::new(extent, resolution, source)?;
        let href = self.request_export(&query, token)?;
        let (response, attempts, waited) = self.retrieve(&href)?;

        std::fs::write(raster_path, &response.body)?;
        let bytes = response.body.len() as u64;
        info!(
            path = %raster_path.display(),
            bytes,
            attempts,
            "Raster downloaded"
        );

        Ok(FetchReport {
            extent: query.extent,
            size: query.size,
            href,
            attempts,
            waited,
            bytes,
        })
    }

    /// Issue the `exportImage` call and return the prepared file URL.
    fn request_export(&self, query: &ExportQuery, token: Option<&AuthToken>) -> Result<String> {
        let url = query.source.export_url();
        info!(
            source = %query.source,
            extent = %query.extent,
            width = query.size.width,
            height = query.size.height,
            "Requesting raster export"
        );

        let response = self.client.get(url, &query.params(token))?;
        let json = arcgis_json(url, &response, "href")?;
        let href = string_field(url, &json, "href")?;
        debug!(%href, "Export prepared");
        Ok(href)
    }

    /// Poll `href` until it returns 200 or the wait ceiling is exceeded.
    fn retrieve(&self, href: &str) -> Result<(HttpResponse, u32, Duration)> {
        let mut waited = Duration::ZERO;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let response = self.client.get(href, &[])?;
            if response.status == 200 {
                return Ok((response, attempts, waited));
            }

            (self.sleep)(POLL_INTERVAL);
            waited += POLL_INTERVAL;
            debug!(
                status = response.status,
                attempts,
                waited_secs = waited.as_secs(),
                "Raster not ready"
            );

            if waited > MAX_POLL_WAIT {
                return Err(TopoError::RetrievalTimeout {
                    url: href.to_string(),
                    status: response.status,
                    waited,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Params;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const EXPORT_OK: &str = r#"{"href":"https://files.example/raster.tif","width":10}"#;

    /// Replays canned export and poll responses.
    struct Script {
        export: HttpResponse,
        polls: RefCell<VecDeque<HttpResponse>>,
        fallback_poll: u16,
        queries: RefCell<Vec<(String, Vec<(String, String)>)>>,
    }

    impl Script {
        fn new(export_body: &str, polls: Vec<u16>, fallback_poll: u16) -> Self {
            let polls = polls
                .into_iter()
                .map(|status| HttpResponse {
                    status,
                    body: if status == 200 { b"TIFF".to_vec() } else { Vec::new() },
                })
                .collect();
            Self {
                export: HttpResponse {
                    status: 200,
                    body: export_body.as_bytes().to_vec(),
                },
                polls: RefCell::new(polls),
                fallback_poll,
                queries: RefCell::new(Vec::new()),
            }
        }

        fn poll_count(&self) -> usize {
            self.queries
                .borrow()
                .iter()
                .filter(|(url, _)| url.starts_with("https://files.example"))
                .count()
        }

        fn export_params(&self) -> Vec<(String, String)> {
            self.queries
                .borrow()
                .iter()
                .find(|(url, _)| url.ends_with("/exportImage"))
                .map(|(_, q)| q.clone())
                .unwrap_or_default()
        }
    }

    impl HttpClient for Script {
        fn get(&self, url: &str, query: &Params) -> Result<HttpResponse> {
            let query = query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            self.queries.borrow_mut().push((url.to_string(), query));
            if url.ends_with("/exportImage") {
                return Ok(self.export.clone());
            }
            Ok(self
                .polls
                .borrow_mut()
                .pop_front()
                .unwrap_or(HttpResponse {
                    status: self.fallback_poll,
                    body: Vec::new(),
                }))
        }

        fn post_form(&self, _url: &str, _form: &Params) -> Result<HttpResponse> {
            panic!("fetcher never posts");
        }
    }

    fn no_sleep(_: Duration) {}

    fn fetcher(script: &Script) -> Fetcher<&Script> {
        Fetcher::new(script).with_sleep(no_sleep)
    }

    fn extent() -> Extent {
        Extent::new(0.0, 0.0, 99.5, 100.0).unwrap()
    }

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_query_resnaps_extent() {
        let query = ExportQuery::new(&extent(), 1.0, DataSource::NationalElevation).unwrap();
        assert_eq!(query.size, GridSize { width: 100, height: 100 });
        assert_eq!(query.extent.xmax, 100.0);
        assert_eq!(query.extent.xmin, 0.0);
    }

    #[test]
    fn test_query_params_national() {
        let query = ExportQuery::new(&extent(), 1.0, DataSource::NationalElevation).unwrap();
        let params: Vec<(String, String)> = query
            .params(None)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(param(&params, "bbox"), Some("0,0,100,100"));
        assert_eq!(param(&params, "size"), Some("100,100"));
        assert_eq!(param(&params, "imageSR"), Some("3857"));
        assert_eq!(param(&params, "bboxSr"), Some("3857"));
        assert_eq!(param(&params, "format"), Some("tiff"));
        assert_eq!(param(&params, "pixelType"), Some("F32"));
        assert_eq!(param(&params, "noData"), Some("-9999"));
        assert_eq!(param(&params, "interpolation"), Some(INTERPOLATION));
        assert!(param(&params, "mosaicRule").is_some());
        assert!(param(&params, "token").is_none());
    }

    #[test]
    fn test_query_params_world_carries_token() {
        let query =
            ExportQuery::new(&extent(), 1.0, DataSource::CommercialWorldElevation).unwrap();
        let token = AuthToken::new("tok");
        let params: Vec<(String, String)> = query
            .params(Some(&token))
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(param(&params, "token"), Some("tok"));
        assert!(param(&params, "mosaicRule").is_none());
    }

    #[test]
    fn test_missing_token_fails_before_network() {
        let script = Script::new(EXPORT_OK, vec![200], 200);
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(&script)
            .fetch(
                &extent(),
                1.0,
                DataSource::CommercialWorldElevation,
                None,
                &dir.path().join("out.tif"),
            )
            .unwrap_err();
        assert!(matches!(err, TopoError::MissingToken { .. }));
        assert!(script.queries.borrow().is_empty());
    }

    #[test]
    fn test_fetch_retries_until_ready() {
        let script = Script::new(EXPORT_OK, vec![404, 404, 503, 200], 404);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");

        let report = fetcher(&script)
            .fetch(&extent(), 1.0, DataSource::NationalElevation, None, &path)
            .unwrap();

        assert_eq!(report.attempts, 4);
        assert_eq!(report.waited, POLL_INTERVAL * 3);
        assert_eq!(report.bytes, 4);
        assert_eq!(report.href, "https://files.example/raster.tif");
        assert_eq!(report.extent.xmax, 100.0);
        assert_eq!(std::fs::read(&path).unwrap(), b"TIFF");
        assert_eq!(param(&script.export_params(), "size"), Some("100,100"));
    }

    #[test]
    fn test_fetch_times_out() {
        let script = Script::new(EXPORT_OK, Vec::new(), 404);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");

        let err = fetcher(&script)
            .fetch(&extent(), 1.0, DataSource::NationalElevation, None, &path)
            .unwrap_err();

        match err {
            TopoError::RetrievalTimeout { status, waited, .. } => {
                assert_eq!(status, 404);
                assert_eq!(waited, Duration::from_secs(303));
            }
            other => panic!("expected RetrievalTimeout, got {:?}", other),
        }
        // 3 s steps until the total passes 300 s: 101 polls.
        assert_eq!(script.poll_count(), 101);
        assert!(!path.exists());
    }

    #[test]
    fn test_success_on_last_allowed_poll() {
        // 100 failures accumulate exactly 300 s, which does not exceed the ceiling.
        let mut polls = vec![500; 100];
        polls.push(200);
        let script = Script::new(EXPORT_OK, polls, 500);
        let dir = tempfile::tempdir().unwrap();

        let report = fetcher(&script)
            .fetch(
                &extent(),
                1.0,
                DataSource::NationalElevation,
                None,
                &dir.path().join("out.tif"),
            )
            .unwrap();
        assert_eq!(report.attempts, 101);
        assert_eq!(report.waited, MAX_POLL_WAIT);
    }

    #[test]
    fn test_export_http_error_is_not_retried() {
        let mut script = Script::new(EXPORT_OK, vec![200], 200);
        script.export.status = 500;
        let dir = tempfile::tempdir().unwrap();

        let err = fetcher(&script)
            .fetch(
                &extent(),
                1.0,
                DataSource::NationalElevation,
                None,
                &dir.path().join("out.tif"),
            )
            .unwrap_err();
        assert!(matches!(err, TopoError::Service { .. }));
        assert_eq!(script.queries.borrow().len(), 1);
    }

    #[test]
    fn test_export_without_href_is_malformed() {
        let script = Script::new(r#"{"width":10}"#, vec![200], 200);
        let dir = tempfile::tempdir().unwrap();

        let err = fetcher(&script)
            .fetch(
                &extent(),
                1.0,
                DataSource::NationalElevation,
                None,
                &dir.path().join("out.tif"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TopoError::MalformedResponse { field: "href", .. }
        ));
        assert_eq!(script.poll_count(), 0);
    }
}
