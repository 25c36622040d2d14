//! HTTP client abstraction for testability.
//!
//! The fetcher and the token request only need two verbs: a GET with query
//! parameters and a form POST. Both return the raw status and body so that
//! callers decide which statuses are fatal and which are worth retrying.

use crate::{Result, TopoError};
use serde_json::Value;
use std::time::Duration;

/// Query or form parameters, in the order they are sent.
pub type Params = [(&'static str, String)];

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Full response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP operations used by the topography pipeline.
///
/// Implementations follow redirects and only return `Err` for transport
/// failures; non-success statuses come back as ordinary responses.
pub trait HttpClient {
    /// Perform a GET with the given query parameters.
    fn get(&self, url: &str, query: &Params) -> Result<HttpResponse>;

    /// Perform a POST with a URL-encoded form body.
    fn post_form(&self, url: &str, form: &Params) -> Result<HttpResponse>;
}

impl<C: HttpClient + ?Sized> HttpClient for &C {
    fn get(&self, url: &str, query: &Params) -> Result<HttpResponse> {
        (**self).get(url, query)
    }

    fn post_form(&self, url: &str, form: &Params) -> Result<HttpResponse> {
        (**self).post_form(url, form)
    }
}

/// Connection setup limit for [`ReqwestClient::new`].
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Create a client that bounds connection setup only.
    ///
    /// Prepared rasters can be large, so a transfer that is making progress
    /// is never cut off.
    pub fn new() -> Result<Self> {
        Self::from_builder(Self::builder(CONNECT_TIMEOUT))
    }

    /// Create a client that also bounds each whole request by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::from_builder(Self::builder(CONNECT_TIMEOUT).timeout(timeout))
    }

    /// Builder with a connect timeout and no overall request timeout.
    fn builder(connect_timeout: Duration) -> reqwest::blocking::ClientBuilder {
        reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
    }

    fn from_builder(builder: reqwest::blocking::ClientBuilder) -> Result<Self> {
        Ok(Self {
            client: builder.build()?,
        })
    }

    fn collect(response: reqwest::blocking::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, query: &Params) -> Result<HttpResponse> {
        let response = self.client.get(url).query(query).send()?;
        Self::collect(response)
    }

    fn post_form(&self, url: &str, form: &Params) -> Result<HttpResponse> {
        let response = self.client.post(url).form(form).send()?;
        Self::collect(response)
    }
}

/// Turn a metadata response into JSON, rejecting HTTP and ArcGIS-level errors.
///
/// ArcGIS REST endpoints report many failures as `200 OK` with an `error`
/// object in the body, so both layers are checked.
pub(crate) fn arcgis_json(url: &str, response: &HttpResponse, field: &'static str) -> Result<Value> {
    if !response.is_success() {
        return Err(TopoError::Service {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status),
        });
    }

    let json: Value =
        serde_json::from_slice(&response.body).map_err(|_| TopoError::MalformedResponse {
            url: url.to_string(),
            field,
        })?;

    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        let reason = match code {
            Some(code) => format!("{} (code {})", message, code),
            None => message.to_string(),
        };
        return Err(TopoError::Service {
            url: url.to_string(),
            reason,
        });
    }

    Ok(json)
}

/// Extract a string field from an ArcGIS JSON body.
pub(crate) fn string_field(url: &str, json: &Value, field: &'static str) -> Result<String> {
    json.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TopoError::MalformedResponse {
            url: url.to_string(),
            field,
        })
}
