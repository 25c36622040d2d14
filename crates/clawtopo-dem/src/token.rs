//! ArcGIS token request for the Esri World Elevation source.

use crate::http::{arcgis_json, string_field, HttpClient};
use crate::Result;
use std::fmt;
use tracing::{debug, info};

/// Public ArcGIS Online token endpoint. Callers pass it explicitly.
pub const DEFAULT_TOKEN_PORTAL: &str = "https://www.arcgis.com/sharing/rest/generateToken";

/// Referer the token is bound to when none is given.
pub const DEFAULT_REFERER: &str = "https://www.arcgis.com";

/// Default token lifetime in minutes.
pub const DEFAULT_TOKEN_EXPIRATION_MINUTES: u32 = 5;

/// Short-lived credential for an export request. Used once, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token obtained elsewhere.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Parameters of a token request.
#[derive(Clone)]
pub struct TokenRequest {
    /// Token endpoint URL.
    pub portal: String,
    /// ArcGIS account name.
    pub username: String,
    /// ArcGIS account password.
    pub password: String,
    /// Requested lifetime in minutes.
    pub expiration_minutes: u32,
    /// Referer the token is bound to.
    pub referer: String,
}

impl TokenRequest {
    /// A request against `portal` with the default lifetime and referer.
    pub fn new(
        portal: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            portal: portal.into(),
            username: username.into(),
            password: password.into(),
            expiration_minutes: DEFAULT_TOKEN_EXPIRATION_MINUTES,
            referer: DEFAULT_REFERER.to_string(),
        }
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("portal", &self.portal)
            .field("username", &self.username)
            .field("expiration_minutes", &self.expiration_minutes)
            .field("referer", &self.referer)
            .finish_non_exhaustive()
    }
}

/// Ask the token server for a token. One attempt, no retry.
pub fn request_token<C: HttpClient>(client: &C, request: &TokenRequest) -> Result<AuthToken> {
    let form = [
        ("f", "json".to_string()),
        ("username", request.username.clone()),
        ("password", request.password.clone()),
        ("client", "referer".to_string()),
        ("expiration", request.expiration_minutes.to_string()),
        ("referer", request.referer.clone()),
    ];

    debug!(portal = %request.portal, username = %request.username, "Requesting token");
    let response = client.post_form(&request.portal, &form)?;
    let json = arcgis_json(&request.portal, &response, "token")?;
    let token = string_field(&request.portal, &json, "token")?;
    info!(
        portal = %request.portal,
        minutes = request.expiration_minutes,
        "Obtained ArcGIS token"
    );

    Ok(AuthToken(token))
}
