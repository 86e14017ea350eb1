//! HTTP transport for the remote scheduling portal
//!
//! [`PortalClient`] knows how to reach the portal and nothing about what the
//! pages mean:
//! - per-account rate limiting with governor
//! - browser-like headers per request kind
//! - session cookie capture from `Set-Cookie`
//! - mapping of authorization failures (401, bounce to sign-in) to
//!   [`FetchError::Unauthorized`]
//!
//! Session state is never stored here; callers pass cookie and CSRF token
//! explicitly on every call.

pub mod headers;

use crate::config::Settings;
use crate::utils::error::FetchError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header::SET_COOKIE, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub use headers::{build_portal_headers, Credentials, RequestKind};

/// Path of the sign-in page relative to the portal base URL
pub const SIGN_IN_PATH: &str = "/users/sign_in";

/// Relative paths of the portal endpoints
pub mod paths {
    /// Applications dashboard
    pub fn dashboard() -> String {
        String::new()
    }

    /// Sign-in page and credential endpoint
    pub fn sign_in() -> String {
        super::SIGN_IN_PATH.to_string()
    }

    /// Appointment page and booking form target
    pub fn appointment(schedule_id: &str) -> String {
        format!("/schedule/{schedule_id}/appointment")
    }

    /// Page the appointment page is normally reached from
    pub fn continue_actions(schedule_id: &str) -> String {
        format!("/schedule/{schedule_id}/continue_actions")
    }

    /// Available dates for a facility
    pub fn days(schedule_id: &str, facility_id: &str) -> String {
        format!("/schedule/{schedule_id}/appointment/days/{facility_id}.json")
    }

    /// Available times for a facility on a date
    pub fn times(schedule_id: &str, facility_id: &str) -> String {
        format!("/schedule/{schedule_id}/appointment/times/{facility_id}.json")
    }
}

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct PortalPage {
    /// HTTP status of the final response
    pub status: u16,

    /// Response body
    pub body: String,

    /// `name=value` pairs from the response's `Set-Cookie` headers
    pub cookie: Option<String>,
}

/// Rate-limited HTTP client bound to one portal base URL
///
/// Cloning is cheap; clones share the connection pool and the rate limiter.
#[derive(Clone)]
pub struct PortalClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,

    /// Base URL, e.g. `https://ais.usvisa-info.com/en-ca/niv`
    base_url: String,

    /// Scheme and host of the base URL, sent as `Origin` on form posts
    origin: String,

    /// User agent string
    user_agent: String,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PortalClient {
    /// Create a client for the portal of a given account country
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn for_country(settings: &Settings, country: &str) -> Result<Self, FetchError> {
        Self::with_config(
            &settings.base_url_for(country),
            settings.portal.requests_per_second,
            settings.request_timeout(),
            &settings.portal.user_agent,
        )
    }

    /// Create a client with an explicit base URL
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` if `base_url` does not parse and
    /// `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let parsed =
            url::Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        let origin = parsed.origin().ascii_serialization();

        // Cookies are tracked explicitly per session, never by the client
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(false)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            client,
            rate_limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
            origin,
            user_agent: user_agent.to_string(),
        })
    }

    /// Base URL all paths are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a relative portal path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(
        &self,
        kind: RequestKind,
        referer_path: &str,
        credentials: Credentials<'_>,
    ) -> reqwest::header::HeaderMap {
        build_portal_headers(
            kind,
            &self.user_agent,
            &self.url(referer_path),
            &self.origin,
            credentials,
        )
    }

    /// Fetch an HTML page
    pub async fn get_page(
        &self,
        path: &str,
        query: &[(&str, &str)],
        kind: RequestKind,
        referer_path: &str,
        credentials: Credentials<'_>,
    ) -> Result<PortalPage, FetchError> {
        let request = self
            .client
            .get(self.url(path))
            .query(query)
            .headers(self.headers(kind, referer_path, credentials));

        let response = self.send(request, path).await?;
        Self::into_page(response).await
    }

    /// Submit a form and return the resulting page
    pub async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
        kind: RequestKind,
        referer_path: &str,
        credentials: Credentials<'_>,
    ) -> Result<PortalPage, FetchError> {
        let request = self
            .client
            .post(self.url(path))
            .headers(self.headers(kind, referer_path, credentials))
            .form(form);

        let response = self.send(request, path).await?;
        Self::into_page(response).await
    }

    /// Fetch and decode a JSON endpoint
    ///
    /// A body that does not decode as `T` is reported as
    /// `FetchError::Decode`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        referer_path: &str,
        credentials: Credentials<'_>,
    ) -> Result<T, FetchError> {
        let request = self
            .client
            .get(self.url(path))
            .query(query)
            .headers(self.headers(RequestKind::Json, referer_path, credentials));

        let response = self.send(request, path).await?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!(path, body = %crate::utils::truncate_text(&body, 200), "Undecodable JSON");
            FetchError::Decode(e.to_string())
        })
    }

    /// Send a request after waiting on the rate limiter and classify the
    /// status
    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        tracing::trace!(path, status = status.as_u16(), "Portal response");

        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        // An expired session is redirected to the sign-in page with a 200
        if path != SIGN_IN_PATH && response.url().path().ends_with(SIGN_IN_PATH) {
            return Err(FetchError::Unauthorized(status.as_u16()));
        }

        Ok(response)
    }

    async fn into_page(response: Response) -> Result<PortalPage, FetchError> {
        let status = response.status().as_u16();
        let cookie = session_cookie(&response);
        let body = response.text().await?;
        Ok(PortalPage {
            status,
            body,
            cookie,
        })
    }
}

/// Collect the `name=value` part of every `Set-Cookie` header
fn session_cookie(response: &Response) -> Option<String> {
    let pairs: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
