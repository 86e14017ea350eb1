//! Browser-like request headers for the scheduling portal
//!
//! The portal serves three kinds of traffic: full page navigations, XHR
//! calls to its JSON endpoints, and form submissions. Each gets the header
//! set a desktop browser would send for it.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION,
    CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT,
};

const DOCUMENT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
     image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

const JSON_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

const SIGN_IN_ACCEPT: &str = "*/*;q=0.5, text/javascript, application/javascript, \
     application/ecmascript, application/x-ecmascript";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Header carrying the CSRF token on XHR-style requests
pub const X_CSRF_TOKEN: &str = "x-csrf-token";

/// Shape of an outgoing portal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Page load (sign-in page, dashboard)
    Document,
    /// User-initiated navigation (appointment page)
    Navigation,
    /// XHR call to a JSON endpoint
    Json,
    /// Credential submission
    SignIn,
    /// Booking form submission
    Form,
}

impl RequestKind {
    fn is_document(&self) -> bool {
        matches!(self, Self::Document | Self::Navigation | Self::Form)
    }
}

/// Session material attached to a request
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub cookie: Option<&'a str>,
    pub csrf_token: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    /// Anonymous request (sign-in page)
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(cookie: &'a str, csrf_token: Option<&'a str>) -> Self {
        Self {
            cookie: Some(cookie),
            csrf_token,
        }
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn insert_static(headers: &mut HeaderMap, name: &'static str, value: &'static str) {
    headers.insert(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    );
}

/// Build the header set for one portal request
///
/// `origin` is only sent on booking form submissions.
pub fn build_portal_headers(
    kind: RequestKind,
    user_agent: &str,
    referer: &str,
    origin: &str,
    credentials: Credentials<'_>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert(&mut headers, USER_AGENT, user_agent);
    insert(&mut headers, REFERER, referer);
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    insert_static(&mut headers, "sec-ch-ua-mobile", "?0");
    insert_static(&mut headers, "sec-ch-ua-platform", "\"Windows\"");
    insert_static(&mut headers, "sec-fetch-site", "same-origin");

    if kind.is_document() {
        headers.insert(ACCEPT, HeaderValue::from_static(DOCUMENT_ACCEPT));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        insert_static(&mut headers, "sec-fetch-dest", "document");
        insert_static(&mut headers, "sec-fetch-mode", "navigate");
        insert_static(&mut headers, "upgrade-insecure-requests", "1");
    }

    match kind {
        RequestKind::Document => {}
        RequestKind::Navigation => {
            insert_static(&mut headers, "sec-fetch-user", "?1");
        }
        RequestKind::Json => {
            headers.insert(ACCEPT, HeaderValue::from_static(JSON_ACCEPT));
            insert_static(&mut headers, "x-requested-with", "XMLHttpRequest");
            insert_static(&mut headers, "sec-fetch-dest", "empty");
            insert_static(&mut headers, "sec-fetch-mode", "cors");
        }
        RequestKind::SignIn => {
            headers.insert(ACCEPT, HeaderValue::from_static(SIGN_IN_ACCEPT));
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
            insert_static(&mut headers, "x-requested-with", "XMLHttpRequest");
        }
        RequestKind::Form => {
            insert_static(&mut headers, "sec-fetch-user", "?1");
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
            insert(&mut headers, ORIGIN, origin);
        }
    }

    if let Some(cookie) = credentials.cookie {
        insert(&mut headers, COOKIE, cookie);
    }
    if let Some(token) = credentials.csrf_token {
        insert(&mut headers, HeaderName::from_static(X_CSRF_TOKEN), token);
    }

    headers
}
