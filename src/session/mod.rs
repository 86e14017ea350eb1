//! Authenticated session management
//!
//! A [`SessionManager`] owns one account's cookie and CSRF token. Nothing
//! here is shared between accounts; each account loop holds its own manager
//! and passes it explicitly to every component that talks to the portal.
//!
//! A request rejected for authorization triggers a full re-login, never a
//! token refresh, followed by exactly one retry of the rejected call.

use crate::error::{Error, Result};
use crate::parser;
use crate::portal::{paths, Credentials, PortalClient, RequestKind};
use crate::utils::error::ParseError;
use std::future::Future;
use tracing::{debug, info, instrument, warn};

/// Cookie and CSRF token of a logged-in session
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Value for the `Cookie` header
    pub cookie: String,

    /// Token for `X-CSRF-Token` and the booking form's `authenticity_token`
    pub csrf_token: String,
}

impl AuthContext {
    pub fn new(cookie: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            csrf_token: csrf_token.into(),
        }
    }

    /// Headers material for a portal request
    pub fn credentials(&self) -> Credentials<'_> {
        Credentials::new(&self.cookie, Some(self.csrf_token.as_str()))
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("cookie", &crate::utils::mask(&self.cookie))
            .field("csrf_token", &crate::utils::mask(&self.csrf_token))
            .finish()
    }
}

/// Per-account session state
pub struct SessionManager {
    client: PortalClient,
    email: String,
    password: String,
    schedule_id: Option<String>,
    context: Option<AuthContext>,
    login_count: u32,
}

impl SessionManager {
    /// Create an unauthenticated session for one account
    pub fn new(client: PortalClient, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client,
            email: email.into(),
            password: password.into(),
            schedule_id: None,
            context: None,
            login_count: 0,
        }
    }

    /// Transport this session talks through
    pub fn client(&self) -> &PortalClient {
        &self.client
    }

    /// Current context, if logged in
    pub fn context(&self) -> Option<&AuthContext> {
        self.context.as_ref()
    }

    /// Number of full logins performed so far
    pub fn login_count(&self) -> u32 {
        self.login_count
    }

    /// Schedule the session's form token is scoped to
    pub fn schedule_id(&self) -> Option<&str> {
        self.schedule_id.as_deref()
    }

    /// Drop the current context; the next call logs in again
    pub fn invalidate(&mut self) {
        self.context = None;
    }

    /// Return the current context, logging in first if there is none
    ///
    /// Calling this repeatedly without an intervening
    /// [`invalidate`](Self::invalidate) performs exactly one login.
    pub async fn ensure_authenticated(&mut self) -> Result<AuthContext> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }

        let mut context = self.login().await?;
        if let Some(schedule_id) = self.schedule_id.clone() {
            context = self.load_form_token(&schedule_id, context).await?;
        }

        self.context = Some(context.clone());
        Ok(context)
    }

    /// Scope the session to a schedule and fetch its form token
    ///
    /// Re-logins after this point refresh the form token automatically.
    pub async fn bind_schedule(&mut self, schedule_id: &str) -> Result<AuthContext> {
        self.schedule_id = Some(schedule_id.to_string());

        match self.context.take() {
            Some(context) => {
                let context = self.load_form_token(schedule_id, context).await?;
                self.context = Some(context.clone());
                Ok(context)
            }
            None => self.ensure_authenticated().await,
        }
    }

    /// Run an authenticated portal call
    ///
    /// On an authorization failure the session logs in again and the call
    /// is retried once. A second authorization failure is reported as
    /// [`Error::AuthorizationExpired`]; it is never retried here.
    pub async fn authorized<T, F, Fut>(&mut self, operation: F) -> Result<T>
    where
        F: Fn(PortalClient, AuthContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let context = self.ensure_authenticated().await?;

        match operation(self.client.clone(), context).await {
            Err(e) if e.is_unauthorized() => {
                warn!(account = %self.email, error = %e, "Session rejected, logging in again");
                self.invalidate();

                let context = self.ensure_authenticated().await?;
                match operation(self.client.clone(), context).await {
                    Err(e) if e.is_unauthorized() => {
                        self.invalidate();
                        Err(Error::AuthorizationExpired)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Full login: sign-in page for the initial token, then credentials
    #[instrument(skip(self), fields(account = %self.email))]
    async fn login(&mut self) -> Result<AuthContext> {
        let sign_in = paths::sign_in();

        debug!("Loading sign-in page");
        let page = self
            .client
            .get_page(
                &sign_in,
                &[],
                RequestKind::Document,
                &sign_in,
                Credentials::none(),
            )
            .await?;
        let csrf_token = parser::extract_csrf_token(&page.body)?;
        let initial_cookie = page.cookie.unwrap_or_default();

        debug!("Submitting credentials");
        let form = [
            ("user[email]", self.email.as_str()),
            ("user[password]", self.password.as_str()),
            ("policy_confirmed", "1"),
            ("commit", "Sign In"),
        ];
        let response = self
            .client
            .post_form(
                &sign_in,
                &form,
                RequestKind::SignIn,
                &sign_in,
                Credentials::new(&initial_cookie, Some(csrf_token.as_str())),
            )
            .await?;

        let cookie = response.cookie.ok_or(ParseError::SessionCookieMissing)?;
        self.login_count += 1;
        info!(login_count = self.login_count, "Logged in");

        Ok(AuthContext::new(cookie, csrf_token))
    }

    /// Load the appointment page for its form token and rotated cookie
    async fn load_form_token(&self, schedule_id: &str, context: AuthContext) -> Result<AuthContext> {
        debug!(account = %self.email, schedule_id, "Loading appointment page for form token");
        let page = self
            .client
            .get_page(
                &paths::appointment(schedule_id),
                &[],
                RequestKind::Navigation,
                &paths::continue_actions(schedule_id),
                Credentials::new(&context.cookie, None),
            )
            .await?;

        let csrf_token = parser::extract_csrf_token(&page.body)?;
        Ok(AuthContext {
            cookie: page.cookie.unwrap_or(context.cookie),
            csrf_token,
        })
    }
}
