use crate::config::{Credentials, SiteConfig};
use crate::site::http_client::HttpClient;
use crate::site::parsers::extract_token;
use crate::site::{SiteError, LOGIN_PATH, TOKEN_FIELD, UPLOAD_PATH};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

/// An authenticated browsing session. Owns its own cookie jar and is used for
/// exactly one upload attempt.
#[derive(Debug)]
pub struct Session {
    pub(crate) client: HttpClient,
    token: String,
    authenticated: bool,
    landing: Url,
}

impl Session {
    /// Most recent anti-forgery token issued by the site.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// URL the login redirect ended on.
    pub fn landing(&self) -> &Url {
        &self.landing
    }

    /// Adopt a token from a freshly loaded page.
    pub(crate) fn refresh_token(&mut self, token: String) {
        if token != self.token {
            debug!("Anti-forgery token refreshed");
        }
        self.token = token;
    }
}

/// Logs in to the site, one fresh session per call.
pub struct SessionManager {
    config: SiteConfig,
}

impl SessionManager {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SiteError> {
        let client = HttpClient::with_cookies(&self.config)?;
        let login_url = client.url(LOGIN_PATH)?;

        // ── 1. Login page: cookies + token ─────────────────────────────────────
        debug!("GET {}", login_url);
        let html = client.get(login_url.clone()).send().await?.text().await?;
        let token = extract_token(&html, TOKEN_FIELD)
            .ok_or(SiteError::InvalidPage("login form has no anti-forgery token"))?;

        // ── 2. Credentials ─────────────────────────────────────────────────────
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(TOKEN_FIELD, &token)
            .append_pair("login", &credentials.username)
            .append_pair("password", &credentials.password)
            .append_pair("next", UPLOAD_PATH)
            .finish();

        debug!("POST {} as {}", login_url, credentials.username);
        let resp = client
            .post(login_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::REFERER, login_url.as_str())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            warn!("Login answered {}", status);
            return Err(SiteError::Login);
        }

        // A successful login redirects away; staying on the form means rejection.
        let landing = resp.url().clone();
        if landing.path() == login_url.path() {
            warn!("Login form returned again, credentials rejected");
            return Err(SiteError::Login);
        }

        // ── 3. Keep whatever token the landing page re-issued ─────────────────
        let html = resp.text().await?;
        let mut session = Session {
            client,
            token,
            authenticated: true,
            landing,
        };
        if let Some(fresh) = extract_token(&html, TOKEN_FIELD) {
            session.refresh_token(fresh);
        }

        info!("Logged in as {}", credentials.username);
        Ok(session)
    }
}
