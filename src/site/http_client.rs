use crate::config::SiteConfig;
use crate::site::SiteError;
use rand::seq::SliceRandom;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use url::Url;

const FALLBACK_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper over `reqwest::Client` that knows the site root and sends a
/// randomly picked browser user agent with every request.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    base_url: Url,
    user_agents: Vec<String>,
}

impl HttpClient {
    /// Stateless client, used for catalog search.
    pub fn new(config: &SiteConfig) -> Result<Self, SiteError> {
        Self::build(config, false)
    }

    /// Client with its own cookie jar. One per login; never shared.
    pub fn with_cookies(config: &SiteConfig) -> Result<Self, SiteError> {
        Self::build(config, true)
    }

    fn build(config: &SiteConfig, cookies: bool) -> Result<Self, SiteError> {
        let base_url = parse_base_url(&config.base_url)?;

        let inner = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(cookies)
            .build()?;

        Ok(Self {
            inner,
            base_url,
            user_agents: config.user_agents.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a site path such as `/new/`, kept under the base path.
    pub fn url(&self, path: &str) -> Result<Url, SiteError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SiteError::Unexpected(format!("bad site path {:?}: {}", path, e)))
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.inner
            .get(url)
            .header(reqwest::header::USER_AGENT, self.user_agent())
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.inner
            .post(url)
            .header(reqwest::header::USER_AGENT, self.user_agent())
    }

    fn user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, SiteError> {
    // Url::join replaces the last segment unless the base ends with a slash.
    let raw = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| SiteError::Unexpected(format!("bad base url {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join_keeps_base_path() {
        let cfg = SiteConfig {
            base_url: "http://127.0.0.1:9/mirror".into(),
            ..SiteConfig::default()
        };
        let client = HttpClient::new(&cfg).unwrap();
        assert_eq!(client.url("new/").unwrap().as_str(), "http://127.0.0.1:9/mirror/new/");
        assert_eq!(client.url("/new/").unwrap().as_str(), "http://127.0.0.1:9/mirror/new/");
    }

    #[test]
    fn test_bad_base_url() {
        let cfg = SiteConfig {
            base_url: "not a url".into(),
            ..SiteConfig::default()
        };
        assert!(matches!(HttpClient::new(&cfg), Err(SiteError::Unexpected(_))));
    }

    #[test]
    fn test_empty_user_agent_pool_falls_back() {
        let cfg = SiteConfig {
            user_agents: vec![],
            ..SiteConfig::default()
        };
        let client = HttpClient::new(&cfg).unwrap();
        assert_eq!(client.user_agent(), FALLBACK_USER_AGENT);
    }
}
