use crate::config::SiteConfig;
use crate::models::{QueryTerms, SearchResult};
use crate::site::http_client::HttpClient;
use crate::site::parsers::extract_search_entries;
use crate::site::{CatalogSearch, SiteError, SEARCH_PATH};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};
use url::form_urlencoded;

/// Catalog search over `GET /search/?name=<query>`.
pub struct SearchClient {
    client: HttpClient,
}

impl SearchClient {
    pub fn new(config: &SiteConfig) -> Result<Self, SiteError> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }

    /// Search URL; each term is form-encoded on its own, then joined with `+`.
    fn search_url(&self, query: &QueryTerms) -> Result<url::Url, SiteError> {
        let encoded = query
            .pieces()
            .into_iter()
            .map(|piece| form_urlencoded::byte_serialize(piece.as_bytes()).collect::<String>())
            .collect::<Vec<_>>()
            .join("+");

        let mut url = self.client.url(SEARCH_PATH)?;
        url.set_query(Some(&format!("name={}", encoded)));
        Ok(url)
    }

    /// All entries on the result page, in the site's order.
    ///
    /// A blank query returns nothing without touching the network, and a
    /// non-200 answer is an empty result rather than an error. Transport
    /// failures (including timeouts) surface as `SiteError::Transport`.
    pub async fn search(&self, query: impl Into<QueryTerms>) -> Result<Vec<SearchResult>, SiteError> {
        let query = query.into();
        if query.is_blank() {
            debug!("Blank query, skipping search");
            return Ok(vec![]);
        }

        let url = self.search_url(&query)?;
        debug!("GET {}", url);

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            debug!("Search for {:?} answered {}, treating as empty", query.normalize(), status);
            return Ok(vec![]);
        }

        let html = resp.text().await?;
        let results = extract_search_entries(&html, self.client.base_url());
        info!("Search {:?}: {} results", query.normalize(), results.len());
        Ok(results)
    }
}

#[async_trait]
impl CatalogSearch for SearchClient {
    async fn search(&self, query: QueryTerms) -> Result<Vec<SearchResult>, SiteError> {
        SearchClient::search(self, query).await
    }
}
