pub mod http_client;
pub mod parsers;
pub mod search;
pub mod session;
pub mod upload;

use crate::models::{QueryTerms, SearchResult, UploadOutcome, UploadRequest};
use async_trait::async_trait;
use reqwest::StatusCode;

pub use self::search::SearchClient;
pub use self::upload::SiteUploader;

/// Name of the hidden anti-forgery field on every myinstants form.
pub const TOKEN_FIELD: &str = "csrfmiddlewaretoken";

pub const LOGIN_PATH: &str = "/accounts/login/";
pub const UPLOAD_PATH: &str = "/new/";
pub const SEARCH_PATH: &str = "/search/";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Http(StatusCode),

    #[error("unexpected page layout: {0}")]
    InvalidPage(&'static str),

    #[error("login rejected")]
    Login,

    #[error("an instant with this name already exists")]
    NameAlreadyExists,

    #[error("audio file exceeds the site size limit")]
    FileSizeExceeded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl SiteError {
    /// Timeouts and connection failures; worth trying again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SiteError::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// Catalog lookup used by the inline-query surface.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    async fn search(&self, query: QueryTerms) -> Result<Vec<SearchResult>, SiteError>;
}

/// One complete upload attempt: authenticate, then submit.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome, SiteError>;
}
