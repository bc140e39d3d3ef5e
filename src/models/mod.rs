use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Search ────────────────────────────────────────────────────────────────────

/// One catalog entry as listed on a search page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub display_name: String,
    pub media_url: String,
}

/// Search input: either free text or pre-split terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTerms {
    Single(String),
    Terms(Vec<String>),
}

impl QueryTerms {
    /// Query segment as the site expects it: terms joined with `+`.
    pub fn normalize(&self) -> String {
        match self {
            QueryTerms::Single(s) => s.replace(' ', "+"),
            QueryTerms::Terms(terms) => terms.join("+"),
        }
    }

    /// Pieces that get percent-encoded individually and joined with `+`.
    pub fn pieces(&self) -> Vec<&str> {
        match self {
            QueryTerms::Single(s) => s.split(' ').collect(),
            QueryTerms::Terms(terms) => terms.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            QueryTerms::Single(s) => s.trim().is_empty(),
            QueryTerms::Terms(terms) => terms.iter().all(|t| t.trim().is_empty()),
        }
    }
}

impl From<&str> for QueryTerms {
    fn from(s: &str) -> Self {
        QueryTerms::Single(s.to_string())
    }
}

impl From<String> for QueryTerms {
    fn from(s: String) -> Self {
        QueryTerms::Single(s)
    }
}

impl From<Vec<String>> for QueryTerms {
    fn from(terms: Vec<String>) -> Self {
        QueryTerms::Terms(terms)
    }
}

// ── Upload ────────────────────────────────────────────────────────────────────

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// A clip ready to be submitted. Consumed once by the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub display_name: String,
    pub audio_path: PathBuf,
    pub content_type: &'static str,
}

impl UploadRequest {
    pub fn new(display_name: impl Into<String>, audio_path: impl AsRef<Path>) -> Self {
        Self {
            display_name: display_name.into(),
            audio_path: audio_path.as_ref().to_path_buf(),
            content_type: AUDIO_CONTENT_TYPE,
        }
    }

    /// File name sent in the multipart `sound` part.
    pub fn file_name(&self) -> String {
        self.audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sound.mp3".to_string())
    }
}

/// What a successful submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Permanent link of the new instant, found by exact name.
    Confirmed(String),
    /// The site accepted the form but the new entry could not be located;
    /// holds the landing page URL.
    Unconfirmed(String),
}

// ── Chat surface ──────────────────────────────────────────────────────────────

/// Voice result handed to the inline-query transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineVoice {
    pub id: String,
    pub title: String,
    pub voice_url: String,
}
