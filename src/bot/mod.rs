//! Chat-facing boundary: inline search answers and a line-based console that
//! speaks the same commands as the chat bot.

use crate::conversation::{Input, Registry, UserId};
use crate::models::{InlineVoice, QueryTerms};
use crate::site::CatalogSearch;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub const START_TEXT: &str = "Hi!\nYou can use this bot in any chat, just type \
    @myinstantsbot query message\nSend /upload to add your own instant.\nEnjoy!";

pub const HELP_TEXT: &str = "This bot searches sounds in myinstants.com\n\
    You can use it in any chat, just type @myinstantsbot query message\n\
    /upload starts uploading a new instant, /cancel aborts it.";

/// Answer an inline query. Search failures degrade to no results so the chat
/// surface never sees an error.
pub async fn inline_answers(
    search: &dyn CatalogSearch,
    query: impl Into<QueryTerms>,
    cap: usize,
) -> Vec<InlineVoice> {
    let query = query.into();
    let results = match search.search(query.clone()).await {
        Ok(results) => results,
        Err(e) => {
            warn!("Inline search for {:?} failed: {:#}", query.normalize(), e);
            return vec![];
        }
    };

    if results.len() > cap {
        debug!("Capping {} results at {}", results.len(), cap);
    }

    results
        .into_iter()
        .take(cap)
        .enumerate()
        .map(|(i, r)| InlineVoice {
            id: i.to_string(),
            title: r.display_name,
            voice_url: r.media_url,
        })
        .collect()
}

// ── Console surface ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Upload,
    Cancel,
    Status,
    Audio(PathBuf),
    Search(String),
    Text(String),
}

pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };

    let cmd = match head {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/upload" => Command::Upload,
        "/cancel" => Command::Cancel,
        "/status" => Command::Status,
        "/audio" if !rest.is_empty() => Command::Audio(PathBuf::from(rest)),
        "/search" => Command::Search(rest.to_string()),
        _ => Command::Text(line.to_string()),
    };
    Some(cmd)
}

pub struct Console<'a> {
    pub registry: &'a Registry,
    pub search: &'a dyn CatalogSearch,
    pub user: UserId,
    pub max_inline_results: usize,
}

impl Console<'_> {
    /// Replies for one console line.
    pub async fn respond(&self, command: Command) -> Vec<String> {
        match command {
            Command::Start => vec![START_TEXT.to_string()],
            Command::Help => vec![HELP_TEXT.to_string()],
            Command::Upload => self.registry.start(self.user).await,
            Command::Cancel => self.registry.dispatch(self.user, Input::Cancel).await,
            Command::Status => match self.registry.snapshot(self.user).await {
                Some(snap) => vec![format!(
                    "state={:?} name={} audio={}",
                    snap.state,
                    snap.display_name.as_deref().unwrap_or("-"),
                    snap.audio_path
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".into())
                )],
                None => vec!["No upload in progress.".to_string()],
            },
            Command::Audio(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => self.registry.dispatch(self.user, Input::Audio(bytes)).await,
                Err(e) => {
                    warn!("Could not read {:?}: {}", path, e);
                    vec![format!("Could not read {}", path.display())]
                }
            },
            Command::Search(query) => {
                let answers = inline_answers(self.search, query, self.max_inline_results).await;
                if answers.is_empty() {
                    vec!["No instants found.".to_string()]
                } else {
                    answers
                        .into_iter()
                        .map(|a| format!("{}\t{}", a.title, a.voice_url))
                        .collect()
                }
            }
            Command::Text(text) => self.registry.dispatch(self.user, Input::Text(text)).await,
        }
    }

    /// Read commands line by line until EOF. A conversation left open at EOF
    /// is cancelled so its temp file does not outlive the session.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(command) = parse_line(&line) else { continue };
            debug!("Console command {:?}", command);
            for reply in self.respond(command).await {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            writer.flush().await?;
        }

        if self.registry.is_active(self.user) {
            info!("Input closed with an upload in progress, cancelling");
            self.registry.dispatch(self.user, Input::Cancel).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::tests::{driver, FakeUploader};
    use crate::models::{SearchResult, UploadOutcome};
    use crate::site::SiteError;
    use async_trait::async_trait;
    use std::io::Write;

    struct FixedSearch(usize);

    #[async_trait]
    impl CatalogSearch for FixedSearch {
        async fn search(&self, _query: QueryTerms) -> Result<Vec<SearchResult>, SiteError> {
            Ok((0..self.0)
                .map(|i| SearchResult {
                    display_name: format!("clip {}", i),
                    media_url: format!("https://site/media/sounds/{}.mp3", i),
                })
                .collect())
        }
    }

    struct BrokenSearch;

    #[async_trait]
    impl CatalogSearch for BrokenSearch {
        async fn search(&self, _query: QueryTerms) -> Result<Vec<SearchResult>, SiteError> {
            Err(SiteError::Unexpected("offline".into()))
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("/upload"), Some(Command::Upload));
        assert_eq!(parse_line(" /cancel "), Some(Command::Cancel));
        assert_eq!(
            parse_line("/audio /tmp/a b.mp3"),
            Some(Command::Audio(PathBuf::from("/tmp/a b.mp3")))
        );
        assert_eq!(parse_line("/audio"), Some(Command::Text("/audio".into())));
        assert_eq!(parse_line("/search air horn"), Some(Command::Search("air horn".into())));
        assert_eq!(parse_line("Yes"), Some(Command::Text("Yes".into())));
    }

    #[tokio::test]
    async fn test_inline_answers_capped_at_40() {
        let answers = inline_answers(&FixedSearch(55), "clip", 40).await;
        assert_eq!(answers.len(), 40);
        assert_eq!(answers[0].title, "clip 0");
        assert_eq!(answers[39].voice_url, "https://site/media/sounds/39.mp3");
        assert_eq!(answers[39].id, "39");
    }

    #[tokio::test]
    async fn test_inline_answers_swallow_errors() {
        assert!(inline_answers(&BrokenSearch, "clip", 40).await.is_empty());
    }

    #[tokio::test]
    async fn test_console_upload_session() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = FakeUploader::with(vec![Ok(UploadOutcome::Confirmed(
            "https://site/instants/test-clip".into(),
        ))]);
        let registry = Registry::new(driver(uploader, dir.path()));

        let mut clip = tempfile::NamedTempFile::new().unwrap();
        clip.write_all(&[3u8; 10 * 1024]).unwrap();

        let script = format!(
            "/upload\n/audio {}\ntest-clip\nMaybe\nYes\n/status\n",
            clip.path().display()
        );
        let mut out = Vec::new();
        let console = Console {
            registry: &registry,
            search: &FixedSearch(0),
            user: 42,
            max_inline_results: 40,
        };
        console.run(script.as_bytes(), &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Send me the audio"));
        assert!(out.contains("Invalid confirmation word"));
        assert!(out.contains("Instant uploaded: https://site/instants/test-clip"));
        assert!(out.contains("No upload in progress."));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_console_eof_cancels_open_upload() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(driver(FakeUploader::with(vec![]), dir.path()));
        let mut clip = tempfile::NamedTempFile::new().unwrap();
        clip.write_all(&[3u8; 64]).unwrap();

        let script = format!("/upload\n/audio {}\n", clip.path().display());
        let console = Console {
            registry: &registry,
            search: &FixedSearch(0),
            user: 1,
            max_inline_results: 40,
        };
        console.run(script.as_bytes(), tokio::io::sink()).await.unwrap();

        assert!(!registry.is_active(1));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
