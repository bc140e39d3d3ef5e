//! Upload conversation: one finite-state machine per chat user.
//!
//! ## Flow
//!
//! `Sound` (waiting for audio) → `Name` (waiting for a display name) →
//! `Confirmation` (waiting for Yes/No) → `Terminal`. The legal moves live in
//! [`State::on`]; [`Driver`] turns user input into events, performs the side
//! effects (temp file, upload) and applies the table.
//!
//! Reaching `Terminal` always deletes the temporary audio file.

pub mod registry;

use crate::config::UploadConfig;
use crate::models::{UploadOutcome, UploadRequest};
use crate::site::{SiteError, Uploader};
use crate::utils::fmt_kb;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

pub use self::registry::{Registry, UserId};

// ── Replies ───────────────────────────────────────────────────────────────────

pub const ASK_NAME: &str = "Nice! Now send me a name for this instant.";
pub const ASK_NAME_AGAIN: &str = "Okay, send me another name for this instant.";
pub const NOT_AUDIO: &str = "That is not an audio message. Send me a voice or audio file.";
pub const INVALID_CONFIRMATION: &str = "Invalid confirmation word. Answer Yes or No.";
pub const NAME_TAKEN: &str =
    "An instant with this name already exists. Send me a different name.";
pub const ABORTING: &str = "Upload aborted.";
pub const UPLOAD_FAILED: &str = "Sorry, the upload failed.";
pub const UPLOAD_FAILED_RETRY: &str =
    "Sorry, the site did not answer in time. Try again later with /upload.";
pub const NO_CONVERSATION: &str = "There is no upload in progress. Send /upload to start one.";

pub fn ask_audio(max_bytes: u64) -> String {
    format!("Send me the audio you want to upload (max {}).", fmt_kb(max_bytes))
}

fn audio_too_large(max_bytes: u64) -> String {
    format!("This audio is too large, the limit is {}. Aborting.", fmt_kb(max_bytes))
}

fn site_rejected_size(max_bytes: u64) -> String {
    format!(
        "The site says this audio is too large. Send me a smaller one (max {}).",
        fmt_kb(max_bytes)
    )
}

fn ask_confirmation(name: &str) -> String {
    format!("Upload this audio as \"{}\"? Answer Yes or No.", name)
}

// ── State table ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Sound,
    Name,
    Confirmation,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    AudioAccepted,
    AudioTooLarge,
    NameGiven,
    Declined,
    UnknownWord,
    Uploaded,
    NameTaken,
    FileTooLarge,
    Failed,
    Cancelled,
}

impl State {
    /// Next state for `event`, `None` when the move is not allowed.
    pub fn on(self, event: Event) -> Option<State> {
        use Event::*;
        use State::*;

        match (self, event) {
            (Sound, AudioAccepted) => Some(Name),
            (Sound, AudioTooLarge) => Some(Terminal),
            (Name, NameGiven) => Some(Confirmation),
            (Confirmation, Declined) => Some(Name),
            (Confirmation, UnknownWord) => Some(Confirmation),
            (Confirmation, Uploaded) => Some(Terminal),
            (Confirmation, NameTaken) => Some(Name),
            (Confirmation, FileTooLarge) => Some(Sound),
            (Sound | Name | Confirmation, Failed) => Some(Terminal),
            (_, Cancelled) => Some(Terminal),
            _ => None,
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Per-user conversation state. Owns the temporary audio file.
#[derive(Debug)]
pub struct ConversationContext {
    state: State,
    audio: Option<TempPath>,
    display_name: Option<String>,
    cancelled: Arc<AtomicBool>,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self {
            state: State::Sound,
            audio: None,
            display_name: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Flag shared with the registry so a cancel can be observed without
    /// holding the context lock.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Apply `event`. Illegal moves, and any move into `Confirmation` without
    /// both audio and name, leave the state untouched.
    fn advance(&mut self, event: Event) -> State {
        match self.state.on(event) {
            Some(State::Confirmation) if self.audio.is_none() || self.display_name.is_none() => {
                warn!("Refusing {:?}: audio or name missing", event);
            }
            Some(next) => {
                debug!("{:?} --{:?}--> {:?}", self.state, event, next);
                self.state = next;
            }
            None => warn!("Illegal transition {:?} on {:?}", self.state, event),
        }
        if self.state == State::Terminal {
            self.cleanup();
        }
        self.state
    }

    fn discard_audio(&mut self) {
        if let Some(path) = self.audio.take() {
            let shown = path.to_path_buf();
            match path.close() {
                Ok(()) => debug!("Removed {:?}", shown),
                Err(e) => warn!("Could not remove {:?}: {}", shown, e),
            }
        }
    }

    /// Delete the temp file and forget collected input. Safe to call twice.
    pub fn cleanup(&mut self) {
        self.discard_audio();
        self.display_name = None;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// A chat message, as far as the upload flow cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Audio(Vec<u8>),
    Text(String),
    Cancel,
}

/// Result of handling one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub replies: Vec<String>,
    pub state: State,
}

impl Step {
    fn reply(state: State, text: impl Into<String>) -> Self {
        Self {
            replies: vec![text.into()],
            state,
        }
    }

    fn silent(state: State) -> Self {
        Self {
            replies: vec![],
            state,
        }
    }
}

#[derive(Clone)]
pub struct Driver {
    uploader: Arc<dyn Uploader>,
    max_audio_bytes: u64,
    temp_dir: Option<PathBuf>,
}

impl Driver {
    pub fn new(uploader: Arc<dyn Uploader>, config: &UploadConfig) -> Self {
        Self {
            uploader,
            max_audio_bytes: config.max_audio_bytes,
            temp_dir: config.temp_dir.clone(),
        }
    }

    pub fn greeting(&self) -> String {
        ask_audio(self.max_audio_bytes)
    }

    pub async fn handle(&self, ctx: &mut ConversationContext, input: Input) -> Step {
        if input == Input::Cancel {
            let state = ctx.advance(Event::Cancelled);
            return Step::reply(state, ABORTING);
        }

        match (ctx.state(), input) {
            (State::Sound, Input::Audio(bytes)) => self.on_audio(ctx, bytes).await,
            (State::Sound, Input::Text(_)) => Step::reply(State::Sound, NOT_AUDIO),

            (State::Name, Input::Text(text)) => {
                let name = text.trim();
                if name.is_empty() {
                    return Step::reply(State::Name, ASK_NAME_AGAIN);
                }
                ctx.display_name = Some(name.to_string());
                let state = ctx.advance(Event::NameGiven);
                Step::reply(state, ask_confirmation(name))
            }
            (State::Name, Input::Audio(_)) => Step::reply(State::Name, ASK_NAME),

            (State::Confirmation, Input::Text(text)) => {
                let word = text.trim();
                if word.eq_ignore_ascii_case("yes") {
                    self.submit(ctx).await
                } else if word.eq_ignore_ascii_case("no") {
                    ctx.display_name = None;
                    let state = ctx.advance(Event::Declined);
                    Step::reply(state, ASK_NAME_AGAIN)
                } else {
                    let state = ctx.advance(Event::UnknownWord);
                    Step::reply(state, INVALID_CONFIRMATION)
                }
            }
            (State::Confirmation, Input::Audio(_)) => {
                Step::reply(State::Confirmation, INVALID_CONFIRMATION)
            }

            (State::Terminal, _) | (_, Input::Cancel) => {
                Step::reply(State::Terminal, NO_CONVERSATION)
            }
        }
    }

    async fn on_audio(&self, ctx: &mut ConversationContext, bytes: Vec<u8>) -> Step {
        if bytes.len() as u64 > self.max_audio_bytes {
            info!("Rejected {} byte audio (limit {})", bytes.len(), self.max_audio_bytes);
            let state = ctx.advance(Event::AudioTooLarge);
            return Step::reply(state, audio_too_large(self.max_audio_bytes));
        }

        match self.persist(&bytes).await {
            Ok(path) => {
                debug!("Stored {} byte audio at {:?}", bytes.len(), path);
                ctx.discard_audio();
                ctx.audio = Some(path);
                let state = ctx.advance(Event::AudioAccepted);
                Step::reply(state, ASK_NAME)
            }
            Err(e) => {
                error!("Could not store audio: {:#}", e);
                let state = ctx.advance(Event::Failed);
                Step::reply(state, UPLOAD_FAILED)
            }
        }
    }

    /// Write the clip to a fresh temp file; the path is deleted when dropped.
    async fn persist(&self, bytes: &[u8]) -> std::io::Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("instant-").suffix(".mp3");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let path = file.into_temp_path();
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn submit(&self, ctx: &mut ConversationContext) -> Step {
        let (Some(path), Some(name)) = (ctx.audio_path(), ctx.display_name()) else {
            error!("Confirmation reached without audio or name");
            let state = ctx.advance(Event::Failed);
            return Step::reply(state, UPLOAD_FAILED);
        };
        if ctx.is_cancelled() {
            info!("Conversation cancelled before upload, nothing sent");
            let state = ctx.advance(Event::Cancelled);
            return Step::silent(state);
        }
        let request = UploadRequest::new(name, path);

        let result = self.uploader.upload(&request).await;

        if ctx.is_cancelled() {
            info!("Conversation cancelled during upload, dropping result");
            let state = ctx.advance(Event::Cancelled);
            return Step::silent(state);
        }

        match result {
            Ok(UploadOutcome::Confirmed(url)) => {
                let state = ctx.advance(Event::Uploaded);
                Step::reply(state, format!("Instant uploaded: {}", url))
            }
            Ok(UploadOutcome::Unconfirmed(url)) => {
                let state = ctx.advance(Event::Uploaded);
                Step::reply(
                    state,
                    format!(
                        "The upload went through but I could not confirm the new instant. Check {}",
                        url
                    ),
                )
            }
            Err(SiteError::NameAlreadyExists) => {
                ctx.display_name = None;
                let state = ctx.advance(Event::NameTaken);
                Step::reply(state, NAME_TAKEN)
            }
            Err(SiteError::FileSizeExceeded) => {
                ctx.discard_audio();
                let state = ctx.advance(Event::FileTooLarge);
                Step::reply(state, site_rejected_size(self.max_audio_bytes))
            }
            Err(e) => {
                error!("Upload of {:?} failed: {:#}", request.display_name, e);
                let retry = e.is_retryable();
                let state = ctx.advance(Event::Failed);
                Step::reply(state, if retry { UPLOAD_FAILED_RETRY } else { UPLOAD_FAILED })
            }
        }
    }
}
