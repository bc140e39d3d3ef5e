use super::{ConversationContext, Driver, Input, State, ABORTING, NO_CONVERSATION};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Chat user identifier as handed over by the messaging layer.
pub type UserId = i64;

#[derive(Clone)]
struct Entry {
    ctx: Arc<tokio::sync::Mutex<ConversationContext>>,
    cancelled: Arc<AtomicBool>,
}

impl Entry {
    fn new() -> Self {
        let ctx = ConversationContext::new();
        let cancelled = ctx.cancel_flag();
        Self {
            ctx: Arc::new(tokio::sync::Mutex::new(ctx)),
            cancelled,
        }
    }

    fn same(&self, other: &Entry) -> bool {
        Arc::ptr_eq(&self.ctx, &other.ctx)
    }
}

/// Read-only view of a user's conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: State,
    pub audio_path: Option<PathBuf>,
    pub display_name: Option<String>,
}

/// Live upload conversations, one per user.
///
/// Inputs for the same user are handled strictly one after another (the
/// context lock is held across the upload); different users never share a
/// lock and run concurrently.
pub struct Registry {
    driver: Driver,
    entries: Mutex<HashMap<UserId, Entry>>,
}

impl Registry {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, user: UserId) -> Option<Entry> {
        self.entries.lock().ok()?.get(&user).cloned()
    }

    fn remove_if_same(&self, user: UserId, entry: &Entry) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.get(&user).is_some_and(|e| e.same(entry)) {
                entries.remove(&user);
            }
        }
    }

    /// Begin a new upload for `user`, abandoning any previous one.
    pub async fn start(&self, user: UserId) -> Vec<String> {
        let entry = Entry::new();
        let previous = match self.entries.lock() {
            Ok(mut entries) => entries.insert(user, entry),
            Err(_) => None,
        };

        if let Some(old) = previous {
            info!("User {} restarted an upload, dropping the old one", user);
            old.cancelled.store(true, Ordering::SeqCst);
            old.ctx.lock().await.cleanup();
        }

        debug!("User {} started an upload", user);
        vec![self.driver.greeting()]
    }

    /// Feed one input into the user's conversation and return the replies.
    pub async fn dispatch(&self, user: UserId, input: Input) -> Vec<String> {
        let Some(entry) = self.lookup(user) else {
            return match input {
                Input::Cancel => vec![ABORTING.to_string()],
                _ => vec![NO_CONVERSATION.to_string()],
            };
        };

        if input == Input::Cancel {
            return self.cancel(user, entry).await;
        }

        let mut ctx = entry.ctx.lock().await;
        let step = self.driver.handle(&mut ctx, input).await;
        if step.state == State::Terminal {
            debug!("User {} conversation finished", user);
            self.remove_if_same(user, &entry);
        }
        step.replies
    }

    /// Cancel wins against an upload in flight: the flag is raised and the
    /// entry dropped before waiting for the context, so the pending upload
    /// result is discarded when it arrives.
    async fn cancel(&self, user: UserId, entry: Entry) -> Vec<String> {
        entry.cancelled.store(true, Ordering::SeqCst);
        self.remove_if_same(user, &entry);
        info!("User {} cancelled the upload", user);

        let mut ctx = entry.ctx.lock().await;
        self.driver.handle(&mut ctx, Input::Cancel).await.replies
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.lookup(user).is_some()
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub async fn snapshot(&self, user: UserId) -> Option<Snapshot> {
        let entry = self.lookup(user)?;
        let ctx = entry.ctx.lock().await;
        Some(Snapshot {
            state: ctx.state(),
            audio_path: ctx.audio_path().map(|p| p.to_path_buf()),
            display_name: ctx.display_name().map(str::to_string),
        })
    }
}
