//! Bookkeeping for in-flight interactions.
//!
//! Every interaction gets its own [`CancellationToken`], a child of the
//! process shutdown token, so `/cancel` can stop one chat's jobs and
//! shutdown stops all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::transport::ChatId;

pub struct InteractionRegistry {
    root: CancellationToken,
    next_id: AtomicU64,
    active: Mutex<HashMap<ChatId, HashMap<u64, CancellationToken>>>,
}

/// Registration of one running interaction. Dropping it unregisters the
/// interaction.
pub struct InteractionHandle {
    registry: Arc<InteractionRegistry>,
    chat_id: ChatId,
    id: u64,
    token: CancellationToken,
}

impl InteractionRegistry {
    pub fn new(root: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            root,
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Register a new interaction for `chat_id`.
    pub fn begin(self: &Arc<Self>, chat_id: ChatId) -> InteractionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();

        self.lock()
            .entry(chat_id)
            .or_default()
            .insert(id, token.clone());

        InteractionHandle {
            registry: Arc::clone(self),
            chat_id,
            id,
            token,
        }
    }

    /// Cancel every interaction of `chat_id`. Returns how many were
    /// running.
    pub fn cancel_chat(&self, chat_id: ChatId) -> usize {
        let active = self.lock();
        let Some(tokens) = active.get(&chat_id) else {
            return 0;
        };
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Number of running interactions across all chats.
    pub fn active_count(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn chat_count(&self, chat_id: ChatId) -> usize {
        self.lock().get(&chat_id).map_or(0, HashMap::len)
    }

    fn remove(&self, chat_id: ChatId, id: u64) {
        let mut active = self.lock();
        if let Some(tokens) = active.get_mut(&chat_id) {
            tokens.remove(&id);
            if tokens.is_empty() {
                active.remove(&chat_id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatId, HashMap<u64, CancellationToken>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InteractionHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InteractionHandle {
    fn drop(&mut self) {
        self.registry.remove(self.chat_id, self.id);
    }
}
