//! Conversation memory.
//!
//! Each conversation keeps a bounded window of its most recent messages.
//! Conversations are independent; a per-conversation lock serializes
//! requests that share an identifier.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use paimon_core::{ConversationId, Message};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default window size.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// A sliding window over the most recent messages of one conversation.
#[derive(Debug, Clone)]
pub struct MessageWindowMemory {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl MessageWindowMemory {
    /// Creates an empty window holding at most `max_messages` (at least 1).
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        let max_messages = max_messages.max(1);
        Self {
            messages: VecDeque::with_capacity(max_messages),
            max_messages,
        }
    }

    /// Appends a message, evicting the oldest ones past the limit.
    pub fn add(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// Returns the messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Returns the number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the window size.
    #[must_use]
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }
}

impl Default for MessageWindowMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}

/// Exclusive access to one conversation's window for the length of a request.
pub type MemorySession = OwnedMutexGuard<MessageWindowMemory>;

/// Windows keyed by conversation, created on first use.
#[derive(Debug)]
pub struct ChatMemoryStore {
    windows: DashMap<ConversationId, Arc<Mutex<MessageWindowMemory>>>,
    max_messages: usize,
}

impl ChatMemoryStore {
    /// Creates a store whose windows hold `max_messages` each.
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_messages: max_messages.max(1),
        }
    }

    /// Returns the per-conversation window size.
    #[must_use]
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    fn window(&self, id: &ConversationId) -> Arc<Mutex<MessageWindowMemory>> {
        // Clone the Arc out so the map shard lock is not held while awaiting.
        self.windows
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(MessageWindowMemory::new(self.max_messages))))
            .clone()
    }

    /// Locks a conversation for the duration of a request.
    ///
    /// Requests on other conversations are not blocked.
    pub async fn session(&self, id: &ConversationId) -> MemorySession {
        self.window(id).lock_owned().await
    }

    /// Appends a message to a conversation.
    pub async fn append(&self, id: &ConversationId, message: Message) {
        self.session(id).await.add(message);
    }

    /// Returns a conversation's messages, oldest first. Unknown ids yield none.
    pub async fn get(&self, id: &ConversationId) -> Vec<Message> {
        let window = self.windows.get(id).map(|w| w.value().clone());
        match window {
            Some(window) => window.lock().await.messages(),
            None => Vec::new(),
        }
    }

    /// Forgets a conversation and drops its entry.
    ///
    /// A request already holding the session finishes against the detached
    /// window, which is emptied once that request releases it.
    pub async fn clear(&self, id: &ConversationId) {
        if let Some((_, window)) = self.windows.remove(id) {
            window.lock().await.clear();
        }
    }

    /// Returns the number of known conversations.
    ///
    /// Every distinct id keeps an entry until it is cleared.
    #[must_use]
    pub fn conversations(&self) -> usize {
        self.windows.len()
    }
}

impl Default for ChatMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGES)
    }
}
