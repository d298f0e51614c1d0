//! Ordered in-memory message list for one joined room.
//!
//! INVARIANTS
//! ==========
//! - Oldest first. Prepends land strictly before every held message,
//!   appends strictly after.
//! - Ids are unique; a message whose id is already held is dropped.

#[cfg(test)]
#[path = "window_test.rs"]
mod window_test;

use std::collections::HashSet;

use events::ChatMessage;

#[derive(Clone, Debug, Default)]
pub struct MessageWindow {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageWindow {
    /// Replace the whole window with a history batch.
    ///
    /// The batch is stably sorted by creation time so a newest-first page
    /// still ends up oldest-first.
    pub fn replace(&mut self, batch: Vec<ChatMessage>) {
        self.messages.clear();
        self.ids.clear();
        for msg in sorted_batch(batch) {
            if self.ids.insert(msg.id.clone()) {
                self.messages.push(msg);
            }
        }
    }

    /// Put an older page in front of everything held. Returns how many
    /// messages were actually inserted.
    pub fn prepend(&mut self, page: Vec<ChatMessage>) -> usize {
        let fresh: Vec<ChatMessage> = sorted_batch(page)
            .into_iter()
            .filter(|msg| self.ids.insert(msg.id.clone()))
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.messages.splice(0..0, fresh);
        }
        added
    }

    /// Append one live message in arrival order. Returns `false` for a
    /// duplicate id.
    pub fn append(&mut self, msg: ChatMessage) -> bool {
        if !self.ids.insert(msg.id.clone()) {
            return false;
        }
        self.messages.push(msg);
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    #[must_use]
    pub fn oldest(&self) -> Option<&ChatMessage> {
        self.messages.first()
    }

    #[must_use]
    pub fn newest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }
}

fn sorted_batch(mut batch: Vec<ChatMessage>) -> Vec<ChatMessage> {
    batch.sort_by_key(|msg| msg.created_at);
    batch
}
