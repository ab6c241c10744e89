//! Per-table chat ring buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::game::constants::CHAT_CAPACITY;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: i64,
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// FIFO chat history capped at [`CHAT_CAPACITY`] messages; the oldest
/// message is evicted to make room.
#[derive(Clone, Debug, Default)]
pub struct ChatRing {
    messages: VecDeque<ChatMessage>,
}

impl ChatRing {
    pub fn push(&mut self, user_id: i64, sender: String, text: String) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            user_id,
            sender,
            text,
            sent_at: Utc::now(),
        };
        if self.messages.len() == CHAT_CAPACITY {
            self.messages.pop_front();
        }
        self.messages.push_back(message.clone());
        message
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut ring = ChatRing::default();
        for i in 0..(CHAT_CAPACITY + 5) {
            ring.push(1, "alice".into(), format!("message {i}"));
        }
        assert_eq!(ring.len(), CHAT_CAPACITY);
        assert_eq!(ring.history()[0].text, "message 5");
        assert_eq!(
            ring.history().last().unwrap().text,
            format!("message {}", CHAT_CAPACITY + 4)
        );
    }

    #[test]
    fn preserves_sender_and_order() {
        let mut ring = ChatRing::default();
        ring.push(1, "alice".into(), "hi".into());
        ring.push(2, "bob".into(), "hello".into());
        let history = ring.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sender, "alice");
        assert_eq!(history[1].user_id, 2);
    }
}
