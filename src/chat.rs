//! Per-scope chat containers (§4.8): a persistent list plus a bounded
//! in-memory tail, keyed by `(container_type, name)`.

use crate::domain::{Message, Visibility};
use crate::store::GameStore;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const TAIL_SIZE: usize = 20;
pub const MAX_CONTENT_LEN: usize = 1024;

#[derive(Debug)]
pub enum ChatRejection {
    /// `payload.keys` was not exactly `{"content"}`.
    BadShape,
    TooLong,
}

/// One persistent chat log, with a bounded recent-message cache.
pub struct ChatLog {
    scope_key: String,
    tail: Mutex<VecDeque<Message>>,
}

impl ChatLog {
    #[must_use]
    pub fn new(scope_key: impl Into<String>) -> Self {
        Self {
            scope_key: scope_key.into(),
            tail: Mutex::new(VecDeque::with_capacity(TAIL_SIZE)),
        }
    }

    /// Validates a chat submission's shape (§4.8), independent of persistence.
    pub fn validate(message: &Message) -> Result<(), ChatRejection> {
        if message.payload.len() != 1 || !message.payload.contains_key("content") {
            return Err(ChatRejection::BadShape);
        }
        let Some(content) = message.payload.get("content").and_then(|v| v.as_str()) else {
            return Err(ChatRejection::BadShape);
        };
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(ChatRejection::TooLong);
        }
        Ok(())
    }

    /// Appends a validated message to durable storage and the in-memory tail.
    pub async fn append(&self, store: &dyn GameStore, message: Message) -> anyhow::Result<()> {
        store.append_chat_message(&self.scope_key, message.clone()).await?;
        let mut tail = self.tail.lock().await;
        if tail.len() == TAIL_SIZE {
            tail.pop_front();
        }
        tail.push_back(message);
        Ok(())
    }

    /// The in-memory tail, chronological order (oldest first).
    pub async fn recent(&self) -> Vec<Message> {
        self.tail.lock().await.iter().cloned().collect()
    }
}

pub type SharedChatLog = Arc<ChatLog>;

fn chat_message(uid: &str, content: &str, ts: i64) -> Message {
    let mut payload = serde_json::Map::new();
    payload.insert("content".to_string(), serde_json::Value::String(content.to_string()));
    Message {
        kind: "SEND_CHAT".to_string(),
        payload,
        visibility: Visibility::Global,
        user: Some(uid.to_string()),
        ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn validate_rejects_extra_keys() {
        let mut message = chat_message("u1", "hi", 0);
        message
            .payload
            .insert("extra".to_string(), serde_json::Value::Bool(true));
        assert!(matches!(ChatLog::validate(&message), Err(ChatRejection::BadShape)));
    }

    #[test]
    fn validate_rejects_non_string_content() {
        let mut message = chat_message("u1", "hi", 0);
        message
            .payload
            .insert("content".to_string(), serde_json::Value::Number(1.into()));
        assert!(matches!(ChatLog::validate(&message), Err(ChatRejection::BadShape)));
    }

    #[test]
    fn validate_rejects_overlong_content() {
        let message = chat_message("u1", &"x".repeat(MAX_CONTENT_LEN + 1), 0);
        assert!(matches!(ChatLog::validate(&message), Err(ChatRejection::TooLong)));
    }

    #[test]
    fn validate_accepts_well_formed_message() {
        let message = chat_message("u1", "gg", 0);
        assert!(ChatLog::validate(&message).is_ok());
    }

    #[tokio::test]
    async fn tail_drops_oldest_beyond_capacity() {
        let store = InMemoryStore::new();
        let log = ChatLog::new("0|MainLobby");
        for i in 0..(TAIL_SIZE + 5) {
            log.append(&store, chat_message("u1", "hi", i as i64)).await.unwrap();
        }
        let recent = log.recent().await;
        assert_eq!(recent.len(), TAIL_SIZE);
        assert_eq!(recent.first().unwrap().ts, 5);
        assert_eq!(recent.last().unwrap().ts, (TAIL_SIZE + 4) as i64);
    }

    #[tokio::test]
    async fn persistent_history_keeps_everything_past_the_tail() {
        use crate::store::GameStore;
        let store = InMemoryStore::new();
        let log = ChatLog::new("0|MainLobby");
        for i in 0..(TAIL_SIZE + 5) {
            log.append(&store, chat_message("u1", "hi", i as i64)).await.unwrap();
        }
        let history = store.chat_history("0|MainLobby").await.unwrap();
        assert_eq!(history.len(), TAIL_SIZE + 5);
    }
}
