//! In-memory message store.
//!
//! Implements the same atomic-insert contract as the database-backed store:
//! the existence check and the insert happen under one lock, so concurrent
//! creates for the same message id produce exactly one record. Used as an
//! injectable fake in tests and embedded setups.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{MessageStore, NewMessage, StoreError, StoredMessage};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    messages: HashMap<String, StoredMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn exists(&self, message_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.messages.contains_key(message_id))
    }

    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        if inner.messages.contains_key(&message.message_id) {
            return Err(StoreError::Duplicate(message.message_id));
        }

        inner.next_id += 1;
        let stored = StoredMessage {
            id: inner.next_id,
            message_id: message.message_id.clone(),
            sender: message.sender,
            recipient: message.recipient,
            subject: message.subject,
            body_plain: message.body_plain,
            body_html: message.body_html,
            raw_mime: message.raw_mime,
            metadata: message.metadata,
            received_at: Utc::now(),
            processed_at: None,
            is_processed: false,
        };
        inner.messages.insert(message.message_id, stored.clone());

        Ok(stored)
    }

    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.messages.get(message_id).cloned())
    }

    async fn mark_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        match inner.messages.get_mut(message_id) {
            Some(message) => {
                message.is_processed = true;
                message.processed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_message(message_id: &str) -> NewMessage {
        NewMessage {
            message_id: message_id.to_string(),
            sender: "sender@example.com".to_string(),
            recipient: "recipient@example.com".to_string(),
            subject: Some("Test Subject".to_string()),
            body_plain: Some("This is the plain text body".to_string()),
            body_html: Some("<p>This is HTML body</p>".to_string()),
            raw_mime: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();

        let stored = store.create(new_message("test-message-id-123")).await.unwrap();
        assert_eq!(stored.message_id, "test-message-id-123");
        assert_eq!(stored.sender, "sender@example.com");
        assert!(!stored.is_processed);
        assert!(stored.processed_at.is_none());

        assert!(store.exists("test-message-id-123").await.unwrap());
        assert!(!store.exists("other-id").await.unwrap());

        let fetched = store.get("test-message-id-123").await.unwrap().unwrap();
        assert_eq!(fetched.subject.as_deref(), Some("Test Subject"));
    }

    #[tokio::test]
    async fn test_duplicate_message_id_rejected() {
        let store = MemoryStore::new();

        store.create(new_message("unique-id-001")).await.unwrap();
        let err = store.create(new_message("unique-id-001")).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(id) if id == "unique-id-001"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_create_stores_exactly_once() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create(new_message("raced-id")).await
            }));
        }

        let mut created = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::Duplicate(_)) => duplicates += 1,
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_processed() {
        let store = MemoryStore::new();
        store.create(new_message("to-process")).await.unwrap();

        assert!(store.mark_processed("to-process").await.unwrap());
        let message = store.get("to-process").await.unwrap().unwrap();
        assert!(message.is_processed);
        assert!(message.processed_at.is_some());

        assert!(!store.mark_processed("never-seen").await.unwrap());
    }
}
