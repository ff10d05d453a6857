//! Message store: the durable record of inbound emails.
//!
//! Both ingestion paths (webhook push and poll reconcile) write through the
//! same store, and the store's atomic insert-by-unique-`message_id` is the
//! only synchronization point between them. A duplicate insert is a normal
//! control-flow outcome, not a failure.

pub mod memory;
pub mod postgres;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use types::{NewMessage, StoredMessage};

/// Store-level errors. `Duplicate` is expected under concurrent producers
/// and callers absorb it; `Database` is a genuine persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} is already stored")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence contract shared by both ingestion paths.
///
/// `create` must be atomic with respect to the uniqueness check: two
/// concurrent creates for the same never-seen `message_id` yield exactly one
/// stored record and one `StoreError::Duplicate`. A check-then-insert without
/// a store-level constraint does not satisfy this.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Whether a record with this message id already exists.
    async fn exists(&self, message_id: &str) -> Result<bool, StoreError>;

    /// Atomically insert a new record, failing with `Duplicate` if the
    /// message id is already present.
    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Fetch a stored message by its message id.
    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError>;

    /// Flag a message as processed, stamping `processed_at`. Returns false
    /// when no record with that id exists.
    async fn mark_processed(&self, message_id: &str) -> Result<bool, StoreError>;
}
