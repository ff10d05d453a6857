//! Mailroom - deduplicated dual-path inbound email ingestion.
//!
//! Inbound email arrives over two redundant paths and is persisted exactly
//! once per provider message id:
//! - `mailroom-web`: webhook push path, one signed HTTP request per message
//! - `mailroom-poll`: pull path, reconciles the provider's recent "stored"
//!   events against the same store
//!
//! ## Architecture
//!
//! ```text
//! Provider webhook → Web Server ─┐
//!                                ├→ Message Store (unique message_id)
//! Provider events API → Poller ──┘
//! ```
//!
//! The store's unique constraint on the message id is the only
//! synchronization point between the two producers.

pub mod config;
pub mod html;
pub mod poll;
pub mod storage;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use poll::{reconcile_events, run_poll, EventsClient, PollReport};
pub use storage::ObjectStorage;
pub use store::{MemoryStore, MessageStore, NewMessage, PostgresStore, StoreError, StoredMessage};
pub use web::AppState;
