//! Stored message record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted inbound email, keyed by the provider-assigned message id.
///
/// At most one row exists per `message_id`; the database enforces this with
/// a unique constraint so that the webhook and poll paths can race safely.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    /// Provider-assigned message id, globally unique. The dedup key.
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
    /// Raw MIME source, populated by the poll path only.
    pub raw_mime: Option<String>,
    /// Full original event/request payload, kept for forensic replay.
    /// Provider-defined shape; never read back programmatically.
    pub metadata: Option<serde_json::Value>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub is_processed: bool,
}

/// Fields for a new record. `received_at` defaults to ingestion time and
/// `is_processed` to false at the store level.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
    pub raw_mime: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
