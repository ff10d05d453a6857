//! PostgreSQL-backed message store.
//!
//! Uniqueness is pushed down to a database constraint on `message_id`; a
//! unique violation surfaces as `StoreError::Duplicate` rather than an error
//! the caller has to inspect.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use super::{MessageStore, NewMessage, StoreError, StoredMessage};

const ALL_COLUMNS: &str = "id, message_id, sender, recipient, subject, body_plain, body_html, \
     raw_mime, metadata, received_at, processed_at, is_processed";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn init(&self) -> Result<(), StoreError> {
        info!("store_schema_init");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inbound_emails (
                id BIGSERIAL PRIMARY KEY,
                message_id TEXT NOT NULL,
                sender TEXT NOT NULL DEFAULT '',
                recipient TEXT NOT NULL DEFAULT '',
                subject TEXT,
                body_plain TEXT,
                body_html TEXT,
                raw_mime TEXT,
                metadata JSONB,
                received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                processed_at TIMESTAMPTZ,
                is_processed BOOLEAN NOT NULL DEFAULT FALSE,
                CONSTRAINT inbound_emails_message_id_key UNIQUE (message_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl MessageStore for PostgresStore {
    async fn exists(&self, message_id: &str) -> Result<bool, StoreError> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM inbound_emails WHERE message_id = $1)")
                .bind(message_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(found)
    }

    async fn create(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let sql = format!(
            "INSERT INTO inbound_emails \
                 (message_id, sender, recipient, subject, body_plain, body_html, raw_mime, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ALL_COLUMNS}"
        );

        let stored = sqlx::query_as::<_, StoredMessage>(&sql)
            .bind(&message.message_id)
            .bind(&message.sender)
            .bind(&message.recipient)
            .bind(&message.subject)
            .bind(&message.body_plain)
            .bind(&message.body_html)
            .bind(&message.raw_mime)
            .bind(&message.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db)
                    if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
                {
                    StoreError::Duplicate(message.message_id.clone())
                }
                _ => StoreError::Database(e),
            })?;

        info!(message_id = %stored.message_id, "message_stored");
        Ok(stored)
    }

    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        let sql = format!("SELECT {ALL_COLUMNS} FROM inbound_emails WHERE message_id = $1");

        let message = sqlx::query_as::<_, StoredMessage>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    async fn mark_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE inbound_emails SET is_processed = TRUE, processed_at = NOW() \
             WHERE message_id = $1",
        )
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
