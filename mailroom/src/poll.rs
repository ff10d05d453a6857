//! Poll ingestion job: the pull-based fallback path.
//!
//! Each run fetches a bounded batch of the provider's most recent "stored"
//! events and reconciles them against the message store. Existing records are
//! never updated (first-write-wins); the store's unique constraint absorbs
//! races against concurrent webhook deliveries. A fetch failure aborts the
//! run with a log line, never an error — the next scheduled run retries
//! naturally.

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::store::{MessageStore, NewMessage, StoreError};

/// Outcome counts for one poll run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Events returned by the provider.
    pub fetched: usize,
    /// Records created this run.
    pub new: usize,
    /// Events skipped because the message was already stored.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Value>,
}

/// Authenticated client for the provider's events API.
pub struct EventsClient {
    http: reqwest::Client,
    base_url: String,
    domain: String,
    api_key: String,
}

impl EventsClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.mailgun_api_base.clone(),
            domain: config.mailgun_domain.clone(),
            api_key: config.mailgun_api_key.clone(),
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/{}/events",
            self.base_url.trim_end_matches('/'),
            self.domain
        )
    }

    /// Fetch up to `limit` of the most recent "stored" events.
    pub async fn fetch_stored_events(&self, limit: u32) -> anyhow::Result<Vec<Value>> {
        let response = self
            .http
            .get(self.events_url())
            .basic_auth("api", Some(&self.api_key))
            .query(&[("event", "stored"), ("limit", &limit.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("events API returned {status}: {body}");
        }

        let events: EventsResponse = response.json().await?;
        Ok(events.items)
    }
}

fn header_str<'a>(event: &'a Value, name: &str) -> Option<&'a str> {
    event.get("message")?.get("headers")?.get(name)?.as_str()
}

fn message_str<'a>(event: &'a Value, name: &str) -> Option<&'a str> {
    event.get("message")?.get(name)?.as_str()
}

/// Reconcile a batch of stored events against the message store.
///
/// Events without a message id are skipped with a warning; the rest of the
/// batch is still processed. A `Duplicate` from the store counts as skipped,
/// same as a positive existence pre-check.
pub async fn reconcile_events(store: &dyn MessageStore, items: &[Value]) -> PollReport {
    let mut report = PollReport {
        fetched: items.len(),
        ..PollReport::default()
    };

    for event in items {
        let message_id = match header_str(event, "message-id").filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                warn!("poll_event_missing_message_id");
                continue;
            }
        };

        match store.exists(&message_id).await {
            Ok(true) => {
                report.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!(message_id = %message_id, error = %e, "poll_store_check_failed");
                continue;
            }
        }

        let new_message = NewMessage {
            message_id: message_id.clone(),
            sender: header_str(event, "from").unwrap_or_default().to_string(),
            recipient: header_str(event, "to").unwrap_or_default().to_string(),
            subject: header_str(event, "subject").map(str::to_string),
            body_plain: message_str(event, "body-plain").map(str::to_string),
            body_html: message_str(event, "body-html").map(str::to_string),
            raw_mime: message_str(event, "mime").map(str::to_string),
            metadata: Some(event.clone()),
        };

        match store.create(new_message).await {
            Ok(_) => report.new += 1,
            Err(StoreError::Duplicate(_)) => {
                // A webhook delivery beat us to it between check and insert.
                report.skipped += 1;
            }
            Err(e) => {
                // Not counted at all; the next run will see it as new again.
                error!(message_id = %message_id, error = %e, "poll_store_failed");
            }
        }
    }

    report
}

/// Run one poll pass: fetch the recent stored events and reconcile them.
///
/// Connection failures and non-2xx responses abort the run; they are logged
/// and an empty report is returned rather than an error, since the schedule
/// will retry on its own.
pub async fn run_poll(client: &EventsClient, store: &dyn MessageStore, limit: u32) -> PollReport {
    let items = match client.fetch_stored_events(limit).await {
        Ok(items) => items,
        Err(e) => {
            error!(error = %e, "poll_fetch_failed");
            return PollReport::default();
        }
    };

    info!(fetched = items.len(), "poll_events_fetched");

    let report = reconcile_events(store, &items).await;

    info!(
        fetched = report.fetched,
        new = report.new,
        skipped = report.skipped,
        "poll_run_complete"
    );

    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn stored_event(message_id: &str, from: &str, subject: &str) -> Value {
        json!({
            "message": {
                "headers": {
                    "message-id": message_id,
                    "from": from,
                    "to": "team@example.com",
                    "subject": subject,
                },
                "body-plain": "Plain text",
                "body-html": "<p>HTML</p>",
                "mime": "raw mime",
            }
        })
    }

    #[tokio::test]
    async fn test_reconcile_creates_new_emails() {
        let store = MemoryStore::new();
        let items = vec![
            stored_event("msg-123", "alice@example.com", "Hello"),
            stored_event("msg-456", "charlie@example.com", "World"),
        ];

        let report = reconcile_events(&store, &items).await;

        assert_eq!(report, PollReport { fetched: 2, new: 2, skipped: 0 });

        let email = store.get("msg-123").await.unwrap().unwrap();
        assert_eq!(email.sender, "alice@example.com");
        assert_eq!(email.subject.as_deref(), Some("Hello"));
        assert_eq!(email.body_plain.as_deref(), Some("Plain text"));
        assert_eq!(email.raw_mime.as_deref(), Some("raw mime"));
        assert!(email.metadata.is_some());

        let email = store.get("msg-456").await.unwrap().unwrap();
        assert_eq!(email.sender, "charlie@example.com");
    }

    #[tokio::test]
    async fn test_reconcile_second_run_skips_everything() {
        let store = MemoryStore::new();
        let items = vec![
            stored_event("msg-123", "alice@example.com", "Hello"),
            stored_event("msg-456", "charlie@example.com", "World"),
        ];

        reconcile_events(&store, &items).await;
        let report = reconcile_events(&store, &items).await;

        assert_eq!(report, PollReport { fetched: 2, new: 0, skipped: 2 });
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_skips_event_without_message_id() {
        let store = MemoryStore::new();
        let items = vec![
            json!({"message": {"headers": {"from": "a@example.com"}}}),
            stored_event("msg-789", "bob@example.com", "Still processed"),
        ];

        let report = reconcile_events(&store, &items).await;

        // The id-less event counts toward neither new nor skipped, and the
        // rest of the batch still goes through.
        assert_eq!(report, PollReport { fetched: 2, new: 1, skipped: 0 });
        assert!(store.exists("msg-789").await.unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_never_updates_existing_records() {
        let store = MemoryStore::new();
        store
            .create(crate::store::NewMessage {
                message_id: "msg-123".to_string(),
                sender: "original@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let items = vec![stored_event("msg-123", "imposter@example.com", "Replaced?")];
        let report = reconcile_events(&store, &items).await;

        assert_eq!(report, PollReport { fetched: 1, new: 0, skipped: 1 });
        let email = store.get("msg-123").await.unwrap().unwrap();
        assert_eq!(email.sender, "original@example.com");
    }

    #[tokio::test]
    async fn test_cross_path_dedup_with_webhook_record() {
        // A message first seen via the webhook path must not be duplicated
        // by a later poll run carrying the same id.
        let store = MemoryStore::new();
        store
            .create(crate::store::NewMessage {
                message_id: "shared-id".to_string(),
                sender: "john@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let items = vec![stored_event("shared-id", "john@example.com", "Hi")];
        let report = reconcile_events(&store, &items).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(store.len(), 1);
    }

    fn test_client(base_url: &str) -> EventsClient {
        let config = Config {
            port: 0,
            database_url: String::new(),
            mailgun_signing_key: None,
            mailgun_api_key: "key-abc".to_string(),
            mailgun_domain: "mail.example.com".to_string(),
            mailgun_api_base: base_url.to_string(),
            poll_limit: 300,
            s3_bucket: None,
            s3_region: None,
        };
        EventsClient::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn test_events_url() {
        let client = test_client("https://api.mailgun.net/v3/");

        assert_eq!(
            client.events_url(),
            "https://api.mailgun.net/v3/mail.example.com/events"
        );
    }

    #[tokio::test]
    async fn test_run_poll_connection_failure_returns_empty_report() {
        let store = MemoryStore::new();
        // Port 1 is never listening; the connection is refused immediately.
        let client = test_client("http://127.0.0.1:1");

        let report = run_poll(&client, &store, 300).await;

        assert_eq!(report, PollReport::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_poll_non_2xx_returns_empty_report() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\n\
                      content-length: 0\r\nconnection: close\r\n\r\n",
                )
                .await;
        });

        let store = MemoryStore::new();
        let client = test_client(&format!("http://{addr}"));

        let report = run_poll(&client, &store, 300).await;

        assert_eq!(report, PollReport::default());
        assert!(store.is_empty());
    }
}
