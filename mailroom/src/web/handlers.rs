//! Webhook endpoint handlers.
//!
//! The inbound endpoint answers `200` for every outcome it has permanently
//! resolved (stored, duplicate, missing id, even a persistence failure) so
//! the provider stops retrying; only a failed signature check gets a `403`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::html::render_preview;
use crate::store::{MessageStore, NewMessage, StoreError};
use crate::web::extract::{extract_email_fields, InboundForm};
use crate::web::signature::{is_signature_verification_enabled, verify_signature};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Inbound email webhook endpoint.
///
/// One provider request per message. The provider retries on non-2xx, so
/// every outcome this handler has already resolved answers 200; 403 is
/// reserved for a failed signature check.
pub async fn inbound_webhook(State(state): State<AppState>, form: InboundForm) -> Response {
    let fields = &form.fields;

    if form.ignored_files > 0 {
        info!(count = form.ignored_files, "webhook_attachments_ignored");
    }

    let token = fields.get("token").map(String::as_str).unwrap_or("");
    let timestamp = fields.get("timestamp").map(String::as_str).unwrap_or("");
    let signature = fields.get("signature").map(String::as_str).unwrap_or("");

    if is_signature_verification_enabled(&state.config.mailgun_signing_key) {
        let signing_key = state.config.mailgun_signing_key.as_deref().unwrap_or("");

        if !token.is_empty() && !timestamp.is_empty() && !signature.is_empty() {
            if !verify_signature(signing_key, timestamp, token, signature) {
                warn!("webhook_signature_invalid");
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({"error": "Invalid signature"})),
                )
                    .into_response();
            }
        } else {
            // Verification is best-effort: misconfigured senders still get
            // their mail stored, the anomaly just gets logged.
            warn!(
                has_token = !token.is_empty(),
                has_timestamp = !timestamp.is_empty(),
                has_signature = !signature.is_empty(),
                "webhook_signature_fields_missing"
            );
        }
    } else {
        warn!("webhook_signing_key_not_configured");
    }

    let email = extract_email_fields(fields);

    let Some(message_id) = email.message_id else {
        // 200 on purpose: an error status would make the provider retry a
        // request we can never store.
        warn!("webhook_missing_message_id");
        return (StatusCode::OK, "No Message-Id").into_response();
    };

    match state.store.exists(&message_id).await {
        Ok(true) => {
            info!(message_id = %message_id, "webhook_duplicate");
            return (StatusCode::OK, "Duplicate").into_response();
        }
        Ok(false) => {}
        Err(e) => {
            error!(message_id = %message_id, error = %e, "webhook_store_check_failed");
            return (StatusCode::OK, "Error saving email").into_response();
        }
    }

    let metadata = serde_json::to_value(fields).ok();
    let new_message = NewMessage {
        message_id: message_id.clone(),
        sender: email.sender,
        recipient: email.recipient,
        subject: email.subject,
        body_plain: email.body_plain,
        body_html: email.body_html,
        raw_mime: None,
        metadata,
    };

    match state.store.create(new_message).await {
        Ok(stored) => {
            info!(
                message_id = %stored.message_id,
                sender = %stored.sender,
                has_body_html = stored.body_html.is_some(),
                "webhook_stored"
            );
            (StatusCode::OK, "Received").into_response()
        }
        Err(StoreError::Duplicate(_)) => {
            // Lost the race against a concurrent delivery or a poll run.
            info!(message_id = %message_id, "webhook_duplicate");
            (StatusCode::OK, "Duplicate").into_response()
        }
        Err(e) => {
            error!(message_id = %message_id, error = %e, "webhook_store_failed");
            (StatusCode::OK, "Error saving email").into_response()
        }
    }
}

/// Read-only sanitized preview of a stored message.
pub async fn message_preview(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Response {
    match state.store.get(&message_id).await {
        Ok(Some(message)) => Html(render_preview(
            message.body_html.as_deref(),
            message.body_plain.as_deref(),
        ))
        .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            error!(message_id = %message_id, error = %e, "preview_lookup_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}
