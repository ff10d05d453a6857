//! Webhook body parsing and field extraction.
//!
//! The provider posts either urlencoded forms or multipart bodies and names
//! each field in one of two conventions: raw MIME-header style (`From`,
//! `Subject`, `Message-Id`) or processed style (`sender`, `subject`,
//! `stripped-text`). Each logical field carries an ordered candidate list and
//! the first non-empty value wins, so the fallback policy stays declarative.

use std::collections::HashMap;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
};
use tracing::debug;

/// Candidate field names per logical field, raw-header style first.
pub const MESSAGE_ID_FIELDS: &[&str] = &["Message-Id", "message-id"];
pub const SENDER_FIELDS: &[&str] = &["From", "sender"];
pub const RECIPIENT_FIELDS: &[&str] = &["To", "recipient"];
pub const SUBJECT_FIELDS: &[&str] = &["Subject", "subject"];
pub const BODY_PLAIN_FIELDS: &[&str] = &["body-plain", "stripped-text"];
pub const BODY_HTML_FIELDS: &[&str] = &["body-html", "stripped-html"];

/// A webhook body flattened to name/value pairs.
///
/// File-upload parts are never read into memory as fields; they are counted
/// and otherwise ignored (attachments are not stored).
pub struct InboundForm {
    pub fields: HashMap<String, String>,
    pub ignored_files: usize,
}

#[async_trait]
impl<S> FromRequest<S> for InboundForm
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.trim_start().starts_with("multipart/form-data"))
            .unwrap_or(false);

        let mut fields = HashMap::new();
        let mut ignored_files = 0;

        if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid multipart body"))?;

            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid multipart body"))?
            {
                if field.file_name().is_some() {
                    ignored_files += 1;
                    continue;
                }

                let name = match field.name() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                let value = field
                    .text()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "invalid multipart body"))?;

                fields.entry(name).or_insert(value);
            }
        } else {
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|_| (StatusCode::BAD_REQUEST, "unable to read request body"))?;

            for (name, value) in url::form_urlencoded::parse(&body) {
                fields
                    .entry(name.into_owned())
                    .or_insert_with(|| value.into_owned());
            }
        }

        debug!(
            field_count = fields.len(),
            ignored_files = ignored_files,
            "webhook_body_parsed"
        );

        Ok(InboundForm {
            fields,
            ignored_files,
        })
    }
}

/// Email fields resolved from a webhook body.
#[derive(Debug, PartialEq)]
pub struct EmailFields {
    pub message_id: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body_plain: Option<String>,
    pub body_html: Option<String>,
}

/// Resolve the first non-empty value among the candidate names.
pub fn first_present<'a>(fields: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

/// Resolve all email fields from a parsed webhook body.
pub fn extract_email_fields(fields: &HashMap<String, String>) -> EmailFields {
    let owned = |value: Option<&str>| value.map(str::to_string);

    EmailFields {
        message_id: owned(first_present(fields, MESSAGE_ID_FIELDS)),
        sender: first_present(fields, SENDER_FIELDS).unwrap_or_default().to_string(),
        recipient: first_present(fields, RECIPIENT_FIELDS)
            .unwrap_or_default()
            .to_string(),
        subject: owned(first_present(fields, SUBJECT_FIELDS)),
        body_plain: owned(first_present(fields, BODY_PLAIN_FIELDS)),
        body_html: owned(first_present(fields, BODY_HTML_FIELDS)),
    }
}
