//! Web server module for the inbound webhook path.
//!
//! One provider request per message: verify the signature, resolve the email
//! fields, store through the dedup constraint, answer 200.

pub mod extract;
pub mod handlers;
pub mod signature;

pub use extract::{extract_email_fields, EmailFields, InboundForm};
pub use handlers::{health, inbound_webhook, message_preview, AppState, HealthResponse};
pub use signature::{is_signature_verification_enabled, verify_signature};
