//! Mailgun webhook signature verification.
//!
//! Mailgun signs webhook requests using HMAC-SHA256.
//! Reference: https://documentation.mailgun.com/docs/mailgun/user-manual/events/webhooks/#securing-webhooks

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Verify a Mailgun webhook signature.
///
/// Webhooks include three fields for signature verification:
/// - timestamp: Unix epoch seconds when the webhook was generated
/// - token: a randomly generated string
/// - signature: HMAC-SHA256 hex digest of timestamp + token
///
/// Pure function of its inputs; returns `true` only when `signature` matches
/// the digest computed with `signing_key`. The comparison is constant-time.
pub fn verify_signature(signing_key: &str, timestamp: &str, token: &str, signature: &str) -> bool {
    // Check for empty inputs
    if signing_key.is_empty() || timestamp.is_empty() || token.is_empty() || signature.is_empty() {
        warn!(
            has_signing_key = !signing_key.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_token = !token.is_empty(),
            has_signature = !signature.is_empty(),
            "signature_missing_fields"
        );
        return false;
    }

    // Compute expected signature: HMAC-SHA256(signing_key, timestamp + token)
    let mut mac = match HmacSha256::new_from_slice(signing_key.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("signature_invalid_key");
            return false;
        }
    };

    mac.update(format!("{}{}", timestamp, token).as_bytes());

    let expected_signature = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison to prevent timing attacks
    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            "signature_mismatch"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check if signature verification is enabled.
pub fn is_signature_verification_enabled(signing_key: &Option<String>) -> bool {
    signing_key
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}
