//! Webhook signature verification.
//!
//! The processor signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{body}"` and sends `t=<unix>,v1=<hex>` in the
//! signature header. Verification checks the timestamp against a
//! replay tolerance and compares digests in constant time. An event
//! whose authenticity cannot be verified is never processed; the only
//! exception is the explicit non-production `allow_unverified` flag,
//! which skips verification up front rather than falling back on
//! failure.

use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The signature header could not be parsed at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Header is missing the timestamp or the v1 digest.
    #[error("malformed signature header")]
    MalformedHeader,
}

/// Verify a signed payload.
///
/// Returns `Ok(false)` for a wrong digest or a timestamp outside the
/// tolerance window; both must be treated as unauthenticated.
///
/// # Errors
///
/// [`SignatureError::MalformedHeader`] when the header cannot be
/// parsed.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<bool, SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut provided: Option<Vec<u8>> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", raw)) => timestamp = raw.parse().ok(),
            Some(("v1", raw)) => provided = hex::decode(raw).ok(),
            _ => {}
        }
    }

    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return Err(SignatureError::MalformedHeader);
    };

    if (now_unix - timestamp).abs() > tolerance_secs {
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    Ok(constant_time_eq(expected.as_slice(), &provided))
}

/// Sign a payload the way the processor does. Used by tests and local
/// tooling to fabricate valid deliveries.
#[must_use]
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_780_000_000;

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = sign_payload(SECRET, payload, NOW);
        assert_eq!(
            verify_signature(SECRET, payload, &header, NOW, 300),
            Ok(true)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = sign_payload("whsec_other", payload, NOW);
        assert_eq!(
            verify_signature(SECRET, payload, &header, NOW, 300),
            Ok(false)
        );
    }

    #[test]
    fn modified_payload_is_rejected() {
        let header = sign_payload(SECRET, br#"{"type":"invoice.paid"}"#, NOW);
        assert_eq!(
            verify_signature(
                SECRET,
                br#"{"type":"invoice.paid","tampered":true}"#,
                &header,
                NOW,
                300
            ),
            Ok(false)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = sign_payload(SECRET, payload, NOW - 600);
        assert_eq!(
            verify_signature(SECRET, payload, &header, NOW, 300),
            Ok(false)
        );
    }

    #[test]
    fn missing_parts_are_malformed() {
        let payload = b"{}";
        for header in ["", "garbage", "t=1234567890", "v1=deadbeef"] {
            assert_eq!(
                verify_signature(SECRET, payload, header, NOW, 300),
                Err(SignatureError::MalformedHeader)
            );
        }
    }
}
