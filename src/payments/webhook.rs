//! Payment webhook verification and parsing.
//!
//! The `Stripe-Signature` header looks like `t=1700000000,v1=<hex>,v1=<hex>`.
//! The signed payload is `"{t}.{raw body}"`, HMAC-SHA256 with the endpoint
//! secret. Any matching `v1` entry is accepted.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::PaymentError;

/// Signatures older (or newer) than this many seconds are rejected.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Checks the signature header against the raw body.
#[instrument(skip_all)]
pub fn verify_signature(header: &str, body: &[u8], secret: &str, now: i64) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| PaymentError::InvalidSignature("Missing timestamp".to_string()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("Invalid timestamp".to_string()))?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature("Timestamp outside tolerance".to_string()));
    }
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature("No v1 signature".to_string()));
    }

    let expected = sign(secret, timestamp, body)?;
    if !signatures.iter().any(|candidate| constant_time_compare(&expected, candidate)) {
        return Err(PaymentError::InvalidSignature("Signature mismatch".to_string()));
    }

    debug!("Webhook signature verified");
    Ok(())
}

fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// What a webhook means for the order it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    /// The hosted session timed out without payment.
    Expired,
    /// Completed checkout whose payment is still settling; a later async event decides.
    Pending,
}

/// Identifiers an event carries, in the order they are tried when matching an order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRefs {
    pub order_id: Option<Uuid>,
    pub client_reference_id: Option<Uuid>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub id: String,
    pub kind: String,
    /// `None` for event types the storefront doesn't act on.
    pub outcome: Option<PaymentOutcome>,
    pub refs: PaymentRefs,
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: EventObject,
}

/// Fields shared by checkout sessions and payment intents that matter here.
#[derive(Deserialize, Default)]
struct EventObject {
    id: Option<String>,
    client_reference_id: Option<String>,
    payment_intent: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

/// Parses a verified webhook body.
pub fn parse_event(body: &[u8]) -> Result<PaymentEvent, PaymentError> {
    let envelope: Envelope = serde_json::from_slice(body).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
    let object = envelope.data.object;
    let order_id = object.metadata.get("order_id").and_then(|v| Uuid::parse_str(v).ok());

    let (outcome, refs) = match envelope.kind.as_str() {
        "checkout.session.completed"
        | "checkout.session.async_payment_succeeded"
        | "checkout.session.async_payment_failed"
        | "checkout.session.expired" => {
            let outcome = match envelope.kind.as_str() {
                "checkout.session.completed" if object.payment_status.as_deref() == Some("paid") => PaymentOutcome::Succeeded,
                "checkout.session.completed" => PaymentOutcome::Pending,
                "checkout.session.async_payment_succeeded" => PaymentOutcome::Succeeded,
                "checkout.session.async_payment_failed" => PaymentOutcome::Failed,
                _ => PaymentOutcome::Expired,
            };
            let refs = PaymentRefs {
                order_id,
                client_reference_id: object.client_reference_id.as_deref().and_then(|v| Uuid::parse_str(v).ok()),
                checkout_session_id: object.id,
                payment_intent_id: object.payment_intent,
            };
            (Some(outcome), refs)
        }
        "payment_intent.payment_failed" => {
            let refs = PaymentRefs { order_id, payment_intent_id: object.id, ..PaymentRefs::default() };
            (Some(PaymentOutcome::Failed), refs)
        }
        _ => (None, PaymentRefs::default()),
    };

    Ok(PaymentEvent { id: envelope.id, kind: envelope.kind, outcome, refs })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    pub(crate) fn signed_header(body: &[u8], secret: &str, t: i64) -> String {
        format!("t={t},v1={}", sign(secret, &t.to_string(), body).unwrap())
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let header = signed_header(body, SECRET, 1_700_000_000);
        assert!(verify_signature(&header, body, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_any_v1_entry_may_match() {
        let body = b"{}";
        let good = signed_header(body, SECRET, 1_700_000_000);
        let header = format!("t=1700000000,v1=deadbeef,{}", good.split_once(',').unwrap().1);
        assert!(verify_signature(&header, body, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_rejects_tampered_body_and_wrong_secret() {
        let header = signed_header(b"{\"amount\":100}", SECRET, 1_700_000_000);
        assert!(verify_signature(&header, b"{\"amount\":1}", SECRET, 1_700_000_000).is_err());
        assert!(verify_signature(&header, b"{\"amount\":100}", "whsec_other", 1_700_000_000).is_err());
    }

    #[test]
    fn test_rejects_stale_and_malformed_headers() {
        let body = b"{}";
        let header = signed_header(body, SECRET, 1_700_000_000);
        assert!(verify_signature(&header, body, SECRET, 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1).is_err());
        assert!(verify_signature("v1=abc", body, SECRET, 0).is_err());
        assert!(verify_signature("t=abc,v1=abc", body, SECRET, 0).is_err());
        assert!(verify_signature("t=0", body, SECRET, 0).is_err());
    }

    #[test]
    fn test_parse_completed_session() {
        let order_id = Uuid::new_v4();
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1", "client_reference_id": order_id.to_string(), "payment_intent": "pi_1",
                "payment_status": "paid", "metadata": { "order_id": order_id.to_string() }
            }}
        });
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.outcome, Some(PaymentOutcome::Succeeded));
        assert_eq!(event.refs.order_id, Some(order_id));
        assert_eq!(event.refs.checkout_session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(event.refs.payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn test_completed_but_unpaid_is_pending() {
        let body = r#"{"id":"evt_2","type":"checkout.session.completed","data":{"object":{"id":"cs_2","payment_status":"unpaid"}}}"#;
        let event = parse_event(body.as_bytes()).unwrap();
        assert_eq!(event.outcome, Some(PaymentOutcome::Pending));
        assert_eq!(event.refs.order_id, None);
    }

    #[test]
    fn test_parse_intent_failure_and_unknown_types() {
        let body = r#"{"id":"evt_3","type":"payment_intent.payment_failed","data":{"object":{"id":"pi_9","metadata":{"order_id":"not-a-uuid"}}}}"#;
        let event = parse_event(body.as_bytes()).unwrap();
        assert_eq!(event.outcome, Some(PaymentOutcome::Failed));
        assert_eq!(event.refs.payment_intent_id.as_deref(), Some("pi_9"));
        assert_eq!(event.refs.order_id, None);

        let body = r#"{"id":"evt_4","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        assert_eq!(parse_event(body.as_bytes()).unwrap().outcome, None);
        assert!(parse_event(b"not json").is_err());
    }
}
