//! Payment gateway webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::payments::fulfillment::{fulfill, Fulfillment, PgOrderStore};
use crate::payments::webhook::{parse_event, verify_signature};
use crate::payments::PaymentError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Verifies and applies one webhook delivery.
///
/// Anything the storefront can't or won't act on is still answered with 200
/// so the gateway stops redelivering it; only storage failures return 500.
#[instrument(skip_all)]
pub async fn payments(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PaymentError::InvalidSignature("Missing signature header".to_string()))?;

    let secret = state.config().payments.webhook_secret.expose_secret();
    if let Err(e) = verify_signature(signature, &body, secret, Utc::now().timestamp()) {
        warn!(error = %e, "Rejected webhook");
        return Err(e.into());
    }

    let event = parse_event(&body)?;
    let store = PgOrderStore::new(state.pool().clone());
    let result = match fulfill(&store, &event, Utc::now()).await? {
        Fulfillment::Applied { order_id, events } => {
            state.events().publish_all(events).await;
            json!({ "received": true, "result": "applied", "order_id": order_id })
        }
        Fulfillment::Unchanged { order_id } => json!({ "received": true, "result": "unchanged", "order_id": order_id }),
        Fulfillment::Rejected { order_id, reason } => {
            json!({ "received": true, "result": "rejected", "order_id": order_id, "reason": reason.to_string() })
        }
        Fulfillment::Unmatched => json!({ "received": true, "result": "unmatched" }),
        Fulfillment::Ignored => json!({ "received": true, "result": "ignored" }),
    };

    info!(event_id = %event.id, kind = %event.kind, result = %result["result"], "Webhook processed");
    Ok(Json(result))
}
