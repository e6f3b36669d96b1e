//! Hosted checkout over the Stripe-compatible REST API.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use super::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway};
use crate::config::PaymentConfig;
use crate::domain::aggregates::PaymentMethod;

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeGateway {
    #[must_use]
    pub fn new(client: Client, config: &PaymentConfig) -> Self {
        Self { client, api_base: config.api_base.clone(), secret_key: config.secret_key.clone() }
    }
}

/// Gateway name of a hosted payment method.
fn method_type(method: PaymentMethod) -> Option<&'static str> {
    match method {
        PaymentMethod::Card => Some("card"),
        PaymentMethod::Upi => Some("upi"),
        PaymentMethod::CashOnDelivery => None,
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub(crate) fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let order_id = request.order_id.to_string();
    let currency = request.currency.to_lowercase();
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), order_id.clone()),
        ("metadata[order_id]".to_string(), order_id.clone()),
        ("metadata[order_number]".to_string(), request.order_number.clone()),
        ("payment_intent_data[metadata][order_id]".to_string(), order_id),
    ];
    if let Some(method) = method_type(request.payment_method) {
        form.push(("payment_method_types[0]".to_string(), method.to_string()));
    }
    if let Some(email) = &request.customer_email {
        form.push(("customer_email".to_string(), email.clone()));
    }
    for (i, line) in request.lines.iter().enumerate() {
        let key = |field: &str| format!("line_items[{i}]{field}");
        form.push((key("[price_data][currency]"), currency.clone()));
        form.push((key("[price_data][product_data][name]"), line.name.clone()));
        form.push((key("[price_data][unit_amount]"), line.unit_amount.to_string()));
        form.push((key("[quantity]"), line.quantity.to_string()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", format!("checkout-{}", request.order_id))
            .form(&session_form(request))
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            error!(status = status.as_u16(), %message, "Checkout session rejected");
            return Err(PaymentError::Api { status: status.as_u16(), message });
        }

        let session: SessionResponse = response.json().await.map_err(|e| PaymentError::Response(e.to_string()))?;
        let url = session.url.ok_or_else(|| PaymentError::Response("session has no url".to_string()))?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession { id: session.id, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::SessionLine;
    use uuid::Uuid;

    fn request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            order_id: Uuid::nil(),
            order_number: "ORD-00000042".into(),
            customer_email: Some("asha@example.com".into()),
            payment_method: PaymentMethod::Card,
            currency: "INR".into(),
            lines: vec![
                SessionLine { name: "Linen Shirt (M)".into(), unit_amount: 149_900, quantity: 2 },
                SessionLine { name: "Shipping".into(), unit_amount: 9_900, quantity: 1 },
            ],
            success_url: "https://shop.example/checkout/success".into(),
            cancel_url: "https://shop.example/cart".into(),
        }
    }

    fn get<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_session_form_references_order() {
        let form = session_form(&request());
        let id = Uuid::nil().to_string();
        assert_eq!(get(&form, "mode"), Some("payment"));
        assert_eq!(get(&form, "client_reference_id"), Some(id.as_str()));
        assert_eq!(get(&form, "metadata[order_id]"), Some(id.as_str()));
        assert_eq!(get(&form, "payment_intent_data[metadata][order_id]"), Some(id.as_str()));
        assert_eq!(get(&form, "customer_email"), Some("asha@example.com"));
    }

    #[test]
    fn test_session_form_line_items() {
        let form = session_form(&request());
        assert_eq!(get(&form, "line_items[0][price_data][currency]"), Some("inr"));
        assert_eq!(get(&form, "line_items[0][price_data][unit_amount]"), Some("149900"));
        assert_eq!(get(&form, "line_items[0][quantity]"), Some("2"));
        assert_eq!(get(&form, "line_items[1][price_data][product_data][name]"), Some("Shipping"));
    }

    #[test]
    fn test_session_form_restricts_to_chosen_method() {
        let form = session_form(&request());
        assert_eq!(get(&form, "payment_method_types[0]"), Some("card"));

        let upi = CheckoutSessionRequest { payment_method: PaymentMethod::Upi, ..request() };
        let form = session_form(&upi);
        assert_eq!(get(&form, "payment_method_types[0]"), Some("upi"));
        assert_eq!(form.iter().filter(|(k, _)| k.starts_with("payment_method_types")).count(), 1);
    }
}
