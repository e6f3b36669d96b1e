//! Checkout: turns the caller's cart into an order.
//!
//! Cash on delivery orders are confirmed on the spot. Card and UPI orders get
//! a hosted checkout session; the buyer pays on the gateway's page and the
//! webhook confirms the order.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::cart::load_cart;
use crate::auth::CurrentUser;
use crate::db::{CartRepository, OrderRepository, ProfileRepository};
use crate::domain::aggregates::order::NewOrder;
use crate::domain::aggregates::{Order, OrderAction, OrderLine, PaymentMethod};
use crate::domain::value_objects::{Address, Money, MoneyError};
use crate::error::{AppError, Result};
use crate::payments::fulfillment::{cancel_unstarted, PgOrderStore};
use crate::payments::{CheckoutSessionRequest, SessionLine};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    #[validate]
    pub shipping_address: Address,
    /// Also store the address on the profile.
    #[serde(default)]
    pub save_address: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutResponse {
    /// Cash on delivery: the order is confirmed.
    Placed { order: Order },
    /// Pay at `url`, then the gateway sends the buyer back to the storefront.
    Redirect { order_id: Uuid, order_number: String, url: String },
}

/// Gateway session for a freshly placed order. Shipping is its own line.
pub(crate) fn session_request(
    order: &Order,
    lines: &[OrderLine],
    customer_email: &str,
    public_base_url: &str,
) -> std::result::Result<CheckoutSessionRequest, MoneyError> {
    let currency = order.currency();
    let mut session_lines = lines
        .iter()
        .map(|line| {
            let name = match (&line.size, &line.color) {
                (Some(size), Some(color)) => format!("{} ({size}, {color})", line.name),
                (Some(option), None) | (None, Some(option)) => format!("{} ({option})", line.name),
                (None, None) => line.name.clone(),
            };
            Ok(SessionLine {
                name,
                unit_amount: Money::new(line.unit_price, currency).minor_units()?,
                quantity: line.quantity.value(),
            })
        })
        .collect::<std::result::Result<Vec<_>, MoneyError>>()?;

    let shipping = order.shipping_fee();
    if !shipping.is_zero() {
        session_lines.push(SessionLine { name: "Shipping".to_string(), unit_amount: shipping.minor_units()?, quantity: 1 });
    }

    Ok(CheckoutSessionRequest {
        order_id: order.id(),
        order_number: order.order_number().to_string(),
        customer_email: Some(customer_email.to_string()).filter(|e| !e.is_empty()),
        payment_method: order.payment_method(),
        currency: currency.to_string(),
        lines: session_lines,
        success_url: format!(
            "{public_base_url}/checkout/success?order_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            order.id()
        ),
        cancel_url: format!("{public_base_url}/checkout/cancel?order_id={}", order.id()),
    })
}

#[instrument(skip(state, user, body), fields(user_id = %user.id, payment_method = %body.payment_method))]
pub async fn checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    body.validate()?;
    let config = state.config();

    let cart = load_cart(&state, user.id).await?;
    let lines = cart.checkout_lines()?;

    if body.save_address {
        if let Err(e) = ProfileRepository::new(state.pool()).save_address(user.id, &body.shipping_address).await {
            warn!(error = %e, "Failed to save shipping address to profile");
        }
    }

    let now = Utc::now();
    let mut order = Order::place(
        NewOrder {
            user_id: user.id,
            payment_method: body.payment_method,
            lines: &lines,
            shipping: &config.shipping,
            currency: &config.currency,
            shipping_address: body.shipping_address,
        },
        now,
    )?;

    let orders = OrderRepository::new(state.pool());
    orders.create(&mut order, &lines).await?;
    state.events().publish_all(order.take_events()).await;
    info!(order_id = %order.id(), order_number = %order.order_number(), total = %order.total(), "Order placed");

    if !body.payment_method.is_hosted() {
        let mut applied = orders.apply(order.id(), Some(user.id), OrderAction::ConfirmCashOnDelivery, now).await?;
        if let Err(e) = CartRepository::new(state.pool()).clear(user.id).await {
            warn!(error = %e, "Failed to clear cart after cash on delivery order");
        }
        state.events().publish_all(applied.order.take_events()).await;
        return Ok((StatusCode::CREATED, Json(CheckoutResponse::Placed { order: applied.order })));
    }

    let request = session_request(&order, &lines, &user.email, &config.public_base_url)
        .map_err(|e| AppError::Internal(format!("order {} amounts: {e}", order.id())))?;
    let session = match state.payments().create_checkout_session(&request).await {
        Ok(session) => session,
        Err(e) => {
            error!(order_id = %order.id(), error = %e, "Checkout session failed, cancelling order");
            let store = PgOrderStore::new(state.pool().clone());
            if let Some(mut applied) = cancel_unstarted(&store, order.id(), Utc::now()).await {
                state.events().publish_all(applied.order.take_events()).await;
            }
            return Err(e.into());
        }
    };

    order.attach_checkout_session(session.id);
    orders.attach_checkout_session(&order).await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse::Redirect {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            url: session.url,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ShippingPolicy;
    use crate::domain::value_objects::Quantity;
    use rust_decimal::Decimal;

    fn place(lines: &[OrderLine]) -> Order {
        let shipping = ShippingPolicy { flat_fee: Decimal::new(99, 0), free_threshold: Decimal::new(999, 0) };
        Order::place(
            NewOrder {
                user_id: Uuid::new_v4(),
                payment_method: PaymentMethod::Upi,
                lines,
                shipping: &shipping,
                currency: "INR",
                shipping_address: Address::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn line(name: &str, price: Decimal, qty: u32, size: Option<&str>) -> OrderLine {
        OrderLine {
            product_id: Uuid::new_v4(),
            name: name.into(),
            size: size.map(Into::into),
            color: None,
            quantity: Quantity::new(qty).unwrap(),
            unit_price: price,
        }
    }

    #[test]
    fn test_session_lines_in_minor_units_with_shipping() {
        let lines = [line("Pocket Square", Decimal::new(44950, 2), 2, Some("OS"))];
        let order = place(&lines);
        let request = session_request(&order, &lines, "neha@example.com", "https://shop.example").unwrap();

        assert_eq!(request.lines.len(), 2);
        assert_eq!(request.lines[0].name, "Pocket Square (OS)");
        assert_eq!(request.lines[0].unit_amount, 44950);
        assert_eq!(request.lines[0].quantity, 2);
        assert_eq!(request.lines[1], SessionLine { name: "Shipping".into(), unit_amount: 9900, quantity: 1 });
        assert!(request.success_url.starts_with("https://shop.example/checkout/success?order_id="));
        assert!(request.success_url.ends_with("session_id={CHECKOUT_SESSION_ID}"));
        assert_eq!(request.customer_email.as_deref(), Some("neha@example.com"));
        assert_eq!(request.payment_method, PaymentMethod::Upi);
    }

    #[test]
    fn test_free_shipping_adds_no_line() {
        let lines = [line("Overshirt", Decimal::new(2499, 0), 1, None)];
        let order = place(&lines);
        let request = session_request(&order, &lines, "", "https://shop.example").unwrap();
        assert_eq!(request.lines.len(), 1);
        assert_eq!(request.lines[0].name, "Overshirt");
        assert!(request.customer_email.is_none());
    }

    #[test]
    fn test_checkout_request_validates_address() {
        let body: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "payment_method": "cod",
            "shipping_address": {
                "full_name": "", "phone": "98765", "line1": "12 MG Road", "city": "Pune",
                "state": "MH", "postal_code": "411001", "country": "IN"
            }
        }))
        .unwrap();
        assert_eq!(body.payment_method, PaymentMethod::CashOnDelivery);
        assert!(!body.save_address);
        assert!(body.validate().is_err());
    }
}
