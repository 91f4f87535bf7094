//! Checkout orchestration.
//!
//! The one place where "money moved" and "order recorded" can disagree.
//! The orchestrator sequences intent creation, payment confirmation and
//! order persistence, and keeps the two failure regimes apart: before the
//! charge is captured every failure is safe to retry from scratch; after
//! the charge is captured a persistence failure is terminal for the session
//! and surfaces as [`ServiceError::PaymentCapturedOrderNotRecorded`].

use crate::{
    entities::cart_item,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::CartService,
        orders::{NewOrder, NewOrderLine, OrderRecorder, ShippingAddress},
        payments::{to_minor_units, PaymentGateway, PaymentIntent},
    },
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const PAYMENT_METHOD_CARD: &str = "card";

/// In-flight checkout: the cart snapshot taken at `begin_checkout` plus the
/// gateway intent. Held in memory only for the life of the checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub session_token: String,
    pub user_id: Uuid,
    pub items: Vec<cart_item::Model>,
    pub currency: String,
    pub intent: PaymentIntent,
}

/// Returned by `begin_checkout`; the client secret goes to the card form.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutStarted {
    pub checkout_id: Uuid,
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Submission payload for completing a checkout.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteCheckoutInput {
    #[validate(nested)]
    pub shipping_address: ShippingAddress,
    pub card_token: String,
}

pub struct CheckoutService {
    cart_service: Arc<CartService>,
    gateway: Arc<dyn PaymentGateway>,
    recorder: Arc<dyn OrderRecorder>,
    event_sender: Arc<EventSender>,
    sessions: DashMap<Uuid, CheckoutSession>,
}

impl CheckoutService {
    pub fn new(
        cart_service: Arc<CartService>,
        gateway: Arc<dyn PaymentGateway>,
        recorder: Arc<dyn OrderRecorder>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            cart_service,
            gateway,
            recorder,
            event_sender,
            sessions: DashMap::new(),
        }
    }

    /// Starts a checkout: snapshots the cart and asks the gateway for an
    /// intent sized to the cart's current total in minor units.
    ///
    /// A failure here is safe: no charge has occurred and no compensating
    /// action is needed, so the error is simply surfaced.
    #[instrument(skip(self))]
    pub async fn begin_checkout(
        &self,
        session_token: &str,
        user_id: Uuid,
    ) -> Result<CheckoutStarted, ServiceError> {
        let cart = self.cart_service.get_cart(session_token).await?;

        if cart.items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot check out an empty cart".to_string(),
            ));
        }

        let amount_minor = to_minor_units(cart.total_price)?;
        let currency = cart.cart.currency.to_lowercase();

        let intent = self.gateway.create_intent(amount_minor, &currency).await?;

        let checkout_id = Uuid::new_v4();
        let session = CheckoutSession {
            id: checkout_id,
            cart_id: cart.cart.id,
            session_token: session_token.to_string(),
            user_id,
            items: cart.items,
            currency: cart.cart.currency.clone(),
            intent,
        };

        let started = CheckoutStarted {
            checkout_id,
            client_secret: session.intent.client_secret.clone(),
            amount_minor,
            currency: session.currency.clone(),
        };

        self.sessions.insert(checkout_id, session);

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                cart_id: cart.cart.id,
                checkout_id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                checkout_id,
                amount_minor,
            })
            .await;

        info!(%checkout_id, amount_minor, "Checkout started");
        Ok(started)
    }

    /// Completes a checkout: validates the address, confirms the charge,
    /// records the order and clears the cart.
    ///
    /// Failure handling follows the capture boundary:
    /// - address/card validation and a declined or unsettled confirmation
    ///   leave the session in place so the customer can correct and resubmit;
    /// - a persistence failure after a captured charge removes the session
    ///   (resubmitting could charge or record twice) and returns the
    ///   distinct captured-but-not-recorded error.
    #[instrument(skip(self, input))]
    pub async fn complete_checkout(
        &self,
        checkout_id: Uuid,
        user_id: Uuid,
        input: CompleteCheckoutInput,
    ) -> Result<crate::entities::order::Model, ServiceError> {
        let session = self
            .sessions
            .get(&checkout_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Checkout session {} not found", checkout_id))
            })?;

        if session.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Checkout session belongs to a different user".to_string(),
            ));
        }

        // Address first: an incomplete address must never reach the gateway.
        input.shipping_address.validate()?;

        if input.card_token.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Card information is required".to_string(),
            ));
        }

        let confirmation = match self
            .gateway
            .confirm_intent(&session.intent.id, &input.card_token)
            .await
        {
            Ok(confirmation) => confirmation,
            Err(e) => {
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        checkout_id,
                        reason: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        if !confirmation.succeeded() {
            self.event_sender
                .send_or_log(Event::PaymentFailed {
                    checkout_id,
                    reason: format!("confirmation status {}", confirmation.status),
                })
                .await;
            return Err(ServiceError::PaymentFailed(format!(
                "Payment was not completed (status: {})",
                confirmation.status
            )));
        }

        self.event_sender
            .send_or_log(Event::PaymentCaptured { checkout_id })
            .await;

        let order_input = NewOrder {
            user_id: session.user_id,
            items: session
                .items
                .iter()
                .map(|item| NewOrderLine {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            shipping_address: input.shipping_address,
            payment_method: PAYMENT_METHOD_CARD.to_string(),
            payment_intent_id: session.intent.id.clone(),
            payment_intent_status: confirmation.status.clone(),
            currency: session.currency.clone(),
        };

        let order = match self.recorder.record_order(order_input).await {
            Ok(order) => order,
            Err(source) => {
                // The charge is captured but nothing was written. Drop the
                // session so a resubmission cannot confirm or record twice;
                // recovery is manual, against the payment reference.
                self.sessions.remove(&checkout_id);
                error!(
                    %checkout_id,
                    payment_intent_id = %session.intent.id,
                    %source,
                    "Order persistence failed after captured payment"
                );
                self.event_sender
                    .send_or_log(Event::PaymentCapturedWithoutOrder {
                        checkout_id,
                        payment_intent_id: session.intent.id.clone(),
                    })
                    .await;
                return Err(ServiceError::PaymentCapturedOrderNotRecorded {
                    payment_intent_id: session.intent.id.clone(),
                });
            }
        };

        // The order exists; a failure clearing the cart must not turn the
        // outcome into an error.
        if let Err(e) = self.cart_service.clear_cart(&session.session_token).await {
            warn!(order_id = %order.id, "Failed to clear cart after checkout: {}", e);
        }

        self.sessions.remove(&checkout_id);

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                checkout_id,
                order_id: order.id,
            })
            .await;

        info!(order_id = %order.id, %checkout_id, "Checkout completed");
        Ok(order)
    }

    /// Number of in-flight checkout sessions (diagnostics).
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }
}

/// Computes the amount a checkout would charge for a given cart total.
/// Split out so the conversion is testable without a gateway.
pub fn checkout_amount_minor(cart_total: Decimal) -> Result<i64, ServiceError> {
    to_minor_units(cart_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn charge_amount_matches_cart_total_in_minor_units() {
        assert_eq!(checkout_amount_minor(dec!(49.99)).unwrap(), 4999);
        assert_eq!(checkout_amount_minor(dec!(25)).unwrap(), 2500);
    }
}
