//! Payment gateway integration.
//!
//! The gateway is an external collaborator reached over HTTP. Everything in
//! the checkout flow sees only the [`PaymentGateway`] trait; the hosted
//! implementation speaks the payment-intents wire shape (create an intent
//! for an amount in minor units, confirm it with a card token).

use crate::{config::PaymentGatewayConfig, errors::ServiceError};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Gateway-issued intent: an authorized charge amount plus the opaque client
/// secret scoping confirmation to this checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
}

/// Result of confirming an intent with the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub id: String,
    pub status: String,
}

impl PaymentConfirmation {
    /// The gateway reports a range of non-terminal statuses; only
    /// `succeeded` means the charge was captured.
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent sized in integer minor currency units.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Confirms the intent with the supplied card token.
    async fn confirm_intent(
        &self,
        intent_id: &str,
        card_token: &str,
    ) -> Result<PaymentConfirmation, ServiceError>;
}

/// Converts a decimal major-unit amount to integer minor units.
///
/// Amounts with sub-minor-unit precision are rejected rather than rounded;
/// rounding here would make the charged amount diverge from the displayed
/// total.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() {
        return Err(ServiceError::InvalidInput(
            "amount must not be negative".to_string(),
        ));
    }

    let scaled = amount * Decimal::from(100);
    if !scaled.fract().is_zero() {
        return Err(ServiceError::InvalidInput(format!(
            "amount {} has sub-minor-unit precision",
            amount
        )));
    }

    scaled
        .trunc()
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput(format!("amount {} is out of range", amount)))
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetails,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetails {
    message: String,
}

/// HTTP client for the hosted payment API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("failed to build gateway client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Extracts the gateway's own error message when it sent one, falling
    /// back to the HTTP status line.
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<GatewayErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("gateway returned {}", status),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount_minor.to_string()),
                ("currency", currency.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment gateway unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let message = Self::error_message(response).await;
            warn!("Payment intent creation rejected: {}", message);
            return Err(ServiceError::ExternalServiceError(message));
        }

        let intent: PaymentIntent = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed gateway response: {}", e))
        })?;

        info!(intent_id = %intent.id, amount_minor, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self, card_token))]
    async fn confirm_intent(
        &self,
        intent_id: &str,
        card_token: &str,
    ) -> Result<PaymentConfirmation, ServiceError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{}/confirm",
                self.base_url, intent_id
            ))
            .bearer_auth(&self.secret_key)
            .form(&[("payment_method", card_token.to_string())])
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("payment gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = Self::error_message(response).await;
            warn!(intent_id, "Payment confirmation rejected: {}", message);
            // 402 is the gateway's card-declined signal; anything else is
            // the gateway misbehaving.
            return if status == StatusCode::PAYMENT_REQUIRED {
                Err(ServiceError::PaymentFailed(message))
            } else {
                Err(ServiceError::ExternalServiceError(message))
            };
        }

        let confirmation: PaymentConfirmation = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("malformed gateway response: {}", e))
        })?;

        info!(intent_id, status = %confirmation.status, "Payment confirmation returned");
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_dollars_to_cents() {
        assert_eq!(to_minor_units(dec!(49.99)).unwrap(), 4999);
        assert_eq!(to_minor_units(dec!(25)).unwrap(), 2500);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn rejects_sub_minor_unit_precision() {
        assert!(to_minor_units(dec!(10.999)).is_err());
        assert!(to_minor_units(dec!(0.001)).is_err());
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(to_minor_units(dec!(-1)).is_err());
    }

    #[test]
    fn only_succeeded_counts_as_success() {
        let succeeded = PaymentConfirmation {
            id: "pi_1".to_string(),
            status: "succeeded".to_string(),
        };
        let processing = PaymentConfirmation {
            id: "pi_2".to_string(),
            status: "processing".to_string(),
        };
        let requires_action = PaymentConfirmation {
            id: "pi_3".to_string(),
            status: "requires_action".to_string(),
        };

        assert!(succeeded.succeeded());
        assert!(!processing.succeeded());
        assert!(!requires_action.succeeded());
    }
}
