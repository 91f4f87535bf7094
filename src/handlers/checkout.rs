use crate::handlers::common::{created_response, map_service_error, validate_input};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::{checkout::CompleteCheckoutInput, orders::ShippingAddress},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::post,
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout endpoints. Both routes require an
/// authenticated session (the order needs an owner).
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/{checkout_id}/complete", post(complete_checkout))
}

/// Start a checkout: sizes a payment intent to the cart's current total and
/// returns the client secret for the card form.
async fn start_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<StartCheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let started = state
        .services
        .checkout
        .begin_checkout(&payload.session_token, user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(started))
}

/// Complete a checkout: validate the address, confirm the charge, record
/// the order.
async fn complete_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(checkout_id): Path<Uuid>,
    Json(payload): Json<CompleteCheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = CompleteCheckoutInput {
        shipping_address: payload.shipping_address,
        card_token: payload.card_token,
    };

    let order = state
        .services
        .checkout
        .complete_checkout(checkout_id, user.user_id, input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(serde_json::json!({ "order": order })))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct StartCheckoutRequest {
    pub session_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteCheckoutRequest {
    #[validate(nested)]
    pub shipping_address: ShippingAddress,
    #[validate(length(min = 1, message = "card token is required"))]
    pub card_token: String,
}
