use crate::handlers::common::{
    map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{auth::AuthUser, errors::ApiError, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, patch},
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Order management routes. Listing is nested behind the admin/seller role
/// gate by the router composition in `lib.rs`; the status update performs
/// its own role check so an authenticated-but-unauthorized caller gets a
/// proper 403 with no mutation.
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_order))
        .route("/{id}/status", patch(update_order_status))
}

pub fn orders_admin_routes() -> Router<AppState> {
    Router::new().route("/", get(list_orders))
}

/// List orders for the management screen, newest first
async fn list_orders(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get a single order with its items. Customers may only read their own
/// orders; admins and sellers may read any.
async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    if !user.can_manage_orders() && order.order.user_id != user.user_id {
        return Err(ApiError::ServiceError(
            crate::errors::ServiceError::Forbidden(
                "Not authorized to view this order".to_string(),
            ),
        ));
    }

    Ok(success_response(order))
}

/// Update an order's status (admin or seller only)
async fn update_order_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .order_status
        .update_status(id, &payload.status, &user)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({ "order": order })))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}
