use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Admin-side order status workflow.
///
/// The status field is the only thing mutable on an order after creation,
/// and only an admin or seller may mutate it. Any known status value is
/// accepted for any current status; there is no transition-legality check,
/// so e.g. `delivered` back to `pending` goes through.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Updates the status of an order on behalf of `caller`.
    #[instrument(skip(self, caller), fields(order_id = %order_id, new_status = %requested_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        requested_status: &str,
        caller: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let new_status = OrderStatus::parse(requested_status).ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid status: {}", requested_status))
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                error!("Order {} not found", order_id);
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })?;

        if !caller.can_manage_orders() {
            return Err(ServiceError::Forbidden(
                "Not authorized to update order status".to_string(),
            ));
        }

        let old_status = order.status;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.as_str().to_string(),
                new_status: new_status.as_str().to_string(),
            })
            .await;

        info!(
            "Order {} status updated from '{}' to '{}' by {}",
            order_id,
            old_status.as_str(),
            new_status.as_str(),
            caller.user_id
        );

        Ok(updated)
    }

    /// Gets the current status of an order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok(order.status)
    }
}
