use crate::{
    entities::{order, order_item, Order, OrderItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shipping destination captured with the order. All five fields are
/// required and validated before any payment step runs.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "zip code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

/// One line of an order payload: the product reference plus the price the
/// customer saw at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order payload handed to the persistence side after a captured charge.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<NewOrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub payment_intent_id: String,
    pub payment_intent_status: String,
    pub currency: String,
}

/// Persistence seam for orders. The checkout orchestrator only sees this
/// trait; tests substitute failing recorders to exercise the post-charge
/// failure path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRecorder: Send + Sync {
    async fn record_order(&self, input: NewOrder) -> Result<order::Model, ServiceError>;
}

/// Order with its line items
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Retrieves an order with all its items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order
            .find_related(OrderItem)
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    /// Lists orders for the management screen, newest first.
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

}

#[async_trait]
impl OrderRecorder for OrderService {
    /// Persists an order and its items in one transaction.
    ///
    /// The total is computed here, once, from the submitted lines
    /// (Σ unit_price × quantity) and frozen; nothing recomputes it later.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn record_order(&self, input: NewOrder) -> Result<order::Model, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::InvalidInput(
                "order must contain at least one item".to_string(),
            ));
        }
        for line in &input.items {
            if line.quantity < 1 {
                return Err(ServiceError::InvalidInput(format!(
                    "quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.unit_price.is_sign_negative() {
                return Err(ServiceError::InvalidInput(format!(
                    "unit price for product {} must not be negative",
                    line.product_id
                )));
            }
        }
        input.shipping_address.validate()?;

        let total_price: Decimal = input
            .items
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let shipping_address = serde_json::to_value(&input.shipping_address)
            .map_err(|e| ServiceError::InternalError(format!("address serialization: {}", e)))?;

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", order_id.to_string()[..8].to_uppercase())),
            user_id: Set(input.user_id),
            status: Set(order::OrderStatus::Pending),
            total_price: Set(total_price),
            currency: Set(input.currency.clone()),
            payment_method: Set(input.payment_method.clone()),
            payment_intent_id: Set(input.payment_intent_id.clone()),
            payment_intent_status: Set(input.payment_intent_status.clone()),
            shipping_address: Set(shipping_address),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let order = order.insert(&txn).await?;

        for (position, line) in input.items.iter().enumerate() {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                position: Set(position as i32),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(
            "Recorded order {} ({}) with total {}",
            order_id, order.order_number, total_price
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62704".to_string(),
            country: "US".to_string(),
        }
    }

    #[test]
    fn address_with_empty_field_fails_validation() {
        let mut addr = address();
        addr.zip_code = String::new();
        assert!(addr.validate().is_err());
        assert!(address().validate().is_ok());
    }

    #[test]
    fn total_is_sum_of_unit_price_times_quantity() {
        let items = vec![
            NewOrderLine {
                product_id: Uuid::new_v4(),
                name: "Widget".to_string(),
                quantity: 2,
                unit_price: dec!(10),
            },
            NewOrderLine {
                product_id: Uuid::new_v4(),
                name: "Gadget".to_string(),
                quantity: 1,
                unit_price: dec!(5),
            },
        ];

        let total: Decimal = items
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        assert_eq!(total, dec!(25));
    }
}
