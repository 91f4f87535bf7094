use crate::{
    entities::{cart, cart_item, Cart, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Session cart service.
///
/// Carts are keyed by an opaque session token and written through to the
/// database on every mutation, so a returning session rehydrates exactly
/// the items it left behind. Totals are never stored; [`CartService::totals`]
/// recomputes them from the current items on every read.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new cart, generating a session token when none is supplied.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<cart::Model, ServiceError> {
        let cart_id = Uuid::new_v4();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            session_token: Set(input
                .session_token
                .unwrap_or_else(|| Uuid::new_v4().to_string())),
            customer_id: Set(input.customer_id),
            currency: Set(input.currency.unwrap_or_else(|| "USD".to_string())),
            status: Set(cart::CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("Created cart {} for session {}", cart_id, cart.session_token);
        Ok(cart)
    }

    /// Rehydrates a cart by session token, with derived totals.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, session_token: &str) -> Result<CartView, ServiceError> {
        let cart = self.find_cart(&*self.db, session_token).await?;
        let items = self.load_items(&*self.db, cart.id).await?;
        Ok(CartView::new(cart, items))
    }

    /// Adds an item to the cart, merging by product identity: if the product
    /// is already in the cart the quantities are summed and the price and
    /// name are refreshed from the catalog row.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        session_token: &str,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, session_token).await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let image_url = product
            .images
            .as_array()
            .and_then(|urls| urls.first())
            .and_then(|url| url.as_str())
            .map(str::to_owned);

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let merged_quantity = item.quantity + input.quantity;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(merged_quantity);
            item.name = Set(product.name.clone());
            item.unit_price = Set(product.price);
            item.image_url = Set(image_url);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            let position = CartItem::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .order_by_desc(cart_item::Column::Position)
                .one(&txn)
                .await?
                .map(|item| item.position + 1)
                .unwrap_or(0);

            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                name: Set(product.name.clone()),
                unit_price: Set(product.price),
                quantity: Set(input.quantity),
                image_url: Set(image_url),
                position: Set(position),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        self.touch_cart(&txn, &cart).await?;
        let items = self.load_items(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added product {} x{} to cart {}",
            input.product_id, input.quantity, cart.id
        );
        Ok(CartView::new(cart, items))
    }

    /// Sets the quantity of a line. Zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        session_token: &str,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, session_token).await?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(&txn).await?;
        } else {
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        self.touch_cart(&txn, &cart).await?;
        let items = self.load_items(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.id,
                product_id,
            })
            .await;

        Ok(CartView::new(cart, items))
    }

    /// Removes a line by product identity.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        session_token: &str,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, session_token).await?;

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;

        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the cart",
                product_id
            )));
        }

        self.touch_cart(&txn, &cart).await?;
        let items = self.load_items(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            })
            .await;

        Ok(CartView::new(cart, items))
    }

    /// Empties the cart. The cart row itself stays, so the session token
    /// keeps working.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, session_token: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, session_token).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        self.touch_cart(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        info!("Cleared cart {}", cart.id);
        Ok(())
    }

    /// Derives the totals from a set of items. Deliberately the only way to
    /// obtain totals: nothing stores them, so they cannot drift from the
    /// item list.
    pub fn totals(items: &[cart_item::Model]) -> CartTotals {
        CartTotals {
            total_items: items.iter().map(|item| item.quantity as i64).sum(),
            total_price: items
                .iter()
                .map(|item| item.unit_price * Decimal::from(item.quantity))
                .sum(),
        }
    }

    async fn find_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        session_token: &str,
    ) -> Result<cart::Model, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::SessionToken.eq(session_token))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart for session {} not found", session_token))
            })?;

        if cart.status != cart::CartStatus::Active {
            return Err(ServiceError::InvalidOperation(
                "Cart is not active".to_string(),
            ));
        }

        Ok(cart)
    }

    async fn load_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::Position)
            .all(conn)
            .await?)
    }

    async fn touch_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: &cart::Model,
    ) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
        Ok(())
    }
}

/// Input for creating a cart
#[derive(Debug, Deserialize)]
pub struct CreateCartInput {
    pub session_token: Option<String>,
    pub customer_id: Option<Uuid>,
    pub currency: Option<String>,
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Derived cart totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub total_items: i64,
    pub total_price: Decimal,
}

/// Cart with items and derived totals
#[derive(Debug, Serialize)]
pub struct CartView {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
    pub total_items: i64,
    pub total_price: Decimal,
}

impl CartView {
    fn new(cart: cart::Model, items: Vec<cart_item::Model>) -> Self {
        let totals = CartService::totals(&items);
        Self {
            cart,
            items,
            total_items: totals.total_items,
            total_price: totals.total_price,
        }
    }
}
