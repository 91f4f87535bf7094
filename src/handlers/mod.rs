pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod products;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        orders::OrderRecorder, payments::PaymentGateway, CartService, CheckoutService,
        OrderService, OrderStatusService, ProductCatalogService,
    },
};
use std::sync::Arc;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    /// Wires the service graph. The payment gateway arrives as a trait
    /// object so binaries and tests can decide what actually sits behind
    /// the checkout flow.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let catalog = Arc::new(ProductCatalogService::new(db.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            cart.clone(),
            gateway,
            orders.clone() as Arc<dyn OrderRecorder>,
            event_sender,
        ));

        Self {
            catalog,
            cart,
            checkout,
            orders,
            order_status,
        }
    }
}
