// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use mockall::mock;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use storefront_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{order, product},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        orders::{NewOrder, OrderRecorder, ShippingAddress},
        payments::{PaymentConfirmation, PaymentGateway, PaymentIntent},
    },
    AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

// Test doubles for the two checkout collaborators.
mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_intent(
            &self,
            amount_minor: i64,
            currency: &str,
        ) -> Result<PaymentIntent, ServiceError>;

        async fn confirm_intent(
            &self,
            intent_id: &str,
            card_token: &str,
        ) -> Result<PaymentConfirmation, ServiceError>;
    }
}

mock! {
    pub Recorder {}

    #[async_trait]
    impl OrderRecorder for Recorder {
        async fn record_order(&self, input: NewOrder) -> Result<order::Model, ServiceError>;
    }
}

/// Gateway stand-in for tests that never reach the payment flow.
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn create_intent(
        &self,
        _amount_minor: i64,
        _currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "payment gateway not wired in this test".to_string(),
        ))
    }

    async fn confirm_intent(
        &self,
        _intent_id: &str,
        _card_token: &str,
    ) -> Result<PaymentConfirmation, ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "payment gateway not wired in this test".to_string(),
        ))
    }
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub auth: Arc<AuthService>,
    #[allow(dead_code)]
    event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    #[allow(dead_code)]
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(OfflineGateway)).await
    }

    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:",
            TEST_JWT_SECRET,
            "127.0.0.1",
            0,
            "test",
        );

        // A single pooled connection keeps every query on the same
        // in-memory database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            "storefront-auth".to_string(),
            "storefront-api".to_string(),
            Duration::from_secs(3600),
        )));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), gateway);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(axum::Extension(auth.clone()))
            .layer(axum::middleware::from_fn(
                storefront_api::request_id::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            state,
            router,
            auth,
            event_task,
        }
    }

    /// Mints a bearer token for a user holding the given roles.
    #[allow(dead_code)]
    pub fn token_for(&self, user_id: Uuid, roles: &[&str]) -> String {
        self.auth
            .generate_token(user_id, roles)
            .expect("failed to mint test token")
    }
}

/// Inserts a catalog product and returns its id.
#[allow(dead_code)]
pub async fn seed_product(app: &TestApp, name: &str, price: Decimal, stock: i32) -> Uuid {
    let product_id = Uuid::new_v4();
    let now = Utc::now();

    let row = product::ActiveModel {
        id: Set(product_id),
        name: Set(name.to_string()),
        description: Set(format!("{} description", name)),
        price: Set(price),
        images: Set(serde_json::json!(["https://img.example/1.jpg"])),
        category: Set("general".to_string()),
        stock: Set(stock),
        created_at: Set(now),
        updated_at: Set(now),
    };

    row.insert(&*app.state.db)
        .await
        .expect("failed to seed product");

    product_id
}

/// A fully populated shipping address.
#[allow(dead_code)]
pub fn test_address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip_code: "62704".to_string(),
        country: "US".to_string(),
    }
}

/// Records an order through the real order service and forces it into the
/// given status.
#[allow(dead_code)]
pub async fn seed_order(
    app: &TestApp,
    user_id: Uuid,
    status: order::OrderStatus,
) -> order::Model {
    use storefront_api::services::orders::NewOrderLine;

    let recorder: &dyn OrderRecorder = app.state.services.orders.as_ref();
    let created = recorder
        .record_order(NewOrder {
            user_id,
            items: vec![NewOrderLine {
                product_id: Uuid::new_v4(),
                name: "Seeded item".to_string(),
                quantity: 1,
                unit_price: Decimal::from(10),
            }],
            shipping_address: test_address(),
            payment_method: "card".to_string(),
            payment_intent_id: format!("pi_{}", Uuid::new_v4().simple()),
            payment_intent_status: "succeeded".to_string(),
            currency: "USD".to_string(),
        })
        .await
        .expect("failed to seed order");

    if created.status == status {
        return created;
    }

    let mut active: order::ActiveModel = created.into();
    active.status = Set(status);
    active
        .update(&*app.state.db)
        .await
        .expect("failed to adjust seeded order status")
}
