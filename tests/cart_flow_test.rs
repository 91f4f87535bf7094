mod common;

use common::{seed_product, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    services::cart::{AddItemInput, CreateCartInput},
};

fn create_input(token: &str) -> CreateCartInput {
    CreateCartInput {
        session_token: Some(token.to_string()),
        customer_id: None,
        currency: Some("USD".to_string()),
    }
}

#[tokio::test]
async fn repeated_adds_of_one_product_merge_into_a_single_line() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-merge"))
        .await
        .unwrap();
    let product_id = seed_product(&app, "Mug", dec!(12.50), 50).await;

    for quantity in [1, 2, 3] {
        cart_service
            .add_item(
                "sess-merge",
                AddItemInput {
                    product_id,
                    quantity,
                },
            )
            .await
            .unwrap();
    }

    let cart = cart_service.get_cart("sess-merge").await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 6);
    assert_eq!(cart.total_items, 6);
    assert_eq!(cart.total_price, dec!(75.00));
}

#[tokio::test]
async fn totals_are_recomputed_from_items_on_every_read() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-totals"))
        .await
        .unwrap();
    let widget = seed_product(&app, "Widget", dec!(10), 100).await;
    let gadget = seed_product(&app, "Gadget", dec!(5), 100).await;

    cart_service
        .add_item(
            "sess-totals",
            AddItemInput {
                product_id: widget,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    let view = cart_service
        .add_item(
            "sess-totals",
            AddItemInput {
                product_id: gadget,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    assert_eq!(view.total_items, 3);
    assert_eq!(view.total_price, dec!(25));

    // Dropping a line is immediately reflected in derived totals.
    let view = cart_service
        .update_item_quantity("sess-totals", widget, 1)
        .await
        .unwrap();
    assert_eq!(view.total_price, dec!(15));

    let view = cart_service
        .remove_item("sess-totals", gadget)
        .await
        .unwrap();
    assert_eq!(view.total_items, 1);
    assert_eq!(view.total_price, dec!(10));
}

#[tokio::test]
async fn update_to_zero_removes_the_line() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-zero"))
        .await
        .unwrap();
    let product_id = seed_product(&app, "Lamp", dec!(30), 10).await;

    cart_service
        .add_item(
            "sess-zero",
            AddItemInput {
                product_id,
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let view = cart_service
        .update_item_quantity("sess-zero", product_id, 0)
        .await
        .unwrap();

    assert!(view.items.is_empty());
    assert_eq!(view.total_items, 0);
    assert_eq!(view.total_price, Decimal::ZERO);
}

#[tokio::test]
async fn clear_cart_empties_items_and_totals_but_keeps_the_session() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-clear"))
        .await
        .unwrap();
    let product_id = seed_product(&app, "Chair", dec!(45), 5).await;

    cart_service
        .add_item(
            "sess-clear",
            AddItemInput {
                product_id,
                quantity: 3,
            },
        )
        .await
        .unwrap();

    cart_service.clear_cart("sess-clear").await.unwrap();

    // The session token still resolves: the cart rehydrates empty.
    let view = cart_service.get_cart("sess-clear").await.unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.total_items, 0);
    assert_eq!(view.total_price, Decimal::ZERO);
}

#[tokio::test]
async fn cart_rehydrates_by_session_token() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-rehydrate"))
        .await
        .unwrap();
    let product_id = seed_product(&app, "Desk", dec!(120), 2).await;

    cart_service
        .add_item(
            "sess-rehydrate",
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    // A later lookup with the same token sees the same items.
    let view = cart_service.get_cart("sess-rehydrate").await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, product_id);
    assert_eq!(view.items[0].name, "Desk");
}

#[tokio::test]
async fn adding_unknown_product_is_not_found() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-missing"))
        .await
        .unwrap();

    let err = cart_service
        .add_item(
            "sess-missing",
            AddItemInput {
                product_id: uuid::Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn add_rejects_non_positive_quantity() {
    let app = TestApp::new().await;
    let cart_service = &app.state.services.cart;

    cart_service
        .create_cart(create_input("sess-qty"))
        .await
        .unwrap();
    let product_id = seed_product(&app, "Pen", dec!(2), 100).await;

    let err = cart_service
        .add_item(
            "sess-qty",
            AddItemInput {
                product_id,
                quantity: 0,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn unknown_session_token_is_not_found() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .cart
        .get_cart("no-such-session")
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}
