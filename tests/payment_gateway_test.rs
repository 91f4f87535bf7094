use storefront_api::{
    config::PaymentGatewayConfig,
    errors::ServiceError,
    services::payments::{HttpPaymentGateway, PaymentGateway},
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> HttpPaymentGateway {
    HttpPaymentGateway::new(&PaymentGatewayConfig {
        base_url: server.uri(),
        secret_key: "sk_test_abc".to_string(),
        currency: "usd".to_string(),
        request_timeout_secs: 5,
    })
    .expect("failed to build gateway client")
}

#[tokio::test]
async fn create_intent_posts_amount_and_parses_the_intent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(header("authorization", "Bearer sk_test_abc"))
        .and(body_string_contains("amount=4999"))
        .and(body_string_contains("currency=usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pi_42",
            "client_secret": "pi_42_secret_xyz",
            "amount": 4999,
            "currency": "usd",
            "status": "requires_confirmation"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let intent = gateway.create_intent(4999, "usd").await.unwrap();

    assert_eq!(intent.id, "pi_42");
    assert_eq!(intent.client_secret, "pi_42_secret_xyz");
    assert_eq!(intent.amount_minor, 4999);
    assert_eq!(intent.status, "requires_confirmation");
}

#[tokio::test]
async fn create_intent_surfaces_the_gateway_error_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "Amount must be at least 50 cents" }
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway.create_intent(1, "usd").await.unwrap_err();

    match err {
        ServiceError::ExternalServiceError(message) => {
            assert!(message.contains("at least 50 cents"));
        }
        other => panic!("expected ExternalServiceError, got {:?}", other),
    }
}

#[tokio::test]
async fn confirm_intent_returns_the_confirmation_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_42/confirm"))
        .and(body_string_contains("payment_method=tok_visa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "pi_42",
            "status": "succeeded"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let confirmation = gateway.confirm_intent("pi_42", "tok_visa").await.unwrap();

    assert_eq!(confirmation.id, "pi_42");
    assert!(confirmation.succeeded());
}

#[tokio::test]
async fn declined_confirmation_is_a_payment_failure_with_the_gateway_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_42/confirm"))
        .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
            "error": { "message": "Your card was declined." }
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway
        .confirm_intent("pi_42", "tok_chargeDeclined")
        .await
        .unwrap_err();

    match err {
        ServiceError::PaymentFailed(message) => {
            assert!(message.contains("declined"));
        }
        other => panic!("expected PaymentFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn gateway_server_error_is_an_external_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_42/confirm"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = gateway.confirm_intent("pi_42", "tok_visa").await.unwrap_err();

    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}

#[tokio::test]
async fn unreachable_gateway_is_an_external_service_error() {
    // Nothing listens on this port.
    let gateway = HttpPaymentGateway::new(&PaymentGatewayConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        secret_key: "sk_test_abc".to_string(),
        currency: "usd".to_string(),
        request_timeout_secs: 1,
    })
    .unwrap();

    let err = gateway.create_intent(1000, "usd").await.unwrap_err();
    assert!(matches!(err, ServiceError::ExternalServiceError(_)));
}
