use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Backend for a standard e-commerce storefront.

## Features

- **Product Catalog**: Read-only product and category listings
- **Session Carts**: Durable per-session carts with derived totals
- **Checkout**: Payment-intent checkout against a hosted payment gateway
- **Order Management**: Admin/seller order listing and status updates

## Authentication

Checkout and order endpoints require a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Failures return a consistent body with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Validation failed",
  "request_id": "req-abc123",
  "timestamp": "2025-01-01T00:00:00Z"
}
```

A completed charge whose order could not be recorded returns a dedicated
500 payload whose message carries the payment reference to quote to
support.
"#
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::orders::ShippingAddress,
        crate::services::checkout::CheckoutStarted,
    )),
    tags(
        (name = "products", description = "Product catalog"),
        (name = "carts", description = "Session carts"),
        (name = "checkout", description = "Checkout flow"),
        (name = "orders", description = "Order management"),
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the OpenAPI document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
