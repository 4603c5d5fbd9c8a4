//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! The fulfillment endpoint is served at `/` for any method, matching how contact-center flows
//! call it (including browser `OPTIONS` preflights). The OpenAPI document is available at
//! `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
