//! OpenAPI documentation, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::fulfillment::{CallProcessingDetails, FulfillmentRequest, FulfillmentResponse, Interaction};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "cbsched",
        description = "Schedules contact-center callbacks as deferred HTTP tasks.",
    ),
    paths(
        api::handlers::fulfillment::handle_fulfillment,
        api::handlers::health::healthz,
    ),
    components(
        schemas(FulfillmentRequest, Interaction, CallProcessingDetails, FulfillmentResponse)
    ),
    tags(
        (name = "fulfillment", description = "Callback scheduling webhook"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;
