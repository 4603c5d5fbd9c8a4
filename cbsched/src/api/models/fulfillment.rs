//! Request and response models for the fulfillment endpoint.
//!
//! Field names follow the contact-center flow payloads (camelCase). Every request field is
//! optional at this layer; presence is checked when the request is converted into a
//! [`crate::callback::CallbackRequest`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Callback request posted by the contact-center flow.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentRequest {
    /// Local callback time, `YYYY-MM-DDTHH:MM`
    #[serde(default)]
    #[schema(example = "2023-01-15T14:30")]
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub interaction: Option<Interaction>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(default)]
    pub call_processing_details: Option<CallProcessingDetails>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct CallProcessingDetails {
    /// Contact-center queue the callback is routed to
    #[serde(default, rename = "queueId")]
    pub queue_id: Option<String>,
    /// Spelling sent by older flows; used only when `queueId` is absent or empty
    #[serde(default, rename = "QueueId")]
    pub legacy_queue_id: Option<String>,
    /// Caller number (automatic number identification)
    #[serde(default)]
    pub ani: Option<String>,
}

/// Body of every fulfillment response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct FulfillmentResponse {
    /// 0 on success, 1 invalid parameters, 2 task not created, -1 configuration or unhandled error
    pub retval: i32,
    pub retmsg: String,
}

impl FulfillmentResponse {
    pub fn new(retval: i32, retmsg: impl Into<String>) -> Self {
        Self {
            retval,
            retmsg: retmsg.into(),
        }
    }

    pub fn ok(retmsg: impl Into<String>) -> Self {
        Self::new(0, retmsg)
    }
}
