//! Callback request validation and task construction.
//!
//! This is the pure part of fulfillment: turn the raw request body into a validated
//! [`CallbackRequest`], derive the callback time, and build the [`HttpTask`] that calls the
//! downstream handler with `{queueId, callbackNumber}` at that time. Nothing here touches
//! the network.

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::api::models::fulfillment::FulfillmentRequest;
use crate::errors::{Error, Result};
use crate::tasks::HttpTask;

/// Seconds and milliseconds appended to the caller's minute-precision time
const SECONDS_SUFFIX: &str = ":00.000";

/// A callback request with every required field present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    /// Local time as sent, `YYYY-MM-DDTHH:MM`
    pub scheduled_time: String,
    pub queue_id: String,
    /// Caller number to call back
    pub ani: String,
}

impl CallbackRequest {
    /// Parse and validate a raw request body.
    ///
    /// A body that is not a JSON fulfillment request, or that lacks any intermediate object,
    /// fails validation the same way a missing field does.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let request: FulfillmentRequest = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "Request body is not a fulfillment request");
            Error::InvalidParameters {
                message: format!("malformed request body: {e}"),
            }
        })?;

        Self::try_from(request)
    }
}

impl TryFrom<FulfillmentRequest> for CallbackRequest {
    type Error = Error;

    fn try_from(request: FulfillmentRequest) -> Result<Self> {
        let scheduled_time = required_field("scheduledTime", request.scheduled_time)?;

        let details = request
            .interaction
            .and_then(|interaction| interaction.call_processing_details)
            .unwrap_or_default();
        let queue_id = details
            .queue_id
            .filter(|queue_id| !queue_id.is_empty())
            .or(details.legacy_queue_id);
        let queue_id = required_field("queueId", queue_id)?;
        let ani = required_field("ani", details.ani)?;

        Ok(Self {
            scheduled_time,
            queue_id,
            ani,
        })
    }
}

fn required_field(field: &'static str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => {
            tracing::debug!(field, "Request missing required field");
            Err(Error::InvalidParameters {
                message: format!("missing {field}"),
            })
        }
    }
}

/// Payload delivered to the downstream handler when the task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub queue_id: String,
    pub callback_number: String,
}

impl From<&CallbackRequest> for CallbackPayload {
    fn from(request: &CallbackRequest) -> Self {
        Self {
            queue_id: request.queue_id.clone(),
            callback_number: request.ani.clone(),
        }
    }
}

/// Interpret `scheduled_time` (`YYYY-MM-DDTHH:MM`) as local time at `offset`.
///
/// No plausibility checks: times in the past are returned as-is and left to the queue.
pub fn parse_scheduled_time(scheduled_time: &str, offset: FixedOffset) -> anyhow::Result<DateTime<Utc>> {
    let timestamp = format!("{scheduled_time}{SECONDS_SUFFIX}{offset}");
    let parsed = DateTime::parse_from_rfc3339(&timestamp).with_context(|| format!("invalid scheduledTime '{scheduled_time}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Build the deferred task that calls `handler_url` at the requested time.
pub fn build_task(request: &CallbackRequest, handler_url: &str, offset: FixedOffset) -> Result<HttpTask> {
    let schedule_time = parse_scheduled_time(&request.scheduled_time, offset)?;

    let payload = CallbackPayload::from(request);
    tracing::debug!(?payload, %schedule_time, "Built callback payload");

    let task = HttpTask::post_json(handler_url, &payload, schedule_time).context("serialize callback payload")?;
    Ok(task)
}
