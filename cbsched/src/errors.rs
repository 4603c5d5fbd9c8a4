use crate::api::models::fulfillment::FulfillmentResponse;
use crate::tasks::TaskQueueError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;
use thiserror::Error as ThisError;

/// Wire message for configuration failures. The misspelling is part of the response contract
/// that existing contact-center flows match on.
pub const CONFIGURATION_FAILURE_MESSAGE: &str = "application intialization failure";
pub const INVALID_PARAMETERS_MESSAGE: &str = "Invalid parameters";
pub const TASK_NOT_CREATED_MESSAGE: &str = "Failed to create task.";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Required service configuration is missing or unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The callback request is missing a required field or is not a fulfillment request at all
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// The task queue accepted the call but reported no task
    #[error("Task queue did not return a created task")]
    TaskNotCreated,

    /// Task queue submission failed
    #[error(transparent)]
    TaskQueue(#[from] TaskQueueError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidParameters { .. } => StatusCode::BAD_REQUEST,
            Error::Configuration { .. } | Error::TaskNotCreated | Error::TaskQueue(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Result code carried in the `retval` field of the response body
    pub fn retval(&self) -> i32 {
        match self {
            Error::Configuration { .. } | Error::TaskQueue(_) | Error::Other(_) => -1,
            Error::InvalidParameters { .. } => 1,
            Error::TaskNotCreated => 2,
        }
    }

    /// Returns the message sent to the caller. Configuration and validation details stay in the
    /// logs; unhandled errors expose their top-level message only, never the context chain.
    pub fn user_message(&self) -> String {
        match self {
            Error::Configuration { .. } => CONFIGURATION_FAILURE_MESSAGE.to_string(),
            Error::InvalidParameters { .. } => INVALID_PARAMETERS_MESSAGE.to_string(),
            Error::TaskNotCreated => TASK_NOT_CREATED_MESSAGE.to_string(),
            Error::TaskQueue(err) => format!("Unhandled error: {err}"),
            Error::Other(err) => format!("Unhandled error: {err}"),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "configuration",
            Error::InvalidParameters { .. } => "invalid_parameters",
            Error::TaskNotCreated => "task_not_created",
            Error::TaskQueue(_) | Error::Other(_) => "unhandled",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::TaskQueue(_) | Error::Other(_) => {
                tracing::error!("Unhandled error: {:#}", self);
            }
            Error::Configuration { .. } => {
                tracing::warn!("Application initialization error: {}", self);
            }
            Error::TaskNotCreated => {
                tracing::warn!("Task submission failed: {}", self);
            }
            Error::InvalidParameters { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        metrics::counter!("cbsched_fulfillment_failures_total", "kind" => self.kind()).increment(1);

        let body = FulfillmentResponse::new(self.retval(), self.user_message());
        (self.status_code(), Json(body)).into_response()
    }
}

/// Converts a handler panic into the unhandled-error response, for use with
/// `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "handler panicked".to_string()
    };

    Error::Other(anyhow::anyhow!(details)).into_response()
}

/// Type alias for fulfillment results
pub type Result<T> = std::result::Result<T, Error>;
