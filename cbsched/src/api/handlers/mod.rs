//! HTTP request handlers.
//!
//! - [`fulfillment`]: Validates callback requests and schedules the callback task
//! - [`health`]: Liveness probe
//!
//! Handlers return [`crate::errors::Error`], which converts into the `{retval, retmsg}` JSON
//! body with the matching status code.

pub mod fulfillment;
pub mod health;
