//! API request and response data models.
//!
//! - [`fulfillment`]: Callback request payload and the `{retval, retmsg}` response envelope

pub mod fulfillment;
