//! Server-side SPIRE APIs.
//!
//! - [`bundle`]: the bundle API, serving the server's own bundle and the
//!   bundles of federated trust domains.
//!
//! Errors map onto the gRPC status taxonomy ([`tonic::Code`]). Batch
//! operations report one [`ApiStatus`] per input item instead of failing
//! the whole call.

pub mod bundle;

use serde::{Serialize, Serializer};
use tonic::Code;

/// Outcome of one item of a batch operation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ApiStatus {
    /// gRPC status code.
    #[serde(serialize_with = "serialize_code")]
    pub code: Code,
    /// Human readable message.
    pub message: String,
}

impl ApiStatus {
    /// Creates a status with the given code and message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The status reported for a successful item.
    pub fn ok() -> Self {
        Self::new(Code::Ok, "OK")
    }

    /// Returns `true` if the code is [`Code::Ok`].
    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

/// Converts an item result into its status, taking the code and the message
/// from the error.
pub fn status_from_result<E>(result: &Result<(), E>) -> ApiStatus
where
    E: std::error::Error,
    for<'a> &'a E: Into<Code>,
{
    match result {
        Ok(()) => ApiStatus::ok(),
        Err(e) => ApiStatus::new(e.into(), e.to_string()),
    }
}

fn serialize_code<S: Serializer>(code: &Code, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i32(*code as i32)
}
