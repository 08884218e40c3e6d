//! Response envelopes for command endpoints.
//!
//! Command responses use `{ "success": bool, "message": String }`; the
//! failure shape (which adds `code`) is produced by [`crate::error::AppError`].

use serde::Serialize;

/// Success envelope for `POST /actuator`.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: &'static str,
}

impl CommandResponse {
    pub fn sent() -> Self {
        Self {
            success: true,
            message: "Command sent successfully",
        }
    }
}
