//! Actuator command validation.
//!
//! Commands are opaque to the backend: the only check is that the body is
//! syntactically valid JSON. The bytes are then forwarded unchanged.

use crate::error::CoreError;

/// Check that `body` parses as JSON.
///
/// Returns a `CoreError::Validation` carrying the parser message if not.
pub fn validate_command(body: &[u8]) -> Result<(), CoreError> {
    serde_json::from_slice::<serde::de::IgnoredAny>(body)
        .map(|_| ())
        .map_err(|e| CoreError::Validation(format!("Invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn accepts_object() {
        assert!(validate_command(br#"{"pump":"on"}"#).is_ok());
    }

    #[test]
    fn accepts_any_json_value() {
        assert!(validate_command(b"[1, 2, 3]").is_ok());
        assert!(validate_command(b"true").is_ok());
    }

    #[test]
    fn rejects_truncated_json() {
        assert_matches!(
            validate_command(br#"{"pump":"#),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_empty_body() {
        assert_matches!(validate_command(b""), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert_matches!(
            validate_command(br#"{"pump":"on"} trailing"#),
            Err(CoreError::Validation(_))
        );
    }
}
