//! The response envelope shared by all participant endpoints.

use serde::{Deserialize, Serialize};

/// Uniform JSON reply: `{success, data?, message?, error?}`.
///
/// Well-formed replies are always HTTP 200; `success: false` with a
/// `message` marks a moot request (e.g. an unknown saga) that callers must
/// not retry, while `error` carries a step failure that triggers
/// compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// A successful reply carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// A `success: false` reply for a request that is moot rather than
    /// failed (missing saga, missing dependent row).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    /// A `success: false` reply for a step failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_skips_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(42)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 42}));
    }

    #[test]
    fn rejected_carries_message() {
        let json = serde_json::to_value(ApiResponse::<()>::rejected("SagaLog not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "message": "SagaLog not found"})
        );
    }

    #[test]
    fn failed_carries_error() {
        let json = serde_json::to_value(ApiResponse::<()>::failed("declined")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "error": "declined"})
        );
    }

    #[test]
    fn envelope_roundtrip() {
        let envelope = ApiResponse::ok(serde_json::json!({"orderId": "x"}));
        let json = serde_json::to_string(&envelope).unwrap();
        let back: ApiResponse<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }
}
