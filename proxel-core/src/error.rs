use serde_json::Value;
use std::fmt;

/// Well-known failure codes carried by [`ServiceError`]. Negative codes
/// are minted by the runtime itself; positive codes follow HTTP status
/// conventions and are minted by interceptors and user services.
pub mod failure_codes {
    /// A service method failed with something other than a [`ServiceError`](super::ServiceError).
    pub const INTERNAL: i32 = -1;
    /// The call envelope named no action, or an action the schema lacks.
    pub const INVALID_ACTION: i32 = -2;
    /// The call body could not be decoded against the method's parameters.
    pub const DECODE: i32 = -3;
    /// The target instance has been closed; the address no longer serves calls.
    pub const INSTANCE_CLOSED: i32 = -4;

    pub const UNAUTHENTICATED: i32 = 401;
    pub const FORBIDDEN: i32 = 403;
    pub const PROVIDER_FAILURE: i32 = 500;
}

/// The one failure shape that crosses the bus. A `ServiceError` raised by
/// a service travels to the caller verbatim: same code, same message,
/// same debug info.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub failure_code: i32,
    pub message: Option<String>,
    pub debug_info: Value,
}

impl ServiceError {
    pub fn new(failure_code: i32, message: impl Into<String>) -> Self {
        ServiceError {
            failure_code,
            message: Some(message.into()),
            debug_info: Value::Null,
        }
    }

    /// An error with a code but no message. Codes are the contract;
    /// messages are advisory.
    pub fn bare(failure_code: i32) -> Self {
        ServiceError {
            failure_code,
            message: None,
            debug_info: Value::Null,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::new(failure_codes::INTERNAL, message)
    }

    pub fn invalid_action(action: &str) -> Self {
        ServiceError::new(
            failure_codes::INVALID_ACTION,
            format!("unknown action: {action}"),
        )
    }

    pub fn missing_action() -> Self {
        ServiceError::new(failure_codes::INVALID_ACTION, "no action header")
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ServiceError::new(failure_codes::DECODE, message)
    }

    pub fn instance_closed() -> Self {
        ServiceError::new(failure_codes::INSTANCE_CLOSED, "service instance closed")
    }

    pub fn with_debug_info(mut self, debug_info: Value) -> Self {
        self.debug_info = debug_info;
        self
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "service error {}: {}", self.failure_code, message),
            None => write!(f, "service error {}", self.failure_code),
        }
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_with_and_without_message() {
        let e = ServiceError::new(25, "out of cheese");
        assert_eq!(e.to_string(), "service error 25: out of cheese");
        assert_eq!(ServiceError::bare(25).to_string(), "service error 25");
    }

    #[test]
    fn test_debug_info_attaches() {
        let e = ServiceError::internal("boom").with_debug_info(json!({"at": "dispatch"}));
        assert_eq!(e.failure_code, failure_codes::INTERNAL);
        assert_eq!(e.debug_info, json!({"at": "dispatch"}));
    }
}
