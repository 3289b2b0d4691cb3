use async_trait::async_trait;
use proxel_core::{RpcValue, ServiceError};
use std::fmt;
use std::sync::Arc;

/// What a service method produced.
pub enum CallOutcome {
    /// A plain value, encoded into the reply body against the method's
    /// declared result shape.
    Value(RpcValue),
    /// A live service instance. The dispatcher spawns a child dispatcher
    /// for it and replies with the child's address instead of a body.
    Service(Arc<dyn ServiceTarget>),
}

impl CallOutcome {
    /// Outcome of a method whose callback carries no value.
    pub fn void() -> Self {
        CallOutcome::Value(RpcValue::Null)
    }
}

impl From<RpcValue> for CallOutcome {
    fn from(value: RpcValue) -> Self {
        CallOutcome::Value(value)
    }
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Value(value) => f.debug_tuple("Value").field(value).finish(),
            CallOutcome::Service(_) => f.write_str("Service(..)"),
        }
    }
}

/// A service implementation as the dispatcher sees it: one entry point,
/// dispatched by method name with already-decoded arguments.
///
/// Arguments arrive in the order the schema declares its value
/// parameters. A [`ServiceError`] returned here travels to the caller
/// verbatim, code and debug info included.
#[async_trait]
pub trait ServiceTarget: Send + Sync {
    async fn call(&self, method: &str, args: Vec<RpcValue>) -> Result<CallOutcome, ServiceError>;
}
