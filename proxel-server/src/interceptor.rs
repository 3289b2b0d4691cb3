use async_trait::async_trait;
use proxel_core::{Envelope, ServiceError};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Mutable state threaded through the interceptor chain ahead of
/// dispatch: the envelope itself plus a typed side-channel for values
/// one interceptor leaves for a later one, such as the authenticated
/// principal.
pub struct InterceptorContext {
    pub envelope: Envelope,
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for InterceptorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorContext")
            .field("envelope", &self.envelope)
            .field("values", &self.values.keys())
            .finish()
    }
}

impl InterceptorContext {
    pub fn new(envelope: Envelope) -> Self {
        InterceptorContext {
            envelope,
            values: HashMap::new(),
        }
    }

    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

/// Runs ahead of dispatch on every envelope its action filter matches.
/// Returning an error short-circuits the chain: the call never reaches
/// the service and the error becomes the failure reply.
#[async_trait]
pub trait ServiceInterceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut InterceptorContext) -> Result<(), ServiceError>;
}

/// Phase an interceptor belongs to. The chain runs phases in this order
/// and rejects registrations that would run an earlier phase after a
/// later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InterceptorKind {
    Authentication,
    Authorization,
    User,
}

impl fmt::Display for InterceptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorKind::Authentication => f.write_str("authentication"),
            InterceptorKind::Authorization => f.write_str("authorization"),
            InterceptorKind::User => f.write_str("user"),
        }
    }
}

/// A registered interceptor: its phase, an optional action filter and
/// the interceptor itself.
#[derive(Clone)]
pub struct InterceptorHolder {
    pub kind: InterceptorKind,
    pub action: Option<String>,
    pub interceptor: Arc<dyn ServiceInterceptor>,
}

impl InterceptorHolder {
    pub fn new(
        kind: InterceptorKind,
        action: Option<String>,
        interceptor: Arc<dyn ServiceInterceptor>,
    ) -> Self {
        InterceptorHolder {
            kind,
            action,
            interceptor,
        }
    }

    fn applies_to(&self, ctx: &InterceptorContext) -> bool {
        match &self.action {
            Some(action) => ctx.envelope.action() == Some(action.as_str()),
            None => true,
        }
    }
}

impl fmt::Debug for InterceptorHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorHolder")
            .field("kind", &self.kind)
            .field("action", &self.action)
            .finish()
    }
}

/// The compiled chain. Holders run in registration order, which the
/// binder has already constrained to be non-decreasing by phase.
#[derive(Debug, Default)]
pub struct InterceptorChain {
    holders: Vec<InterceptorHolder>,
}

impl InterceptorChain {
    pub fn new(holders: Vec<InterceptorHolder>) -> Self {
        InterceptorChain { holders }
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub async fn run(&self, ctx: &mut InterceptorContext) -> Result<(), ServiceError> {
        for holder in &self.holders {
            if holder.applies_to(ctx) {
                holder.interceptor.intercept(ctx).await?;
            }
        }
        Ok(())
    }
}
