use proxel_core::{
    decode_value, encode_args, headers, CodecError, Envelope, MarshalError, ProxyRegistry,
    ResultKind, RpcValue, ServiceError, ServiceSchema, TypeDescriptor,
};
use proxel_transport::{BusError, MessageBus};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The service failed the call. Carries the failure exactly as the
    /// service raised it.
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Bus(BusError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("failure frame could not be decoded: {0}")]
    Codec(#[from] CodecError),

    #[error("schema '{schema}' has no callable method '{method}'")]
    UnknownMethod { schema: String, method: String },

    #[error("this proxy has been closed")]
    ProxyClosed,

    #[error("reply to '{method}' names no proxy address")]
    MissingProxyAddress { method: String },

    #[error("no schema registered under '{0}'")]
    UnknownSchema(String),
}

/// What came back from an invocation.
#[derive(Debug)]
pub enum StubReply {
    /// Fire-and-forget send, or a void callback acknowledgement.
    None,
    Value(RpcValue),
    /// A stub bound to the child dispatcher announced in the reply.
    Proxy(ServiceProxy),
}

impl StubReply {
    pub fn into_value(self) -> Option<RpcValue> {
        match self {
            StubReply::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<ServiceProxy> {
        match self {
            StubReply::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub auth_token: Option<String>,
    /// Pre-select the child address for a service-reference result
    /// instead of letting the dispatcher mint one.
    pub proxy_address: Option<String>,
}

struct ProxyInner {
    schema: Arc<ServiceSchema>,
    address: String,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ProxyRegistry>,
    auth_token: Option<String>,
    timeout: Duration,
    closed: AtomicBool,
}

/// A schema-driven stub: every method of the schema is invoked by name
/// with positional arguments, marshaled and sent to the service's
/// address. Cheap to clone; clones share the closed flag.
#[derive(Clone)]
pub struct ServiceProxy {
    inner: Arc<ProxyInner>,
}

impl ServiceProxy {
    pub(crate) fn new(
        schema: Arc<ServiceSchema>,
        address: String,
        bus: Arc<dyn MessageBus>,
        registry: Arc<ProxyRegistry>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        ServiceProxy {
            inner: Arc::new(ProxyInner {
                schema,
                address,
                bus,
                registry,
                auth_token,
                timeout,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn schema_name(&self) -> &str {
        &self.inner.schema.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub async fn invoke(&self, method: &str, args: Vec<RpcValue>) -> Result<StubReply, CallError> {
        self.invoke_with(method, args, CallOptions::default()).await
    }

    pub async fn invoke_with(
        &self,
        method: &str,
        args: Vec<RpcValue>,
        options: CallOptions,
    ) -> Result<StubReply, CallError> {
        if self.is_closed() {
            return Err(CallError::ProxyClosed);
        }

        let inner = &self.inner;
        let descriptor = inner
            .schema
            .find_method(method)
            .filter(|m| !m.is_static_or_ignored)
            .ok_or_else(|| CallError::UnknownMethod {
                schema: inner.schema.name.clone(),
                method: method.to_string(),
            })?;

        let body = encode_args(descriptor, &args, inner.registry.records())?;
        let mut envelope = Envelope::call(method, body);
        if let Some(token) = options.auth_token.as_deref().or(inner.auth_token.as_deref()) {
            envelope.set_header(headers::AUTH_TOKEN, token);
        }

        let result_ty = match descriptor.result_kind() {
            ResultKind::FireAndForget => {
                debug!(address = %inner.address, method, "send");
                inner
                    .bus
                    .send(&inner.address, envelope)
                    .await
                    .map_err(CallError::Bus)?;
                if descriptor.is_close {
                    inner.closed.store(true, Ordering::SeqCst);
                }
                return Ok(StubReply::None);
            }
            ResultKind::Callback(result_ty) => result_ty,
        };

        if let (TypeDescriptor::ServiceRef(_), Some(addr)) = (&result_ty, &options.proxy_address)
        {
            envelope.set_header(headers::NEW_PROXY_ADDR, addr.clone());
        }

        let timeout = options.timeout.unwrap_or(inner.timeout);
        debug!(address = %inner.address, method, ?timeout, "request");

        let reply = match inner.bus.request(&inner.address, envelope, timeout).await {
            Ok(reply) => reply,
            Err(BusError::Recipient { frame, .. }) => {
                let failure = inner.registry.errors().decode(&frame)?;
                return Err(CallError::Service(failure));
            }
            Err(other) => return Err(CallError::Bus(other)),
        };

        if descriptor.is_close {
            inner.closed.store(true, Ordering::SeqCst);
        }

        match &result_ty {
            TypeDescriptor::Void => Ok(StubReply::None),
            TypeDescriptor::ServiceRef(child_schema) => {
                let address = reply
                    .header(headers::PROXY_ADDR)
                    .map(str::to_string)
                    .ok_or_else(|| CallError::MissingProxyAddress {
                        method: method.to_string(),
                    })?;
                Ok(StubReply::Proxy(self.child(child_schema, address)?))
            }
            _ => {
                let value = decode_value(&result_ty, reply.body, inner.registry.records())?;
                Ok(StubReply::Value(value))
            }
        }
    }

    /// Invoke a fluent method and get the proxy back for chaining.
    pub async fn invoke_chained(
        &self,
        method: &str,
        args: Vec<RpcValue>,
    ) -> Result<&Self, CallError> {
        self.invoke(method, args).await?;
        Ok(self)
    }

    /// Legacy one-way form of a service-reference method: pre-allocate
    /// the child address, tell the dispatcher through `newproxyaddr`,
    /// and hand back the child stub without waiting for the reply.
    pub async fn invoke_preallocated(
        &self,
        method: &str,
        args: Vec<RpcValue>,
    ) -> Result<ServiceProxy, CallError> {
        if self.is_closed() {
            return Err(CallError::ProxyClosed);
        }

        let inner = &self.inner;
        let descriptor = inner
            .schema
            .find_method(method)
            .filter(|m| !m.is_static_or_ignored)
            .ok_or_else(|| CallError::UnknownMethod {
                schema: inner.schema.name.clone(),
                method: method.to_string(),
            })?;
        let ResultKind::Callback(TypeDescriptor::ServiceRef(child_schema)) =
            descriptor.result_kind()
        else {
            return Err(CallError::UnknownMethod {
                schema: inner.schema.name.clone(),
                method: method.to_string(),
            });
        };

        let body = encode_args(descriptor, &args, inner.registry.records())?;
        let address = Uuid::new_v4().to_string();
        let mut envelope =
            Envelope::call(method, body).with_header(headers::NEW_PROXY_ADDR, address.clone());
        if let Some(token) = inner.auth_token.as_deref() {
            envelope.set_header(headers::AUTH_TOKEN, token);
        }

        debug!(address = %inner.address, method, child = %address, "send with pre-allocated child");
        inner
            .bus
            .send(&inner.address, envelope)
            .await
            .map_err(CallError::Bus)?;
        self.child(&child_schema, address)
    }

    fn child(&self, schema_name: &str, address: String) -> Result<ServiceProxy, CallError> {
        let schema = self
            .inner
            .registry
            .schemas()
            .get(schema_name)
            .ok_or_else(|| CallError::UnknownSchema(schema_name.to_string()))?;
        Ok(ServiceProxy::new(
            schema,
            address,
            Arc::clone(&self.inner.bus),
            Arc::clone(&self.inner.registry),
            self.inner.auth_token.clone(),
            self.inner.timeout,
        ))
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("schema", &self.inner.schema.name)
            .field("address", &self.inner.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}
