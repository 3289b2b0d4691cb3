use crate::auth::{AuthenticationInterceptor, AuthenticationProvider, AuthorizationInterceptor};
use crate::dispatcher::{spawn_dispatcher, DispatchOptions, RegisteredService};
use crate::interceptor::{
    InterceptorChain, InterceptorHolder, InterceptorKind, ServiceInterceptor,
};
use crate::target::ServiceTarget;
use proxel_core::ProxyRegistry;
use proxel_transport::{BusError, MessageBus};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Idle timeout applied when the binder is not given one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BinderError {
    #[error("no address set on the binder")]
    MissingAddress,

    #[error("no schema registered under '{0}'")]
    UnknownSchema(String),

    #[error("cannot add {new} interceptor after {last}")]
    InterceptorOrder {
        last: InterceptorKind,
        new: InterceptorKind,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Builder that puts service implementations on the bus.
///
/// Configure an address, optional interceptors and lifecycle options,
/// then [`register`](ServiceBinder::register) an implementation against
/// a schema name. One binder can register several services at the same
/// settings; each registration gets its own dispatcher.
pub struct ServiceBinder {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ProxyRegistry>,
    address: Option<String>,
    timeout: Duration,
    top_level: bool,
    include_debug_info: bool,
    interceptors: Vec<InterceptorHolder>,
}

impl ServiceBinder {
    pub fn new(bus: Arc<dyn MessageBus>, registry: Arc<ProxyRegistry>) -> Self {
        ServiceBinder {
            bus,
            registry,
            address: None,
            timeout: DEFAULT_TIMEOUT,
            top_level: true,
            include_debug_info: false,
            interceptors: Vec::new(),
        }
    }

    pub fn set_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Top-level services are never reaped for idleness. Defaults to
    /// true; children spawned for service-reference results are always
    /// non-top-level regardless of this setting.
    pub fn set_top_level(mut self, top_level: bool) -> Self {
        self.top_level = top_level;
        self
    }

    pub fn set_include_debug_info(mut self, include_debug_info: bool) -> Self {
        self.include_debug_info = include_debug_info;
        self
    }

    pub fn add_authentication_interceptor(
        self,
        provider: Arc<dyn AuthenticationProvider>,
    ) -> Result<Self, BinderError> {
        self.push(InterceptorHolder::new(
            InterceptorKind::Authentication,
            None,
            Arc::new(AuthenticationInterceptor::new(provider)),
        ))
    }

    pub fn add_authorization_interceptor(
        self,
        interceptor: AuthorizationInterceptor,
    ) -> Result<Self, BinderError> {
        self.push(InterceptorHolder::new(
            InterceptorKind::Authorization,
            None,
            Arc::new(interceptor),
        ))
    }

    /// Add a user interceptor running on every action.
    pub fn add_interceptor(
        self,
        interceptor: Arc<dyn ServiceInterceptor>,
    ) -> Result<Self, BinderError> {
        self.push(InterceptorHolder::new(InterceptorKind::User, None, interceptor))
    }

    /// Add a user interceptor running only on the named action.
    pub fn add_interceptor_for(
        self,
        action: impl Into<String>,
        interceptor: Arc<dyn ServiceInterceptor>,
    ) -> Result<Self, BinderError> {
        self.push(InterceptorHolder::new(
            InterceptorKind::User,
            Some(action.into()),
            interceptor,
        ))
    }

    /// Interceptors run in registration order; a phase may never be
    /// registered behind a later one.
    fn push(mut self, holder: InterceptorHolder) -> Result<Self, BinderError> {
        if let Some(last) = self.interceptors.last() {
            if last.kind > holder.kind {
                return Err(BinderError::InterceptorOrder {
                    last: last.kind,
                    new: holder.kind,
                });
            }
        }
        self.interceptors.push(holder);
        Ok(self)
    }

    /// Bind an implementation of the named schema to the configured
    /// address and start dispatching.
    pub fn register(
        &self,
        schema_name: &str,
        service: Arc<dyn ServiceTarget>,
    ) -> Result<RegisteredService, BinderError> {
        let address = self.address.clone().ok_or(BinderError::MissingAddress)?;
        let schema = self
            .registry
            .schemas()
            .get(schema_name)
            .ok_or_else(|| BinderError::UnknownSchema(schema_name.to_string()))?;

        let registered = spawn_dispatcher(
            Arc::clone(&self.bus),
            address,
            schema,
            service,
            Arc::clone(&self.registry),
            Arc::new(InterceptorChain::new(self.interceptors.clone())),
            DispatchOptions {
                timeout: self.timeout,
                top_level: self.top_level,
                include_debug_info: self.include_debug_info,
            },
        )?;
        Ok(registered)
    }
}

impl fmt::Debug for ServiceBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBinder")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("top_level", &self.top_level)
            .field("include_debug_info", &self.include_debug_info)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Principal, ProviderError, TokenCredentials};
    use crate::interceptor::InterceptorContext;
    use async_trait::async_trait;
    use proxel_core::{ServiceError, ServiceSchema};
    use proxel_transport::InMemoryBus;
    use std::collections::HashSet;

    struct NoopAuthn;

    #[async_trait]
    impl AuthenticationProvider for NoopAuthn {
        async fn authenticate(
            &self,
            _credentials: &TokenCredentials,
        ) -> Result<Option<Principal>, ProviderError> {
            Ok(None)
        }
    }

    struct NoopAuthz;

    #[async_trait]
    impl crate::auth::AuthorizationProvider for NoopAuthz {
        async fn authorizations(
            &self,
            _principal: &Principal,
        ) -> Result<HashSet<String>, ProviderError> {
            Ok(HashSet::new())
        }
    }

    struct Noop;

    #[async_trait]
    impl ServiceInterceptor for Noop {
        async fn intercept(&self, _ctx: &mut InterceptorContext) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    struct NoopService;

    #[async_trait]
    impl ServiceTarget for NoopService {
        async fn call(
            &self,
            _method: &str,
            _args: Vec<proxel_core::RpcValue>,
        ) -> Result<crate::target::CallOutcome, ServiceError> {
            Ok(crate::target::CallOutcome::void())
        }
    }

    fn binder() -> ServiceBinder {
        let registry = Arc::new(ProxyRegistry::new());
        registry
            .schemas()
            .register(ServiceSchema::new("Empty"))
            .unwrap();
        ServiceBinder::new(Arc::new(InMemoryBus::new()), registry)
    }

    #[tokio::test]
    async fn test_phases_cannot_run_out_of_order() {
        let result = binder()
            .add_interceptor(Arc::new(Noop))
            .unwrap()
            .add_authentication_interceptor(Arc::new(NoopAuthn));
        assert_eq!(
            result.err(),
            Some(BinderError::InterceptorOrder {
                last: InterceptorKind::User,
                new: InterceptorKind::Authentication,
            })
        );

        // The documented order passes.
        binder()
            .add_authentication_interceptor(Arc::new(NoopAuthn))
            .unwrap()
            .add_authorization_interceptor(AuthorizationInterceptor::new(Arc::new(NoopAuthz)))
            .unwrap()
            .add_interceptor(Arc::new(Noop))
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_requires_address_and_schema() {
        let b = binder();
        assert_eq!(
            b.register("Empty", Arc::new(NoopService)).err(),
            Some(BinderError::MissingAddress)
        );

        let b = binder().set_address("svc.addr");
        assert_eq!(
            b.register("Missing", Arc::new(NoopService)).err(),
            Some(BinderError::UnknownSchema("Missing".to_string()))
        );
        assert!(b.register("Empty", Arc::new(NoopService)).is_ok());
    }
}
