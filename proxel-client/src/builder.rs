use crate::proxy::ServiceProxy;
use proxel_core::ProxyRegistry;
use proxel_transport::MessageBus;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reply deadline applied when the builder is not given one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyBuildError {
    #[error("no address set on the builder")]
    MissingAddress,

    #[error("no schema registered under '{0}'")]
    UnknownSchema(String),
}

/// Builds [`ServiceProxy`] stubs against registered schemas.
pub struct ProxyBuilder {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ProxyRegistry>,
    address: Option<String>,
    auth_token: Option<String>,
    timeout: Duration,
}

impl ProxyBuilder {
    pub fn new(bus: Arc<dyn MessageBus>, registry: Arc<ProxyRegistry>) -> Self {
        ProxyBuilder {
            bus,
            registry,
            address: None,
            auth_token: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn set_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Token attached to every call as the `auth-token` header.
    pub fn set_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a stub for the named schema at the configured address.
    pub fn build(&self, schema_name: &str) -> Result<ServiceProxy, ProxyBuildError> {
        let address = self.address.clone().ok_or(ProxyBuildError::MissingAddress)?;
        let schema = self
            .registry
            .schemas()
            .get(schema_name)
            .ok_or_else(|| ProxyBuildError::UnknownSchema(schema_name.to_string()))?;

        Ok(ServiceProxy::new(
            schema,
            address,
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            self.auth_token.clone(),
            self.timeout,
        ))
    }
}

impl fmt::Debug for ProxyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBuilder")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("auth_token", &self.auth_token.as_deref().map(|_| "<set>"))
            .finish()
    }
}
