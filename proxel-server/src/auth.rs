use crate::interceptor::{InterceptorContext, ServiceInterceptor};
use async_trait::async_trait;
use proxel_core::{failure_codes, headers, ServiceError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Context key under which the authentication interceptor stores the
/// [`Principal`] for everything downstream.
pub const USER_KEY: &str = "user";

/// Credential extracted from the `auth-token` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    pub token: String,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Principal {
            subject: subject.into(),
        }
    }
}

/// A provider-side failure, distinct from a rejected credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Resolves a token to a principal. `Ok(None)` means the token is
/// well-formed but not valid; `Err` means the provider itself failed.
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    async fn authenticate(
        &self,
        credentials: &TokenCredentials,
    ) -> Result<Option<Principal>, ProviderError>;
}

/// Yields the set of grants held by a principal.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    async fn authorizations(&self, principal: &Principal) -> Result<HashSet<String>, ProviderError>;
}

/// Authenticates the `auth-token` header and stores the resulting
/// principal under [`USER_KEY`]. A missing or rejected token fails with
/// 401; a missing or failing provider with 500.
pub struct AuthenticationInterceptor {
    provider: Option<Arc<dyn AuthenticationProvider>>,
}

impl AuthenticationInterceptor {
    pub fn new(provider: Arc<dyn AuthenticationProvider>) -> Self {
        AuthenticationInterceptor {
            provider: Some(provider),
        }
    }

    /// An interceptor with no provider. Every authenticated call fails
    /// with 500 until one is configured; used to fail closed rather
    /// than open.
    pub fn unconfigured() -> Self {
        AuthenticationInterceptor { provider: None }
    }
}

impl fmt::Debug for AuthenticationInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationInterceptor")
            .field("configured", &self.provider.is_some())
            .finish()
    }
}

#[async_trait]
impl ServiceInterceptor for AuthenticationInterceptor {
    async fn intercept(&self, ctx: &mut InterceptorContext) -> Result<(), ServiceError> {
        let Some(token) = ctx.envelope.header(headers::AUTH_TOKEN) else {
            return Err(ServiceError::new(
                failure_codes::UNAUTHENTICATED,
                "Unauthorized",
            ));
        };
        let Some(provider) = &self.provider else {
            return Err(ServiceError::new(
                failure_codes::PROVIDER_FAILURE,
                "no authentication provider configured",
            ));
        };

        let credentials = TokenCredentials {
            token: token.to_string(),
        };
        match provider.authenticate(&credentials).await {
            Ok(Some(principal)) => {
                ctx.put(USER_KEY, principal);
                Ok(())
            }
            Ok(None) => Err(ServiceError::new(
                failure_codes::UNAUTHENTICATED,
                "Unauthorized",
            )),
            Err(e) => {
                warn!(error = %e, "authentication provider failed");
                Err(ServiceError::new(failure_codes::PROVIDER_FAILURE, e.0))
            }
        }
    }
}

/// Checks the caller's grants against a required set. Calls with no
/// principal in the context pass through untouched so the interceptor
/// can sit on services with mixed public and protected actions.
pub struct AuthorizationInterceptor {
    provider: Arc<dyn AuthorizationProvider>,
    required: HashSet<String>,
}

impl AuthorizationInterceptor {
    pub fn new(provider: Arc<dyn AuthorizationProvider>) -> Self {
        AuthorizationInterceptor {
            provider,
            required: HashSet::new(),
        }
    }

    pub fn set_authorizations(mut self, required: HashSet<String>) -> Self {
        self.required = required;
        self
    }

    pub fn add_authorization(mut self, grant: impl Into<String>) -> Self {
        self.required.insert(grant.into());
        self
    }
}

impl fmt::Debug for AuthorizationInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationInterceptor")
            .field("required", &self.required)
            .finish()
    }
}

#[async_trait]
impl ServiceInterceptor for AuthorizationInterceptor {
    async fn intercept(&self, ctx: &mut InterceptorContext) -> Result<(), ServiceError> {
        if self.required.is_empty() {
            return Ok(());
        }
        let Some(principal) = ctx.get::<Principal>(USER_KEY) else {
            return Ok(());
        };

        let held = match self.provider.authorizations(&principal).await {
            Ok(held) => held,
            Err(e) => {
                warn!(error = %e, subject = %principal.subject, "authorization provider failed");
                return Err(ServiceError::new(failure_codes::PROVIDER_FAILURE, e.0));
            }
        };

        if self.required.iter().any(|grant| !held.contains(grant)) {
            return Err(ServiceError::new(failure_codes::FORBIDDEN, "Forbidden"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxel_core::Envelope;
    use serde_json::json;

    struct FixedAuthn;

    #[async_trait]
    impl AuthenticationProvider for FixedAuthn {
        async fn authenticate(
            &self,
            credentials: &TokenCredentials,
        ) -> Result<Option<Principal>, ProviderError> {
            match credentials.token.as_str() {
                "valid" => Ok(Some(Principal::new("alice"))),
                "explode" => Err(ProviderError("directory offline".to_string())),
                _ => Ok(None),
            }
        }
    }

    struct FixedAuthz;

    #[async_trait]
    impl AuthorizationProvider for FixedAuthz {
        async fn authorizations(
            &self,
            principal: &Principal,
        ) -> Result<HashSet<String>, ProviderError> {
            match principal.subject.as_str() {
                "alice" => Ok(["reader".to_string()].into_iter().collect()),
                "eve" => Err(ProviderError("grant store offline".to_string())),
                _ => Ok(HashSet::new()),
            }
        }
    }

    fn ctx_with_token(token: Option<&str>) -> InterceptorContext {
        let mut envelope = Envelope::call("m", json!({}));
        if let Some(token) = token {
            envelope.set_header(headers::AUTH_TOKEN, token);
        }
        InterceptorContext::new(envelope)
    }

    #[tokio::test]
    async fn test_valid_token_stores_principal() {
        let interceptor = AuthenticationInterceptor::new(Arc::new(FixedAuthn));
        let mut ctx = ctx_with_token(Some("valid"));
        interceptor.intercept(&mut ctx).await.unwrap();
        assert_eq!(
            ctx.get::<Principal>(USER_KEY).as_deref(),
            Some(&Principal::new("alice"))
        );
    }

    #[tokio::test]
    async fn test_missing_and_rejected_tokens_fail_401() {
        let interceptor = AuthenticationInterceptor::new(Arc::new(FixedAuthn));

        let mut ctx = ctx_with_token(None);
        let err = interceptor.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::UNAUTHENTICATED);

        let mut ctx = ctx_with_token(Some("wrong"));
        let err = interceptor.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::UNAUTHENTICATED);
    }

    #[tokio::test]
    async fn test_provider_problems_fail_500() {
        let unconfigured = AuthenticationInterceptor::unconfigured();
        let mut ctx = ctx_with_token(Some("valid"));
        let err = unconfigured.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::PROVIDER_FAILURE);

        let interceptor = AuthenticationInterceptor::new(Arc::new(FixedAuthn));
        let mut ctx = ctx_with_token(Some("explode"));
        let err = interceptor.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::PROVIDER_FAILURE);
        assert_eq!(err.message.as_deref(), Some("directory offline"));
    }

    #[tokio::test]
    async fn test_grant_checks() {
        let interceptor =
            AuthorizationInterceptor::new(Arc::new(FixedAuthz)).add_authorization("reader");

        // No principal in the context: pass through.
        let mut ctx = ctx_with_token(None);
        interceptor.intercept(&mut ctx).await.unwrap();

        let mut ctx = ctx_with_token(None);
        ctx.put(USER_KEY, Principal::new("alice"));
        interceptor.intercept(&mut ctx).await.unwrap();

        let mut ctx = ctx_with_token(None);
        ctx.put(USER_KEY, Principal::new("bob"));
        let err = interceptor.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::FORBIDDEN);
        assert_eq!(err.message.as_deref(), Some("Forbidden"));

        let mut ctx = ctx_with_token(None);
        ctx.put(USER_KEY, Principal::new("eve"));
        let err = interceptor.intercept(&mut ctx).await.unwrap_err();
        assert_eq!(err.failure_code, failure_codes::PROVIDER_FAILURE);
    }

    #[tokio::test]
    async fn test_no_required_grants_passes() {
        let interceptor = AuthorizationInterceptor::new(Arc::new(FixedAuthz));
        let mut ctx = ctx_with_token(None);
        ctx.put(USER_KEY, Principal::new("bob"));
        interceptor.intercept(&mut ctx).await.unwrap();
    }
}
