//! Server side of a proxel service proxy: the binder that puts
//! implementations on the bus, the dispatcher that decodes envelopes and
//! invokes them, the interceptor chain that runs ahead of dispatch, and
//! the idle reaper for non-top-level instances.

pub mod auth;
pub mod binder;
pub mod dispatcher;
pub mod interceptor;
pub mod logging;
pub mod target;

pub use auth::{
    AuthenticationInterceptor, AuthenticationProvider, AuthorizationInterceptor,
    AuthorizationProvider, Principal, ProviderError, TokenCredentials, USER_KEY,
};
pub use binder::{BinderError, ServiceBinder, DEFAULT_TIMEOUT};
pub use dispatcher::{DispatchOptions, RegisteredService};
pub use interceptor::{
    InterceptorChain, InterceptorContext, InterceptorHolder, InterceptorKind, ServiceInterceptor,
};
pub use logging::{init_logging, init_test_logging};
pub use target::{CallOutcome, ServiceTarget};
