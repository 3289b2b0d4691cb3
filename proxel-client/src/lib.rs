//! Client side of a proxel service proxy: schema-driven stubs that
//! marshal positional arguments into call envelopes and decode replies,
//! including child stubs for service-reference results.

pub mod builder;
pub mod proxy;

pub use builder::{ProxyBuildError, ProxyBuilder, DEFAULT_CALL_TIMEOUT};
pub use proxy::{CallError, CallOptions, ServiceProxy, StubReply};
