use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header names with wire-level meaning. Everything else in the header
/// map is application metadata carried through untouched.
pub mod headers {
    /// Names the method a call envelope targets.
    pub const ACTION: &str = "action";
    /// Bearer credential consumed by the authentication interceptor.
    pub const AUTH_TOKEN: &str = "auth-token";
    /// Reply header announcing the address of a freshly spawned child
    /// dispatcher for a service-reference result.
    pub const PROXY_ADDR: &str = "proxyaddr";
    /// Request header by which a caller pre-selects the child address
    /// instead of letting the dispatcher mint one.
    pub const NEW_PROXY_ADDR: &str = "newproxyaddr";
}

/// The unit of traffic on the bus: string headers plus a document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl Envelope {
    pub fn new(body: Value) -> Self {
        Envelope {
            headers: BTreeMap::new(),
            body,
        }
    }

    /// A call envelope targeting `action`.
    pub fn call(action: impl Into<String>, body: Value) -> Self {
        Envelope::new(body).with_header(headers::ACTION, action)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn action(&self) -> Option<&str> {
        self.header(headers::ACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_envelope_carries_action() {
        let env = Envelope::call("echo", json!({"x": 1}))
            .with_header(headers::AUTH_TOKEN, "secret");
        assert_eq!(env.action(), Some("echo"));
        assert_eq!(env.header(headers::AUTH_TOKEN), Some("secret"));
        assert_eq!(env.header("missing"), None);
        assert_eq!(env.body, json!({"x": 1}));
    }
}
