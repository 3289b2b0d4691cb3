use async_trait::async_trait;
use proxel_core::{Envelope, FailureFrame};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BusError {
    #[error("no handler registered at '{0}'")]
    NoHandler(String),

    #[error("no reply from '{address}' within {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("address '{0}' already has a consumer")]
    AddressInUse(String),

    /// The recipient handled the call and failed it. The frame decodes
    /// into a `ServiceError` through the caller's codec registry.
    #[error("recipient at '{address}' failed the call")]
    Recipient {
        address: String,
        frame: FailureFrame,
    },
}

/// One-shot reply handle attached to a request delivery. Consumed by
/// replying or failing; dropping it without either leaves the caller to
/// its timeout.
#[derive(Debug)]
pub struct Replier {
    tx: oneshot::Sender<Result<Envelope, FailureFrame>>,
}

impl Replier {
    pub fn new(tx: oneshot::Sender<Result<Envelope, FailureFrame>>) -> Self {
        Replier { tx }
    }

    /// Send the reply. A reply landing after the caller gave up is
    /// dropped silently.
    pub fn reply(self, envelope: Envelope) {
        let _ = self.tx.send(Ok(envelope));
    }

    pub fn fail(self, frame: FailureFrame) {
        let _ = self.tx.send(Err(frame));
    }
}

/// An envelope as it arrives at a consumer, with the reply handle when
/// the sender expects one.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub replier: Option<Replier>,
}

impl Delivery {
    pub fn expects_reply(&self) -> bool {
        self.replier.is_some()
    }
}

/// Receiving end of an address registration. Deliveries arrive in send
/// order; the stream ends when the address is released.
#[derive(Debug)]
pub struct Consumer {
    address: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Consumer {
    pub fn new(address: String, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Consumer { address, rx }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Point-to-point, address-routed messaging. One consumer owns an
/// address at a time; senders need nothing but the address string.
#[async_trait]
pub trait MessageBus: Send + Sync + fmt::Debug {
    /// Fire-and-forget send to `address`.
    async fn send(&self, address: &str, envelope: Envelope) -> Result<(), BusError>;

    /// Send expecting exactly one reply within `timeout`.
    async fn request(
        &self,
        address: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, BusError>;

    /// Claim `address` and start receiving its deliveries.
    fn consume(&self, address: &str) -> Result<Consumer, BusError>;

    /// Drop the registration at `address`, ending its consumer's stream.
    fn release(&self, address: &str);
}
