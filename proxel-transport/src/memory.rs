use crate::bus::{BusError, Consumer, Delivery, MessageBus, Replier};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use proxel_core::Envelope;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Process-local bus backed by per-address channels. The reference
/// transport: every dispatcher and stub test runs against it, and small
/// deployments can use it as-is.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: DashMap<String, mpsc::UnboundedSender<Delivery>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn deliver(&self, address: &str, delivery: Delivery) -> Result<(), BusError> {
        let Some(tx) = self.handlers.get(address).map(|h| h.value().clone()) else {
            return Err(BusError::NoHandler(address.to_string()));
        };
        if tx.send(delivery).is_err() {
            // Consumer dropped without release; clear the stale entry.
            self.handlers
                .remove_if(address, |_, handler| handler.is_closed());
            return Err(BusError::NoHandler(address.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn send(&self, address: &str, envelope: Envelope) -> Result<(), BusError> {
        trace!(address, "send");
        self.deliver(
            address,
            Delivery {
                envelope,
                replier: None,
            },
        )
    }

    async fn request(
        &self,
        address: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<Envelope, BusError> {
        trace!(address, ?timeout, "request");
        let (tx, rx) = oneshot::channel();
        self.deliver(
            address,
            Delivery {
                envelope,
                replier: Some(Replier::new(tx)),
            },
        )?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(frame))) => Err(BusError::Recipient {
                address: address.to_string(),
                frame,
            }),
            // Replier dropped without answering: the handler is gone.
            Ok(Err(_)) => Err(BusError::NoHandler(address.to_string())),
            Err(_) => Err(BusError::Timeout {
                address: address.to_string(),
                timeout,
            }),
        }
    }

    fn consume(&self, address: &str) -> Result<Consumer, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.handlers.entry(address.to_string()) {
            Entry::Occupied(mut slot) => {
                if !slot.get().is_closed() {
                    return Err(BusError::AddressInUse(address.to_string()));
                }
                slot.insert(tx);
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }
        debug!(address, "consumer registered");
        Ok(Consumer::new(address.to_string(), rx))
    }

    fn release(&self, address: &str) {
        if self.handlers.remove(address).is_some() {
            debug!(address, "consumer released");
        }
    }
}

impl fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("addresses", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxel_core::{BaseErrorCodec, ErrorCodec, FailureFrame, ServiceError};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_request_reply() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.consume("service.addr").unwrap();

        let server = tokio::spawn(async move {
            let delivery = consumer.recv().await.unwrap();
            assert_eq!(delivery.envelope.body, json!({"x": 1}));
            let replier = delivery.replier.unwrap();
            replier.reply(Envelope::new(json!("pong")));
        });

        let reply = bus
            .request("service.addr", Envelope::new(json!({"x": 1})), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply.body, json!("pong"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_recipient_failure_carries_frame() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.consume("service.addr").unwrap();
        let error = ServiceError::new(7, "nope");
        let frame = FailureFrame {
            codec: "service.error".to_string(),
            payload: BaseErrorCodec.encode(&error).unwrap(),
        };

        let sent = frame.clone();
        tokio::spawn(async move {
            let delivery = consumer.recv().await.unwrap();
            delivery.replier.unwrap().fail(sent);
        });

        let err = bus
            .request("service.addr", Envelope::new(json!({})), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BusError::Recipient {
                address: "service.addr".to_string(),
                frame,
            }
        );
    }

    #[tokio::test]
    async fn test_send_without_handler_fails() {
        let bus = InMemoryBus::new();
        let err = bus
            .send("nowhere", Envelope::new(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, BusError::NoHandler("nowhere".to_string()));
    }

    #[tokio::test]
    async fn test_address_exclusive_until_released() {
        let bus = InMemoryBus::new();
        let consumer = bus.consume("addr").unwrap();
        assert_eq!(
            bus.consume("addr").unwrap_err(),
            BusError::AddressInUse("addr".to_string())
        );

        bus.release("addr");
        drop(consumer);
        assert!(bus.consume("addr").is_ok());
    }

    #[tokio::test]
    async fn test_release_ends_consumer_stream() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.consume("addr").unwrap();
        bus.release("addr");
        assert!(consumer.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.consume("slow").unwrap();

        let request = bus.request("slow", Envelope::new(json!({})), Duration::from_secs(2));
        let (result, delivery) = tokio::join!(request, async {
            // Hold the replier past the caller's deadline.
            let delivery = consumer.recv().await.unwrap();
            tokio::time::sleep(Duration::from_secs(3)).await;
            delivery
        });

        assert_eq!(
            result.unwrap_err(),
            BusError::Timeout {
                address: "slow".to_string(),
                timeout: Duration::from_secs(2),
            }
        );

        // A reply after the deadline is discarded, not an error.
        delivery.replier.unwrap().reply(Envelope::new(json!("late")));
    }
}
