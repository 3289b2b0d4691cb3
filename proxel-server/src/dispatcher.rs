use crate::interceptor::{InterceptorChain, InterceptorContext};
use crate::target::{CallOutcome, ServiceTarget};
use proxel_core::{
    decode_args, encode_value, headers, Envelope, ProxyRegistry, ResultKind, ServiceError,
    ServiceSchema, TypeDescriptor,
};
use proxel_transport::{BusError, Consumer, Delivery, MessageBus, Replier};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Idle checks never run less often than every half timeout, and never
/// more rarely than this.
const MAX_REAP_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Idle timeout after which a non-top-level instance is reaped.
    pub timeout: Duration,
    /// Top-level services are never reaped.
    pub top_level: bool,
    /// Attach diagnostic context to runtime-generated failures.
    pub include_debug_info: bool,
}

pub(crate) enum Control {
    Unregister,
}

/// Handle to a running dispatcher. Dropping it leaves the dispatcher
/// serving; only [`unregister`](RegisteredService::unregister) releases
/// the address.
pub struct RegisteredService {
    address: String,
    closed: Arc<AtomicBool>,
    control: mpsc::UnboundedSender<Control>,
    worker: JoinHandle<()>,
}

impl RegisteredService {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the instance has been closed, by its close method or the
    /// idle reaper.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the address and stop the worker.
    pub fn unregister(&self) {
        let _ = self.control.send(Control::Unregister);
    }

    /// Wait for the worker to stop after [`unregister`](Self::unregister).
    pub async fn completion(self) {
        let _ = self.worker.await;
    }
}

impl fmt::Debug for RegisteredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredService")
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Claim `address` on the bus and start a worker dispatching its
/// deliveries to `service` according to `schema`.
pub(crate) fn spawn_dispatcher(
    bus: Arc<dyn MessageBus>,
    address: String,
    schema: Arc<ServiceSchema>,
    service: Arc<dyn ServiceTarget>,
    registry: Arc<ProxyRegistry>,
    chain: Arc<InterceptorChain>,
    options: DispatchOptions,
) -> Result<RegisteredService, BusError> {
    let consumer = bus.consume(&address)?;
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    info!(address = %address, schema = %schema.name, top_level = options.top_level, "service registered");

    let dispatcher = Dispatcher {
        bus,
        address: address.clone(),
        schema,
        service: Some(service),
        registry,
        chain,
        options,
        closed: Arc::clone(&closed),
        last_accessed: Instant::now(),
    };
    let worker = tokio::spawn(dispatcher.run(consumer, control_rx));

    Ok(RegisteredService {
        address,
        closed,
        control: control_tx,
        worker,
    })
}

enum Reply {
    None,
    Envelope(Envelope),
}

struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    address: String,
    schema: Arc<ServiceSchema>,
    service: Option<Arc<dyn ServiceTarget>>,
    registry: Arc<ProxyRegistry>,
    chain: Arc<InterceptorChain>,
    options: DispatchOptions,
    closed: Arc<AtomicBool>,
    last_accessed: Instant,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut consumer: Consumer,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        let reaping = !self.options.top_level;
        let mut reap = tokio::time::interval(reap_period(self.options.timeout));
        reap.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_open = true;

        loop {
            tokio::select! {
                ctrl = control.recv(), if control_open => match ctrl {
                    Some(Control::Unregister) => {
                        self.bus.release(&self.address);
                        break;
                    }
                    // Handle dropped; keep serving the address.
                    None => control_open = false,
                },
                delivery = consumer.recv() => match delivery {
                    Some(delivery) => {
                        self.last_accessed = Instant::now();
                        self.handle(delivery).await;
                    }
                    None => break,
                },
                _ = reap.tick(), if reaping && !self.is_closed() => {
                    if self.last_accessed.elapsed() >= self.options.timeout {
                        debug!(address = %self.address, "instance idle past timeout");
                        self.close_instance().await;
                    }
                }
            }
        }

        debug!(address = %self.address, "dispatcher stopped");
    }

    async fn handle(&mut self, delivery: Delivery) {
        let Delivery { envelope, replier } = delivery;

        if self.is_closed() {
            if let Some(replier) = replier {
                self.fail(replier, ServiceError::instance_closed());
            }
            return;
        }

        let mut ctx = InterceptorContext::new(envelope);
        if let Err(rejection) = self.chain.run(&mut ctx).await {
            debug!(address = %self.address, code = rejection.failure_code, "call rejected by interceptor");
            if let Some(replier) = replier {
                self.fail(replier, rejection);
            }
            return;
        }
        let envelope = ctx.into_envelope();

        match self.dispatch(&envelope).await {
            Ok(Reply::None) => {}
            Ok(Reply::Envelope(reply)) => {
                if let Some(replier) = replier {
                    replier.reply(reply);
                }
            }
            Err(failure) => {
                if let Some(replier) = replier {
                    self.fail(replier, failure);
                }
            }
        }
    }

    async fn dispatch(&mut self, envelope: &Envelope) -> Result<Reply, ServiceError> {
        let action = envelope.action().ok_or_else(ServiceError::missing_action)?;
        let method = self
            .schema
            .find_method(action)
            .filter(|m| !m.is_static_or_ignored)
            .cloned()
            .ok_or_else(|| ServiceError::invalid_action(action))?;

        let args = decode_args(&method, &envelope.body, self.registry.records())
            .map_err(|e| self.with_debug(ServiceError::decode(e.to_string())))?;

        let service = match &self.service {
            Some(service) => Arc::clone(service),
            None => return Err(ServiceError::instance_closed()),
        };

        debug!(address = %self.address, action = %method.name, "dispatching");
        let outcome = service.call(&method.name, args).await;

        // A close call tears the instance down whether or not the
        // implementation's close handler succeeded.
        if method.is_close {
            self.mark_closed();
        }
        let outcome = outcome?;

        let reply = match method.result_kind() {
            ResultKind::FireAndForget => Reply::None,
            ResultKind::Callback(result_ty) => match outcome {
                CallOutcome::Value(value) => {
                    let body = encode_value(&result_ty, &value, self.registry.records())
                        .map_err(|e| {
                            self.with_debug(ServiceError::internal(format!(
                                "failed to encode result of '{}': {e}",
                                method.name
                            )))
                        })?;
                    Reply::Envelope(Envelope::new(body))
                }
                CallOutcome::Service(child) => {
                    let TypeDescriptor::ServiceRef(child_schema) = &result_ty else {
                        return Err(self.with_debug(ServiceError::internal(format!(
                            "method '{}' produced a service but declares {result_ty}",
                            method.name
                        ))));
                    };
                    Reply::Envelope(self.register_child(child_schema, child, envelope)?)
                }
            },
        };

        Ok(reply)
    }

    /// Put a child dispatcher on the bus for a service-reference result
    /// and build the reply announcing its address. The caller may have
    /// pre-selected the address through the `newproxyaddr` header.
    fn register_child(
        &self,
        schema_name: &str,
        service: Arc<dyn ServiceTarget>,
        envelope: &Envelope,
    ) -> Result<Envelope, ServiceError> {
        let schema = self.registry.schemas().get(schema_name).ok_or_else(|| {
            self.with_debug(ServiceError::internal(format!(
                "no schema registered for service '{schema_name}'"
            )))
        })?;

        let address = envelope
            .header(headers::NEW_PROXY_ADDR)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Children inherit the timeout and get reaped when idle. The
        // interceptor chain already ran on the parent call; children
        // start with an empty one.
        let child = spawn_dispatcher(
            Arc::clone(&self.bus),
            address.clone(),
            schema,
            service,
            Arc::clone(&self.registry),
            Arc::new(InterceptorChain::default()),
            DispatchOptions {
                top_level: false,
                ..self.options.clone()
            },
        )
        .map_err(|e| {
            self.with_debug(ServiceError::internal(format!(
                "failed to register child at '{address}': {e}"
            )))
        })?;
        drop(child);

        debug!(parent = %self.address, child = %address, schema = %schema_name, "child service registered");
        Ok(Envelope::new(Value::Null).with_header(headers::PROXY_ADDR, address))
    }

    /// Run the schema's close method on the implementation, then
    /// tombstone the instance.
    async fn close_instance(&mut self) {
        if let (Some(service), Some(close)) =
            (self.service.clone(), self.schema.close_method().cloned())
        {
            if let Err(e) = service.call(&close.name, Vec::new()).await {
                warn!(address = %self.address, error = %e, "close handler failed");
            }
        }
        self.mark_closed();
    }

    /// A closed instance keeps its address and answers every further
    /// reply-expecting call with an instance-closed failure.
    fn mark_closed(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.service = None;
        info!(address = %self.address, "service instance closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn with_debug(&self, failure: ServiceError) -> ServiceError {
        if self.options.include_debug_info {
            let info = json!({
                "address": self.address,
                "schema": self.schema.name,
            });
            failure.with_debug_info(info)
        } else {
            failure
        }
    }

    fn fail(&self, replier: Replier, failure: ServiceError) {
        match self.registry.errors().encode(&failure) {
            Ok(frame) => replier.fail(frame),
            Err(e) => {
                error!(address = %self.address, error = %e, "failed to encode failure frame")
            }
        }
    }
}

fn reap_period(timeout: Duration) -> Duration {
    (timeout / 2)
        .min(MAX_REAP_PERIOD)
        .max(Duration::from_millis(10))
}
