//! The message bus the proxies ride on: a point-to-point, address-routed
//! abstraction plus the in-memory implementation used in tests and
//! single-process deployments.

pub mod bus;
pub mod memory;

pub use bus::{BusError, Consumer, Delivery, MessageBus, Replier};
pub use memory::InMemoryBus;
