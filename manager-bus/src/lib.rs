//! The message bus abstraction (spec §4.4): a pluggable pub/sub +
//! request/reply transport, the manager's topic taxonomy, and the
//! typed `ManagerClient`/`ManagerService` operations layered on top.

pub mod bus;
pub mod client;
pub mod local;
#[cfg(feature = "nats")]
pub mod nats;
pub mod message;
pub mod service;
pub mod topic;

pub use bus::{Message, MessageBus, Subscription};
pub use client::{ClientReply, ClientRequest, ManagerClient};
pub use local::LocalBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;
pub use message::{BusMessage, DeviceEvent};
pub use service::{ManagerService, TypedSubscription};
