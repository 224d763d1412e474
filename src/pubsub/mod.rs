//! Cross-instance fan-out.
//!
//! Every instance publishes to and subscribes on one shared channel. An
//! envelope carries the target user and the id of the instance that sent it;
//! subscribers deliver only to users connected locally and skip their own
//! envelopes.

pub mod channel;
pub mod envelope;
pub mod publisher;
pub mod subscriber;

pub use channel::{BroadcastChannel, InMemoryBroadcastChannel, RedisBroadcastChannel};
pub use envelope::{BroadcastEnvelope, InstanceId};
pub use publisher::{BroadcastPublisher, PublishReport};
pub use subscriber::{BroadcastSubscriber, DeliveryOutcome};
