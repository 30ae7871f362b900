//! Distributed hashing: a request/result protocol correlated by tracking
//! id, the transport it runs over, and both ends of the exchange.

pub mod consumer;
pub mod message;
pub mod producer;
pub mod protocol;
pub mod transport;

pub use consumer::{hash_request, HashRequestConsumer};
pub use message::{Message, PropertyValue};
pub use producer::{HashRequestProducer, ProducerSummary};
pub use protocol::{
    HashOutcome, HashRequest, HashResponse, TrackingId, TrackingIdAllocator, FAILURE_PROPERTY,
    FAILURE_REASON_PROPERTY, HASH_PROPERTY, TRACKING_PROPERTY,
};
pub use transport::{InMemoryBus, MessageTransport, Subscription};
