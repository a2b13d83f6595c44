//! # Messaging Module
//!
//! Message envelopes and the broker abstraction queue agents read from and write
//! to, with in-memory and pgmq providers.

pub mod errors;
pub mod message;
pub mod providers;
pub mod service;

pub use errors::{MessagingError, MessagingResult};
pub use message::{body_type_name, decode_envelope, encode_envelope, FramingError, Message};
pub use providers::{connect_messaging_service, InMemoryMessagingService};
#[cfg(feature = "postgres")]
pub use providers::PgmqMessagingService;
pub use service::{
    validate_queue_name, AckMode, Delivery, MessageId, MessagingService, ReceiptHandle,
};
