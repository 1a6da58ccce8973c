//! Inbound message bus, message log, and the types flowing through them.

pub mod log;
pub mod queue;
pub mod types;

pub use log::MessageLog;
pub use queue::MessageBus;
pub use types::{InboundMessage, Location, MessageKind, Payload};
