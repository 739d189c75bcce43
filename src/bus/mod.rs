// Message bus: registration, persisted send, single-worker dispatch

mod dispatcher;
pub mod handler;
pub mod message;
pub mod message_bus;

use thiserror::Error;

use crate::storage::StoreError;

pub use handler::{handler_fn, AgentRegistration, FnHandler, MessageHandler};
pub use message::{Intent, Message, MessageStatus};
pub use message_bus::MessageBus;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Log store error: {0}")]
    Store(#[from] StoreError),

    #[error("Message bus is shut down")]
    Closed,
}
