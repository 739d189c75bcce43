use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::message::{Intent, Message};

/// Capability implemented by anything that wants to receive bus messages.
///
/// Errors and panics are contained by the dispatch worker: the message is
/// marked `error` and dispatch continues with the next message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

/// Adapter for synchronous closures
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Message) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, message: &Message) -> anyhow::Result<()> {
        (self.0)(message)
    }
}

/// Wrap a closure as a shareable handler
pub fn handler_fn<F>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// A named agent known to the bus
#[derive(Clone)]
pub struct AgentRegistration {
    pub name: String,
    pub handler: Option<Arc<dyn MessageHandler>>,
    /// Empty means every intent is accepted
    pub intents: HashSet<Intent>,
    pub registered_at: DateTime<Utc>,
}

impl AgentRegistration {
    pub fn new(
        name: impl Into<String>,
        handler: Option<Arc<dyn MessageHandler>>,
        intents: impl IntoIterator<Item = Intent>,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            intents: intents.into_iter().collect(),
            registered_at: Utc::now(),
        }
    }

    pub fn accepts(&self, intent: &Intent) -> bool {
        self.intents.is_empty() || self.intents.contains(intent)
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for AgentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistration")
            .field("name", &self.name)
            .field("has_handler", &self.has_handler())
            .field("intents", &self.intents)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}
