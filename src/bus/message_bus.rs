use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, Envelope, Registry};
use super::handler::{AgentRegistration, MessageHandler};
use super::message::{Intent, Message, MessageStatus};
use super::BusError;
use crate::config::BusConfig;
use crate::priority::Priority;
use crate::storage::LogStore;

/// Message bus decoupling named agents.
///
/// Every message is appended to the log store before it is queued, and a
/// single worker task drains the bounded queue and invokes handlers.
pub struct MessageBus {
    store: Arc<LogStore>,
    registry: Registry,
    queue: mpsc::Sender<Envelope>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl MessageBus {
    /// Create the bus and spawn its dispatch worker. Must be called from
    /// within a Tokio runtime.
    pub fn start(store: Arc<LogStore>, config: &BusConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (queue, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let dispatcher = Dispatcher {
            store: Arc::clone(&store),
            registry: Arc::clone(&registry),
        };
        let worker = tokio::spawn(dispatcher.run(receiver, shutdown_rx));

        info!(queue_capacity = capacity, "Message bus started");

        Self {
            store,
            registry,
            queue,
            worker: Mutex::new(Some(worker)),
            shutdown: Mutex::new(Some(shutdown_tx)),
        }
    }

    /// Register or re-register an agent. Re-registration replaces the
    /// handler and intent filter.
    pub async fn register(
        &self,
        name: &str,
        handler: Option<Arc<dyn MessageHandler>>,
        intents: impl IntoIterator<Item = Intent>,
    ) {
        let registration = AgentRegistration::new(name, handler, intents);
        let has_handler = registration.has_handler();
        let replaced = self
            .registry
            .write()
            .await
            .insert(name.to_string(), registration)
            .is_some();

        info!(agent = %name, has_handler, replaced, "Agent registered on bus");
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.registry.write().await.remove(name).is_some();
        if removed {
            info!(agent = %name, "Agent unregistered from bus");
        }
        removed
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.registry.read().await.contains_key(name)
    }

    /// Registered agent names, sorted
    pub async fn registered_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn ensure_registered(&self, name: &str) {
        if self.registry.read().await.contains_key(name) {
            return;
        }
        let mut registry = self.registry.write().await;
        if !registry.contains_key(name) {
            warn!(agent = %name, "Unknown agent auto-registered");
            registry.insert(
                name.to_string(),
                AgentRegistration::new(name, None, []),
            );
        }
    }

    /// Persist a message and queue it for dispatch. Returns the message id.
    ///
    /// Unknown senders and receivers are auto-registered. The caller never
    /// waits on handler execution. Fails with `Closed` after `shutdown`.
    pub async fn send(
        &self,
        sender: &str,
        receiver: &str,
        intent: Intent,
        payload: Value,
        priority: Priority,
    ) -> Result<String, BusError> {
        // Nothing is persisted once the worker is gone
        if self.queue.is_closed() {
            return Err(BusError::Closed);
        }

        self.ensure_registered(sender).await;
        self.ensure_registered(receiver).await;

        let message = Message::new(sender, receiver, intent, payload, priority);
        let message_id = message.id.clone();

        // Durability precedes delivery
        self.store.append_message(&message).await?;

        debug!(
            message_id = %message_id,
            sender = %sender,
            receiver = %receiver,
            intent = %message.intent,
            priority = %priority,
            "Message persisted and queued"
        );

        self.enqueue(Envelope::Deliver(message))?;
        Ok(message_id)
    }

    /// Send one message to every registered agent except the sender
    pub async fn broadcast(
        &self,
        sender: &str,
        intent: Intent,
        payload: Value,
        priority: Priority,
    ) -> Result<Vec<String>, BusError> {
        let receivers: Vec<String> = self
            .registered_agents()
            .await
            .into_iter()
            .filter(|name| name != sender)
            .collect();

        let mut ids = Vec::with_capacity(receivers.len());
        for receiver in &receivers {
            ids.push(
                self.send(sender, receiver, intent.clone(), payload.clone(), priority)
                    .await?,
            );
        }

        info!(sender = %sender, intent = %intent, receivers = receivers.len(), "Broadcast sent");
        Ok(ids)
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), BusError> {
        match self.queue.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(envelope)) => {
                // Hand the wait to a task so a handler sending from inside the
                // worker cannot deadlock against its own queue
                warn!("Dispatch queue full, deferring enqueue");
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    if queue.send(envelope).await.is_err() {
                        warn!("Dispatch queue closed before deferred message was queued");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    /// Messages the agent sent or received, newest first
    pub async fn get_messages(
        &self,
        agent: &str,
        status: Option<MessageStatus>,
        limit: usize,
    ) -> Result<Vec<Message>, BusError> {
        let messages = self.store.load_messages().await?;
        Ok(messages
            .into_iter()
            .rev()
            .filter(|m| m.involves(agent))
            .filter(|m| status.map_or(true, |s| m.status == s))
            .take(limit)
            .collect())
    }

    /// Advance a message's status. Returns false if the message is unknown
    /// or the change would move it backwards.
    pub async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, BusError> {
        let Some(message) = self.store.find_message(message_id).await? else {
            warn!(message_id = %message_id, "Status update for unknown message");
            return Ok(false);
        };

        if !message.status.can_advance_to(status) {
            debug!(
                message_id = %message_id,
                current = %message.status,
                requested = %status,
                "Ignoring non-forward status change"
            );
            return Ok(false);
        }

        self.store.append_status(message_id, status).await?;
        Ok(true)
    }

    /// Wait until every message queued before this call has been dispatched
    pub async fn flush(&self) -> Result<(), BusError> {
        let (done, wait) = oneshot::channel();
        self.queue
            .send(Envelope::Flush(done))
            .await
            .map_err(|_| BusError::Closed)?;
        wait.await.map_err(|_| BusError::Closed)
    }

    /// Drain the queue and stop the dispatch worker
    pub async fn shutdown(&self) {
        let signal = self.shutdown.lock().ok().and_then(|mut s| s.take());
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());

        if let Some(signal) = signal {
            let _ = signal.send(());
        }
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Dispatch worker ended abnormally");
            }
        }
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }
}
