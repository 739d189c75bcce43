use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info};

use super::handler::AgentRegistration;
use super::message::{Message, MessageStatus};
use crate::storage::LogStore;

pub(super) type Registry = Arc<RwLock<HashMap<String, AgentRegistration>>>;

pub(super) enum Envelope {
    Deliver(Message),
    /// Resolved once everything queued ahead of it has been dispatched
    Flush(oneshot::Sender<()>),
}

/// The single dispatch worker of a bus.
///
/// Handlers run on their own spawned task which the worker awaits, so a
/// panicking handler surfaces as a `JoinError` instead of killing the worker.
pub(super) struct Dispatcher {
    pub(super) store: Arc<LogStore>,
    pub(super) registry: Registry,
}

impl Dispatcher {
    pub(super) async fn run(
        self,
        mut queue: mpsc::Receiver<Envelope>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("Message bus dispatch worker started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    let mut drained = 0usize;
                    while let Ok(envelope) = queue.try_recv() {
                        self.process(envelope).await;
                        drained += 1;
                    }
                    info!(drained, "Message bus dispatch worker shutting down");
                    break;
                }

                envelope = queue.recv() => match envelope {
                    Some(envelope) => self.process(envelope).await,
                    None => {
                        info!("Dispatch queue closed");
                        break;
                    }
                },
            }
        }
    }

    async fn process(&self, envelope: Envelope) {
        match envelope {
            Envelope::Deliver(message) => self.dispatch(message).await,
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    async fn dispatch(&self, message: Message) {
        let registration = self.registry.read().await.get(&message.receiver).cloned();
        self.mark(&message.id, MessageStatus::Delivered).await;

        let Some(registration) = registration else {
            debug!(message_id = %message.id, receiver = %message.receiver, "Receiver not registered");
            return;
        };
        let Some(handler) = registration.handler.clone() else {
            return;
        };
        if !registration.accepts(&message.intent) {
            debug!(
                message_id = %message.id,
                receiver = %message.receiver,
                intent = %message.intent,
                "Receiver not subscribed to intent"
            );
            return;
        }

        let message_id = message.id.clone();
        let receiver = message.receiver.clone();
        let intent = message.intent.clone();

        let outcome = tokio::spawn(async move { handler.handle(&message).await }).await;

        match outcome {
            Ok(Ok(())) => {
                self.mark(&message_id, MessageStatus::Processed).await;
            }
            Ok(Err(e)) => {
                error!(
                    message_id = %message_id,
                    receiver = %receiver,
                    intent = %intent,
                    error = %e,
                    "Message handler failed"
                );
                self.mark(&message_id, MessageStatus::Error).await;
            }
            Err(join_error) => {
                error!(
                    message_id = %message_id,
                    receiver = %receiver,
                    intent = %intent,
                    panicked = join_error.is_panic(),
                    error = %join_error,
                    "Message handler aborted"
                );
                self.mark(&message_id, MessageStatus::Error).await;
            }
        }
    }

    async fn mark(&self, message_id: &str, status: MessageStatus) {
        if let Err(e) = self.store.append_status(message_id, status).await {
            error!(
                message_id = %message_id,
                status = %status,
                error = %e,
                "Failed to persist message status"
            );
        }
    }
}
