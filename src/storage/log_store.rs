use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{jsonl, StoreError};
use crate::bus::{Message, MessageStatus};
use crate::fusion::FusionResult;
use crate::recovery::RecoveryRecord;

pub const MESSAGES_FILE: &str = "messages.jsonl";
pub const FUSIONS_FILE: &str = "fusions.jsonl";
pub const RECOVERIES_FILE: &str = "recoveries.jsonl";

/// One line of the message log. Status changes are appended, never
/// rewritten in place; readers fold them onto the original record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageLogEntry {
    Message(Message),
    Status(StatusChange),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: String,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
}

/// Shared log store. Writers are the bus and the recovery orchestrator;
/// readers see a snapshot taken at read time.
#[derive(Debug)]
pub struct LogStore {
    root: PathBuf,
    // Keeps in-process appends off the blocking pool while another holds the file lock
    write_lock: Mutex<()>,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root).await?;
        tracing::debug!(root = %store.root.display(), "Log store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    async fn append<T: Serialize>(&self, file: &str, entry: &T) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        jsonl::append_entry(&self.path(file), entry).await
    }

    pub async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.append(MESSAGES_FILE, &MessageLogEntry::Message(message.clone()))
            .await
    }

    pub async fn append_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<(), StoreError> {
        let change = StatusChange {
            id: message_id.to_string(),
            status,
            timestamp: Utc::now(),
        };
        self.append(MESSAGES_FILE, &MessageLogEntry::Status(change))
            .await
    }

    /// All messages in append order with their current status folded in.
    /// Status changes that would move a message backwards are ignored.
    pub async fn load_messages(&self) -> Result<Vec<Message>, StoreError> {
        let entries: Vec<MessageLogEntry> = jsonl::read_entries(&self.path(MESSAGES_FILE)).await?;

        let mut messages: Vec<Message> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            match entry {
                MessageLogEntry::Message(message) => {
                    index.insert(message.id.clone(), messages.len());
                    messages.push(message);
                }
                MessageLogEntry::Status(change) => match index.get(&change.id) {
                    Some(&position) => {
                        let message = &mut messages[position];
                        if message.status.can_advance_to(change.status) {
                            message.status = change.status;
                        }
                    }
                    None => {
                        tracing::debug!(message_id = %change.id, "Status change for unknown message");
                    }
                },
            }
        }

        Ok(messages)
    }

    pub async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self
            .load_messages()
            .await?
            .into_iter()
            .find(|m| m.id == message_id))
    }

    pub async fn append_fusion_result(&self, result: &FusionResult) -> Result<(), StoreError> {
        self.append(FUSIONS_FILE, result).await
    }

    pub async fn load_fusion_results(&self) -> Result<Vec<FusionResult>, StoreError> {
        jsonl::read_entries(&self.path(FUSIONS_FILE)).await
    }

    pub async fn find_fusion_result(
        &self,
        fusion_id: &str,
    ) -> Result<Option<FusionResult>, StoreError> {
        Ok(self
            .load_fusion_results()
            .await?
            .into_iter()
            .find(|r| r.fusion_id == fusion_id))
    }

    pub async fn append_recovery_record(&self, record: &RecoveryRecord) -> Result<(), StoreError> {
        self.append(RECOVERIES_FILE, record).await
    }

    /// Recovery records in append order, optionally for one agent
    pub async fn load_recovery_records(
        &self,
        agent: Option<&str>,
    ) -> Result<Vec<RecoveryRecord>, StoreError> {
        let records: Vec<RecoveryRecord> = jsonl::read_entries(&self.path(RECOVERIES_FILE)).await?;
        Ok(match agent {
            Some(agent) => records.into_iter().filter(|r| r.agent == agent).collect(),
            None => records,
        })
    }
}
