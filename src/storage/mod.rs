// Append-only persistence for messages, fusion results and recovery records

pub(crate) mod jsonl;
pub mod log_store;

use std::path::PathBuf;
use thiserror::Error;

pub use log_store::{LogStore, MessageLogEntry, StatusChange};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock acquisition failed on {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
