// Fusion: scatter-gather query resolution across agents

pub mod coordinator;
pub mod synthesis;
pub mod types;

use thiserror::Error;

use crate::bus::BusError;
use crate::storage::StoreError;

pub use coordinator::FusionCoordinator;
pub use synthesis::{KeywordSynthesis, SynthesisInput, SynthesisStrategy};
pub use types::{
    FusionOutcome, FusionRequestPayload, FusionResponsePayload, FusionResult, FusionStatus,
    NO_RESPONSE_PLACEHOLDER,
};

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Invalid fusion request: need at least 2 distinct agents, got {distinct}")]
    InvalidFusionRequest { distinct: usize },

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Log store error: {0}")]
    Store(#[from] StoreError),

    #[error("Payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
}
