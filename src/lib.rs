// Society Protocol - inter-agent coordination substrate
// Message bus, fusion scatter-gather, health scoring and agent recovery

pub mod bus;
pub mod cli;
pub mod config;
pub mod context;
pub mod fusion;
pub mod health;
pub mod priority;
pub mod profile;
pub mod recovery;
pub mod shutdown;
pub mod storage;
pub mod telemetry;

// Re-export key types for easy access
pub use bus::{handler_fn, BusError, Intent, Message, MessageBus, MessageHandler, MessageStatus};
pub use config::SocietyConfig;
pub use context::AppContext;
pub use fusion::{FusionCoordinator, FusionError, FusionOutcome, FusionResult, FusionStatus};
pub use health::{HealthError, HealthMetrics, HealthMonitor, RecoveryNeed, SatisfactionFeed};
pub use priority::Priority;
pub use profile::{AgentProfile, ProfileRegistry};
pub use recovery::{
    RecoveryError, RecoveryOrchestrator, RecoveryOutcome, RecoveryPhase, RecoveryRecord,
    RestartProcedure,
};
pub use storage::{LogStore, StoreError};
pub use telemetry::{create_coordination_span, generate_correlation_id, init_telemetry};
