// Recovery: backup, restore and restart of unhealthy agents

pub mod backup;
pub mod orchestrator;
pub mod restart;
pub mod state_machine;
pub mod types;

pub use backup::{BackedUpArtifact, BackupManager, BackupSnapshot};
pub use orchestrator::RecoveryOrchestrator;
pub use restart::{CommandRestart, NoopRestart, RestartProcedure};
pub use state_machine::{RecoveryEvent, RecoveryMachine, RecoveryPhase};
pub use types::{RecoveryAction, RecoveryError, RecoveryOutcome, RecoveryRecord};

#[cfg(any(test, feature = "testing"))]
pub use restart::MockRestartProcedure;
