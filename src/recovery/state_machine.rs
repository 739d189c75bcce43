use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::fmt;

/// Phase of an agent's recovery, mirrored from the machine's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    Healthy,
    BackingUp,
    Restoring,
    Restarting,
    Recovered,
    FailedRestart,
    /// Loop breaker tripped; waits for a forced recovery or a reset
    RepeatedFailure,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPhase::Healthy => "healthy",
            RecoveryPhase::BackingUp => "backing_up",
            RecoveryPhase::Restoring => "restoring",
            RecoveryPhase::Restarting => "restarting",
            RecoveryPhase::Recovered => "recovered",
            RecoveryPhase::FailedRestart => "failed_restart",
            RecoveryPhase::RepeatedFailure => "repeated_failure",
        }
    }

    /// No recovery is in progress
    pub fn is_at_rest(&self) -> bool {
        matches!(
            self,
            RecoveryPhase::Healthy
                | RecoveryPhase::Recovered
                | RecoveryPhase::FailedRestart
                | RecoveryPhase::RepeatedFailure
        )
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    Begin,
    BackupFinished,
    RestoreFinished,
    RestartSucceeded,
    RestartFailed,
    LoopBreakerTripped,
    Reset,
}

pub struct RecoveryMachine {
    agent: String,
    phase: RecoveryPhase,
}

impl RecoveryMachine {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            phase: RecoveryPhase::Healthy,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    fn enter(&mut self, next: RecoveryPhase, event: &RecoveryEvent) {
        tracing::info!(
            agent = %self.agent,
            from = %self.phase,
            to = %next,
            event = ?event,
            "Recovery phase transition"
        );
        self.phase = next;
    }

    fn ignore(&self, event: &RecoveryEvent) -> Outcome<State> {
        tracing::warn!(
            agent = %self.agent,
            phase = %self.phase,
            event = ?event,
            "Recovery event ignored in current phase"
        );
        Handled
    }

    /// Shared by every phase where no recovery is running
    fn at_rest(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        match event {
            RecoveryEvent::Begin => {
                self.enter(RecoveryPhase::BackingUp, event);
                Transition(State::backing_up())
            }
            RecoveryEvent::LoopBreakerTripped => {
                self.enter(RecoveryPhase::RepeatedFailure, event);
                Transition(State::repeated_failure())
            }
            RecoveryEvent::Reset if self.phase != RecoveryPhase::Healthy => {
                self.enter(RecoveryPhase::Healthy, event);
                Transition(State::healthy())
            }
            RecoveryEvent::Reset => Handled,
            _ => self.ignore(event),
        }
    }

    fn abort(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        self.enter(RecoveryPhase::Healthy, event);
        Transition(State::healthy())
    }
}

#[state_machine(initial = "State::healthy()")]
impl RecoveryMachine {
    #[state]
    fn healthy(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        self.at_rest(event)
    }

    #[state]
    fn backing_up(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        match event {
            RecoveryEvent::BackupFinished => {
                self.enter(RecoveryPhase::Restoring, event);
                Transition(State::restoring())
            }
            RecoveryEvent::Reset => self.abort(event),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn restoring(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        match event {
            RecoveryEvent::RestoreFinished => {
                self.enter(RecoveryPhase::Restarting, event);
                Transition(State::restarting())
            }
            RecoveryEvent::Reset => self.abort(event),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn restarting(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        match event {
            RecoveryEvent::RestartSucceeded => {
                self.enter(RecoveryPhase::Recovered, event);
                Transition(State::recovered())
            }
            RecoveryEvent::RestartFailed => {
                self.enter(RecoveryPhase::FailedRestart, event);
                Transition(State::failed_restart())
            }
            RecoveryEvent::Reset => self.abort(event),
            _ => self.ignore(event),
        }
    }

    #[state]
    fn recovered(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        self.at_rest(event)
    }

    #[state]
    fn failed_restart(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        self.at_rest(event)
    }

    #[state]
    fn repeated_failure(&mut self, event: &RecoveryEvent) -> Outcome<State> {
        self.at_rest(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_recovery_path() {
        let mut sm = RecoveryMachine::new("Anima").state_machine();
        assert_eq!(sm.inner().phase(), RecoveryPhase::Healthy);

        sm.handle(&RecoveryEvent::Begin);
        assert_eq!(sm.inner().phase(), RecoveryPhase::BackingUp);
        sm.handle(&RecoveryEvent::BackupFinished);
        assert_eq!(sm.inner().phase(), RecoveryPhase::Restoring);
        sm.handle(&RecoveryEvent::RestoreFinished);
        assert_eq!(sm.inner().phase(), RecoveryPhase::Restarting);
        sm.handle(&RecoveryEvent::RestartSucceeded);
        assert_eq!(sm.inner().phase(), RecoveryPhase::Recovered);
        assert!(sm.inner().phase().is_at_rest());
    }

    #[test]
    fn test_failed_restart_can_be_retried() {
        let mut sm = RecoveryMachine::new("Anima").state_machine();
        for event in [
            RecoveryEvent::Begin,
            RecoveryEvent::BackupFinished,
            RecoveryEvent::RestoreFinished,
            RecoveryEvent::RestartFailed,
        ] {
            sm.handle(&event);
        }
        assert_eq!(sm.inner().phase(), RecoveryPhase::FailedRestart);

        sm.handle(&RecoveryEvent::Begin);
        assert_eq!(sm.inner().phase(), RecoveryPhase::BackingUp);
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        let mut sm = RecoveryMachine::new("Anima").state_machine();
        sm.handle(&RecoveryEvent::RestartSucceeded);
        assert_eq!(sm.inner().phase(), RecoveryPhase::Healthy);

        sm.handle(&RecoveryEvent::Begin);
        sm.handle(&RecoveryEvent::RestoreFinished);
        assert_eq!(sm.inner().phase(), RecoveryPhase::BackingUp);
    }

    #[test]
    fn test_loop_breaker_and_reset() {
        let mut sm = RecoveryMachine::new("Anima").state_machine();
        sm.handle(&RecoveryEvent::LoopBreakerTripped);
        assert_eq!(sm.inner().phase(), RecoveryPhase::RepeatedFailure);

        sm.handle(&RecoveryEvent::Reset);
        assert_eq!(sm.inner().phase(), RecoveryPhase::Healthy);
    }
}
