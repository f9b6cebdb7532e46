// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::Command;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Host constructed, no start event seen yet.
    #[default]
    Created,
    /// `on_start` ran and has not completed.
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Reloading,
    /// `on_stop` ran and has not completed.
    Stopping,
    /// Terminal state; `exec` returns once reached.
    Stopped,
}

impl ServiceState {
    /// A transition is in flight and awaiting its handler's completion.
    pub fn is_transient(self) -> bool {
        use ServiceState::*;
        matches!(self, Starting | Pausing | Resuming | Reloading | Stopping)
    }

    /// The in-flight state entered when `command` is accepted, or `None` if
    /// the command is not valid here.
    pub fn begin(self, command: Command) -> Option<ServiceState> {
        use ServiceState::*;
        match (self, command) {
            (Created, Command::Start) => Some(Starting),
            (Running | Paused, Command::Stop) => Some(Stopping),
            (Running, Command::Pause) => Some(Pausing),
            (Paused, Command::Resume) => Some(Resuming),
            (Running, Command::Reload) => Some(Reloading),
            _ => None,
        }
    }

    /// The settled state after the in-flight transition finishes.
    pub fn settle(self, success: bool) -> ServiceState {
        use ServiceState::*;
        match (self, success) {
            (Starting, true) => Running,
            (Starting, false) => Stopped,
            (Stopping, _) => Stopped,
            (Pausing, true) => Paused,
            (Pausing, false) => Running,
            (Resuming, true) => Running,
            (Resuming, false) => Paused,
            (Reloading, _) => Running,
            (other, _) => other,
        }
    }

    /// The command whose handler owns this in-flight state.
    pub fn pending_command(self) -> Option<Command> {
        use ServiceState::*;
        match self {
            Starting => Some(Command::Start),
            Stopping => Some(Command::Stop),
            Pausing => Some(Command::Pause),
            Resuming => Some(Command::Resume),
            Reloading => Some(Command::Reload),
            _ => None,
        }
    }

    pub(crate) fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Created, Stopped)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Stopping)
                | (Running, Pausing)
                | (Running, Reloading)
                | (Pausing, Paused)
                | (Pausing, Running)
                | (Paused, Resuming)
                | (Paused, Stopping)
                | (Resuming, Running)
                | (Resuming, Paused)
                | (Reloading, Running)
                | (Stopping, Stopped)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Created => write!(f, "created"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Pausing => write!(f, "pausing"),
            ServiceState::Paused => write!(f, "paused"),
            ServiceState::Resuming => write!(f, "resuming"),
            ServiceState::Reloading => write!(f, "reloading"),
            ServiceState::Stopping => write!(f, "stopping"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_only_from_accepting_states() {
        use ServiceState::*;
        assert_eq!(Created.begin(Command::Start), Some(Starting));
        assert_eq!(Running.begin(Command::Start), None);
        assert_eq!(Created.begin(Command::Stop), None);
        assert_eq!(Running.begin(Command::Stop), Some(Stopping));
        assert_eq!(Paused.begin(Command::Stop), Some(Stopping));
        assert_eq!(Running.begin(Command::Pause), Some(Pausing));
        assert_eq!(Paused.begin(Command::Pause), None);
        assert_eq!(Paused.begin(Command::Resume), Some(Resuming));
        assert_eq!(Running.begin(Command::Resume), None);
        assert_eq!(Running.begin(Command::Reload), Some(Reloading));
        assert_eq!(Paused.begin(Command::Reload), None);
        assert_eq!(Stopped.begin(Command::Stop), None);
    }

    #[test]
    fn test_transient_states_reject_everything() {
        use ServiceState::*;
        for state in [Starting, Pausing, Resuming, Reloading, Stopping] {
            assert!(state.is_transient());
            for cmd in [
                Command::Start,
                Command::Stop,
                Command::Pause,
                Command::Resume,
                Command::Reload,
            ] {
                assert_eq!(state.begin(cmd), None, "{state} accepted {cmd}");
            }
        }
    }

    #[test]
    fn test_settle_outcomes() {
        use ServiceState::*;
        assert_eq!(Starting.settle(true), Running);
        assert_eq!(Starting.settle(false), Stopped);
        assert_eq!(Stopping.settle(false), Stopped);
        assert_eq!(Pausing.settle(true), Paused);
        assert_eq!(Pausing.settle(false), Running);
        assert_eq!(Resuming.settle(true), Running);
        assert_eq!(Resuming.settle(false), Paused);
        assert_eq!(Reloading.settle(false), Running);
        assert_eq!(Running.settle(true), Running);
    }

    #[test]
    fn test_begin_and_settle_are_valid_transitions() {
        use ServiceState::*;
        for state in [Created, Running, Paused] {
            for cmd in [
                Command::Start,
                Command::Stop,
                Command::Pause,
                Command::Resume,
                Command::Reload,
            ] {
                if let Some(next) = state.begin(cmd) {
                    assert!(state.can_transition_to(next));
                    assert_eq!(next.pending_command(), Some(cmd));
                    for ok in [true, false] {
                        assert!(next.can_transition_to(next.settle(ok)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ServiceState::Created.to_string(), "created");
        assert_eq!(ServiceState::Reloading.to_string(), "reloading");
        assert_eq!(ServiceState::Stopped.to_string(), "stopped");
    }
}
