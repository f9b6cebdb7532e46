// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of lifecycle verbs a backend can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Reload,
}

/// How a lifecycle handler completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandMode {
    /// The action is done when the handler returns.
    #[default]
    Synchronous,
    /// The handler started work and will signal completion exactly once
    /// through [`ServiceControl`](crate::ServiceControl).
    Asynchronous,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Stop => write!(f, "stop"),
            Command::Pause => write!(f, "pause"),
            Command::Resume => write!(f, "resume"),
            Command::Reload => write!(f, "reload"),
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "reload" => Ok(Command::Reload),
            other => Err(format!("unknown lifecycle command: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_from_str() {
        for cmd in [
            Command::Start,
            Command::Stop,
            Command::Pause,
            Command::Resume,
            Command::Reload,
        ] {
            assert_eq!(cmd.to_string().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("restart".parse::<Command>().is_err());
        assert!("Start".parse::<Command>().is_err());
    }

    #[test]
    fn test_default_mode_is_synchronous() {
        assert_eq!(CommandMode::default(), CommandMode::Synchronous);
    }
}
