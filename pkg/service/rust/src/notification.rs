// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::command::Command;
use crate::state::ServiceState;
use crate::terminal::{TerminalId, TerminalMode};
use serde::{Deserialize, Serialize};

/// Observable changes published by the host.
///
/// Delivered to [`ServiceHost::subscribe`](crate::ServiceHost::subscribe)
/// receivers and forwarded to every terminal that may receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Started,
    Stopped {
        exit_code: i32,
    },
    Reloaded,
    Paused,
    Resumed,
    TerminalConnected {
        id: TerminalId,
        mode: TerminalMode,
    },
    TerminalDisconnected {
        id: TerminalId,
    },
    TerminalActiveChanged {
        active: bool,
    },
    GlobalTerminalChanged {
        global: bool,
    },
    /// A lifecycle request arrived in a state that does not accept it.
    CommandRejected {
        command: Command,
        state: ServiceState,
    },
    /// A completion signal did not match the pending transition.
    CompletionRejected {
        command: Command,
    },
}

impl Notification {
    /// Notification emitted when `command` completes successfully.
    pub(crate) fn completed(command: Command, exit_code: i32) -> Self {
        match command {
            Command::Start => Notification::Started,
            Command::Stop => Notification::Stopped { exit_code },
            Command::Reload => Notification::Reloaded,
            Command::Pause => Notification::Paused,
            Command::Resume => Notification::Resumed,
        }
    }
}
