// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Platform integration.
//!
//! A backend translates platform control (signals, the service manager
//! protocol) into lifecycle events delivered through an [`EventSink`], and
//! reports the outcome of each transition back to the platform.

mod foreground;
#[cfg(any(test, feature = "test-helpers"))]
mod manual;
#[cfg(target_os = "linux")]
mod systemd;

use crate::command::Command;
use crate::control::EventSink;
use crate::error::ServiceError;
use crate::sockets::SocketDescriptor;
use std::fmt;
use std::str::FromStr;

pub use foreground::ForegroundBackend;
#[cfg(any(test, feature = "test-helpers"))]
pub use manual::{ManualBackend, ManualBackendHandle};
#[cfg(target_os = "linux")]
pub use systemd::SystemdBackend;

/// What the service supports, announced to the backend on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub pausable: bool,
}

/// Outcome of a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReport {
    pub command: Command,
    pub success: bool,
    /// Set when the transition ends the service.
    pub exit_code: Option<i32>,
}

/// Port for platform integration.
///
/// All methods run on the event loop thread. `attach` runs inside the loop's
/// runtime, so backends may spawn tasks there; those tasks hold the sink.
pub trait Backend {
    fn identifier(&self) -> &'static str;

    /// Start delivering events. Backends deliver [`Command::Start`] here or
    /// later, once the platform asks for it.
    fn attach(&mut self, sink: EventSink, capabilities: Capabilities) -> Result<(), ServiceError>;

    fn report_completion(&mut self, report: CompletionReport);

    /// Sockets inherited under `name`; empty when there are none.
    fn inherited_sockets(&self, name: &str) -> Vec<SocketDescriptor>;

    /// Stop delivering events. Called once the service has stopped.
    fn detach(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Pick from the environment, see [`BackendKind::detect`].
    #[default]
    Auto,
    Foreground,
    Systemd,
}

impl BackendKind {
    /// Systemd when started with a notification socket, foreground otherwise.
    pub fn detect() -> BackendKind {
        Self::detect_from(std::env::var_os("NOTIFY_SOCKET").is_some())
    }

    fn detect_from(notify_socket: bool) -> BackendKind {
        if notify_socket && cfg!(target_os = "linux") {
            BackendKind::Systemd
        } else {
            BackendKind::Foreground
        }
    }

    /// Replace `Auto` with the detected kind.
    pub fn resolve(self) -> BackendKind {
        match self {
            BackendKind::Auto => Self::detect(),
            other => other,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Auto => write!(f, "auto"),
            BackendKind::Foreground => write!(f, "foreground"),
            BackendKind::Systemd => write!(f, "systemd"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(BackendKind::Auto),
            "foreground" => Ok(BackendKind::Foreground),
            "systemd" => Ok(BackendKind::Systemd),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, foreground or systemd)"
            )),
        }
    }
}

/// Construct the backend for `kind`.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn Backend>, ServiceError> {
    match kind.resolve() {
        BackendKind::Foreground | BackendKind::Auto => Ok(Box::new(ForegroundBackend::new()?)),
        #[cfg(target_os = "linux")]
        BackendKind::Systemd => Ok(Box::new(SystemdBackend::new()?)),
        #[cfg(not(target_os = "linux"))]
        BackendKind::Systemd => Err(ServiceError::UnsupportedBackend("systemd")),
    }
}
