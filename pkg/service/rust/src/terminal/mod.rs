// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Interactive control sessions.
//!
//! Clients connect to a Unix socket in the runtime directory, announce a
//! [`TerminalMode`] and then exchange newline-delimited JSON with the host
//! (see [`protocol`]). The host keeps one [`Terminal`] handle per session in a
//! [`TerminalRegistry`], which also does the activity accounting.

pub mod client;
pub mod protocol;
pub mod registry;
#[cfg(unix)]
mod server;

use protocol::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub use client::{TerminalClient, TerminalError};
pub use protocol::{Hello, Request};
pub use registry::TerminalRegistry;

/// File name of the control socket inside the runtime directory.
pub const SOCKET_FILE_NAME: &str = "terminal.sock";

static NEXT_TERMINAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalId(u64);

impl TerminalId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TERMINAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminal-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMode {
    /// Receives notifications and replies only.
    ReadOnly,
    /// Issues commands only; nothing is written back.
    WriteOnly,
    /// Bidirectional; counts as active after its first command.
    ReadWritePassive,
    /// Bidirectional; counts as active from the start.
    ReadWriteActive,
}

impl TerminalMode {
    pub fn can_receive(self) -> bool {
        !matches!(self, TerminalMode::WriteOnly)
    }

    pub fn can_send(self) -> bool {
        !matches!(self, TerminalMode::ReadOnly)
    }

    pub(crate) fn initially_active(self) -> bool {
        matches!(self, TerminalMode::ReadWriteActive)
    }
}

impl fmt::Display for TerminalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalMode::ReadOnly => write!(f, "read_only"),
            TerminalMode::WriteOnly => write!(f, "write_only"),
            TerminalMode::ReadWritePassive => write!(f, "read_write_passive"),
            TerminalMode::ReadWriteActive => write!(f, "read_write_active"),
        }
    }
}

/// Activity as observed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalActivity {
    /// Global mode: one shared flag for the whole process.
    Global(bool),
    /// Per-session flags, ordered by terminal id.
    PerSession(Vec<(TerminalId, bool)>),
}

pub(crate) enum Outbound {
    Frame(Frame),
    Close,
}

/// Handle to one connected session. The connection itself is owned by its
/// I/O tasks; dropping every handle closes the write side.
#[derive(Debug, Clone)]
pub struct Terminal {
    id: TerminalId,
    mode: TerminalMode,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::Frame(frame) => f.debug_tuple("Frame").field(frame).finish(),
            Outbound::Close => write!(f, "Close"),
        }
    }
}

impl Terminal {
    pub(crate) fn new(
        id: TerminalId,
        mode: TerminalMode,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self { id, mode, outbound }
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn mode(&self) -> TerminalMode {
        self.mode
    }

    /// Queue `frame` for the client. Write-only sessions and closed
    /// connections drop it; returns whether it was queued.
    pub fn send(&self, frame: Frame) -> bool {
        if !self.mode.can_receive() {
            return false;
        }
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    /// Close the connection after pending frames are written.
    pub fn disconnect(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }
}

#[cfg(unix)]
pub(crate) use server::TerminalServer;

#[cfg(unix)]
pub(crate) async fn listen(
    path: &std::path::Path,
    control: crate::control::ServiceControl,
) -> std::io::Result<TerminalServer> {
    TerminalServer::bind(path, control).await
}

#[cfg(not(unix))]
pub(crate) struct TerminalServer;

#[cfg(not(unix))]
impl TerminalServer {
    pub(crate) async fn shutdown(self) {}
}

#[cfg(not(unix))]
pub(crate) async fn listen(
    _path: &std::path::Path,
    _control: crate::control::ServiceControl,
) -> std::io::Result<TerminalServer> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "terminals require Unix domain sockets",
    ))
}

#[cfg(test)]
pub(crate) fn test_terminal(
    mode: TerminalMode,
) -> (Terminal, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Terminal::new(TerminalId::next(), mode, tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_mode_capabilities() {
        assert!(TerminalMode::ReadOnly.can_receive());
        assert!(!TerminalMode::ReadOnly.can_send());
        assert!(!TerminalMode::WriteOnly.can_receive());
        assert!(TerminalMode::WriteOnly.can_send());
        assert!(TerminalMode::ReadWritePassive.can_send());
        assert!(!TerminalMode::ReadWritePassive.initially_active());
        assert!(TerminalMode::ReadWriteActive.initially_active());
    }

    #[test]
    fn test_mode_wire_names() {
        let mode: TerminalMode = serde_json::from_str(r#""read_write_passive""#).unwrap();
        assert_eq!(mode, TerminalMode::ReadWritePassive);
        assert_eq!(
            serde_json::to_string(&TerminalMode::ReadOnly).unwrap(),
            format!("\"{}\"", TerminalMode::ReadOnly)
        );
    }

    #[test]
    fn test_write_only_drops_frames() {
        let (terminal, mut rx) = test_terminal(TerminalMode::WriteOnly);
        assert!(!terminal.send(Frame::Reply {
            result: Value::Null
        }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_and_disconnect() {
        let (terminal, mut rx) = test_terminal(TerminalMode::ReadOnly);
        assert!(terminal.send(Frame::Reply {
            result: Value::Int(1)
        }));
        terminal.disconnect();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Frame(_))));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));

        drop(rx);
        assert!(!terminal.is_connected());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TerminalId::next();
        let b = TerminalId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("terminal-"));
    }
}
