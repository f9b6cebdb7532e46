// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Client side of the terminal protocol.

use super::TerminalMode;
use super::protocol::{self, Frame, Hello, Request};
use crate::notification::Notification;
use crate::value::Value;
use std::collections::VecDeque;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("{0}")]
    Remote(String),

    #[error("connection closed by service")]
    Closed,

    #[error("terminals are not supported on this platform")]
    Unsupported,

    #[error("{0} terminals cannot {1}")]
    Mode(TerminalMode, &'static str),
}

#[cfg(unix)]
type Reader = tokio::io::BufReader<tokio::net::unix::OwnedReadHalf>;
#[cfg(unix)]
type Writer = tokio::net::unix::OwnedWriteHalf;

/// A connected session.
///
/// Events that arrive while waiting for a reply are buffered and returned by
/// [`next_event`](Self::next_event) in arrival order.
pub struct TerminalClient {
    mode: TerminalMode,
    #[cfg(unix)]
    reader: Reader,
    #[cfg(unix)]
    writer: Writer,
    events: VecDeque<Notification>,
}

impl TerminalClient {
    #[cfg(unix)]
    pub async fn connect(
        path: impl AsRef<std::path::Path>,
        mode: TerminalMode,
    ) -> Result<Self, TerminalError> {
        use tokio::io::AsyncWriteExt;

        let stream = tokio::net::UnixStream::connect(path.as_ref()).await?;
        let (read_half, mut writer) = stream.into_split();
        writer
            .write_all(&protocol::encode(&Hello { mode })?)
            .await?;
        Ok(Self {
            mode,
            reader: tokio::io::BufReader::new(read_half),
            writer,
            events: VecDeque::new(),
        })
    }

    #[cfg(not(unix))]
    pub async fn connect(
        _path: impl AsRef<std::path::Path>,
        _mode: TerminalMode,
    ) -> Result<Self, TerminalError> {
        Err(TerminalError::Unsupported)
    }

    pub fn mode(&self) -> TerminalMode {
        self.mode
    }

    /// Invoke callback `kind` and wait for its reply.
    pub async fn request(
        &mut self,
        kind: &str,
        args: Vec<Value>,
    ) -> Result<Value, TerminalError> {
        if !self.mode.can_receive() {
            return Err(TerminalError::Mode(self.mode, "wait for replies"));
        }
        self.send(kind, args).await?;
        loop {
            match self.next_frame().await? {
                Frame::Reply { result } => return Ok(result),
                Frame::Error { message } => return Err(TerminalError::Remote(message)),
                Frame::Event { notification } => self.events.push_back(notification),
            }
        }
    }

    /// Send a request without waiting for anything back.
    #[cfg(unix)]
    pub async fn send(&mut self, kind: &str, args: Vec<Value>) -> Result<(), TerminalError> {
        use tokio::io::AsyncWriteExt;

        let line = protocol::encode(&Request::new(kind, args))?;
        self.writer.write_all(&line).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn send(&mut self, _kind: &str, _args: Vec<Value>) -> Result<(), TerminalError> {
        Err(TerminalError::Unsupported)
    }

    /// Next notification pushed by the service. Replies that arrive here are
    /// unsolicited and skipped; remote errors are returned.
    pub async fn next_event(&mut self) -> Result<Notification, TerminalError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }
        loop {
            match self.next_frame().await? {
                Frame::Event { notification } => return Ok(notification),
                Frame::Error { message } => return Err(TerminalError::Remote(message)),
                Frame::Reply { .. } => continue,
            }
        }
    }

    #[cfg(unix)]
    async fn next_frame(&mut self) -> Result<Frame, TerminalError> {
        loop {
            match protocol::read_line(&mut self.reader).await? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(serde_json::from_str(&line)?),
                None => return Err(TerminalError::Closed),
            }
        }
    }

    #[cfg(not(unix))]
    async fn next_frame(&mut self) -> Result<Frame, TerminalError> {
        Err(TerminalError::Unsupported)
    }
}
