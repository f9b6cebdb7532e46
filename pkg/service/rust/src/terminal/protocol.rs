// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Terminal wire format: one JSON document per line.
//!
//! ```text
//! client -> host   {"mode": "read_write_active"}            (handshake, once)
//! client -> host   {"kind": "echo", "args": ["hi"]}
//! host -> client   {"type": "reply", "result": "hi"}
//! host -> client   {"type": "error", "message": "unknown callback 'x'"}
//! host -> client   {"type": "event", "notification": {"event": "reloaded"}}
//! ```

use super::TerminalMode;
use crate::notification::Notification;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest accepted line, handshake included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub mode: TerminalMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub kind: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Request {
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Reply { result: Value },
    Error { message: String },
    Event { notification: Notification },
}

pub(crate) fn encode<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Read one line without its terminator. `None` at end of stream.
pub(crate) async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let limit = MAX_LINE_LEN as u64 + 1;
    let n = AsyncReadExt::take(&mut *reader, limit)
        .read_line(&mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && n > MAX_LINE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {MAX_LINE_LEN} bytes"),
        ));
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}
