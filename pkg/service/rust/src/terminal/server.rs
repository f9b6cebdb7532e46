// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::protocol::{self, Frame, Hello, Request};
use super::{Outbound, Terminal, TerminalId};
use crate::control::{Message, ServiceControl};
use crate::runtime_dir;
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

// Every writer task holds a clone; the channel closes once all are gone.
type WriterToken = mpsc::Sender<()>;

/// Listener for terminal sessions. Dropping it stops accepting and removes
/// the socket file.
pub(crate) struct TerminalServer {
    path: PathBuf,
    accept_task: JoinHandle<()>,
    writers: Option<WriterToken>,
    writers_done: mpsc::Receiver<()>,
}

impl TerminalServer {
    pub(crate) async fn bind(path: &Path, control: ServiceControl) -> io::Result<Self> {
        runtime_dir::remove_stale(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)?;
        // Owner and group only
        fs::set_permissions(path, fs::Permissions::from_mode(0o660))?;
        info!("terminal listening on {}", path.display());

        let (writers, writers_done) = mpsc::channel(1);
        let accept_task = tokio::spawn(accept_loop(listener, control, writers.clone()));
        Ok(Self {
            path: path.to_path_buf(),
            accept_task,
            writers: Some(writers),
            writers_done,
        })
    }

    /// Stop accepting and wait briefly for sessions to write out what is
    /// queued. Sessions must have been told to close.
    pub(crate) async fn shutdown(mut self) {
        self.accept_task.abort();
        self.writers.take();
        if tokio::time::timeout(FLUSH_TIMEOUT, self.writers_done.recv())
            .await
            .is_err()
        {
            debug!("terminal sessions did not flush in time");
        }
    }
}

impl Drop for TerminalServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        runtime_dir::remove_stale(&self.path);
    }
}

async fn accept_loop(listener: UnixListener, control: ServiceControl, writers: WriterToken) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve_connection(stream, control.clone(), writers.clone()));
            }
            Err(e) => {
                warn!("terminal accept failed: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(stream: UnixStream, control: ServiceControl, token: WriterToken) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let hello = match handshake(&mut reader).await {
        Ok(Some(hello)) => hello,
        Ok(None) => return,
        Err(message) => {
            debug!("terminal handshake rejected: {message}");
            if let Ok(line) = protocol::encode(&Frame::Error { message }) {
                let _ = write_half.write_all(&line).await;
            }
            return;
        }
    };

    let id = TerminalId::next();
    let (tx, rx) = mpsc::unbounded_channel();
    let terminal = Terminal::new(id, hello.mode, tx);
    tokio::spawn(write_frames(id, write_half, rx, token));

    if control
        .post(Message::TerminalConnected(terminal.clone()))
        .is_err()
    {
        return;
    }

    read_requests(&mut reader, &terminal, &control).await;
    let _ = control.post(Message::TerminalDisconnected(id));
}

async fn handshake(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<Hello>, String> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, protocol::read_line(reader)).await {
        Ok(Ok(Some(line))) => serde_json::from_str(&line)
            .map(Some)
            .map_err(|e| format!("invalid handshake: {e}")),
        Ok(Ok(None)) => Ok(None),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("handshake timed out".to_string()),
    }
}

async fn read_requests(
    reader: &mut BufReader<OwnedReadHalf>,
    terminal: &Terminal,
    control: &ServiceControl,
) {
    let id = terminal.id();
    loop {
        let line = match protocol::read_line(reader).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("{id}: read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                if control
                    .post(Message::TerminalRequest { id, request })
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                terminal.send(Frame::Error {
                    message: format!("malformed request: {e}"),
                });
            }
        }
    }
}

async fn write_frames(
    id: TerminalId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    _token: WriterToken,
) {
    while let Some(item) = outbound.recv().await {
        let frame = match item {
            Outbound::Frame(frame) => frame,
            Outbound::Close => break,
        };
        let line = match protocol::encode(&frame) {
            Ok(line) => line,
            Err(e) => {
                warn!("{id}: failed to encode frame: {e}");
                continue;
            }
        };
        if let Err(e) = writer.write_all(&line).await {
            debug!("{id}: write failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
