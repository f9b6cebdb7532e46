// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! systemd integration (`Type=notify`).
//!
//! State is reported over `$NOTIFY_SOCKET` with the `sd_notify` datagram
//! protocol. Without a notification socket the backend still runs, it just
//! has nobody to report to.

use super::{Backend, Capabilities, CompletionReport};
use crate::command::Command;
use crate::control::EventSink;
use crate::error::ServiceError;
use crate::sockets::{ActivatedSockets, SocketDescriptor};
use log::{debug, info, warn};
use std::io;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

const NAME: &str = "systemd";

/// Destination of `sd_notify` messages.
#[derive(Debug, Clone)]
struct NotifySocket {
    path: String,
}

impl NotifySocket {
    fn from_env() -> Option<Self> {
        let path = std::env::var("NOTIFY_SOCKET").ok()?;
        if path.is_empty() {
            return None;
        }
        Some(Self { path })
    }

    fn address(&self) -> io::Result<SocketAddr> {
        match self.path.strip_prefix('@') {
            Some(name) => SocketAddr::from_abstract_name(name.as_bytes()),
            None => SocketAddr::from_pathname(&self.path),
        }
    }

    fn send(&self, message: &str) -> io::Result<()> {
        let socket = UnixDatagram::unbound()?;
        socket.send_to_addr(message.as_bytes(), &self.address()?)?;
        debug!("[{NAME}] notify: {}", message.replace('\n', " "));
        Ok(())
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.send(message) {
            warn!("[{NAME}] failed to notify {}: {e}", self.path);
        }
    }
}

pub struct SystemdBackend {
    sockets: ActivatedSockets,
    notify: Option<NotifySocket>,
    watchdog: Option<Duration>,
    tasks: Vec<JoinHandle<()>>,
}

impl SystemdBackend {
    pub fn new() -> Result<Self, ServiceError> {
        let notify = NotifySocket::from_env();
        if notify.is_none() {
            warn!("[{NAME}] NOTIFY_SOCKET is not set, state will not be reported");
        }
        let watchdog = watchdog_interval(
            std::env::var("WATCHDOG_USEC").ok().as_deref(),
            std::env::var("WATCHDOG_PID").ok().as_deref(),
            std::process::id(),
        );
        Ok(Self {
            sockets: ActivatedSockets::from_env()?,
            notify,
            watchdog,
            tasks: Vec::new(),
        })
    }

    fn watch(&mut self, kind: SignalKind, command: Command, sink: &EventSink) -> io::Result<()> {
        let mut stream = signal(kind)?;
        let sink = sink.clone();
        let notify = self.notify.clone();
        self.tasks.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!("[{NAME}] received signal {}, requesting {command}", kind.as_raw_value());
                // The manager expects to hear about reloads and stops as soon
                // as they begin, not when they finish.
                if let Some(notify) = &notify {
                    match command {
                        Command::Reload => notify.notify(&reloading_message()),
                        Command::Stop => notify.notify("STOPPING=1"),
                        _ => {}
                    }
                }
                if sink.deliver(command).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn start_watchdog(&mut self, interval: Duration) {
        let Some(notify) = self.notify.clone() else {
            return;
        };
        info!("[{NAME}] watchdog enabled, pinging every {interval:?}");
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                notify.notify("WATCHDOG=1");
            }
        }));
    }
}

impl Backend for SystemdBackend {
    fn identifier(&self) -> &'static str {
        NAME
    }

    fn attach(&mut self, sink: EventSink, _capabilities: Capabilities) -> Result<(), ServiceError> {
        let routes = [
            (SignalKind::terminate(), Command::Stop),
            (SignalKind::interrupt(), Command::Stop),
            (SignalKind::hangup(), Command::Reload),
        ];
        for (kind, command) in routes {
            self.watch(kind, command, &sink)
                .map_err(|e| ServiceError::Backend {
                    backend: NAME,
                    message: format!("failed to install signal handlers: {e}"),
                })?;
        }
        if let Some(interval) = self.watchdog {
            self.start_watchdog(interval);
        }
        sink.deliver(Command::Start)
    }

    fn report_completion(&mut self, report: CompletionReport) {
        if !report.success {
            warn!("[{NAME}] {} failed", report.command);
        }
        if let (Some(notify), Some(message)) = (&self.notify, completion_message(&report)) {
            notify.notify(&message);
        }
    }

    fn inherited_sockets(&self, name: &str) -> Vec<SocketDescriptor> {
        self.sockets.get(name)
    }

    fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn reloading_message() -> String {
    let now = nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
        .map(|t| t.tv_sec() as u64 * 1_000_000 + t.tv_nsec() as u64 / 1_000)
        .unwrap_or_default();
    format!("RELOADING=1\nMONOTONIC_USEC={now}")
}

fn completion_message(report: &CompletionReport) -> Option<String> {
    let message = match (report.command, report.success) {
        (Command::Start, true) => format!("READY=1\nSTATUS=running\nMAINPID={}", std::process::id()),
        (Command::Start, false) => format!(
            "STATUS=startup failed\nEXIT_STATUS={}",
            report.exit_code.unwrap_or(crate::EXIT_FAILURE)
        ),
        (Command::Reload, true) => "READY=1\nSTATUS=running".to_string(),
        (Command::Reload, false) => "READY=1\nSTATUS=reload failed".to_string(),
        (Command::Stop, _) => match report.exit_code {
            Some(code) if code != 0 => format!("STOPPING=1\nEXIT_STATUS={code}"),
            _ => "STOPPING=1".to_string(),
        },
        (Command::Pause, true) => "STATUS=paused".to_string(),
        (Command::Resume, true) => "STATUS=running".to_string(),
        (Command::Pause | Command::Resume, false) => return None,
    };
    Some(message)
}

/// Ping interval for the service manager's watchdog: half the timeout, and
/// only when the watchdog is meant for this process.
fn watchdog_interval(usec: Option<&str>, pid: Option<&str>, own_pid: u32) -> Option<Duration> {
    let usec: u64 = usec?.trim().parse().ok().filter(|v| *v > 0)?;
    if let Some(pid) = pid {
        let pid: u32 = pid.trim().parse().ok()?;
        if pid != own_pid {
            return None;
        }
    }
    Some(Duration::from_micros(usec / 2))
}
