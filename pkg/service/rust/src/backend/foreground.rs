// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::{Backend, Capabilities, CompletionReport};
use crate::command::Command;
use crate::control::EventSink;
use crate::error::ServiceError;
use crate::sockets::{ActivatedSockets, SocketDescriptor};
use log::{info, warn};
use tokio::task::JoinHandle;

const NAME: &str = "foreground";

/// Runs the service as a plain process attached to its launcher.
///
/// Start is delivered on attach. On Unix, signals drive the lifecycle:
///
/// | signal                    | effect                         |
/// |---------------------------|--------------------------------|
/// | SIGINT, SIGTERM, SIGQUIT  | stop                           |
/// | SIGHUP                    | reload                         |
/// | SIGTSTP, SIGCONT          | pause, resume (pausable only)  |
/// | SIGUSR1, SIGUSR2          | callback `SIGUSR1` / `SIGUSR2` |
///
/// Elsewhere Ctrl-C stops the service.
pub struct ForegroundBackend {
    sockets: ActivatedSockets,
    tasks: Vec<JoinHandle<()>>,
}

impl ForegroundBackend {
    pub fn new() -> Result<Self, ServiceError> {
        Ok(Self {
            sockets: ActivatedSockets::from_env()?,
            tasks: Vec::new(),
        })
    }

    #[cfg(unix)]
    fn watch_signals(&mut self, sink: &EventSink, capabilities: Capabilities) -> std::io::Result<()> {
        use nix::sys::signal::Signal;
        use tokio::signal::unix::SignalKind;

        let mut routes = vec![
            (SignalKind::interrupt(), Action::Command(Command::Stop)),
            (SignalKind::terminate(), Action::Command(Command::Stop)),
            (SignalKind::quit(), Action::Command(Command::Stop)),
            (SignalKind::hangup(), Action::Command(Command::Reload)),
            (SignalKind::user_defined1(), Action::Callback("SIGUSR1")),
            (SignalKind::user_defined2(), Action::Callback("SIGUSR2")),
        ];
        if capabilities.pausable {
            routes.push((
                SignalKind::from_raw(Signal::SIGTSTP as i32),
                Action::Command(Command::Pause),
            ));
            routes.push((
                SignalKind::from_raw(Signal::SIGCONT as i32),
                Action::Command(Command::Resume),
            ));
        }

        for (kind, action) in routes {
            let mut stream = tokio::signal::unix::signal(kind)?;
            let sink = sink.clone();
            self.tasks.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("[{NAME}] received signal {}, {action}", kind.as_raw_value());
                    if action.dispatch(&sink).is_err() {
                        break;
                    }
                }
            }));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn watch_signals(&mut self, sink: &EventSink, _capabilities: Capabilities) -> std::io::Result<()> {
        let sink = sink.clone();
        self.tasks.push(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("[{NAME}] received Ctrl-C, stopping");
                if sink.deliver(Command::Stop).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Command(Command),
    #[cfg_attr(not(unix), allow(dead_code))]
    Callback(&'static str),
}

impl Action {
    fn dispatch(self, sink: &EventSink) -> Result<(), ServiceError> {
        match self {
            Action::Command(command) => sink.deliver(command),
            Action::Callback(kind) => sink.callback(kind, Vec::new()),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Command(command) => write!(f, "requesting {command}"),
            Action::Callback(kind) => write!(f, "invoking callback {kind}"),
        }
    }
}

impl Backend for ForegroundBackend {
    fn identifier(&self) -> &'static str {
        NAME
    }

    fn attach(&mut self, sink: EventSink, capabilities: Capabilities) -> Result<(), ServiceError> {
        self.watch_signals(&sink, capabilities)
            .map_err(|e| ServiceError::Backend {
                backend: NAME,
                message: format!("failed to install signal handlers: {e}"),
            })?;
        sink.deliver(Command::Start)
    }

    fn report_completion(&mut self, report: CompletionReport) {
        match (report.success, report.exit_code) {
            (true, Some(code)) => info!("[{NAME}] {} completed, exit code {code}", report.command),
            (true, None) => info!("[{NAME}] {} completed", report.command),
            (false, _) => warn!("[{NAME}] {} failed", report.command),
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

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::control::{Message, ServiceControl};
    use nix::sys::signal::{Signal, raise};
    use serial_test::serial;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn backend() -> ForegroundBackend {
        ForegroundBackend {
            sockets: ActivatedSockets::empty(),
            tasks: Vec::new(),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    #[tokio::test]
    #[serial]
    async fn test_attach_delivers_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = backend();
        backend
            .attach(EventSink::new(ServiceControl::new(tx)), Capabilities::default())
            .unwrap();

        assert!(matches!(next_event(&mut rx).await, Message::Event(Command::Start)));
        backend.detach();
    }

    #[tokio::test]
    #[serial]
    async fn test_signals_map_to_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = backend();
        backend
            .attach(EventSink::new(ServiceControl::new(tx)), Capabilities::default())
            .unwrap();
        assert!(matches!(next_event(&mut rx).await, Message::Event(Command::Start)));

        raise(Signal::SIGHUP).unwrap();
        assert!(matches!(next_event(&mut rx).await, Message::Event(Command::Reload)));

        raise(Signal::SIGUSR1).unwrap();
        match next_event(&mut rx).await {
            Message::Callback { kind, reply, .. } => {
                assert_eq!(kind, "SIGUSR1");
                assert!(reply.is_none());
            }
            _ => panic!("expected callback"),
        }

        backend.detach();
    }

    #[test]
    fn test_inherited_sockets_lookup() {
        let backend = ForegroundBackend {
            sockets: ActivatedSockets::from_entries([("web", SocketDescriptor::new(3))]),
            tasks: Vec::new(),
        };
        assert_eq!(backend.inherited_sockets("web"), vec![SocketDescriptor::new(3)]);
        assert!(backend.inherited_sockets("admin").is_empty());
    }
}
