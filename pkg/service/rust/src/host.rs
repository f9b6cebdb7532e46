// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The service host and its event loop.
//!
//! One host per process. `exec` builds a single-threaded runtime, attaches
//! the backend and processes [`Message`]s until the service reaches
//! [`ServiceState::Stopped`]. At most one transition is in flight; lifecycle
//! events arriving meanwhile are queued (duplicates coalesced) and evaluated
//! once it settles.

use crate::EXIT_FAILURE;
use crate::backend::{Backend, Capabilities, CompletionReport, create_backend};
use crate::callback::{CallbackError, CallbackRegistry, TypedCallback};
use crate::command::{Command, CommandMode};
use crate::config::ServiceConfig;
use crate::control::{EventSink, Message, ServiceControl};
use crate::error::ServiceError;
use crate::notification::Notification;
use crate::runtime_dir;
use crate::service::{Context, Service};
use crate::sockets::{DEFAULT_SOCKET_NAME, SocketDescriptor};
use crate::state::ServiceState;
use crate::terminal::protocol::{Frame, Request};
use crate::terminal::{
    self, SOCKET_FILE_NAME, TerminalActivity, TerminalId, TerminalRegistry, TerminalServer,
};
use crate::value::Value;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};

const NOTIFICATION_CAPACITY: usize = 256;

static HOST_EXISTS: AtomicBool = AtomicBool::new(false);

/// Claims the process-wide host slot until dropped.
struct InstanceGuard;

impl InstanceGuard {
    fn acquire() -> Result<Self, ServiceError> {
        if HOST_EXISTS.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyConstructed);
        }
        Ok(InstanceGuard)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        HOST_EXISTS.store(false, Ordering::Release);
    }
}

/// Host state shared with handlers through [`Context`].
pub(crate) struct Core {
    pub(crate) name: String,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) runtime_dir: PathBuf,
    pub(crate) state: ServiceState,
    pub(crate) exit_code: i32,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) terminals: TerminalRegistry,
    pub(crate) control: ServiceControl,
    notifications: broadcast::Sender<Notification>,
}

impl Core {
    pub(crate) fn default_socket(&self) -> Option<SocketDescriptor> {
        self.backend
            .inherited_sockets(DEFAULT_SOCKET_NAME)
            .into_iter()
            .next()
    }

    pub(crate) fn set_terminal_active(&mut self, active: bool) {
        if self.terminals.set_all_active(active) {
            self.emit_activity();
        }
    }

    pub(crate) fn set_global_terminal(&mut self, global: bool) {
        if self.terminals.set_global(global) {
            info!("[{}] global terminal mode {}", self.name, on_off(global));
            self.emit(Notification::GlobalTerminalChanged { global });
        }
    }

    fn emit_activity(&mut self) {
        self.emit(Notification::TerminalActiveChanged {
            active: self.terminals.is_active(),
        });
    }

    fn emit(&self, notification: Notification) {
        debug!("[{}] notify {notification:?}", self.name);
        // No subscribers is fine.
        let _ = self.notifications.send(notification.clone());
        self.terminals.broadcast(&Frame::Event { notification });
    }

    fn set_state(&mut self, next: ServiceState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        info!("[{}] {} -> {next}", self.name, self.state);
        self.state = next;
    }

    fn report(&mut self, command: Command, success: bool, exit_code: Option<i32>) {
        self.backend.report_completion(CompletionReport {
            command,
            success,
            exit_code,
        });
    }

    fn close_terminals(&mut self) {
        for terminal in self.terminals.terminals() {
            terminal.disconnect();
        }
        self.terminals = TerminalRegistry::new(self.terminals.is_global());
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// Runs a [`Service`] on a [`Backend`].
pub struct ServiceHost<S: Service> {
    service: S,
    core: Core,
    inbox: Option<mpsc::UnboundedReceiver<Message>>,
    terminal_enabled: bool,
    queued: VecDeque<Command>,
    _instance: InstanceGuard,
}

impl<S: Service> ServiceHost<S> {
    /// Create the host with the backend `config` selects.
    pub fn new(service: S, config: &ServiceConfig) -> Result<Self, ServiceError> {
        let backend = create_backend(config.backend)?;
        Self::with_backend(service, config, backend)
    }

    pub fn with_backend(
        service: S,
        config: &ServiceConfig,
        backend: Box<dyn Backend>,
    ) -> Result<Self, ServiceError> {
        let instance = InstanceGuard::acquire()?;

        let runtime_dir = runtime_dir::resolve(&config.name, config.runtime_dir.as_deref());
        runtime_dir::ensure(&runtime_dir)?;

        let (tx, inbox) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        info!(
            "[{}] created with {} backend, runtime directory {}",
            config.name,
            backend.identifier(),
            runtime_dir.display()
        );

        Ok(Self {
            service,
            core: Core {
                name: config.name.clone(),
                backend,
                runtime_dir,
                state: ServiceState::Created,
                exit_code: 0,
                callbacks: CallbackRegistry::new(),
                terminals: TerminalRegistry::new(config.global_terminal),
                control: ServiceControl::new(tx),
                notifications,
            },
            inbox: Some(inbox),
            terminal_enabled: config.terminal,
            queued: VecDeque::new(),
            _instance: instance,
        })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn backend(&self) -> &'static str {
        self.core.backend.identifier()
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.core.runtime_dir
    }

    /// Where terminals connect.
    pub fn terminal_socket_path(&self) -> PathBuf {
        self.core.runtime_dir.join(SOCKET_FILE_NAME)
    }

    pub fn state(&self) -> ServiceState {
        self.core.state
    }

    pub fn exit_code(&self) -> i32 {
        self.core.exit_code
    }

    pub fn control(&self) -> ServiceControl {
        self.core.control.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.core.notifications.subscribe()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn add_callback<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, CallbackError> + 'static,
    {
        self.core.callbacks.add(kind, handler);
    }

    pub fn add_typed_callback<F, Args>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: TypedCallback<Args>,
    {
        self.core.callbacks.add_typed(kind, handler);
    }

    pub fn get_sockets(&self, name: &str) -> Vec<SocketDescriptor> {
        self.core.backend.inherited_sockets(name)
    }

    pub fn get_socket(&self) -> Option<SocketDescriptor> {
        self.core.default_socket()
    }

    pub fn is_terminal_active(&self) -> bool {
        self.core.terminals.is_active()
    }

    pub fn terminal_activity(&self) -> TerminalActivity {
        self.core.terminals.activity()
    }

    pub fn set_terminal_active(&mut self, active: bool) {
        self.core.set_terminal_active(active);
    }

    pub fn global_terminal(&self) -> bool {
        self.core.terminals.is_global()
    }

    pub fn set_global_terminal(&mut self, global: bool) {
        self.core.set_global_terminal(global);
    }

    /// Run the service to completion and return its exit code.
    ///
    /// Handlers may use `tokio::task::spawn_local` for work that completes
    /// asynchronous transitions.
    pub fn exec(&mut self) -> i32 {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("[{}] failed to build runtime: {e}", self.core.name);
                return EXIT_FAILURE;
            }
        };
        let local = tokio::task::LocalSet::new();
        match local.block_on(&runtime, self.run()) {
            Ok(exit_code) => exit_code,
            Err(e) => {
                error!("[{}] {e}", self.core.name);
                EXIT_FAILURE
            }
        }
    }

    /// Event loop body of [`exec`](Self::exec), for callers that own a
    /// runtime. Must run inside a `LocalSet` if handlers spawn local tasks.
    pub async fn run(&mut self) -> Result<i32, ServiceError> {
        let mut inbox = self
            .inbox
            .take()
            .ok_or(ServiceError::AlreadyExecuted(self.core.state))?;

        let capabilities = Capabilities {
            pausable: self.service.can_pause(),
        };
        let sink = EventSink::new(self.core.control.clone());
        self.core.backend.attach(sink, capabilities)?;

        let server = self.start_terminal().await;

        while self.core.state != ServiceState::Stopped {
            match inbox.recv().await {
                Some(message) => self.handle(message),
                None => break,
            }
        }

        self.core.close_terminals();
        if let Some(server) = server {
            server.shutdown().await;
        }
        self.core.backend.detach();
        info!(
            "[{}] exited with code {}",
            self.core.name, self.core.exit_code
        );
        Ok(self.core.exit_code)
    }

    async fn start_terminal(&self) -> Option<TerminalServer> {
        if !self.terminal_enabled {
            return None;
        }
        let path = self.terminal_socket_path();
        match terminal::listen(&path, self.core.control.clone()).await {
            Ok(server) => Some(server),
            Err(e) => {
                warn!(
                    "[{}] terminal unavailable at {}: {e}",
                    self.core.name,
                    path.display()
                );
                None
            }
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Event(command) => self.dispatch(command),
            Message::Complete {
                command,
                success,
                exit_code,
            } => self.complete(command, success, exit_code),
            Message::Callback { kind, args, reply } => {
                let result = self.invoke_callback(&kind, args);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Message::TerminalConnected(terminal) => {
                let (id, mode) = (terminal.id(), terminal.mode());
                info!("[{}] {id} connected ({mode})", self.core.name);
                let changed = self.core.terminals.insert(terminal.clone());
                self.core.emit(Notification::TerminalConnected { id, mode });
                if changed {
                    self.core.emit_activity();
                }
                self.service
                    .on_terminal_connected(&mut Context::new(&mut self.core), &terminal);
            }
            Message::TerminalRequest { id, request } => self.terminal_request(id, request),
            Message::TerminalDisconnected(id) => {
                let (removed, changed) = self.core.terminals.remove(id);
                if removed.is_none() {
                    return;
                }
                info!("[{}] {id} disconnected", self.core.name);
                self.core.emit(Notification::TerminalDisconnected { id });
                if changed {
                    self.core.emit_activity();
                }
            }
        }
    }

    fn dispatch(&mut self, command: Command) {
        let state = self.core.state;
        if state == ServiceState::Stopped {
            debug!("[{}] ignoring {command}, already stopped", self.core.name);
            return;
        }
        if state.is_transient() {
            self.enqueue(command);
            return;
        }
        if state == ServiceState::Created && command == Command::Stop {
            info!("[{}] stop requested before start", self.core.name);
            self.core.set_state(ServiceState::Stopped);
            let exit_code = self.core.exit_code;
            self.core.report(Command::Stop, true, Some(exit_code));
            self.core.emit(Notification::Stopped { exit_code });
            return;
        }
        let pause_unsupported =
            matches!(command, Command::Pause | Command::Resume) && !self.service.can_pause();
        let Some(next) = state.begin(command).filter(|_| !pause_unsupported) else {
            self.reject(command);
            return;
        };

        if command == Command::Start
            && !self.service.pre_start(&mut Context::new(&mut self.core))
        {
            warn!("[{}] pre-start check failed", self.core.name);
            self.core.exit_code = EXIT_FAILURE;
            self.core.set_state(ServiceState::Stopped);
            self.core.report(Command::Start, false, Some(EXIT_FAILURE));
            self.core.emit(Notification::Stopped {
                exit_code: EXIT_FAILURE,
            });
            return;
        }

        self.core.set_state(next);
        let mut exit_code = self.core.exit_code;
        let mut ctx = Context::new(&mut self.core);
        let mode = match command {
            Command::Start => self.service.on_start(&mut ctx),
            Command::Stop => self.service.on_stop(&mut ctx, &mut exit_code),
            Command::Pause => self.service.on_pause(&mut ctx),
            Command::Resume => self.service.on_resume(&mut ctx),
            Command::Reload => self.service.on_reload(&mut ctx),
        };
        if command == Command::Stop {
            self.core.exit_code = exit_code;
        }

        match mode {
            CommandMode::Synchronous => self.finish(command, true),
            CommandMode::Asynchronous => {
                debug!("[{}] {command} pending completion", self.core.name);
            }
        }
    }

    fn enqueue(&mut self, command: Command) {
        if self.queued.contains(&command) {
            debug!(
                "[{}] {command} already queued behind {}",
                self.core.name, self.core.state
            );
        } else {
            debug!("[{}] queued {command} behind {}", self.core.name, self.core.state);
            self.queued.push_back(command);
        }
    }

    fn reject(&mut self, command: Command) {
        let state = self.core.state;
        warn!("[{}] cannot {command} while {state}", self.core.name);
        self.core.report(command, false, None);
        self.core.emit(Notification::CommandRejected { command, state });
    }

    fn complete(&mut self, command: Command, success: bool, exit_code: Option<i32>) {
        if self.core.state.pending_command() != Some(command) {
            error!(
                "[{}] unexpected completion of {command} while {}",
                self.core.name, self.core.state
            );
            self.core
                .emit(Notification::CompletionRejected { command });
            return;
        }

        if let Some(code) = exit_code {
            self.core.exit_code = code;
        } else if !success
            && matches!(command, Command::Start | Command::Stop)
            && self.core.exit_code == 0
        {
            self.core.exit_code = EXIT_FAILURE;
        }
        self.finish(command, success);
    }

    fn finish(&mut self, command: Command, success: bool) {
        let next = self.core.state.settle(success);
        self.core.set_state(next);

        let exit_code = self.core.exit_code;
        let ended = next == ServiceState::Stopped;
        self.core
            .report(command, success, ended.then_some(exit_code));

        if success {
            self.core.emit(Notification::completed(command, exit_code));
        } else if ended {
            self.core.emit(Notification::Stopped { exit_code });
        } else {
            warn!("[{}] {command} failed, back to {next}", self.core.name);
        }

        self.drain_queue();
    }

    fn drain_queue(&mut self) {
        while !self.core.state.is_transient() {
            let Some(command) = self.queued.pop_front() else {
                return;
            };
            if self.core.state == ServiceState::Stopped {
                debug!(
                    "[{}] dropping {} queued command(s)",
                    self.core.name,
                    self.queued.len() + 1
                );
                self.queued.clear();
                return;
            }
            self.dispatch(command);
        }
    }

    fn invoke_callback(&mut self, kind: &str, args: Vec<Value>) -> Result<Value, CallbackError> {
        let result = self
            .service
            .on_callback(&mut Context::new(&mut self.core), kind, args);
        match &result {
            Ok(_) => debug!("[{}] callback '{kind}' done", self.core.name),
            Err(e) if e.is_unknown() => debug!("[{}] {e}", self.core.name),
            Err(e) => warn!("[{}] callback '{kind}' failed: {e}", self.core.name),
        }
        result
    }

    fn terminal_request(&mut self, id: TerminalId, request: Request) {
        let Some(terminal) = self.core.terminals.get(id).cloned() else {
            debug!("[{}] request from departed {id}", self.core.name);
            return;
        };
        if !terminal.mode().can_send() {
            terminal.send(Frame::Error {
                message: format!("{} terminals cannot issue commands", terminal.mode()),
            });
            return;
        }
        if self.core.terminals.record_command(id) {
            self.core.emit_activity();
        }

        debug!("[{}] {id} requested '{}'", self.core.name, request.kind);
        let result = self.service.on_terminal_request(
            &mut Context::new(&mut self.core),
            &terminal,
            request,
        );
        let frame = match result {
            Ok(result) => Frame::Reply { result },
            Err(e) => Frame::Error {
                message: e.to_string(),
            },
        };
        terminal.send(frame);
    }
}
