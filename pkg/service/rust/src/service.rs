// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::callback::{CallbackError, CallbackRegistry, TypedCallback};
use crate::command::CommandMode;
use crate::control::ServiceControl;
use crate::host::Core;
use crate::sockets::SocketDescriptor;
use crate::state::ServiceState;
use crate::terminal::protocol::Request;
use crate::terminal::{Terminal, TerminalActivity, TerminalId};
use crate::value::Value;
use std::path::Path;

/// A concrete service.
///
/// Handlers run on the event loop thread. A handler returning
/// [`CommandMode::Asynchronous`] leaves its transition pending until the
/// service calls [`ServiceControl::complete`] (or `fail`, `complete_stop`)
/// from wherever the work finished.
pub trait Service {
    /// Runs before `on_start`. Returning `false` aborts startup and the host
    /// exits with [`EXIT_FAILURE`](crate::EXIT_FAILURE).
    fn pre_start(&mut self, _ctx: &mut Context<'_>) -> bool {
        true
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> CommandMode;

    /// `exit_code` starts at 0 and becomes the process exit code.
    fn on_stop(&mut self, _ctx: &mut Context<'_>, _exit_code: &mut i32) -> CommandMode {
        CommandMode::Synchronous
    }

    fn on_reload(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        CommandMode::Synchronous
    }

    fn on_pause(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        CommandMode::Synchronous
    }

    fn on_resume(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        CommandMode::Synchronous
    }

    /// Whether pause and resume are supported. Backends only route pause
    /// requests to services that say so.
    fn can_pause(&self) -> bool {
        false
    }

    /// Invoked for every callback request. The default dispatches to the
    /// registry.
    fn on_callback(
        &mut self,
        ctx: &mut Context<'_>,
        kind: &str,
        args: Vec<Value>,
    ) -> Result<Value, CallbackError> {
        ctx.callbacks().invoke(kind, args)
    }

    fn on_terminal_connected(&mut self, _ctx: &mut Context<'_>, _terminal: &Terminal) {}

    /// Invoked for every command a terminal sends. The default treats it as
    /// a callback request.
    fn on_terminal_request(
        &mut self,
        ctx: &mut Context<'_>,
        _terminal: &Terminal,
        request: Request,
    ) -> Result<Value, CallbackError> {
        self.on_callback(ctx, &request.kind, request.args)
    }
}

/// The host as seen from inside a handler.
pub struct Context<'a> {
    core: &'a mut Core,
}

impl<'a> Context<'a> {
    pub(crate) fn new(core: &'a mut Core) -> Self {
        Self { core }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Identifier of the active backend.
    pub fn backend(&self) -> &'static str {
        self.core.backend.identifier()
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.core.runtime_dir
    }

    pub fn state(&self) -> ServiceState {
        self.core.state
    }

    pub fn control(&self) -> ServiceControl {
        self.core.control.clone()
    }

    /// Sockets the platform handed over under `name`.
    pub fn get_sockets(&self, name: &str) -> Vec<SocketDescriptor> {
        self.core.backend.inherited_sockets(name)
    }

    /// First socket of the unnamed set.
    pub fn get_socket(&self) -> Option<SocketDescriptor> {
        self.core.default_socket()
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.core.callbacks
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

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.core.terminals.terminals()
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.core.terminals.get(id)
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
}
