// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Scriptable backend for tests.

use super::{Backend, Capabilities, CompletionReport};
use crate::command::Command;
use crate::control::EventSink;
use crate::error::ServiceError;
use crate::sockets::{ActivatedSockets, SocketDescriptor};
use crate::value::Value;
use std::sync::{Arc, Mutex, MutexGuard};

enum Pending {
    Command(Command),
    Callback(String, Vec<Value>),
}

#[derive(Default)]
struct Inner {
    sink: Option<EventSink>,
    pending: Vec<Pending>,
    reports: Vec<CompletionReport>,
    capabilities: Option<Capabilities>,
    detached: bool,
}

/// Test-side view of a [`ManualBackend`]. Events sent before the host
/// attaches are held and delivered on attach.
#[derive(Clone, Default)]
pub struct ManualBackendHandle {
    inner: Arc<Mutex<Inner>>,
}

impl ManualBackendHandle {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn deliver(&self, command: Command) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.sink {
            Some(sink) => {
                let _ = sink.deliver(command);
            }
            None => inner.pending.push(Pending::Command(command)),
        }
    }

    pub fn callback(&self, kind: &str, args: Vec<Value>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.sink {
            Some(sink) => {
                let _ = sink.callback(kind, args);
            }
            None => inner.pending.push(Pending::Callback(kind.to_string(), args)),
        }
    }

    /// Completions reported so far, oldest first.
    pub fn reports(&self) -> Vec<CompletionReport> {
        self.lock().reports.clone()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.lock().capabilities
    }

    pub fn is_detached(&self) -> bool {
        self.lock().detached
    }
}

pub struct ManualBackend {
    handle: ManualBackendHandle,
    sockets: ActivatedSockets,
    auto_start: bool,
}

impl ManualBackend {
    /// A backend that delivers start on attach.
    pub fn new() -> Self {
        Self {
            handle: ManualBackendHandle::default(),
            sockets: ActivatedSockets::empty(),
            auto_start: true,
        }
    }

    /// Leave start to the test.
    pub fn without_auto_start(mut self) -> Self {
        self.auto_start = false;
        self
    }

    pub fn with_sockets(mut self, sockets: ActivatedSockets) -> Self {
        self.sockets = sockets;
        self
    }

    pub fn handle(&self) -> ManualBackendHandle {
        self.handle.clone()
    }
}

impl Default for ManualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ManualBackend {
    fn identifier(&self) -> &'static str {
        "manual"
    }

    fn attach(&mut self, sink: EventSink, capabilities: Capabilities) -> Result<(), ServiceError> {
        let mut guard = self.handle.lock();
        let inner = &mut *guard;
        inner.capabilities = Some(capabilities);
        if self.auto_start {
            sink.deliver(Command::Start)?;
        }
        for pending in inner.pending.drain(..) {
            match pending {
                Pending::Command(command) => sink.deliver(command)?,
                Pending::Callback(kind, args) => sink.callback(kind, args)?,
            }
        }
        inner.sink = Some(sink);
        Ok(())
    }

    fn report_completion(&mut self, report: CompletionReport) {
        self.handle.lock().reports.push(report);
    }

    fn inherited_sockets(&self, name: &str) -> Vec<SocketDescriptor> {
        self.sockets.get(name)
    }

    fn detach(&mut self) {
        let mut inner = self.handle.lock();
        inner.sink = None;
        inner.detached = true;
    }
}
