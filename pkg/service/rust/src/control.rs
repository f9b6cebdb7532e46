// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Handles that marshal work onto the host's event loop.
//!
//! Everything that changes host state travels as a [`Message`] through one
//! unbounded channel and is processed on the loop thread in arrival order.
//! Both handles are `Send + Clone`, so signal tasks, worker threads and
//! terminal connections can hold them.

use crate::callback::CallbackError;
use crate::command::Command;
use crate::error::ServiceError;
use crate::terminal::protocol::Request;
use crate::terminal::{Terminal, TerminalId};
use crate::value::Value;
use tokio::sync::{mpsc, oneshot};

pub(crate) type CallbackReply = oneshot::Sender<Result<Value, CallbackError>>;

pub(crate) enum Message {
    Event(Command),
    Complete {
        command: Command,
        success: bool,
        exit_code: Option<i32>,
    },
    Callback {
        kind: String,
        args: Vec<Value>,
        reply: Option<CallbackReply>,
    },
    TerminalConnected(Terminal),
    TerminalRequest {
        id: TerminalId,
        request: Request,
    },
    TerminalDisconnected(TerminalId),
}

/// Service-facing handle: request transitions, signal completion of
/// asynchronous handlers and invoke callbacks from any thread.
#[derive(Clone)]
pub struct ServiceControl {
    tx: mpsc::UnboundedSender<Message>,
}

impl ServiceControl {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }

    pub(crate) fn post(&self, message: Message) -> Result<(), ServiceError> {
        self.tx.send(message).map_err(|_| ServiceError::LoopClosed)
    }

    /// Request a stop transition.
    pub fn quit(&self) -> Result<(), ServiceError> {
        self.post(Message::Event(Command::Stop))
    }

    pub fn reload(&self) -> Result<(), ServiceError> {
        self.post(Message::Event(Command::Reload))
    }

    pub fn pause(&self) -> Result<(), ServiceError> {
        self.post(Message::Event(Command::Pause))
    }

    pub fn resume(&self) -> Result<(), ServiceError> {
        self.post(Message::Event(Command::Resume))
    }

    /// Report that the asynchronous handler for `command` succeeded.
    pub fn complete(&self, command: Command) -> Result<(), ServiceError> {
        self.post(Message::Complete {
            command,
            success: true,
            exit_code: None,
        })
    }

    /// Report that the asynchronous handler for `command` failed.
    ///
    /// A failed start stops the service with [`EXIT_FAILURE`](crate::EXIT_FAILURE).
    pub fn fail(&self, command: Command) -> Result<(), ServiceError> {
        self.post(Message::Complete {
            command,
            success: false,
            exit_code: None,
        })
    }

    /// Finish an asynchronous stop with `exit_code`.
    pub fn complete_stop(&self, exit_code: i32) -> Result<(), ServiceError> {
        self.post(Message::Complete {
            command: Command::Stop,
            success: true,
            exit_code: Some(exit_code),
        })
    }

    /// Fail an asynchronous start with `exit_code`.
    pub fn fail_start(&self, exit_code: i32) -> Result<(), ServiceError> {
        self.post(Message::Complete {
            command: Command::Start,
            success: false,
            exit_code: Some(exit_code),
        })
    }

    /// Invoke callback `kind` on the loop and wait for its result.
    pub async fn callback(
        &self,
        kind: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Value, CallbackError> {
        let (reply, rx) = oneshot::channel();
        self.post(Message::Callback {
            kind: kind.into(),
            args,
            reply: Some(reply),
        })
        .map_err(|_| CallbackError::Unavailable)?;
        rx.await.map_err(|_| CallbackError::Unavailable)?
    }

    /// Invoke callback `kind` on the loop, discarding its result.
    pub fn post_callback(
        &self,
        kind: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<(), ServiceError> {
        self.post(Message::Callback {
            kind: kind.into(),
            args,
            reply: None,
        })
    }
}

/// Backend-facing handle: deliver lifecycle events and callback requests
/// that originate from the platform (signals, service manager, ...).
#[derive(Clone)]
pub struct EventSink {
    control: ServiceControl,
}

impl EventSink {
    pub(crate) fn new(control: ServiceControl) -> Self {
        Self { control }
    }

    pub fn deliver(&self, command: Command) -> Result<(), ServiceError> {
        self.control.post(Message::Event(command))
    }

    pub fn callback(&self, kind: impl Into<String>, args: Vec<Value>) -> Result<(), ServiceError> {
        self.control.post_callback(kind, args)
    }

    pub fn is_closed(&self) -> bool {
        self.control.tx.is_closed()
    }
}
