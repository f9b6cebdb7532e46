// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service framework for long-running background processes.
//!
//! A concrete service implements [`Service`] and hands itself to a
//! [`ServiceHost`], which owns the lifecycle state machine, the callback
//! registry, the terminal control channel and the platform [`Backend`].
//! [`ServiceHost::exec`] runs a single-threaded event loop until the service
//! reaches [`ServiceState::Stopped`] and returns the process exit code.

pub mod backend;
pub mod callback;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod notification;
pub mod runtime_dir;
pub mod service;
pub mod sockets;
pub mod state;
pub mod terminal;
pub mod value;

pub use backend::{Backend, BackendKind, Capabilities, CompletionReport, create_backend};
pub use callback::{CallbackError, CallbackRegistry, TypedCallback};
pub use command::{Command, CommandMode};
pub use config::ServiceConfig;
pub use control::{EventSink, ServiceControl};
pub use error::ServiceError;
pub use host::ServiceHost;
pub use notification::Notification;
pub use service::{Context, Service};
pub use sockets::{ActivatedSockets, SocketDescriptor};
pub use state::ServiceState;
pub use terminal::{Terminal, TerminalActivity, TerminalId, TerminalMode};
pub use value::{FromValue, Value};

/// Exit code returned by `exec` when startup or the backend fails.
pub const EXIT_FAILURE: i32 = 1;
