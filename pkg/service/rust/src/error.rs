// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service-level errors.
//! Lifecycle problems are recovered where they occur; only construction and
//! backend failures surface through these variants.

use crate::sockets::SocketError;
use crate::state::ServiceState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a service host already exists in this process")]
    AlreadyConstructed,

    #[error("service was already executed (state: {0})")]
    AlreadyExecuted(ServiceState),

    #[error("event loop is not running")]
    LoopClosed,

    #[error("backend '{backend}' failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("backend '{0}' is not supported on this platform")]
    UnsupportedBackend(&'static str),

    #[error("runtime directory {path}: {source}")]
    RuntimeDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sockets(#[from] SocketError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
