// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Socket activation hand-off.
//!
//! Follows the systemd protocol:
//! - `LISTEN_PID` names the process the descriptors are meant for; without
//!   it nothing is inherited
//! - `LISTEN_FDS` counts descriptors passed starting at FD 3
//! - `LISTEN_FDNAMES` optionally names each descriptor, colon-separated
//!
//! Every backend collects once at construction and answers lookups from the
//! collected table. Unknown names yield an empty list.

use log::{debug, warn};
use thiserror::Error;

/// First inherited descriptor (`SD_LISTEN_FDS_START`).
pub const LISTEN_FDS_START: i32 = 3;

/// Name under which unnamed sockets are collected.
pub const DEFAULT_SOCKET_NAME: &str = "";

// Placeholder systemd reports for descriptors without a name.
const UNNAMED_PLACEHOLDER: &str = "unknown";

#[cfg(unix)]
pub type RawDescriptor = std::os::fd::RawFd;
#[cfg(windows)]
pub type RawDescriptor = std::os::windows::io::RawSocket;

/// An inherited listening socket. The descriptor stays owned by the process;
/// callers wrap it (e.g. `TcpListener::from_raw_fd`) exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketDescriptor(RawDescriptor);

impl SocketDescriptor {
    pub fn new(raw: RawDescriptor) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> RawDescriptor {
        self.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SocketError {
    #[error("invalid LISTEN_FDS value '{0}'")]
    InvalidCount(String),

    #[error("invalid LISTEN_PID value '{0}'")]
    InvalidPid(String),

    #[error("LISTEN_FDS={count} exceeds the descriptor limit ({limit})")]
    TooMany { count: i32, limit: i32 },
}

/// Sockets handed to this process, in the order they were passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivatedSockets {
    entries: Vec<(String, SocketDescriptor)>,
}

impl ActivatedSockets {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from explicit entries, e.g. for backends that receive sockets by
    /// other means.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SocketDescriptor)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(n, d)| (n.into(), d)).collect(),
        }
    }

    /// Collect from the current process environment.
    #[cfg(unix)]
    pub fn from_env() -> Result<Self, SocketError> {
        let pid = std::env::var("LISTEN_PID").ok();
        let fds = std::env::var("LISTEN_FDS").ok();
        let names = std::env::var("LISTEN_FDNAMES").ok();
        let sockets = Self::from_vars(
            pid.as_deref(),
            fds.as_deref(),
            names.as_deref(),
            std::process::id(),
        )?;
        for (name, fd) in &sockets.entries {
            mark_cloexec(*fd);
            debug!("inherited socket fd={} name='{name}'", fd.raw());
        }
        Ok(sockets)
    }

    #[cfg(windows)]
    pub fn from_env() -> Result<Self, SocketError> {
        Ok(Self::empty())
    }

    /// Parse the activation variables for process `own_pid`.
    #[cfg(unix)]
    pub fn from_vars(
        listen_pid: Option<&str>,
        listen_fds: Option<&str>,
        listen_fdnames: Option<&str>,
        own_pid: u32,
    ) -> Result<Self, SocketError> {
        // Without LISTEN_PID the variables may belong to an ancestor process.
        let (Some(pid), Some(count)) = (listen_pid, listen_fds) else {
            return Ok(Self::empty());
        };

        let pid: u32 = pid
            .trim()
            .parse()
            .map_err(|_| SocketError::InvalidPid(pid.to_string()))?;
        if pid != own_pid {
            debug!("LISTEN_PID={pid} is not this process ({own_pid}), ignoring sockets");
            return Ok(Self::empty());
        }

        let count: i32 = count
            .trim()
            .parse()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| SocketError::InvalidCount(count.to_string()))?;
        let limit = max_inherited();
        if count > limit {
            return Err(SocketError::TooMany { count, limit });
        }

        let names: Vec<&str> = match listen_fdnames {
            Some(raw) => {
                let names: Vec<&str> = raw.split(':').collect();
                if names.len() == count as usize {
                    names
                } else {
                    warn!(
                        "LISTEN_FDNAMES has {} name(s) for {count} socket(s), treating all as unnamed",
                        names.len()
                    );
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        let entries = (0..count)
            .map(|i| {
                let name = names
                    .get(i as usize)
                    .copied()
                    .filter(|n| *n != UNNAMED_PLACEHOLDER)
                    .unwrap_or(DEFAULT_SOCKET_NAME);
                (
                    name.to_string(),
                    SocketDescriptor::new(LISTEN_FDS_START + i),
                )
            })
            .collect();
        Ok(Self { entries })
    }

    /// Descriptors inherited under `name`, in hand-off order.
    pub fn get(&self, name: &str) -> Vec<SocketDescriptor> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, fd)| *fd)
            .collect()
    }

    /// First descriptor of the unnamed set.
    pub fn first_default(&self) -> Option<SocketDescriptor> {
        self.get(DEFAULT_SOCKET_NAME).into_iter().next()
    }

    /// Distinct names, in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.entries {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Inherited descriptors must not leak into children we spawn.
/// Largest LISTEN_FDS value this process can hold: descriptors start at
/// `LISTEN_FDS_START` and must stay below the open file limit.
#[cfg(unix)]
fn max_inherited() -> i32 {
    use nix::sys::resource::{Resource, getrlimit};

    let ceiling = i32::MAX - LISTEN_FDS_START;
    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, _)) => i32::try_from(soft)
            .unwrap_or(i32::MAX)
            .saturating_sub(LISTEN_FDS_START)
            .clamp(0, ceiling),
        Err(e) => {
            warn!("failed to read RLIMIT_NOFILE: {e}");
            ceiling
        }
    }
}

#[cfg(unix)]
fn mark_cloexec(fd: SocketDescriptor) {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use std::os::fd::BorrowedFd;

    // SAFETY: the descriptor was handed to this process by the service manager
    // and stays open for the lifetime of the process.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd.raw()) };
    if let Err(e) = fcntl(borrowed, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
        warn!("failed to set FD_CLOEXEC on inherited fd {}: {e}", fd.raw());
    }
}
