// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Host configuration from environment variables.
//!
//! Everything has a default, so a service runs with no configuration at all.

use crate::backend::BackendKind;
use anyhow::{Result, bail};
use log::{LevelFilter, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TERMINAL: bool = true;
const DEFAULT_GLOBAL_TERMINAL: bool = false;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Service name; names the runtime directory and the log prefix.
    pub name: String,

    /// Backend to host the service.
    pub backend: BackendKind,

    /// Overrides runtime directory resolution.
    pub runtime_dir: Option<PathBuf>,

    /// Listen for terminal connections.
    pub terminal: bool,

    /// Initial value of the global-terminal flag.
    pub global_terminal: bool,

    pub log_level: String,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: BackendKind::default(),
            runtime_dir: None,
            terminal: DEFAULT_TERMINAL,
            global_terminal: DEFAULT_GLOBAL_TERMINAL,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Load configuration for service `name` from `DD_SVC_*` variables.
    pub fn from_env(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: Self::parse_backend(),
            runtime_dir: env::var_os("DD_SVC_RUNTIME_DIR").map(PathBuf::from),
            terminal: Self::parse_bool("DD_SVC_TERMINAL", DEFAULT_TERMINAL),
            global_terminal: Self::parse_bool("DD_SVC_GLOBAL_TERMINAL", DEFAULT_GLOBAL_TERMINAL),
            log_level: Self::parse_log_level(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = Some(dir.into());
        self
    }

    pub fn with_terminal(mut self, enabled: bool) -> Self {
        self.terminal = enabled;
        self
    }

    pub fn with_global_terminal(mut self, global: bool) -> Self {
        self.global_terminal = global;
        self
    }

    fn parse_backend() -> BackendKind {
        match env::var("DD_SVC_BACKEND") {
            Ok(raw) => BackendKind::from_str(&raw).unwrap_or_else(|e| {
                warn!("{e}, using auto-detection");
                BackendKind::default()
            }),
            Err(_) => BackendKind::default(),
        }
    }

    fn parse_bool(var_name: &str, default: bool) -> bool {
        env::var(var_name)
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn parse_log_level() -> String {
        // DD_SVC_LOG_LEVEL > RUST_LOG > default
        env::var("DD_SVC_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        match LevelFilter::from_str(&self.log_level) {
            Ok(level) => Ok(level),
            Err(_) => bail!("invalid log level '{}'", self.log_level),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("service name must not be empty");
        }
        if self.name.contains(['/', '\\']) {
            bail!("service name '{}' must not contain path separators", self.name);
        }
        self.log_level_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "DD_SVC_BACKEND",
        "DD_SVC_RUNTIME_DIR",
        "DD_SVC_TERMINAL",
        "DD_SVC_GLOBAL_TERMINAL",
        "DD_SVC_LOG_LEVEL",
        "RUST_LOG",
    ];

    fn cleared<R>(f: impl FnOnce() -> R) -> R {
        temp_env::with_vars_unset(VARS, f)
    }

    #[test]
    fn test_default_config() {
        let config = cleared(|| ServiceConfig::from_env("demo"));
        assert_eq!(config, ServiceConfig::new("demo"));
        assert_eq!(config.backend, BackendKind::Auto);
        assert!(config.terminal);
        assert!(!config.global_terminal);
        assert_eq!(config.log_level, "info");
        assert!(config.runtime_dir.is_none());
    }

    #[test]
    fn test_backend_selection() {
        let config = cleared(|| {
            temp_env::with_var("DD_SVC_BACKEND", Some("foreground"), || {
                ServiceConfig::from_env("demo")
            })
        });
        assert_eq!(config.backend, BackendKind::Foreground);

        let config = cleared(|| {
            temp_env::with_var("DD_SVC_BACKEND", Some("launchd"), || {
                ServiceConfig::from_env("demo")
            })
        });
        assert_eq!(config.backend, BackendKind::Auto);
    }

    #[test]
    fn test_bool_parsing() {
        for val in ["true", "1", "yes", "on", "TRUE", "Yes"] {
            let config = cleared(|| {
                temp_env::with_var("DD_SVC_GLOBAL_TERMINAL", Some(val), || {
                    ServiceConfig::from_env("demo")
                })
            });
            assert!(config.global_terminal, "Failed for value: {val}");
        }
        for val in ["false", "0", "no", "off", "FALSE", "No"] {
            let config = cleared(|| {
                temp_env::with_var("DD_SVC_TERMINAL", Some(val), || {
                    ServiceConfig::from_env("demo")
                })
            });
            assert!(!config.terminal, "Failed for value: {val}");
        }
        let config = cleared(|| {
            temp_env::with_var("DD_SVC_TERMINAL", Some("maybe"), || {
                ServiceConfig::from_env("demo")
            })
        });
        assert!(config.terminal);
    }

    #[test]
    fn test_log_level_priority() {
        let config = cleared(|| {
            temp_env::with_vars(
                [("DD_SVC_LOG_LEVEL", Some("debug")), ("RUST_LOG", Some("trace"))],
                || ServiceConfig::from_env("demo"),
            )
        });
        assert_eq!(config.log_level, "debug");

        let config = cleared(|| {
            temp_env::with_var("RUST_LOG", Some("trace"), || ServiceConfig::from_env("demo"))
        });
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.log_level_filter().unwrap(), LevelFilter::Trace);
    }

    #[test]
    fn test_runtime_dir_override() {
        let config = cleared(|| {
            temp_env::with_var("DD_SVC_RUNTIME_DIR", Some("/tmp/svc"), || {
                ServiceConfig::from_env("demo")
            })
        });
        assert_eq!(config.runtime_dir, Some(PathBuf::from("/tmp/svc")));
    }

    #[test]
    fn test_validation() {
        assert!(ServiceConfig::new("demo").validate().is_ok());
        assert!(ServiceConfig::new("").validate().is_err());
        assert!(ServiceConfig::new("a/b").validate().is_err());

        let mut config = ServiceConfig::new("demo");
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = ServiceConfig::new("demo")
            .with_backend(BackendKind::Systemd)
            .with_runtime_dir("/run/demo")
            .with_terminal(false)
            .with_global_terminal(true);
        assert_eq!(config.backend, BackendKind::Systemd);
        assert_eq!(config.runtime_dir, Some(PathBuf::from("/run/demo")));
        assert!(!config.terminal);
        assert!(config.global_terminal);
    }
}
