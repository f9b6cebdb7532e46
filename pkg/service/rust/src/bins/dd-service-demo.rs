// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Example service built on dd-service.
//!
//! Starts asynchronously, counts reloads, and exposes a few callbacks to
//! terminals (`echo`, `add`, `reloads`, `status`, `quit`).

use anyhow::{Context as _, Result};
use clap::Parser;
use dd_service::{
    BackendKind, CallbackError, Command, CommandMode, Context, Service, ServiceConfig, ServiceHost,
    Terminal, Value,
};
use log::{info, warn};
use simple_logger::SimpleLogger;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

const NAME: &str = "dd-service-demo";

#[derive(Parser, Debug)]
#[command(name = NAME, version)]
#[command(about = "Run the dd-service example service")]
struct Args {
    /// Backend to run on (auto, foreground, systemd); overrides DD_SVC_BACKEND
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Runtime directory; overrides DD_SVC_RUNTIME_DIR
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Do not listen for terminals
    #[arg(long)]
    no_terminal: bool,

    /// Exit code reported after a stop
    #[arg(long, env = "DD_SVC_DEMO_EXIT_CODE", default_value_t = 0)]
    exit_code: i32,

    /// Milliseconds before startup completes
    #[arg(long, default_value_t = 100)]
    start_delay_ms: u64,
}

struct DemoService {
    reloads: Rc<Cell<u64>>,
    exit_code: i32,
    start_delay: Duration,
}

impl Service for DemoService {
    fn pre_start(&mut self, ctx: &mut Context<'_>) -> bool {
        if let Some(socket) = ctx.get_socket() {
            info!("[{NAME}] inherited listening socket fd={}", socket.raw());
        }
        true
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> CommandMode {
        ctx.add_callback("echo", |args| Ok(Value::List(args)));
        ctx.add_typed_callback("add", |a: i64, b: i64| a + b);
        let reloads = Rc::clone(&self.reloads);
        ctx.add_typed_callback("reloads", move || reloads.get() as i64);
        ctx.add_callback("SIGUSR1", |_| {
            info!("[{NAME}] SIGUSR1: still alive");
            Ok(Value::Null)
        });

        let control = ctx.control();
        let delay = self.start_delay;
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            info!("[{NAME}] ready");
            if let Err(e) = control.complete(Command::Start) {
                warn!("[{NAME}] could not complete startup: {e}");
            }
        });
        CommandMode::Asynchronous
    }

    fn on_stop(&mut self, _ctx: &mut Context<'_>, exit_code: &mut i32) -> CommandMode {
        info!("[{NAME}] stopping with exit code {}", self.exit_code);
        *exit_code = self.exit_code;
        CommandMode::Synchronous
    }

    fn on_reload(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        let count = self.reloads.get() + 1;
        self.reloads.set(count);
        info!("[{NAME}] reload #{count}");
        CommandMode::Synchronous
    }

    fn on_pause(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        info!("[{NAME}] paused");
        CommandMode::Synchronous
    }

    fn on_resume(&mut self, _ctx: &mut Context<'_>) -> CommandMode {
        info!("[{NAME}] resumed");
        CommandMode::Synchronous
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn on_callback(
        &mut self,
        ctx: &mut Context<'_>,
        kind: &str,
        args: Vec<Value>,
    ) -> Result<Value, CallbackError> {
        match kind {
            "status" => {
                let mut status = BTreeMap::new();
                status.insert("state".to_string(), Value::from(ctx.state().to_string()));
                status.insert("backend".to_string(), Value::from(ctx.backend()));
                status.insert("reloads".to_string(), Value::Int(self.reloads.get() as i64));
                status.insert(
                    "terminal_active".to_string(),
                    Value::from(ctx.is_terminal_active()),
                );
                Ok(Value::Map(status))
            }
            "quit" => ctx
                .control()
                .quit()
                .map(|_| Value::Null)
                .map_err(|e| CallbackError::Failed(e.to_string())),
            _ => ctx.callbacks().invoke(kind, args),
        }
    }

    fn on_terminal_connected(&mut self, _ctx: &mut Context<'_>, terminal: &Terminal) {
        info!("[{NAME}] {} attached ({})", terminal.id(), terminal.mode());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServiceConfig::from_env(NAME);
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    if let Some(dir) = args.runtime_dir {
        config = config.with_runtime_dir(dir);
    }
    if args.no_terminal {
        config = config.with_terminal(false);
    }
    config.validate()?;

    SimpleLogger::new()
        .with_level(config.log_level_filter()?)
        .init()
        .context("failed to initialize logging")?;
    info!("{NAME} starting (version {})", env!("CARGO_PKG_VERSION"));

    let service = DemoService {
        reloads: Rc::new(Cell::new(0)),
        exit_code: args.exit_code,
        start_delay: Duration::from_millis(args.start_delay_ms),
    };
    let mut host = ServiceHost::new(service, &config).context("failed to create service host")?;
    let exit_code = host.exec();
    drop(host);

    info!("{NAME} exiting with code {exit_code}");
    std::process::exit(exit_code);
}
