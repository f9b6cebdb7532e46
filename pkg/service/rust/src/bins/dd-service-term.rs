// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Command-line terminal for dd-service based services.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dd_service::terminal::{SOCKET_FILE_NAME, TerminalClient, TerminalError};
use dd_service::{TerminalMode, Value, runtime_dir};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dd-service-term", version)]
#[command(about = "Talk to a running service over its terminal socket")]
struct Args {
    /// Service name, used to locate the runtime directory
    #[arg(long, default_value = "dd-service-demo")]
    name: String,

    /// Runtime directory of the service
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Terminal socket; overrides --name and --runtime-dir
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Invoke a callback and print its result
    Call {
        kind: String,
        /// Arguments, parsed as JSON when possible
        args: Vec<String>,
    },
    /// Invoke a callback without waiting for a result
    Send { kind: String, args: Vec<String> },
    /// Print notifications until the service goes away
    Watch,
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let socket = match args.socket {
        Some(path) => path,
        None => runtime_dir::resolve(&args.name, args.runtime_dir.as_deref()).join(SOCKET_FILE_NAME),
    };

    match args.command {
        Cmd::Call { kind, args } => {
            let mut client = connect(&socket, TerminalMode::ReadWritePassive).await?;
            let values = args.iter().map(|a| parse_arg(a)).collect();
            match client.request(&kind, values).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(TerminalError::Remote(message)) => bail!("{kind}: {message}"),
                Err(e) => return Err(e.into()),
            }
        }
        Cmd::Send { kind, args } => {
            let mut client = connect(&socket, TerminalMode::WriteOnly).await?;
            client
                .send(&kind, args.iter().map(|a| parse_arg(a)).collect())
                .await?;
        }
        Cmd::Watch => {
            let mut client = connect(&socket, TerminalMode::ReadOnly).await?;
            loop {
                match client.next_event().await {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(TerminalError::Closed) => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
    Ok(())
}

async fn connect(socket: &std::path::Path, mode: TerminalMode) -> Result<TerminalClient> {
    TerminalClient::connect(socket, mode)
        .await
        .with_context(|| format!("failed to connect to {}", socket.display()))
}
