// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host bootstrap for the console request queue
//!
//! Allocates a zeroed queue page, runs the console service on its own
//! thread and a client workload on the main thread.

mod session;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serq_hal::{CaptureSink, IoSink};
use serq_sync::WaitConfig;
use serqd::ServiceConfig;

use crate::session::{run_workload, Workload};

#[derive(Debug, Parser)]
#[command(name = "serq-run", about = "Run a console queue session on the host")]
struct Cli {
    /// Service configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Back off instead of busy-polling. With --config the file's [wait]
    /// table still governs the service and only the client backs off.
    #[arg(long)]
    backoff: bool,
    /// Print the device output as hex instead of raw bytes.
    #[arg(long)]
    hex: bool,
    #[command(subcommand)]
    workload: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print "Hello world!".
    Hello,
    /// Print 0..N, one number per line.
    Count { n: u64 },
    /// Send raw arguments; only their low byte reaches the device.
    Bytes { values: Vec<u64> },
    /// Print a string followed by a newline.
    Text { text: String },
}

impl From<Command> for Workload {
    fn from(value: Command) -> Self {
        match value {
            Command::Hello => Workload::Hello,
            Command::Count { n } => Workload::Count(n),
            Command::Bytes { values } => Workload::Bytes(values),
            Command::Text { text } => Workload::Text(text),
        }
    }
}

/// Applies `--backoff` and returns the client's wait configuration. A loaded
/// config file keeps its own `[wait]` table for the service.
fn apply_backoff(config: &mut ServiceConfig, backoff: bool, from_file: bool) -> WaitConfig {
    if !backoff {
        return WaitConfig::default();
    }
    if from_file {
        info!("serq-run: --backoff applies to the client; service keeps [wait] from the config file");
    } else {
        config.wait = WaitConfig::backoff();
    }
    WaitConfig::backoff()
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    let client_wait = apply_backoff(&mut config, cli.backoff, cli.config.is_some());
    let workload = Workload::from(cli.workload);

    if cli.hex {
        let sink = run_workload(config, client_wait, workload, CaptureSink::new())?;
        let hex: Vec<String> = sink.bytes().iter().map(|b| format!("{b:02x}")).collect();
        println!("{}", hex.join(" "));
    } else {
        let sink = run_workload(config, client_wait, workload, IoSink::new(io::stdout()))?;
        sink.into_inner().flush().context("flushing stdout")?;
    }
    Ok(())
}
