//! delsnoop - file deletion observer
//!
//! Attaches a probe to the entry of the unlinkat syscall and logs one
//! structured record per deletion attempt: pid, command name and the
//! pathname argument. The probe never alters the observed syscall.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use delsnoop::config::SnoopConfig;
use delsnoop::service::{self, Observer, TRACEPOINT_CATEGORY, TRACEPOINT_NAME};
use delsnoop::sink::LogSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "delsnoop")]
#[command(version)]
#[command(about = "Report file deletion attempts observed at the unlinkat syscall")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DELSNOOP_CONFIG")]
    config: Option<PathBuf>,

    /// Per-CPU ring capacity in records, overriding the config file
    #[arg(long)]
    ring_slots: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SnoopConfig::load(cli.config.as_deref()).context("load configuration")?;
    if let Some(slots) = cli.ring_slots {
        config.channel.ring_slots = slots;
    }
    if cli.json {
        config.observer.json_logs = true;
    }

    init_tracing(&config);
    service::preflight();

    let mut observer = Observer::load().context("load and attach the unlinkat probe")?;

    let sink = Arc::new(LogSink::new());
    observer.spawn_readers(config.page_count(), sink.clone())?;

    info!(
        ring_slots = config.channel.ring_slots,
        pages_per_cpu = config.page_count(),
        "watching {TRACEPOINT_CATEGORY}/{TRACEPOINT_NAME}"
    );

    wait_for_shutdown().await?;

    info!(
        delivered = sink.delivered(),
        lost = sink.lost_total(),
        "graceful shutdown"
    );

    Ok(())
}

fn init_tracing(config: &SnoopConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observer.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.observer.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("wait for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
