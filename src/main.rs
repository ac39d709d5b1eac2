use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use modbus_link_mock::config::{ListenerKind, MockConfig, MockFraming, SlaveConfig};
use modbus_link_mock::MockServer;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "modbus_link_mock", about = "Mock Modbus slave server")]
struct Cli {
    /// TOML config describing the listener, transport settings and slaves.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on; overrides the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Serve UDP instead of TCP.
    #[arg(long)]
    udp: bool,

    #[arg(long, value_enum)]
    framing: Option<MockFraming>,

    /// Extra unit ids to serve with empty point stores.
    #[arg(short, long = "unit")]
    units: Vec<u8>,

    /// Write a JSON dump of all non-zero points here on shutdown.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<MockConfig> {
    let mut cfg = match &cli.config {
        Some(path) => MockConfig::load(path)?,
        None => MockConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        cfg.listener.bind.clone_from(bind);
    }
    if cli.udp {
        cfg.listener.kind = ListenerKind::Udp;
    }
    if let Some(framing) = cli.framing {
        cfg.listener.framing = framing;
    }
    for &unit in &cli.units {
        if cfg.slaves.iter().all(|s| s.unit_id != unit) {
            cfg.slaves.push(SlaveConfig::empty(unit));
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();
    modbus_link::init_defaults()?;

    let cfg = load_config(&cli)?;
    let server = MockServer::from_config(&cfg)?;
    tracing::info!(units = ?server.registry().unit_ids(), "slaves configured");

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("ctrl-c received, shutting down");
        let _ = tx.send(true);
    });

    match cfg.listener.kind {
        ListenerKind::Tcp => {
            let listener = TcpListener::bind(cfg.listener.bind.as_str())
                .await
                .with_context(|| format!("bind tcp {}", cfg.listener.bind))?;
            server.run_tcp_listener_on(listener, rx).await?;
        }
        ListenerKind::Udp => {
            let socket = UdpSocket::bind(cfg.listener.bind.as_str())
                .await
                .with_context(|| format!("bind udp {}", cfg.listener.bind))?;
            server.run_udp_on(socket, rx).await?;
        }
    }

    if let Some(path) = &cli.snapshot {
        std::fs::write(path, server.snapshot_json()?)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        tracing::info!("snapshot written to {}", path.display());
    }
    Ok(())
}
