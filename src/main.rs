use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portstream::config::{tuning_from_millis, ServerConfig};
use portstream::params::{self, ScanParams};
use portstream::types::{BatchScanResponse, ScanEvent, ScanReport};
use portstream::{server, ScanCoordinator, SessionOutcome, TcpConnectProbe};

/// portstream: concurrent TCP connect scanner with a live event stream.
#[derive(Debug, Parser)]
#[command(
    name = "portstream",
    version,
    about = "Concurrent TCP connect scanner streaming live results over server-sent events.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (`/sse`, `/scan`, `/health`) and the optional web UI.
    Serve(ServeArgs),
    /// Scan one host from the command line and print the open ports.
    Scan(ScanArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:9090")]
    bind: String,

    /// Access key callers must supply as `key`.
    #[arg(long = "access-key", env = "PORTSTREAM_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    /// Directory with the web UI; `index.html` is served at `/` when present.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,

    /// Scanned-port advance between two progress events.
    #[arg(long = "progress-step", default_value_t = 50)]
    progress_step: u64,

    /// Period between progress samples in milliseconds.
    #[arg(long = "sample-interval-ms", default_value_t = 200)]
    sample_interval_ms: u64,

    /// How long to wait for workers after a scan ends or is cancelled, in milliseconds.
    #[arg(long = "grace-ms", default_value_t = 5000)]
    grace_ms: u64,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Host name or IP address to scan.
    #[arg(long, default_value = params::DEFAULT_HOST)]
    ip: String,

    #[arg(long = "start-port", default_value_t = params::DEFAULT_START_PORT, allow_negative_numbers = true)]
    start_port: i64,

    #[arg(long = "end-port", default_value_t = params::DEFAULT_END_PORT, allow_negative_numbers = true)]
    end_port: i64,

    /// Connect timeout in seconds (0.1 to 5).
    #[arg(long, default_value_t = params::DEFAULT_TIMEOUT_SECS)]
    timeout: f64,

    /// Concurrent workers (1 to 100).
    #[arg(long, default_value_t = params::DEFAULT_THREADS, allow_negative_numbers = true)]
    threads: i64,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Scan(args) => scan(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        bind: args.bind,
        access_key: args.access_key,
        ui_dir: args.ui_dir,
        tuning: tuning_from_millis(args.progress_step, args.sample_interval_ms, args.grace_ms),
    };
    tracing::info!(
        bind = %config.bind,
        ui_dir = %config.ui_dir.display(),
        progress_step = config.tuning.progress_step,
        "starting server"
    );
    server::spawn_server(config, Arc::new(TcpConnectProbe)).await
}

async fn scan(args: ScanArgs) -> Result<()> {
    let request = ScanParams {
        ip: args.ip,
        start_port: args.start_port,
        end_port: args.end_port,
        timeout: args.timeout,
        threads: args.threads,
    }
    .validate()?;

    println!(
        "Scanning {} ports {}-{} ({} workers, {:?} timeout)",
        request.host, request.start_port, request.end_port, request.worker_count, request.timeout
    );

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let (tx, mut rx) = mpsc::channel(64);
    let (ip, start_port, end_port) = (request.host.clone(), request.start_port, request.end_port);
    let session = tokio::spawn(
        ScanCoordinator::new(request, Arc::new(TcpConnectProbe)).run(tx, cancel),
    );

    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::PortOpen(result) => println!("  open  {:>5}/tcp  {}", result.port, result.service),
            ScanEvent::Progress { scanned, total, progress } => {
                eprintln!("  progress {scanned}/{total} ({progress:.2}%)")
            }
            _ => {}
        }
    }

    let report = match session.await? {
        SessionOutcome::Completed(report) => report,
        SessionOutcome::Cancelled { open_ports, scanned } => {
            eprintln!("Scan cancelled after {scanned} ports");
            ScanReport::new(open_ports)
        }
        SessionOutcome::Failed(e) => return Err(e.into()),
    };

    print_results_table(&report);
    if let Some(path) = args.output.as_deref() {
        let response = BatchScanResponse {
            ip,
            start_port,
            end_port,
            report,
        };
        if let Err(e) = write_results_json(path, &response) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON results to {}", path.display());
        }
    }
    Ok(())
}

fn print_results_table(report: &ScanReport) {
    let port_w = 5usize;
    let mut service_w = "service".len();
    for r in &report.open_ports {
        service_w = service_w.max(r.service.len());
    }

    println!("\nOpen ports: {}", report.total_open);
    println!(
        "{:>port_w$}  {:<service_w$}",
        "port",
        "service",
        port_w = port_w,
        service_w = service_w
    );
    println!(
        "{:-<port_w$}  {:-<service_w$}",
        "",
        "",
        port_w = port_w,
        service_w = service_w
    );
    let mut rows = report.open_ports.clone();
    rows.sort_by_key(|r| r.port);
    for r in &rows {
        println!(
            "{:>port_w$}  {:<service_w$}",
            r.port,
            r.service,
            port_w = port_w,
            service_w = service_w
        );
    }
}

fn write_results_json(path: &Path, response: &BatchScanResponse) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, response)?;
    Ok(())
}
